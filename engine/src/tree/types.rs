// Decision trees: ordered conditional branches returning a typed value.
//
// A tree is a flat list of branches walked in order. Each branch carries an
// optional boolean condition (an arena expression id) and exactly one
// outcome matching the tree's declared return type. Exactly one branch
// omits its condition: the ELSE, walked last.

use crate::expr::types::ExprId;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// RETURN TYPES
// ============================================================================

/// Declared return type of a decision tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    Number,
    Boolean,
    /// Returns a direct graph-node reference (routing trees).
    Node,
    /// Returns one or more numeric adjustment commands (pricing trees).
    Adjustment,
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReturnType::Number => "number",
            ReturnType::Boolean => "boolean",
            ReturnType::Node => "node",
            ReturnType::Adjustment => "adjustment",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// TREE DEFINITION
// ============================================================================

/// Complete decision tree definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Unique identifier for this tree.
    pub id: String,

    /// Optional human-readable description.
    #[serde(default)]
    pub description: Option<String>,

    pub return_type: ReturnType,

    /// Ordered branches; first match (or the ELSE) wins.
    pub branches: Vec<Branch>,
}

/// One branch of a decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Boolean condition. `None` marks the ELSE branch.
    #[serde(default)]
    pub condition: Option<ExprId>,

    pub outcome: BranchOutcome,
}

impl Branch {
    pub fn is_else(&self) -> bool {
        self.condition.is_none()
    }
}

/// Outcome of a branch. The shape must match the tree's return type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BranchOutcome {
    Number { value: ExprId },
    Boolean { value: ExprId },
    Node { node_id: String },
    Adjustment { commands: Vec<AdjustmentCommand> },
}

/// One numeric adjustment emitted by an adjustment-returning tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentCommand {
    /// What the adjustment applies to (a cost line or bucket label).
    pub target: String,

    /// Number-typed expression supplying the adjustment amount.
    pub value: ExprId,
}

// ============================================================================
// TESTS
// ============================================================================
