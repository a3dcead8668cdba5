// Expression model: typed AST for boolean/numeric/string expressions.
//
// JSON-authored expression nodes live in an arena and reference their
// children by integer id. All shapes deserialize safely from JSON; type
// correctness is checked by the resolver before any evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ARENA IDS
// ============================================================================

/// Index of an expression node inside an [`ExpressionArena`].
///
/// Ids are plain integers so authored graphs serialize flat and per-run
/// memoization caches can key on them directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ExprId(pub u32);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// VALUE TYPES
// ============================================================================

/// Static type of an expression or fact value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    Boolean,
    Text,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Text => "text",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// LITERALS
// ============================================================================

/// Literal constant. The literal slot that is set determines the type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl Literal {
    pub fn value_type(&self) -> ValueType {
        match self {
            Literal::Boolean(_) => ValueType::Boolean,
            Literal::Number(_) => ValueType::Number,
            Literal::Text(_) => ValueType::Text,
        }
    }
}

// ============================================================================
// OPERATORS & FUNCTIONS
// ============================================================================

/// Binary/unary operator. Serialized as its glyph (`"+"`, `"=="`, `"and"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "and")]
    And,
    #[serde(rename = "or")]
    Or,
    #[serde(rename = "not")]
    Not,
}

impl Operator {
    /// Number of children the operator owns.
    pub fn arity(&self) -> usize {
        match self {
            Operator::Not => 1,
            _ => 2,
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Operator::Add | Operator::Subtract | Operator::Multiply | Operator::Divide
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Equal
                | Operator::NotEqual
                | Operator::LessThan
                | Operator::LessOrEqual
                | Operator::GreaterThan
                | Operator::GreaterOrEqual
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Not)
    }

    /// Glyph used in serialized form and error messages.
    pub fn glyph(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessThan => "<",
            Operator::LessOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
        }
    }
}

/// Built-in numeric function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    Min,
    Max,
    Abs,
    Clamp,
}

impl FunctionKind {
    /// Number of arguments the function owns.
    pub fn arity(&self) -> usize {
        match self {
            FunctionKind::Min | FunctionKind::Max => 2,
            FunctionKind::Abs => 1,
            FunctionKind::Clamp => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FunctionKind::Min => "min",
            FunctionKind::Max => "max",
            FunctionKind::Abs => "abs",
            FunctionKind::Clamp => "clamp",
        }
    }
}

// ============================================================================
// EXPRESSION NODES
// ============================================================================

/// A node in the expression tree.
///
/// Children are arena ids, never owned boxes: the arena avoids cyclic
/// ownership and keeps the serialized form flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpressionNode {
    /// Literal constant.
    Const { literal: Literal },

    /// Reference to an externally supplied fact, typed via the fact registry.
    FactRef { key: String },

    /// Reference to a variable bound to a decision tree. Always `number`.
    VariableRef { key: String },

    /// Operator application owning 1-2 children.
    Operator { op: Operator, children: Vec<ExprId> },

    /// Function application owning 1-3 children.
    Function {
        function: FunctionKind,
        children: Vec<ExprId>,
    },
}

// ============================================================================
// ARENA
// ============================================================================

/// Flat store of expression nodes addressed by [`ExprId`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionArena {
    nodes: Vec<ExpressionNode>,
}

impl ExpressionArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Append a node and return its id.
    pub fn push(&mut self, node: ExpressionNode) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: ExprId) -> Option<&ExpressionNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // Builder helpers. Authoring code and tests assemble expressions through
    // these rather than pushing raw nodes.

    pub fn number(&mut self, value: f64) -> ExprId {
        self.push(ExpressionNode::Const {
            literal: Literal::Number(value),
        })
    }

    pub fn boolean(&mut self, value: bool) -> ExprId {
        self.push(ExpressionNode::Const {
            literal: Literal::Boolean(value),
        })
    }

    pub fn text(&mut self, value: &str) -> ExprId {
        self.push(ExpressionNode::Const {
            literal: Literal::Text(value.to_string()),
        })
    }

    pub fn fact(&mut self, key: &str) -> ExprId {
        self.push(ExpressionNode::FactRef {
            key: key.to_string(),
        })
    }

    pub fn variable(&mut self, key: &str) -> ExprId {
        self.push(ExpressionNode::VariableRef {
            key: key.to_string(),
        })
    }

    pub fn binary(&mut self, op: Operator, left: ExprId, right: ExprId) -> ExprId {
        self.push(ExpressionNode::Operator {
            op,
            children: vec![left, right],
        })
    }

    pub fn unary(&mut self, op: Operator, child: ExprId) -> ExprId {
        self.push(ExpressionNode::Operator {
            op,
            children: vec![child],
        })
    }

    pub fn function(&mut self, function: FunctionKind, children: Vec<ExprId>) -> ExprId {
        self.push(ExpressionNode::Function { function, children })
    }
}

// ============================================================================
// TESTS
// ============================================================================
