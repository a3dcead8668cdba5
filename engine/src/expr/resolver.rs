// Type resolver: recursive static type checking for expression trees.
//
// Every authored expression is resolved against the fact registry and the
// caller's variable allow-list before it may be evaluated. There is no
// implicit coercion anywhere: a mismatch here is a validation failure that
// blocks publishing.

use crate::expr::types::{ExprId, ExpressionArena, ExpressionNode, Operator, ValueType};
use crate::models::fact::FactRegistry;
use std::collections::BTreeSet;
use thiserror::Error;

/// Maximum expression depth the resolver will walk.
///
/// Authored arenas are bounded; exceeding this means the arena is malformed
/// (e.g. a child id pointing back up the tree).
pub const MAX_EXPR_DEPTH: usize = 100;

/// Type resolution errors.
#[derive(Debug, Error, PartialEq)]
pub enum TypeError {
    #[error("expression node {0} is not in the arena")]
    UnknownNode(ExprId),

    #[error("fact '{0}' is not defined in the fact registry")]
    UnknownFact(String),

    #[error("variable '{0}' is not visible in this scope")]
    VariableNotAllowed(String),

    #[error("operator '{op}' expects {expected} operand(s), found {found}")]
    OperatorArity {
        op: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("function '{function}' expects {expected} argument(s), found {found}")]
    FunctionArity {
        function: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("operator '{op}' expects {expected} operands, found {found}")]
    OperandType {
        op: &'static str,
        expected: ValueType,
        found: ValueType,
    },

    #[error("comparison '{op}' requires equal-typed operands, found {left} and {right}")]
    MixedComparison {
        op: &'static str,
        left: ValueType,
        right: ValueType,
    },

    #[error("expression depth exceeds maximum {MAX_EXPR_DEPTH}")]
    ExcessiveDepth,
}

/// Resolve the static type of an expression node.
///
/// Rules:
/// - `const` takes the type of whichever literal slot is set
/// - `fact_ref` looks up the registry by key; unknown keys error
/// - `variable_ref` must be in the caller's allow-list; always `number`
/// - math operators take two `number` children and yield `number`
/// - comparisons take equal-typed children and yield `boolean`
/// - `and`/`or` take two `boolean` children, `not` one; all yield `boolean`
/// - `min`/`max` take two `number`s, `abs` one, `clamp` three; all yield
///   `number`
///
/// The walk is recursive and re-run per call; memoization only happens at
/// evaluation time.
pub fn resolve_type(
    arena: &ExpressionArena,
    id: ExprId,
    registry: &FactRegistry,
    allowed_variables: &BTreeSet<String>,
) -> Result<ValueType, TypeError> {
    resolve_at_depth(arena, id, registry, allowed_variables, 0)
}

fn resolve_at_depth(
    arena: &ExpressionArena,
    id: ExprId,
    registry: &FactRegistry,
    allowed_variables: &BTreeSet<String>,
    depth: usize,
) -> Result<ValueType, TypeError> {
    if depth > MAX_EXPR_DEPTH {
        return Err(TypeError::ExcessiveDepth);
    }

    let node = arena.get(id).ok_or(TypeError::UnknownNode(id))?;

    match node {
        ExpressionNode::Const { literal } => Ok(literal.value_type()),

        ExpressionNode::FactRef { key } => registry
            .get(key)
            .map(|fact_type| fact_type.value_type())
            .ok_or_else(|| TypeError::UnknownFact(key.clone())),

        ExpressionNode::VariableRef { key } => {
            if allowed_variables.contains(key) {
                Ok(ValueType::Number)
            } else {
                Err(TypeError::VariableNotAllowed(key.clone()))
            }
        }

        ExpressionNode::Operator { op, children } => {
            if children.len() != op.arity() {
                return Err(TypeError::OperatorArity {
                    op: op.glyph(),
                    expected: op.arity(),
                    found: children.len(),
                });
            }

            let child_types: Vec<ValueType> = children
                .iter()
                .map(|&child| {
                    resolve_at_depth(arena, child, registry, allowed_variables, depth + 1)
                })
                .collect::<Result<_, _>>()?;

            if op.is_arithmetic() {
                for &found in &child_types {
                    if found != ValueType::Number {
                        return Err(TypeError::OperandType {
                            op: op.glyph(),
                            expected: ValueType::Number,
                            found,
                        });
                    }
                }
                Ok(ValueType::Number)
            } else if op.is_comparison() {
                if child_types[0] != child_types[1] {
                    return Err(TypeError::MixedComparison {
                        op: op.glyph(),
                        left: child_types[0],
                        right: child_types[1],
                    });
                }
                Ok(ValueType::Boolean)
            } else {
                // and / or / not
                for &found in &child_types {
                    if found != ValueType::Boolean {
                        return Err(TypeError::OperandType {
                            op: op.glyph(),
                            expected: ValueType::Boolean,
                            found,
                        });
                    }
                }
                Ok(ValueType::Boolean)
            }
        }

        ExpressionNode::Function { function, children } => {
            if children.len() != function.arity() {
                return Err(TypeError::FunctionArity {
                    function: function.name(),
                    expected: function.arity(),
                    found: children.len(),
                });
            }

            for &child in children {
                let found =
                    resolve_at_depth(arena, child, registry, allowed_variables, depth + 1)?;
                if found != ValueType::Number {
                    return Err(TypeError::OperandType {
                        op: function.name(),
                        expected: ValueType::Number,
                        found,
                    });
                }
            }
            Ok(ValueType::Number)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
