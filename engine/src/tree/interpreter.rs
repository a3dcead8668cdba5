// Expression and decision-tree evaluation.
//
// Memoized recursive walk over the arena using the context's per-run
// caches. Facts are immutable within a run's evaluation phase, so a node
// id always resolves to the same value and caching is safe.
//
// Division by zero evaluates to 0: a deliberate tolerance, not an error.

use crate::expr::types::{ExprId, ExpressionNode, FunctionKind, Operator, ValueType};
use crate::models::fact::FactValue;
use crate::tree::context::EvaluationContext;
use crate::tree::types::{Branch, BranchOutcome, DecisionTree};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::debug;

/// Epsilon for floating point equality comparison.
pub const FLOAT_EPSILON: f64 = 1e-9;

/// Maximum recursion depth during evaluation.
pub const MAX_EVAL_DEPTH: usize = 100;

/// Errors that can occur during evaluation.
///
/// After validation most of these are unreachable; the ones that remain
/// reachable are `MissingFact` (a fact the run has not produced yet) and
/// `NoMatchingBranch` (internal-consistency failure).
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("expression node {0} is not in the arena")]
    UnknownNode(ExprId),

    #[error("fact '{0}' is not defined in the fact registry")]
    UnknownFact(String),

    #[error("fact '{0}' has not been produced in this run")]
    MissingFact(String),

    #[error("variable '{0}' has no binding")]
    UnknownVariable(String),

    #[error("variable '{key}' is bound to unknown decision tree '{tree_id}'")]
    UnknownTree { key: String, tree_id: String },

    #[error("decision tree '{0}' exhausted its branches without a match")]
    NoMatchingBranch(String),

    #[error("variable '{key}' is bound to tree '{tree_id}' which does not return a number")]
    NonNumericVariable { key: String, tree_id: String },

    #[error("operator '{op}' applied to a non-{expected} operand")]
    OperandType { op: String, expected: ValueType },

    #[error("comparison across mixed value types")]
    MixedComparison,

    #[error("operator '{op}' has wrong operand count {found}")]
    MalformedOperator { op: String, found: usize },

    #[error("evaluation depth exceeds maximum {MAX_EVAL_DEPTH}")]
    MaxDepthExceeded,
}

// ============================================================================
// EXPRESSION EVALUATION
// ============================================================================

/// Evaluate an expression node to a typed value, memoized per run.
pub fn evaluate(id: ExprId, ctx: &EvaluationContext) -> Result<FactValue, EvalError> {
    evaluate_at_depth(id, ctx, 0)
}

/// Evaluate an expression expected to produce a number.
pub fn evaluate_number(id: ExprId, ctx: &EvaluationContext) -> Result<f64, EvalError> {
    match evaluate(id, ctx)? {
        FactValue::Number(n) => Ok(n),
        _ => Err(EvalError::OperandType {
            op: format!("expression {}", id),
            expected: ValueType::Number,
        }),
    }
}

/// Evaluate an expression expected to produce a boolean.
pub fn evaluate_boolean(id: ExprId, ctx: &EvaluationContext) -> Result<bool, EvalError> {
    match evaluate(id, ctx)? {
        FactValue::Boolean(b) => Ok(b),
        _ => Err(EvalError::OperandType {
            op: format!("expression {}", id),
            expected: ValueType::Boolean,
        }),
    }
}

/// Evaluate an optional gate condition against the context.
///
/// `None` holds. A condition that fails with `MissingFact` does not hold:
/// gates over facts the run has not produced yet stay closed rather than
/// failing the run. Any other error propagates.
pub fn condition_holds(
    condition: Option<ExprId>,
    ctx: &EvaluationContext,
) -> Result<bool, EvalError> {
    match condition {
        None => Ok(true),
        Some(id) => match evaluate_boolean(id, ctx) {
            Ok(holds) => Ok(holds),
            Err(EvalError::MissingFact(_)) => Ok(false),
            Err(e) => Err(e),
        },
    }
}

fn evaluate_at_depth(
    id: ExprId,
    ctx: &EvaluationContext,
    depth: usize,
) -> Result<FactValue, EvalError> {
    if depth > MAX_EVAL_DEPTH {
        return Err(EvalError::MaxDepthExceeded);
    }

    if let Some(cached) = ctx.cached_expr(id) {
        return Ok(cached);
    }

    let node = ctx.arena().get(id).ok_or(EvalError::UnknownNode(id))?;

    let value = match node {
        ExpressionNode::Const { literal } => match literal {
            crate::expr::types::Literal::Boolean(b) => FactValue::Boolean(*b),
            crate::expr::types::Literal::Number(n) => FactValue::Number(*n),
            crate::expr::types::Literal::Text(t) => FactValue::Text(t.clone()),
        },

        ExpressionNode::FactRef { key } => ctx.fact(key)?,

        ExpressionNode::VariableRef { key } => FactValue::Number(resolve_variable(key, ctx)?),

        ExpressionNode::Operator { op, children } => {
            evaluate_operator(*op, children, ctx, depth)?
        }

        ExpressionNode::Function { function, children } => {
            evaluate_function(*function, children, ctx, depth)?
        }
    };

    ctx.store_expr(id, value.clone());
    Ok(value)
}

fn evaluate_operator(
    op: Operator,
    children: &[ExprId],
    ctx: &EvaluationContext,
    depth: usize,
) -> Result<FactValue, EvalError> {
    if children.len() != op.arity() {
        return Err(EvalError::MalformedOperator {
            op: op.glyph().to_string(),
            found: children.len(),
        });
    }

    // Logical operators short-circuit, so they evaluate their own children.
    if op.is_logical() {
        return match op {
            Operator::And => {
                let left = boolean_child(children[0], ctx, depth, op)?;
                if !left {
                    return Ok(FactValue::Boolean(false));
                }
                let right = boolean_child(children[1], ctx, depth, op)?;
                Ok(FactValue::Boolean(right))
            }
            Operator::Or => {
                let left = boolean_child(children[0], ctx, depth, op)?;
                if left {
                    return Ok(FactValue::Boolean(true));
                }
                let right = boolean_child(children[1], ctx, depth, op)?;
                Ok(FactValue::Boolean(right))
            }
            Operator::Not => {
                let value = boolean_child(children[0], ctx, depth, op)?;
                Ok(FactValue::Boolean(!value))
            }
            _ => unreachable!("is_logical covers and/or/not"),
        };
    }

    if op.is_arithmetic() {
        let left = number_child(children[0], ctx, depth, op)?;
        let right = number_child(children[1], ctx, depth, op)?;
        let result = match op {
            Operator::Add => left + right,
            Operator::Subtract => left - right,
            Operator::Multiply => left * right,
            Operator::Divide => {
                if right.abs() < FLOAT_EPSILON {
                    0.0
                } else {
                    left / right
                }
            }
            _ => unreachable!("is_arithmetic covers + - * /"),
        };
        return Ok(FactValue::Number(result));
    }

    // Comparison over equal-typed operands.
    let left = evaluate_at_depth(children[0], ctx, depth + 1)?;
    let right = evaluate_at_depth(children[1], ctx, depth + 1)?;
    let result = compare(op, &left, &right)?;
    Ok(FactValue::Boolean(result))
}

fn compare(op: Operator, left: &FactValue, right: &FactValue) -> Result<bool, EvalError> {
    let ordering = match (left, right) {
        (FactValue::Number(l), FactValue::Number(r)) => {
            if (l - r).abs() < FLOAT_EPSILON {
                Ordering::Equal
            } else if l < r {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (FactValue::Boolean(l), FactValue::Boolean(r)) => l.cmp(r),
        (FactValue::Text(l), FactValue::Text(r)) => l.cmp(r),
        _ => return Err(EvalError::MixedComparison),
    };

    let result = match op {
        Operator::Equal => ordering == Ordering::Equal,
        Operator::NotEqual => ordering != Ordering::Equal,
        Operator::LessThan => ordering == Ordering::Less,
        Operator::LessOrEqual => ordering != Ordering::Greater,
        Operator::GreaterThan => ordering == Ordering::Greater,
        Operator::GreaterOrEqual => ordering != Ordering::Less,
        _ => unreachable!("comparison operators only"),
    };
    Ok(result)
}

fn evaluate_function(
    function: FunctionKind,
    children: &[ExprId],
    ctx: &EvaluationContext,
    depth: usize,
) -> Result<FactValue, EvalError> {
    if children.len() != function.arity() {
        return Err(EvalError::MalformedOperator {
            op: function.name().to_string(),
            found: children.len(),
        });
    }

    let result = match function {
        FunctionKind::Min => {
            let a = function_child(children[0], ctx, depth, function)?;
            let b = function_child(children[1], ctx, depth, function)?;
            a.min(b)
        }
        FunctionKind::Max => {
            let a = function_child(children[0], ctx, depth, function)?;
            let b = function_child(children[1], ctx, depth, function)?;
            a.max(b)
        }
        FunctionKind::Abs => function_child(children[0], ctx, depth, function)?.abs(),
        FunctionKind::Clamp => {
            let value = function_child(children[0], ctx, depth, function)?;
            let min = function_child(children[1], ctx, depth, function)?;
            let max = function_child(children[2], ctx, depth, function)?;
            value.max(min).min(max)
        }
    };
    Ok(FactValue::Number(result))
}

fn number_child(
    id: ExprId,
    ctx: &EvaluationContext,
    depth: usize,
    op: Operator,
) -> Result<f64, EvalError> {
    match evaluate_at_depth(id, ctx, depth + 1)? {
        FactValue::Number(n) => Ok(n),
        _ => Err(EvalError::OperandType {
            op: op.glyph().to_string(),
            expected: ValueType::Number,
        }),
    }
}

fn boolean_child(
    id: ExprId,
    ctx: &EvaluationContext,
    depth: usize,
    op: Operator,
) -> Result<bool, EvalError> {
    match evaluate_at_depth(id, ctx, depth + 1)? {
        FactValue::Boolean(b) => Ok(b),
        _ => Err(EvalError::OperandType {
            op: op.glyph().to_string(),
            expected: ValueType::Boolean,
        }),
    }
}

fn function_child(
    id: ExprId,
    ctx: &EvaluationContext,
    depth: usize,
    function: FunctionKind,
) -> Result<f64, EvalError> {
    match evaluate_at_depth(id, ctx, depth + 1)? {
        FactValue::Number(n) => Ok(n),
        _ => Err(EvalError::OperandType {
            op: function.name().to_string(),
            expected: ValueType::Number,
        }),
    }
}

// ============================================================================
// TREE TRAVERSAL
// ============================================================================

/// Walk a tree's branches in order and select the first whose condition
/// holds, or the unconditioned ELSE.
///
/// Exhausting every branch is an internal-consistency failure: validation
/// guarantees an ELSE, so a validated tree cannot reach it.
pub fn select_branch<'t>(
    tree: &'t DecisionTree,
    ctx: &EvaluationContext,
) -> Result<&'t Branch, EvalError> {
    for branch in &tree.branches {
        match branch.condition {
            None => return Ok(branch),
            Some(condition) => {
                if evaluate_boolean(condition, ctx)? {
                    return Ok(branch);
                }
            }
        }
    }
    Err(EvalError::NoMatchingBranch(tree.id.clone()))
}

/// Resolve a variable to its number value, memoized per run.
///
/// Looks up the variable's bound tree, selects the first matching branch,
/// and evaluates its number outcome.
pub fn resolve_variable(key: &str, ctx: &EvaluationContext) -> Result<f64, EvalError> {
    if let Some(cached) = ctx.cached_variable(key) {
        return Ok(cached);
    }

    let tree = ctx.tree_for_variable(key)?;
    let branch = select_branch(tree, ctx)?;

    let value = match &branch.outcome {
        BranchOutcome::Number { value } => evaluate_number(*value, ctx)?,
        _ => {
            return Err(EvalError::NonNumericVariable {
                key: key.to_string(),
                tree_id: tree.id.clone(),
            })
        }
    };

    debug!(variable = key, value, "resolved variable");
    ctx.store_variable(key, value);
    Ok(value)
}

/// Resolve a node-returning tree to the referenced node id.
pub fn resolve_node<'t>(
    tree: &'t DecisionTree,
    ctx: &EvaluationContext,
) -> Result<&'t str, EvalError> {
    let branch = select_branch(tree, ctx)?;
    match &branch.outcome {
        BranchOutcome::Node { node_id } => Ok(node_id),
        _ => Err(EvalError::NoMatchingBranch(tree.id.clone())),
    }
}

/// Resolve an adjustment-returning tree to its (target, amount) commands.
pub fn resolve_adjustments(
    tree: &DecisionTree,
    ctx: &EvaluationContext,
) -> Result<Vec<(String, f64)>, EvalError> {
    let branch = select_branch(tree, ctx)?;
    match &branch.outcome {
        BranchOutcome::Adjustment { commands } => commands
            .iter()
            .map(|command| {
                evaluate_number(command.value, ctx).map(|amount| (command.target.clone(), amount))
            })
            .collect(),
        _ => Err(EvalError::NoMatchingBranch(tree.id.clone())),
    }
}

// ============================================================================
// TESTS
// ============================================================================
