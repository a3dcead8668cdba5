// Decision tree validation.
//
// Pre-evaluation safety checks:
// - every conditioned branch's condition resolves to boolean
// - exactly one ELSE branch, and it comes last
// - each branch's outcome shape matches the declared return type
// - adjustment outcomes carry at least one command, each number-typed
//
// All violations are collected in branch order so results are
// deterministic and testable.

use crate::expr::resolver::{resolve_type, TypeError};
use crate::expr::types::{ExpressionArena, ValueType};
use crate::models::fact::FactRegistry;
use crate::tree::types::{BranchOutcome, DecisionTree, ReturnType};
use std::collections::BTreeSet;
use thiserror::Error;

/// Tree validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum TreeValidationError {
    #[error("tree '{tree}' has no ELSE branch")]
    MissingElse { tree: String },

    #[error("tree '{tree}' has {count} ELSE branches; exactly one is allowed")]
    MultipleElse { tree: String, count: usize },

    #[error("tree '{tree}' branch {branch}: ELSE must be the final branch")]
    ElseNotLast { tree: String, branch: usize },

    #[error("tree '{tree}' branch {branch}: condition resolves to {found}, expected boolean")]
    NonBooleanCondition {
        tree: String,
        branch: usize,
        found: ValueType,
    },

    #[error("tree '{tree}' branch {branch}: outcome does not match return type {expected}")]
    OutcomeShapeMismatch {
        tree: String,
        branch: usize,
        expected: ReturnType,
    },

    #[error("tree '{tree}' branch {branch}: outcome value resolves to {found}, expected {expected}")]
    OutcomeValueType {
        tree: String,
        branch: usize,
        expected: ValueType,
        found: ValueType,
    },

    #[error("tree '{tree}' branch {branch}: adjustment outcome has no commands")]
    EmptyAdjustment { tree: String, branch: usize },

    #[error(
        "tree '{tree}' branch {branch}: adjustment '{target}' resolves to {found}, expected number"
    )]
    NonNumericAdjustment {
        tree: String,
        branch: usize,
        target: String,
        found: ValueType,
    },

    #[error("tree '{tree}' branch {branch}: {source}")]
    Type {
        tree: String,
        branch: usize,
        source: TypeError,
    },
}

/// Validate a decision tree against the arena, fact registry, and the
/// caller's variable allow-list.
///
/// Returns all violations found, in branch order.
pub fn validate_tree(
    tree: &DecisionTree,
    arena: &ExpressionArena,
    registry: &FactRegistry,
    allowed_variables: &BTreeSet<String>,
) -> Result<(), Vec<TreeValidationError>> {
    let mut errors = Vec::new();

    let else_positions: Vec<usize> = tree
        .branches
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_else())
        .map(|(i, _)| i)
        .collect();

    // Exactly one ELSE, regardless of how many conditioned branches exist.
    match else_positions.len() {
        0 => errors.push(TreeValidationError::MissingElse {
            tree: tree.id.clone(),
        }),
        1 => {
            let position = else_positions[0];
            if position != tree.branches.len() - 1 {
                errors.push(TreeValidationError::ElseNotLast {
                    tree: tree.id.clone(),
                    branch: position,
                });
            }
        }
        count => errors.push(TreeValidationError::MultipleElse {
            tree: tree.id.clone(),
            count,
        }),
    }

    for (index, branch) in tree.branches.iter().enumerate() {
        if let Some(condition) = branch.condition {
            match resolve_type(arena, condition, registry, allowed_variables) {
                Ok(ValueType::Boolean) => {}
                Ok(found) => errors.push(TreeValidationError::NonBooleanCondition {
                    tree: tree.id.clone(),
                    branch: index,
                    found,
                }),
                Err(source) => errors.push(TreeValidationError::Type {
                    tree: tree.id.clone(),
                    branch: index,
                    source,
                }),
            }
        }

        validate_outcome(tree, index, arena, registry, allowed_variables, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_outcome(
    tree: &DecisionTree,
    index: usize,
    arena: &ExpressionArena,
    registry: &FactRegistry,
    allowed_variables: &BTreeSet<String>,
    errors: &mut Vec<TreeValidationError>,
) {
    let outcome = &tree.branches[index].outcome;

    // Shape must match the declared return type before values are checked.
    let shape_matches = matches!(
        (tree.return_type, outcome),
        (ReturnType::Number, BranchOutcome::Number { .. })
            | (ReturnType::Boolean, BranchOutcome::Boolean { .. })
            | (ReturnType::Node, BranchOutcome::Node { .. })
            | (ReturnType::Adjustment, BranchOutcome::Adjustment { .. })
    );
    if !shape_matches {
        errors.push(TreeValidationError::OutcomeShapeMismatch {
            tree: tree.id.clone(),
            branch: index,
            expected: tree.return_type,
        });
        return;
    }

    match outcome {
        BranchOutcome::Number { value } => {
            check_value_type(
                tree, index, arena, registry, allowed_variables, *value,
                ValueType::Number, errors,
            );
        }
        BranchOutcome::Boolean { value } => {
            check_value_type(
                tree, index, arena, registry, allowed_variables, *value,
                ValueType::Boolean, errors,
            );
        }
        BranchOutcome::Node { .. } => {
            // A direct node reference; resolution against the graph happens
            // at graph load, where dangling references are rejected.
        }
        BranchOutcome::Adjustment { commands } => {
            if commands.is_empty() {
                errors.push(TreeValidationError::EmptyAdjustment {
                    tree: tree.id.clone(),
                    branch: index,
                });
            }
            for command in commands {
                match resolve_type(arena, command.value, registry, allowed_variables) {
                    Ok(ValueType::Number) => {}
                    Ok(found) => errors.push(TreeValidationError::NonNumericAdjustment {
                        tree: tree.id.clone(),
                        branch: index,
                        target: command.target.clone(),
                        found,
                    }),
                    Err(source) => errors.push(TreeValidationError::Type {
                        tree: tree.id.clone(),
                        branch: index,
                        source,
                    }),
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn check_value_type(
    tree: &DecisionTree,
    index: usize,
    arena: &ExpressionArena,
    registry: &FactRegistry,
    allowed_variables: &BTreeSet<String>,
    value: crate::expr::types::ExprId,
    expected: ValueType,
    errors: &mut Vec<TreeValidationError>,
) {
    match resolve_type(arena, value, registry, allowed_variables) {
        Ok(found) if found == expected => {}
        Ok(found) => errors.push(TreeValidationError::OutcomeValueType {
            tree: tree.id.clone(),
            branch: index,
            expected,
            found,
        }),
        Err(source) => errors.push(TreeValidationError::Type {
            tree: tree.id.clone(),
            branch: index,
            source,
        }),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::types::Operator;
    use crate::models::fact::FactType;
    use crate::tree::types::{AdjustmentCommand, Branch};
    use std::collections::BTreeMap;

    fn registry() -> FactRegistry {
        let mut reg = BTreeMap::new();
        reg.insert("age".to_string(), FactType::Number);
        reg
    }

    fn number_branch(arena: &mut ExpressionArena, condition: Option<crate::expr::types::ExprId>, value: f64) -> Branch {
        let value = arena.number(value);
        Branch {
            condition,
            outcome: BranchOutcome::Number { value },
        }
    }

    #[test]
    fn test_valid_tree_passes() {
        let mut arena = ExpressionArena::new();
        let age = arena.fact("age");
        let limit = arena.number(65.0);
        let senior = arena.binary(Operator::GreaterThan, age, limit);

        let tree = DecisionTree {
            id: "discount".to_string(),
            description: None,
            return_type: ReturnType::Number,
            branches: vec![
                number_branch(&mut arena, Some(senior), 0.5),
                number_branch(&mut arena, None, 1.0),
            ],
        };

        let result = validate_tree(&tree, &arena, &registry(), &BTreeSet::new());
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_else_is_invalid() {
        let mut arena = ExpressionArena::new();
        let age = arena.fact("age");
        let limit = arena.number(65.0);
        let senior = arena.binary(Operator::GreaterThan, age, limit);

        let tree = DecisionTree {
            id: "discount".to_string(),
            description: None,
            return_type: ReturnType::Number,
            branches: vec![number_branch(&mut arena, Some(senior), 0.5)],
        };

        let errors = validate_tree(&tree, &arena, &registry(), &BTreeSet::new()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, TreeValidationError::MissingElse { .. })));
    }

    #[test]
    fn test_multiple_else_is_invalid() {
        let mut arena = ExpressionArena::new();
        let tree = DecisionTree {
            id: "discount".to_string(),
            description: None,
            return_type: ReturnType::Number,
            branches: vec![
                number_branch(&mut arena, None, 0.5),
                number_branch(&mut arena, None, 1.0),
            ],
        };

        let errors = validate_tree(&tree, &arena, &registry(), &BTreeSet::new()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, TreeValidationError::MultipleElse { count: 2, .. })));
    }

    #[test]
    fn test_else_must_come_last() {
        let mut arena = ExpressionArena::new();
        let age = arena.fact("age");
        let limit = arena.number(65.0);
        let senior = arena.binary(Operator::GreaterThan, age, limit);

        let tree = DecisionTree {
            id: "discount".to_string(),
            description: None,
            return_type: ReturnType::Number,
            branches: vec![
                number_branch(&mut arena, None, 1.0),
                number_branch(&mut arena, Some(senior), 0.5),
            ],
        };

        let errors = validate_tree(&tree, &arena, &registry(), &BTreeSet::new()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, TreeValidationError::ElseNotLast { branch: 0, .. })));
    }

    #[test]
    fn test_non_boolean_condition_is_invalid() {
        let mut arena = ExpressionArena::new();
        let age = arena.fact("age");

        let tree = DecisionTree {
            id: "discount".to_string(),
            description: None,
            return_type: ReturnType::Number,
            branches: vec![
                number_branch(&mut arena, Some(age), 0.5),
                number_branch(&mut arena, None, 1.0),
            ],
        };

        let errors = validate_tree(&tree, &arena, &registry(), &BTreeSet::new()).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            TreeValidationError::NonBooleanCondition {
                found: ValueType::Number,
                ..
            }
        )));
    }

    #[test]
    fn test_outcome_shape_must_match_return_type() {
        let mut arena = ExpressionArena::new();
        let value = arena.number(1.0);

        let tree = DecisionTree {
            id: "route".to_string(),
            description: None,
            return_type: ReturnType::Node,
            branches: vec![Branch {
                condition: None,
                outcome: BranchOutcome::Number { value },
            }],
        };

        let errors = validate_tree(&tree, &arena, &registry(), &BTreeSet::new()).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            TreeValidationError::OutcomeShapeMismatch {
                expected: ReturnType::Node,
                ..
            }
        )));
    }

    #[test]
    fn test_adjustment_needs_commands() {
        let tree = DecisionTree {
            id: "adjust".to_string(),
            description: None,
            return_type: ReturnType::Adjustment,
            branches: vec![Branch {
                condition: None,
                outcome: BranchOutcome::Adjustment { commands: vec![] },
            }],
        };

        let arena = ExpressionArena::new();
        let errors = validate_tree(&tree, &arena, &registry(), &BTreeSet::new()).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, TreeValidationError::EmptyAdjustment { .. })));
    }

    #[test]
    fn test_adjustment_values_must_be_numeric() {
        let mut arena = ExpressionArena::new();
        let flag = arena.boolean(true);

        let tree = DecisionTree {
            id: "adjust".to_string(),
            description: None,
            return_type: ReturnType::Adjustment,
            branches: vec![Branch {
                condition: None,
                outcome: BranchOutcome::Adjustment {
                    commands: vec![AdjustmentCommand {
                        target: "labor".to_string(),
                        value: flag,
                    }],
                },
            }],
        };

        let errors = validate_tree(&tree, &arena, &registry(), &BTreeSet::new()).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            TreeValidationError::NonNumericAdjustment {
                found: ValueType::Boolean,
                ..
            }
        )));
    }
}
