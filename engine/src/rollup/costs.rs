// Cost node evaluation and report building.
//
// Every cost node whose applies_if holds contributes one cost record:
// min/max from its cost_range, overridden by formula.min/formula.max when
// a formula is present. The report builder sums the records and classifies
// the inferred tier from the configured boundaries.

use crate::models::graph::{DecisionGraph, GraphNode};
use crate::tree::context::EvaluationContext;
use crate::tree::interpreter::{condition_holds, evaluate_number, EvalError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// One persisted cost row for an applying cost node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub run_id: String,
    pub node_id: String,
    pub min: f64,
    pub max: f64,
}

/// Price tier inferred from the rolled-up maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Standard,
    Premium,
}

/// Tier boundaries. A total below `basic_below` is basic, below
/// `standard_below` standard, anything else premium.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierBoundaries {
    pub basic_below: f64,
    pub standard_below: f64,
}

impl Default for TierBoundaries {
    fn default() -> Self {
        Self {
            basic_below: 10_000.0,
            standard_below: 30_000.0,
        }
    }
}

impl TierBoundaries {
    pub fn classify(&self, total: f64) -> Tier {
        if total < self.basic_below {
            Tier::Basic
        } else if total < self.standard_below {
            Tier::Standard
        } else {
            Tier::Premium
        }
    }
}

/// Rolled-up cost report for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub total_min: f64,
    pub total_max: f64,
    pub inferred_tier: Tier,
}

#[derive(Debug, Error, PartialEq)]
pub enum CostError {
    #[error("no costs calculated for run '{0}'")]
    NoCostsCalculated(String),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

// ============================================================================
// COST NODE EVALUATION
// ============================================================================

/// Evaluate every cost node in the graph against the context.
///
/// Nodes whose applies_if does not hold contribute nothing. Formula
/// overrides win over the plain range.
pub fn evaluate_cost_nodes(
    graph: &DecisionGraph,
    ctx: &EvaluationContext,
    run_id: &str,
) -> Result<Vec<CostRecord>, CostError> {
    let mut records = Vec::new();

    for node in graph.nodes() {
        let (id, applies_if, cost_range, formula) = match node {
            GraphNode::Cost {
                id,
                applies_if,
                cost_range,
                formula,
            } => (id, *applies_if, cost_range, formula),
            GraphNode::Question { .. } => continue,
        };

        if !condition_holds(applies_if, ctx)? {
            continue;
        }

        let (min_expr, max_expr) = match formula {
            Some(formula) => (formula.min, formula.max),
            None => (cost_range.min, cost_range.max),
        };

        let min = evaluate_number(min_expr, ctx)?;
        let max = evaluate_number(max_expr, ctx)?;
        debug!(node = %id, min, max, "cost node applies");

        records.push(CostRecord {
            run_id: run_id.to_string(),
            node_id: id.clone(),
            min,
            max,
        });
    }

    Ok(records)
}

// ============================================================================
// REPORT BUILDER
// ============================================================================

/// Sum persisted cost records into a tiered report.
///
/// Zero records is a hard error: a priced run with nothing applying is an
/// authoring or data problem, not an empty quote.
pub fn build_report(
    run_id: &str,
    records: &[CostRecord],
    boundaries: &TierBoundaries,
) -> Result<CostReport, CostError> {
    if records.is_empty() {
        return Err(CostError::NoCostsCalculated(run_id.to_string()));
    }

    let total_min: f64 = records.iter().map(|r| r.min).sum();
    let total_max: f64 = records.iter().map(|r| r.max).sum();

    Ok(CostReport {
        total_min,
        total_max,
        inferred_tier: boundaries.classify(total_max),
    })
}

// ============================================================================
// TESTS
// ============================================================================
