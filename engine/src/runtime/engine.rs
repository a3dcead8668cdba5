// Engine facade: the caller-visible run lifecycle.
//
// start_run / get_state / answer / go_back walk the decision graph;
// calculate evaluates the pricing graph into a tiered cost report.
// Everything is synchronous and per-call: graphs load as immutable
// snapshots, a fresh evaluation context is built after every fact change.

use crate::graph::scheduler::{
    compute_active_chunk, compute_page_nodes, ActiveChunk, ScheduleError,
};
use crate::graph::validation::{validate_graph, ValidationReport};
use crate::models::fact::{CoercionError, FactMap, FactRecord, FactValue};
use crate::models::graph::{DecisionGraph, FactSource, GraphNode};
use crate::models::run::{Run, RunError};
use crate::repo::{DataError, Repository};
use crate::rollup::costs::{
    build_report, evaluate_cost_nodes, CostError, CostReport, TierBoundaries,
};
use crate::rollup::pemdas::{evaluate_rollup, RollupError};
use crate::tree::context::EvaluationContext;
use crate::tree::interpreter::{evaluate, EvalError};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, error};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Page size for the sibling-pagination scheduler variant.
    pub page_size: usize,

    /// Report tier boundaries.
    pub tiers: TierBoundaries,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 8,
            tiers: TierBoundaries::default(),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Failure family, used for transport mapping by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Authoring problems: never recovered, block evaluation/publishing.
    Validation,
    /// Internal-consistency failures: surfaced as server-side errors.
    Runtime,
    /// Missing graph/run/node: surfaced as not-found.
    Data,
}

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Cost(#[from] CostError),

    #[error(transparent)]
    Rollup(#[from] RollupError),

    #[error("graph '{graph_id}' failed structural validation: {details}")]
    InvalidGraph { graph_id: String, details: String },

    #[error("fact '{0}' is not defined for this project")]
    UnknownFactKey(String),

    #[error("node '{node}' in graph '{graph}' is not a question")]
    NotAQuestion { graph: String, node: String },
}

impl EngineError {
    /// Classify into the three caller-visible failure families.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Data(_) => ErrorKind::Data,
            EngineError::Run(_)
            | EngineError::Coercion(_)
            | EngineError::InvalidGraph { .. }
            | EngineError::UnknownFactKey(_)
            | EngineError::NotAQuestion { .. } => ErrorKind::Validation,
            EngineError::Schedule(ScheduleError::NonDeterministicGraph { .. })
            | EngineError::Cost(CostError::NoCostsCalculated(_)) => ErrorKind::Runtime,
            EngineError::Schedule(ScheduleError::Eval(e))
            | EngineError::Eval(e) => eval_kind(e),
            EngineError::Cost(CostError::Eval(e)) => eval_kind(e),
            EngineError::Rollup(RollupError::Eval(e)) => eval_kind(e),
            EngineError::Rollup(_) => ErrorKind::Validation,
        }
    }
}

fn eval_kind(error: &EvalError) -> ErrorKind {
    match error {
        // Unknown references survive only in graphs that skipped
        // validation; both families block the caller the same way.
        EvalError::UnknownFact(_) | EvalError::UnknownVariable(_) => ErrorKind::Validation,
        _ => ErrorKind::Runtime,
    }
}

// ============================================================================
// RUN STATE
// ============================================================================

/// Caller-visible state of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub run_id: String,
    pub facts: FactMap,
    pub active_chunk: ActiveChunk,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Decision/pricing engine over a persistence collaborator.
pub struct Engine<R: Repository> {
    repo: R,
    config: EngineConfig,
}

impl<R: Repository> Engine<R> {
    pub fn new(repo: R) -> Self {
        Self::with_config(repo, EngineConfig::default())
    }

    pub fn with_config(repo: R, config: EngineConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Structural validation for the publish path.
    pub fn validate_graph(&self, graph_id: &str) -> Result<ValidationReport, EngineError> {
        let graph = self.repo.load_graph(graph_id)?;
        Ok(validate_graph(&graph))
    }

    /// Start a run over a decision/pricing graph pair.
    ///
    /// The decision graph is structurally validated here, once per run
    /// start; errors block the run from existing.
    pub fn start_run(
        &mut self,
        decision_graph_id: &str,
        pricing_graph_id: &str,
    ) -> Result<RunState, EngineError> {
        let graph = self.load_validated(decision_graph_id)?;

        let run = Run::new(&graph.project_id, decision_graph_id, pricing_graph_id);
        let run_id = run.id.clone();
        debug!(run = %run_id, graph = %decision_graph_id, "starting run");

        let state = self.state_for(&run, &graph)?;
        self.repo.create_run(run)?;
        Ok(state)
    }

    /// Current facts and active chunk for a run.
    pub fn get_state(&self, run_id: &str) -> Result<RunState, EngineError> {
        let run = self.repo.load_run(run_id)?;
        let graph = self.repo.load_graph(&run.decision_graph_id)?;
        self.state_for(&run, &graph)
    }

    /// Paginated sibling variant: all ready unanswered questions by id, up
    /// to the configured page size, without depth-locking. For graphs
    /// whose questions are independently presentable.
    pub fn get_page(&self, run_id: &str) -> Result<RunState, EngineError> {
        let run = self.repo.load_run(run_id)?;
        let graph = self.repo.load_graph(&run.decision_graph_id)?;

        let facts = run.fact_view();
        let ctx = EvaluationContext::for_graph(&graph, &facts);
        let active_chunk =
            compute_page_nodes(&graph, &ctx, &run.answered(), self.config.page_size)?;

        Ok(RunState {
            run_id: run.id.clone(),
            facts,
            active_chunk,
        })
    }

    /// Answer a question node.
    ///
    /// Each `produces_facts` entry resolves (literal, raw answer, or
    /// derived expression), coerces to its declared fact type, and lands
    /// tagged with `batch_id`. The new active chunk is computed against
    /// the updated facts.
    pub fn answer(
        &mut self,
        run_id: &str,
        node_id: &str,
        payload: &JsonValue,
        batch_id: u64,
    ) -> Result<RunState, EngineError> {
        let mut run = self.repo.load_run(run_id)?;
        let graph = self.repo.load_graph(&run.decision_graph_id)?;

        let productions = match graph.node(node_id) {
            None => {
                return Err(DataError::NodeNotFound {
                    graph: graph.id.clone(),
                    node: node_id.to_string(),
                }
                .into())
            }
            Some(GraphNode::Cost { .. }) => {
                return Err(EngineError::NotAQuestion {
                    graph: graph.id.clone(),
                    node: node_id.to_string(),
                })
            }
            Some(GraphNode::Question { produces_facts, .. }) => produces_facts,
        };

        let facts = run.fact_view();
        let ctx = EvaluationContext::for_graph(&graph, &facts);

        let mut produced: Vec<FactRecord> = Vec::new();
        for production in productions {
            let raw = match &production.source {
                FactSource::Literal { value } => value.clone(),
                FactSource::Answer => payload.clone(),
                FactSource::Derived { expr } => {
                    fact_value_to_json(evaluate(*expr, &ctx)?)
                }
            };

            let definition = self
                .repo
                .fact_definition(&run.project_id, &production.key)
                .ok_or_else(|| EngineError::UnknownFactKey(production.key.clone()))?;

            let value = definition.fact_type.coerce(&production.key, &raw)?;
            produced.push(FactRecord {
                key: production.key.clone(),
                value,
                batch_id,
            });
        }

        run.record_answer(node_id, batch_id, produced)?;
        debug!(run = %run_id, node = %node_id, batch = batch_id, "answer recorded");

        let state = self.state_for(&run, &graph)?;
        self.repo.save_run(run)?;
        Ok(state)
    }

    /// Delete the latest answer batch and recompute the chunk.
    ///
    /// Destructive, one level only; there is no redo.
    pub fn go_back(&mut self, run_id: &str) -> Result<RunState, EngineError> {
        let mut run = self.repo.load_run(run_id)?;
        let graph = self.repo.load_graph(&run.decision_graph_id)?;

        let removed = run.roll_back()?;
        debug!(run = %run_id, batch = removed, "rolled back latest batch");

        let state = self.state_for(&run, &graph)?;
        self.repo.save_run(run)?;
        Ok(state)
    }

    /// Evaluate the run's pricing graph into a tiered cost report.
    ///
    /// `fact_inputs` supplement the run's accumulated facts; each input
    /// must coerce to its declared type for the project. Rollup line and
    /// bucket totals are published into the fact view (as number facts
    /// named by line id / bucket label) before cost nodes evaluate, so
    /// cost conditions and formulas can reference subtotals.
    pub fn calculate(
        &mut self,
        process_id: &str,
        run_id: &str,
        fact_inputs: &BTreeMap<String, JsonValue>,
    ) -> Result<CostReport, EngineError> {
        let run = self.repo.load_run(run_id)?;
        let graph = self.load_validated(&run.pricing_graph_id)?;

        let mut facts = run.fact_view();
        for (key, raw) in fact_inputs {
            let definition = self
                .repo
                .fact_definition(process_id, key)
                .ok_or_else(|| EngineError::UnknownFactKey(key.clone()))?;
            facts.insert(key.clone(), definition.fact_type.coerce(key, raw)?);
        }

        if let Some(rollup) = &graph.rollup {
            let ctx = EvaluationContext::for_graph(&graph, &facts);
            let result = evaluate_rollup(rollup, &ctx)?;

            for (line_id, total) in result.line_totals {
                facts.insert(line_id, FactValue::Number(total));
            }
            for (bucket, total) in result.bucket_totals {
                facts.insert(bucket.label().to_string(), FactValue::Number(total));
            }
        }

        let ctx = EvaluationContext::for_graph(&graph, &facts);
        let records = evaluate_cost_nodes(&graph, &ctx, run_id)?;
        if records.is_empty() {
            let err = CostError::NoCostsCalculated(run_id.to_string());
            error!(run = %run_id, graph = %graph.id, "{}", err);
            return Err(err.into());
        }

        self.repo.save_cost_records(run_id, records.clone())?;
        let report = build_report(run_id, &records, &self.config.tiers)?;
        debug!(
            run = %run_id,
            total_min = report.total_min,
            total_max = report.total_max,
            "calculated cost report"
        );
        Ok(report)
    }

    fn load_validated(&self, graph_id: &str) -> Result<DecisionGraph, EngineError> {
        let graph = self.repo.load_graph(graph_id)?;
        let report = validate_graph(&graph);
        if !report.valid {
            let details = report
                .errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            error!(graph = %graph_id, %details, "structural validation failed");
            return Err(EngineError::InvalidGraph {
                graph_id: graph_id.to_string(),
                details,
            });
        }
        Ok(graph)
    }

    fn state_for(&self, run: &Run, graph: &DecisionGraph) -> Result<RunState, EngineError> {
        let facts = run.fact_view();
        let ctx = EvaluationContext::for_graph(graph, &facts);
        let active_chunk = compute_active_chunk(graph, &ctx, &run.answered())?;

        Ok(RunState {
            run_id: run.id.clone(),
            facts,
            active_chunk,
        })
    }
}

fn fact_value_to_json(value: FactValue) -> JsonValue {
    match value {
        FactValue::Boolean(b) => JsonValue::Bool(b),
        FactValue::Number(n) => serde_json::json!(n),
        FactValue::Text(t) => JsonValue::String(t),
    }
}

// ============================================================================
// TESTS
// ============================================================================
