// Persistence collaborator.
//
// The engine consumes already-materialized graph snapshots and run rows
// through this narrow trait; a relational store implements it in
// production, MemoryRepository backs the tests. Graph integrity (empty
// graphs, dangling edges, zero entry nodes) is rejected when snapshots
// are assembled, before they are ever stored.

use crate::models::fact::{FactDefinition, FactType};
use crate::models::graph::DecisionGraph;
use crate::models::run::Run;
use crate::rollup::costs::CostRecord;
use std::collections::BTreeMap;
use thiserror::Error;

/// Not-found family of failures.
#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("graph '{0}' not found")]
    GraphNotFound(String),

    #[error("run '{0}' not found")]
    RunNotFound(String),

    #[error("node '{node}' not found in graph '{graph}'")]
    NodeNotFound { graph: String, node: String },
}

/// Narrow persistence interface the engine depends on.
pub trait Repository {
    /// Load an immutable graph snapshot.
    fn load_graph(&self, graph_id: &str) -> Result<DecisionGraph, DataError>;

    /// Declared fact definition for a project, if any.
    fn fact_definition(&self, project_id: &str, key: &str) -> Option<FactDefinition>;

    fn create_run(&mut self, run: Run) -> Result<(), DataError>;

    fn load_run(&self, run_id: &str) -> Result<Run, DataError>;

    /// Persist the run's current state (facts append-only, answers
    /// upserted per node; both enforced by [`Run`] itself).
    fn save_run(&mut self, run: Run) -> Result<(), DataError>;

    /// Replace the run's cost records with a fresh calculation.
    fn save_cost_records(&mut self, run_id: &str, records: Vec<CostRecord>)
        -> Result<(), DataError>;

    fn cost_records(&self, run_id: &str) -> Vec<CostRecord>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

/// In-process repository for tests and single-node tooling.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    graphs: BTreeMap<String, DecisionGraph>,
    fact_definitions: BTreeMap<(String, String), FactDefinition>,
    runs: BTreeMap<String, Run>,
    cost_records: BTreeMap<String, Vec<CostRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_graph(&mut self, graph: DecisionGraph) {
        // The graph's registry doubles as the project's fact definitions.
        for (key, fact_type) in &graph.fact_registry {
            self.insert_fact_definition(&graph.project_id, key, *fact_type);
        }
        self.graphs.insert(graph.id.clone(), graph);
    }

    pub fn insert_fact_definition(&mut self, project_id: &str, key: &str, fact_type: FactType) {
        self.fact_definitions.insert(
            (project_id.to_string(), key.to_string()),
            FactDefinition {
                key: key.to_string(),
                fact_type,
            },
        );
    }
}

impl Repository for MemoryRepository {
    fn load_graph(&self, graph_id: &str) -> Result<DecisionGraph, DataError> {
        self.graphs
            .get(graph_id)
            .cloned()
            .ok_or_else(|| DataError::GraphNotFound(graph_id.to_string()))
    }

    fn fact_definition(&self, project_id: &str, key: &str) -> Option<FactDefinition> {
        self.fact_definitions
            .get(&(project_id.to_string(), key.to_string()))
            .cloned()
    }

    fn create_run(&mut self, run: Run) -> Result<(), DataError> {
        self.runs.insert(run.id.clone(), run);
        Ok(())
    }

    fn load_run(&self, run_id: &str) -> Result<Run, DataError> {
        self.runs
            .get(run_id)
            .cloned()
            .ok_or_else(|| DataError::RunNotFound(run_id.to_string()))
    }

    fn save_run(&mut self, run: Run) -> Result<(), DataError> {
        if !self.runs.contains_key(&run.id) {
            return Err(DataError::RunNotFound(run.id));
        }
        self.runs.insert(run.id.clone(), run);
        Ok(())
    }

    fn save_cost_records(
        &mut self,
        run_id: &str,
        records: Vec<CostRecord>,
    ) -> Result<(), DataError> {
        self.cost_records.insert(run_id.to_string(), records);
        Ok(())
    }

    fn cost_records(&self, run_id: &str) -> Vec<CostRecord> {
        self.cost_records.get(run_id).cloned().unwrap_or_default()
    }
}

// ============================================================================
// TESTS
// ============================================================================
