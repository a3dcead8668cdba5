// Run: ephemeral per-user context over a graph pair.
//
// Facts are append-only and tagged with a monotonic batch id (one batch per
// answer action). Going back deletes exactly the latest batch; there is no
// redo.

use crate::models::fact::{latest_view, FactMap, FactRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

/// One answered node, tagged with the batch its facts landed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub node_id: String,
    pub batch_id: u64,
}

#[derive(Debug, Error, PartialEq)]
pub enum RunError {
    #[error("batch id {given} is not newer than the latest batch {latest}")]
    NonMonotonicBatch { given: u64, latest: u64 },

    #[error("nothing to roll back: the run has no answered batches")]
    NothingToRollBack,
}

/// Accumulated state of one estimation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub project_id: String,
    pub decision_graph_id: String,
    pub pricing_graph_id: String,

    facts: Vec<FactRecord>,
    answers: Vec<AnswerRecord>,
}

impl Run {
    pub fn new(project_id: &str, decision_graph_id: &str, pricing_graph_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            decision_graph_id: decision_graph_id.to_string(),
            pricing_graph_id: pricing_graph_id.to_string(),
            facts: Vec::new(),
            answers: Vec::new(),
        }
    }

    /// Current fact view, latest batch wins.
    pub fn fact_view(&self) -> FactMap {
        latest_view(&self.facts)
    }

    pub fn fact_records(&self) -> &[FactRecord] {
        &self.facts
    }

    /// Ids of every node answered so far.
    pub fn answered(&self) -> BTreeSet<String> {
        self.answers.iter().map(|a| a.node_id.clone()).collect()
    }

    pub fn latest_batch(&self) -> Option<u64> {
        self.answers
            .iter()
            .map(|a| a.batch_id)
            .chain(self.facts.iter().map(|f| f.batch_id))
            .max()
    }

    /// The most recently answered node, if any.
    pub fn last_answered(&self) -> Option<&str> {
        self.answers
            .iter()
            .max_by_key(|a| a.batch_id)
            .map(|a| a.node_id.as_str())
    }

    /// Record one answer action: the answered node plus the facts its
    /// `produces_facts` entries resolved to, all tagged with `batch_id`.
    ///
    /// Batch ids are strictly monotonic; re-answering a node upserts its
    /// answer record while the facts append.
    pub fn record_answer(
        &mut self,
        node_id: &str,
        batch_id: u64,
        facts: Vec<FactRecord>,
    ) -> Result<(), RunError> {
        if let Some(latest) = self.latest_batch() {
            if batch_id <= latest {
                return Err(RunError::NonMonotonicBatch {
                    given: batch_id,
                    latest,
                });
            }
        }

        debug_assert!(facts.iter().all(|f| f.batch_id == batch_id));

        // Answer-per-node upsert.
        self.answers.retain(|a| a.node_id != node_id);
        self.answers.push(AnswerRecord {
            node_id: node_id.to_string(),
            batch_id,
        });
        self.facts.extend(facts);
        Ok(())
    }

    /// Delete the latest batch's facts and answers. One level only, no redo.
    ///
    /// Returns the batch id that was removed.
    pub fn roll_back(&mut self) -> Result<u64, RunError> {
        let latest = self.latest_batch().ok_or(RunError::NothingToRollBack)?;
        self.facts.retain(|f| f.batch_id != latest);
        self.answers.retain(|a| a.batch_id != latest);
        Ok(latest)
    }
}

// ============================================================================
// TESTS
// ============================================================================
