// Runtime scheduler: which question chunk becomes active next.
//
// The scheduler selects the next batch to present, not every currently
// unlocked node; presenting everything at once would flatten branching
// into noise. Selection pipeline:
//
// 1. candidates: unanswered question nodes whose visibility holds
// 2. ready: the entry wave (only while nothing is answered), or nodes
//    with a satisfied incoming edge from an answered node; the
//    lowest-priority satisfied edge names the activating predecessor
// 3. depth-lock: if the deepest answered node activated any ready
//    candidates, restrict to exactly those, so a freshly-unlocked chain
//    drains fully before shallower siblings return
// 4. sort by (depth desc, priority asc, id asc); every candidate tied
//    with the best (depth, priority) key forms the chunk
//
// An empty ready set means the run is complete.

use crate::models::graph::{DecisionGraph, GraphNode};
use crate::tree::context::EvaluationContext;
use crate::tree::interpreter::{condition_holds, EvalError};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

/// The set of question nodes to present next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveChunk {
    /// Node ids, ordered by the scheduling key.
    pub nodes: Vec<String>,

    /// True when no further question can become ready.
    pub completed: bool,
}

impl ActiveChunk {
    fn complete() -> Self {
        Self {
            nodes: Vec::new(),
            completed: true,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("non-deterministic graph: {count} outgoing edges from '{node}' match simultaneously")]
    NonDeterministicGraph { node: String, count: usize },

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// A ready candidate with its scheduling key inputs.
struct ReadyCandidate {
    id: String,
    depth: usize,
    priority: i32,
    activator: Option<String>,
}

// ============================================================================
// ACTIVE CHUNK
// ============================================================================

/// Compute the next active chunk for a run.
///
/// Idempotent for identical facts and answer history.
pub fn compute_active_chunk(
    graph: &DecisionGraph,
    ctx: &EvaluationContext,
    answered: &BTreeSet<String>,
) -> Result<ActiveChunk, ScheduleError> {
    let ready = ready_candidates(graph, ctx, answered)?;
    if ready.is_empty() {
        debug!(graph = %graph.id, "no ready candidates, run complete");
        return Ok(ActiveChunk::complete());
    }

    let locked = apply_depth_lock(graph, answered, ready);

    // Sort by (depth desc, priority asc, id asc); the chunk is every
    // candidate tied with the best (depth, priority) key.
    let mut sorted = locked;
    sorted.sort_by(|a, b| {
        b.depth
            .cmp(&a.depth)
            .then(a.priority.cmp(&b.priority))
            .then(a.id.cmp(&b.id))
    });

    let best = (sorted[0].depth, sorted[0].priority);
    let nodes: Vec<String> = sorted
        .iter()
        .filter(|c| (c.depth, c.priority) == best)
        .map(|c| c.id.clone())
        .collect();

    debug!(graph = %graph.id, chunk = ?nodes, "computed active chunk");
    Ok(ActiveChunk {
        nodes,
        completed: false,
    })
}

/// Paginated sibling variant: up to `page_size` ready unanswered nodes in
/// id order, without depth-locking. For graphs whose questions are
/// independently presentable.
pub fn compute_page_nodes(
    graph: &DecisionGraph,
    ctx: &EvaluationContext,
    answered: &BTreeSet<String>,
    page_size: usize,
) -> Result<ActiveChunk, ScheduleError> {
    let ready = ready_candidates(graph, ctx, answered)?;
    if ready.is_empty() {
        return Ok(ActiveChunk::complete());
    }

    let mut nodes: Vec<String> = ready.into_iter().map(|c| c.id).collect();
    nodes.sort();
    nodes.truncate(page_size);

    Ok(ActiveChunk {
        nodes,
        completed: false,
    })
}

/// Strict single-successor walk from the last-answered node.
///
/// More than one simultaneously satisfied outgoing edge is a
/// non-deterministic graph: a hard error, surfaced and never retried.
/// Zero matches means the walk reached a cost boundary.
pub fn execute_decision_graph(
    graph: &DecisionGraph,
    ctx: &EvaluationContext,
    last_answered: &str,
) -> Result<Option<String>, ScheduleError> {
    let mut matches: Vec<&str> = Vec::new();
    for edge in graph.edges_from(last_answered) {
        if condition_holds(edge.condition, ctx)? {
            matches.push(&edge.to);
        }
    }

    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches[0].to_string())),
        count => Err(ScheduleError::NonDeterministicGraph {
            node: last_answered.to_string(),
            count,
        }),
    }
}

// ============================================================================
// READINESS
// ============================================================================

fn ready_candidates(
    graph: &DecisionGraph,
    ctx: &EvaluationContext,
    answered: &BTreeSet<String>,
) -> Result<Vec<ReadyCandidate>, ScheduleError> {
    let mut ready = Vec::new();

    for node in graph.nodes() {
        let (id, visibility) = match node {
            GraphNode::Question { id, visibility, .. } => (id, *visibility),
            GraphNode::Cost { .. } => continue,
        };

        if answered.contains(id) {
            continue;
        }
        if !condition_holds(visibility, ctx)? {
            continue;
        }

        let incoming = graph.incoming_to(id);

        if answered.is_empty() {
            // One entry wave only: zero-incoming-edge nodes.
            if incoming.is_empty() {
                ready.push(ReadyCandidate {
                    id: id.clone(),
                    depth: graph.depth(id).unwrap_or(0),
                    priority: 0,
                    activator: None,
                });
            }
            continue;
        }

        // The lowest-priority satisfied edge from an answered predecessor
        // names the activating predecessor; ties break on the predecessor
        // id so activation is stable.
        let mut best: Option<(i32, &str)> = None;
        for edge in incoming {
            if !answered.contains(&edge.from) {
                continue;
            }
            if !condition_holds(edge.condition, ctx)? {
                continue;
            }
            let key = (edge.execution_priority, edge.from.as_str());
            if best.map(|b| key < b).unwrap_or(true) {
                best = Some(key);
            }
        }

        if let Some((priority, activator)) = best {
            ready.push(ReadyCandidate {
                id: id.clone(),
                depth: graph.depth(id).unwrap_or(0),
                priority,
                activator: Some(activator.to_string()),
            });
        }
    }

    Ok(ready)
}

/// Restrict to the deepest answered node's activations, if it has any.
///
/// When several answered nodes tie at the maximum depth the restriction is
/// the union of their activations; an empty union leaves the full ready
/// set in place.
fn apply_depth_lock(
    graph: &DecisionGraph,
    answered: &BTreeSet<String>,
    ready: Vec<ReadyCandidate>,
) -> Vec<ReadyCandidate> {
    let max_depth = answered
        .iter()
        .filter_map(|id| graph.depth(id))
        .max();

    let Some(max_depth) = max_depth else {
        return ready;
    };

    let deepest: BTreeSet<&str> = answered
        .iter()
        .filter(|id| graph.depth(id) == Some(max_depth))
        .map(|id| id.as_str())
        .collect();

    let activated: Vec<usize> = ready
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            c.activator
                .as_deref()
                .map(|a| deepest.contains(a))
                .unwrap_or(false)
        })
        .map(|(index, _)| index)
        .collect();

    if activated.is_empty() {
        return ready;
    }

    let keep: BTreeSet<usize> = activated.into_iter().collect();
    ready
        .into_iter()
        .enumerate()
        .filter(|(index, _)| keep.contains(index))
        .map(|(_, c)| c)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
