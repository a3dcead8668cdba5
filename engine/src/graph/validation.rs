// Graph structural validation.
//
// Publish-time analysis over the question/cost graph:
// - cycle detection: DFS with a recursion stack; any revisit-on-stack is a
//   cycle (error)
// - entry-node check: at least one zero-incoming-edge node (error)
// - ambiguous fan-in: a node with more than one unconditional incoming
//   edge (warning)
// - bypass detection: an edge A→B flagged when another A→B path exists
//   that does not use that edge (warning)
//
// Errors block publishing; warnings are informational. Nodes are visited
// in sorted-id order so reports are deterministic. Bypass detection
// re-walks alternate paths per edge and therefore runs only here, never
// on the answer path.

use crate::models::graph::DecisionGraph;
use std::collections::BTreeSet;
use thiserror::Error;

/// Structural errors. Any of these blocks publishing.
#[derive(Debug, Error, PartialEq)]
pub enum GraphValidationError {
    #[error("cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("graph has no entry node")]
    NoEntryNode,
}

/// Structural warnings. Informational; publishing proceeds.
#[derive(Debug, Error, PartialEq)]
pub enum GraphWarning {
    #[error("node '{node}' has {count} unconditional incoming edges")]
    AmbiguousFanIn { node: String, count: usize },

    #[error("edge '{from}' -> '{to}' is bypassed by another path")]
    BypassedEdge { from: String, to: String },
}

/// Outcome of structural validation.
#[derive(Debug, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<GraphValidationError>,
    pub warnings: Vec<GraphWarning>,
}

/// Run all structural checks over a graph snapshot.
pub fn validate_graph(graph: &DecisionGraph) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    detect_cycles(graph, &mut errors);

    if graph.entry_nodes().is_empty() {
        errors.push(GraphValidationError::NoEntryNode);
    }

    detect_ambiguous_fan_in(graph, &mut warnings);

    // Bypass analysis only makes sense on an acyclic graph.
    if errors.is_empty() {
        detect_bypassed_edges(graph, &mut warnings);
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

// ============================================================================
// CYCLE DETECTION
// ============================================================================

fn detect_cycles(graph: &DecisionGraph, errors: &mut Vec<GraphValidationError>) {
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut on_stack: Vec<String> = Vec::new();

    // Start from every node, sorted order; entry-unreachable components
    // still get cycle-checked.
    for node in graph.nodes() {
        if !visited.contains(node.id()) {
            dfs_cycle(graph, node.id(), &mut visited, &mut on_stack, errors);
        }
    }
}

fn dfs_cycle(
    graph: &DecisionGraph,
    node_id: &str,
    visited: &mut BTreeSet<String>,
    on_stack: &mut Vec<String>,
    errors: &mut Vec<GraphValidationError>,
) {
    if let Some(position) = on_stack.iter().position(|id| id == node_id) {
        // Revisit on the current path: report the cycle slice, closed.
        let mut path: Vec<String> = on_stack[position..].to_vec();
        path.push(node_id.to_string());
        errors.push(GraphValidationError::Cycle { path });
        return;
    }

    if visited.contains(node_id) {
        return;
    }

    on_stack.push(node_id.to_string());
    for edge in graph.edges_from(node_id) {
        dfs_cycle(graph, &edge.to, visited, on_stack, errors);
    }
    on_stack.pop();
    visited.insert(node_id.to_string());
}

// ============================================================================
// AMBIGUOUS FAN-IN
// ============================================================================

fn detect_ambiguous_fan_in(graph: &DecisionGraph, warnings: &mut Vec<GraphWarning>) {
    for node in graph.nodes() {
        let unconditional = graph
            .incoming_to(node.id())
            .iter()
            .filter(|edge| edge.is_unconditional())
            .count();
        if unconditional > 1 {
            warnings.push(GraphWarning::AmbiguousFanIn {
                node: node.id().to_string(),
                count: unconditional,
            });
        }
    }
}

// ============================================================================
// BYPASS DETECTION
// ============================================================================

fn detect_bypassed_edges(graph: &DecisionGraph, warnings: &mut Vec<GraphWarning>) {
    for node in graph.nodes() {
        let edges = graph.edges_from(node.id());
        for (index, edge) in edges.iter().enumerate() {
            if edge.from == edge.to {
                continue;
            }
            if path_exists_avoiding(graph, &edge.from, &edge.to, node.id(), index) {
                warnings.push(GraphWarning::BypassedEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                });
            }
        }
    }
}

/// DFS from `from` to `to` that skips one specific edge occurrence
/// (identified by its owner node and position in the adjacency list).
fn path_exists_avoiding(
    graph: &DecisionGraph,
    from: &str,
    to: &str,
    skip_owner: &str,
    skip_index: usize,
) -> bool {
    let mut stack: Vec<String> = vec![from.to_string()];
    let mut seen: BTreeSet<String> = BTreeSet::new();

    while let Some(current) = stack.pop() {
        for (index, edge) in graph.edges_from(&current).iter().enumerate() {
            if current == skip_owner && index == skip_index {
                continue;
            }
            if edge.to == to {
                return true;
            }
            if seen.insert(edge.to.clone()) {
                stack.push(edge.to.clone());
            }
        }
    }
    false
}

// ============================================================================
// TESTS
// ============================================================================
