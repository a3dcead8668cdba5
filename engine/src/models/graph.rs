// Question/cost graph model.
//
// A graph snapshot is loaded once per call from the persistence
// collaborator and never mutated. Nodes are a tagged sum type per
// node_type; question and cost configuration never share a record.
// Adjacency uses BTreeMap so every walk iterates in sorted order.

use crate::expr::types::{ExprId, ExpressionArena};
use crate::models::fact::FactRegistry;
use crate::rollup::pemdas::PemdasGraph;
use crate::tree::types::DecisionTree;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

// ============================================================================
// NODES
// ============================================================================

/// Input widget kind for a question node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Boolean,
    Number,
    Text,
    Choice,
}

/// How a produced fact obtains its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum FactSource {
    /// Fixed value recorded whenever the question is answered.
    Literal { value: serde_json::Value },

    /// The raw answer payload itself.
    Answer,

    /// Derived from an expression over facts already accumulated.
    Derived { expr: ExprId },
}

/// One fact a question produces when answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactProduction {
    pub key: String,

    #[serde(flatten)]
    pub source: FactSource,
}

/// Min/max cost expressions for a cost node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRange {
    pub min: ExprId,
    pub max: ExprId,
}

/// Optional formula override; takes precedence over the plain range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostFormula {
    pub min: ExprId,
    pub max: ExprId,
}

/// A node in the decision/pricing graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "lowercase")]
pub enum GraphNode {
    Question {
        id: String,
        prompt: String,
        input_type: InputType,

        /// Boolean expression gating whether the question is shown.
        #[serde(default)]
        visibility: Option<ExprId>,

        #[serde(default)]
        produces_facts: Vec<FactProduction>,
    },

    Cost {
        id: String,

        /// Boolean expression gating whether the cost applies.
        #[serde(default)]
        applies_if: Option<ExprId>,

        cost_range: CostRange,

        #[serde(default)]
        formula: Option<CostFormula>,
    },
}

impl GraphNode {
    pub fn id(&self) -> &str {
        match self {
            GraphNode::Question { id, .. } => id,
            GraphNode::Cost { id, .. } => id,
        }
    }

    pub fn is_question(&self) -> bool {
        matches!(self, GraphNode::Question { .. })
    }

    pub fn is_cost(&self) -> bool {
        matches!(self, GraphNode::Cost { .. })
    }
}

// ============================================================================
// EDGES
// ============================================================================

/// Directed edge between graph nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,

    /// Boolean expression gating traversal. `None` is unconditional.
    #[serde(default)]
    pub condition: Option<ExprId>,

    /// Lower value wins when several edges are satisfied simultaneously.
    #[serde(default)]
    pub execution_priority: i32,
}

impl GraphEdge {
    pub fn is_unconditional(&self) -> bool {
        self.condition.is_none()
    }
}

// ============================================================================
// GRAPH SNAPSHOT
// ============================================================================

/// Integrity failures rejected at load time.
#[derive(Debug, Error, PartialEq)]
pub enum GraphIntegrityError {
    #[error("graph '{0}' has no nodes")]
    Empty(String),

    #[error("graph '{graph}': edge references unknown node '{node}'")]
    DanglingEdge { graph: String, node: String },

    #[error("graph '{0}' has no entry node")]
    NoEntryNode(String),
}

/// Immutable graph snapshot assembled from persisted rows.
///
/// Carries everything evaluation needs: the node table, adjacency in both
/// directions, entry nodes, the expression arena, the decision-tree table
/// with its variable bindings, the materialized fact registry, node depths
/// (memoized here, once per graph), and the optional arithmetic rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionGraph {
    pub id: String,
    pub project_id: String,

    nodes: BTreeMap<String, GraphNode>,
    edges_from: BTreeMap<String, Vec<GraphEdge>>,
    incoming_to: BTreeMap<String, Vec<GraphEdge>>,
    entry_nodes: Vec<String>,
    depths: BTreeMap<String, usize>,

    pub arena: ExpressionArena,

    /// Tree id → tree.
    pub trees: BTreeMap<String, DecisionTree>,

    /// Variable key → tree id.
    pub bindings: BTreeMap<String, String>,

    pub fact_registry: FactRegistry,

    #[serde(default)]
    pub rollup: Option<PemdasGraph>,
}

impl DecisionGraph {
    /// Assemble a snapshot from persisted rows.
    ///
    /// Rejects empty graphs, dangling edge references, and graphs with no
    /// entry node; these are data-layer failures, not structural warnings.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        id: &str,
        project_id: &str,
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
        arena: ExpressionArena,
        trees: BTreeMap<String, DecisionTree>,
        bindings: BTreeMap<String, String>,
        fact_registry: FactRegistry,
        rollup: Option<PemdasGraph>,
    ) -> Result<Self, GraphIntegrityError> {
        if nodes.is_empty() {
            return Err(GraphIntegrityError::Empty(id.to_string()));
        }

        let mut node_table = BTreeMap::new();
        for node in nodes {
            node_table.insert(node.id().to_string(), node);
        }

        let mut edges_from: BTreeMap<String, Vec<GraphEdge>> = BTreeMap::new();
        let mut incoming_to: BTreeMap<String, Vec<GraphEdge>> = BTreeMap::new();
        for edge in edges {
            for endpoint in [&edge.from, &edge.to] {
                if !node_table.contains_key(endpoint) {
                    return Err(GraphIntegrityError::DanglingEdge {
                        graph: id.to_string(),
                        node: endpoint.clone(),
                    });
                }
            }
            edges_from
                .entry(edge.from.clone())
                .or_default()
                .push(edge.clone());
            incoming_to.entry(edge.to.clone()).or_default().push(edge);
        }

        let entry_nodes: Vec<String> = node_table
            .keys()
            .filter(|node_id| {
                incoming_to
                    .get(*node_id)
                    .map(|edges| edges.is_empty())
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if entry_nodes.is_empty() {
            return Err(GraphIntegrityError::NoEntryNode(id.to_string()));
        }

        let depths = compute_depths(&entry_nodes, &edges_from);

        Ok(Self {
            id: id.to_string(),
            project_id: project_id.to_string(),
            nodes: node_table,
            edges_from,
            incoming_to,
            entry_nodes,
            depths,
            arena,
            trees,
            bindings,
            fact_registry,
            rollup,
        })
    }

    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.get(node_id)
    }

    /// Nodes in sorted-id order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges_from(&self, node_id: &str) -> &[GraphEdge] {
        self.edges_from
            .get(node_id)
            .map(|edges| edges.as_slice())
            .unwrap_or(&[])
    }

    pub fn incoming_to(&self, node_id: &str) -> &[GraphEdge] {
        self.incoming_to
            .get(node_id)
            .map(|edges| edges.as_slice())
            .unwrap_or(&[])
    }

    pub fn entry_nodes(&self) -> &[String] {
        &self.entry_nodes
    }

    /// Memoized node depth: entry nodes are 0, otherwise 1 + the minimum
    /// predecessor depth. Nodes unreachable from any entry have no depth.
    pub fn depth(&self, node_id: &str) -> Option<usize> {
        self.depths.get(node_id).copied()
    }
}

/// Min-predecessor-depth relaxation from the entry wave.
fn compute_depths(
    entry_nodes: &[String],
    edges_from: &BTreeMap<String, Vec<GraphEdge>>,
) -> BTreeMap<String, usize> {
    let mut depths: BTreeMap<String, usize> = BTreeMap::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    for entry in entry_nodes {
        depths.insert(entry.clone(), 0);
        queue.push_back(entry.clone());
    }

    while let Some(node_id) = queue.pop_front() {
        let next_depth = depths[&node_id] + 1;
        if let Some(edges) = edges_from.get(&node_id) {
            for edge in edges {
                let improved = depths
                    .get(&edge.to)
                    .map(|&current| next_depth < current)
                    .unwrap_or(true);
                if improved {
                    depths.insert(edge.to.clone(), next_depth);
                    queue.push_back(edge.to.clone());
                }
            }
        }
    }

    depths
}

// ============================================================================
// TESTS
// ============================================================================
