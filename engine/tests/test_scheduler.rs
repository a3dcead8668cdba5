/// Runtime scheduler: active-chunk computation
///
/// Covers the selection pipeline against assembled graphs: entry wave,
/// edge-gated readiness, depth-lock, best-key chunking, pagination, and
/// the strict single-successor walk.
use estimation_engine_core_rs::{
    compute_active_chunk, compute_page_nodes, execute_decision_graph, DecisionGraph,
    EvaluationContext, ExpressionArena, FactMap, FactRegistry, FactType, FactValue, GraphEdge,
    GraphNode, InputType, Operator, ScheduleError,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn question(id: &str) -> GraphNode {
    GraphNode::Question {
        id: id.to_string(),
        prompt: format!("{}?", id),
        input_type: InputType::Boolean,
        visibility: None,
        produces_facts: vec![],
    }
}

fn edge(from: &str, to: &str) -> GraphEdge {
    GraphEdge {
        from: from.to_string(),
        to: to.to_string(),
        condition: None,
        execution_priority: 0,
    }
}

fn build(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> DecisionGraph {
    build_with(nodes, edges, ExpressionArena::new(), FactRegistry::new())
}

fn build_with(
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    arena: ExpressionArena,
    registry: FactRegistry,
) -> DecisionGraph {
    DecisionGraph::assemble(
        "g1",
        "p1",
        nodes,
        edges,
        arena,
        BTreeMap::new(),
        BTreeMap::new(),
        registry,
        None,
    )
    .unwrap()
}

fn answered(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_entry_wave_is_the_first_chunk() {
    let graph = build(
        vec![question("q1"), question("q2"), question("q3")],
        vec![edge("q1", "q3"), edge("q2", "q3")],
    );

    let facts = FactMap::new();
    let ctx = EvaluationContext::for_graph(&graph, &facts);
    let chunk = compute_active_chunk(&graph, &ctx, &BTreeSet::new()).unwrap();

    assert_eq!(chunk.nodes, vec!["q1".to_string(), "q2".to_string()]);
    assert!(!chunk.completed);
}

#[test]
fn test_false_edge_condition_completes_the_run() {
    // Acceptance fixture: A -> B gated on x == true, answered A with
    // x = false. The chunk is empty and the run is complete.
    let mut arena = ExpressionArena::new();
    let x = arena.fact("x");
    let t = arena.boolean(true);
    let gate = arena.binary(Operator::Equal, x, t);

    let mut registry = FactRegistry::new();
    registry.insert("x".to_string(), FactType::Boolean);

    let graph = build_with(
        vec![question("a"), question("b")],
        vec![GraphEdge {
            from: "a".to_string(),
            to: "b".to_string(),
            condition: Some(gate),
            execution_priority: 0,
        }],
        arena,
        registry,
    );

    let mut facts = FactMap::new();
    facts.insert("x".to_string(), FactValue::Boolean(false));
    let ctx = EvaluationContext::for_graph(&graph, &facts);
    let chunk = compute_active_chunk(&graph, &ctx, &answered(&["a"])).unwrap();

    assert!(chunk.nodes.is_empty());
    assert!(chunk.completed);
}

#[test]
fn test_deep_chain_drains_before_shallow_siblings() {
    // a unlocks b and c; c leads to d then e. Once c is answered the
    // chain keeps the focus until it runs dry.
    let graph = build(
        vec![
            question("a"),
            question("b"),
            question("c"),
            question("d"),
            question("e"),
        ],
        vec![
            edge("a", "b"),
            edge("a", "c"),
            edge("c", "d"),
            edge("d", "e"),
        ],
    );

    let facts = FactMap::new();
    let ctx = EvaluationContext::for_graph(&graph, &facts);

    let after_c = compute_active_chunk(&graph, &ctx, &answered(&["a", "c"])).unwrap();
    assert_eq!(after_c.nodes, vec!["d".to_string()]);

    let after_d = compute_active_chunk(&graph, &ctx, &answered(&["a", "c", "d"])).unwrap();
    assert_eq!(after_d.nodes, vec!["e".to_string()]);

    // Chain dry: the shallow sibling finally returns.
    let after_e = compute_active_chunk(&graph, &ctx, &answered(&["a", "c", "d", "e"])).unwrap();
    assert_eq!(after_e.nodes, vec!["b".to_string()]);
}

#[test]
fn test_lower_execution_priority_edge_names_the_activator() {
    let graph = build(
        vec![question("a"), question("b"), question("z")],
        vec![
            GraphEdge {
                from: "a".to_string(),
                to: "z".to_string(),
                condition: None,
                execution_priority: 10,
            },
            GraphEdge {
                from: "b".to_string(),
                to: "z".to_string(),
                condition: None,
                execution_priority: 1,
            },
        ],
    );

    let facts = FactMap::new();
    let ctx = EvaluationContext::for_graph(&graph, &facts);
    let chunk = compute_active_chunk(&graph, &ctx, &answered(&["a", "b"])).unwrap();
    assert_eq!(chunk.nodes, vec!["z".to_string()]);
}

#[test]
fn test_cost_nodes_are_never_scheduled() {
    let mut arena = ExpressionArena::new();
    let min = arena.number(10.0);
    let max = arena.number(20.0);

    let graph = build_with(
        vec![
            question("a"),
            GraphNode::Cost {
                id: "c_total".to_string(),
                applies_if: None,
                cost_range: estimation_engine_core_rs::CostRange { min, max },
                formula: None,
            },
        ],
        vec![edge("a", "c_total")],
        arena,
        FactRegistry::new(),
    );

    let facts = FactMap::new();
    let ctx = EvaluationContext::for_graph(&graph, &facts);
    let chunk = compute_active_chunk(&graph, &ctx, &answered(&["a"])).unwrap();

    assert!(chunk.completed, "a cost node is a terminal for scheduling");
}

#[test]
fn test_page_variant_returns_all_ready_by_id() {
    let graph = build(
        vec![
            question("a"),
            question("p1"),
            question("p2"),
            question("p3"),
        ],
        vec![edge("a", "p1"), edge("a", "p2"), edge("a", "p3")],
    );

    let facts = FactMap::new();
    let ctx = EvaluationContext::for_graph(&graph, &facts);

    let page = compute_page_nodes(&graph, &ctx, &answered(&["a"]), 2).unwrap();
    assert_eq!(page.nodes, vec!["p1".to_string(), "p2".to_string()]);

    let full = compute_page_nodes(&graph, &ctx, &answered(&["a"]), 10).unwrap();
    assert_eq!(full.nodes.len(), 3);
}

#[test]
fn test_strict_walk_rejects_simultaneous_matches() {
    let graph = build(
        vec![question("a"), question("b"), question("c")],
        vec![edge("a", "b"), edge("a", "c")],
    );

    let facts = FactMap::new();
    let ctx = EvaluationContext::for_graph(&graph, &facts);
    let result = execute_decision_graph(&graph, &ctx, "a");

    assert_eq!(
        result.unwrap_err(),
        ScheduleError::NonDeterministicGraph {
            node: "a".to_string(),
            count: 2,
        }
    );
}

#[test]
fn test_strict_walk_terminal_means_cost_boundary() {
    let graph = build(vec![question("a")], vec![]);
    let facts = FactMap::new();
    let ctx = EvaluationContext::for_graph(&graph, &facts);

    assert_eq!(execute_decision_graph(&graph, &ctx, "a").unwrap(), None);
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    /// compute_active_chunk is idempotent for identical inputs.
    #[test]
    fn prop_chunk_is_idempotent(chain_len in 2usize..8, answered_prefix in 0usize..8) {
        let ids: Vec<String> = (0..chain_len).map(|i| format!("q{}", i)).collect();
        let nodes: Vec<GraphNode> = ids.iter().map(|id| question(id)).collect();
        let edges: Vec<GraphEdge> = ids.windows(2).map(|w| edge(&w[0], &w[1])).collect();
        let graph = build(nodes, edges);

        let prefix = answered_prefix.min(chain_len);
        let done: BTreeSet<String> = ids[..prefix].iter().cloned().collect();

        let facts = FactMap::new();
        let ctx = EvaluationContext::for_graph(&graph, &facts);
        let first = compute_active_chunk(&graph, &ctx, &done).unwrap();
        let second = compute_active_chunk(&graph, &ctx, &done).unwrap();
        prop_assert_eq!(&first, &second);
    }

    /// On a linear chain the chunk is exactly the next unanswered node.
    #[test]
    fn prop_linear_chain_advances_one_node(chain_len in 2usize..8) {
        let ids: Vec<String> = (0..chain_len).map(|i| format!("q{}", i)).collect();
        let nodes: Vec<GraphNode> = ids.iter().map(|id| question(id)).collect();
        let edges: Vec<GraphEdge> = ids.windows(2).map(|w| edge(&w[0], &w[1])).collect();
        let graph = build(nodes, edges);

        let facts = FactMap::new();
        let ctx = EvaluationContext::for_graph(&graph, &facts);

        for prefix in 0..=chain_len {
            let done: BTreeSet<String> = ids[..prefix].iter().cloned().collect();
            let chunk = compute_active_chunk(&graph, &ctx, &done).unwrap();
            if prefix == chain_len {
                prop_assert!(chunk.completed);
            } else {
                prop_assert_eq!(&chunk.nodes, &vec![ids[prefix].clone()]);
            }
        }
    }
}
