// Evaluation context.
//
// An explicit, immutable view threaded through every evaluation call:
// the run's current facts, the expression arena, the decision-tree table
// with its variable bindings, and the fact registry. The per-run
// memoization caches live here behind RefCell; a single run is evaluated
// from one thread at a time, distinct runs share nothing.

use crate::expr::types::{ExprId, ExpressionArena};
use crate::models::fact::{FactMap, FactRegistry, FactValue};
use crate::models::graph::DecisionGraph;
use crate::tree::interpreter::EvalError;
use crate::tree::types::DecisionTree;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

/// Immutable per-call evaluation context with interior memo caches.
///
/// Facts are assumed immutable for the lifetime of the context; the engine
/// builds a fresh context after every fact-changing operation.
pub struct EvaluationContext<'a> {
    facts: &'a FactMap,
    registry: &'a FactRegistry,
    arena: &'a ExpressionArena,
    trees: &'a BTreeMap<String, DecisionTree>,
    bindings: &'a BTreeMap<String, String>,

    /// Expression id → evaluated value, per run.
    expr_cache: RefCell<HashMap<ExprId, FactValue>>,

    /// Variable key → resolved number, per run.
    variable_cache: RefCell<HashMap<String, f64>>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        facts: &'a FactMap,
        registry: &'a FactRegistry,
        arena: &'a ExpressionArena,
        trees: &'a BTreeMap<String, DecisionTree>,
        bindings: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            facts,
            registry,
            arena,
            trees,
            bindings,
            expr_cache: RefCell::new(HashMap::new()),
            variable_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Context over a loaded graph snapshot and a run's fact view.
    pub fn for_graph(graph: &'a DecisionGraph, facts: &'a FactMap) -> Self {
        Self::new(
            facts,
            &graph.fact_registry,
            &graph.arena,
            &graph.trees,
            &graph.bindings,
        )
    }

    pub fn arena(&self) -> &ExpressionArena {
        self.arena
    }

    pub fn facts(&self) -> &FactMap {
        self.facts
    }

    /// Look up a fact value.
    ///
    /// A key absent from the registry is an unknown reference; a key the
    /// registry knows but the run has not yet produced is a missing fact.
    /// Callers that gate on facts distinguish the two.
    pub fn fact(&self, key: &str) -> Result<FactValue, EvalError> {
        if !self.registry.contains_key(key) {
            return Err(EvalError::UnknownFact(key.to_string()));
        }
        self.facts
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::MissingFact(key.to_string()))
    }

    /// Resolve a variable key to its bound decision tree.
    pub fn tree_for_variable(&self, key: &str) -> Result<&DecisionTree, EvalError> {
        let tree_id = self
            .bindings
            .get(key)
            .ok_or_else(|| EvalError::UnknownVariable(key.to_string()))?;
        self.trees
            .get(tree_id)
            .ok_or_else(|| EvalError::UnknownTree {
                key: key.to_string(),
                tree_id: tree_id.clone(),
            })
    }

    pub fn cached_expr(&self, id: ExprId) -> Option<FactValue> {
        self.expr_cache.borrow().get(&id).cloned()
    }

    pub fn store_expr(&self, id: ExprId, value: FactValue) {
        self.expr_cache.borrow_mut().insert(id, value);
    }

    pub fn cached_variable(&self, key: &str) -> Option<f64> {
        self.variable_cache.borrow().get(key).copied()
    }

    pub fn store_variable(&self, key: &str, value: f64) {
        self.variable_cache
            .borrow_mut()
            .insert(key.to_string(), value);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fact::FactType;

    #[test]
    fn test_fact_lookup_distinguishes_unknown_and_missing() {
        let mut facts = FactMap::new();
        facts.insert("age".to_string(), FactValue::Number(70.0));

        let mut registry = FactRegistry::new();
        registry.insert("age".to_string(), FactType::Number);
        registry.insert("region".to_string(), FactType::Enum);

        let arena = ExpressionArena::new();
        let trees = BTreeMap::new();
        let bindings = BTreeMap::new();
        let ctx = EvaluationContext::new(&facts, &registry, &arena, &trees, &bindings);

        assert_eq!(ctx.fact("age"), Ok(FactValue::Number(70.0)));
        assert_eq!(
            ctx.fact("region"),
            Err(EvalError::MissingFact("region".to_string()))
        );
        assert_eq!(
            ctx.fact("ghost"),
            Err(EvalError::UnknownFact("ghost".to_string()))
        );
    }

    #[test]
    fn test_expr_cache_round_trip() {
        let facts = FactMap::new();
        let registry = FactRegistry::new();
        let arena = ExpressionArena::new();
        let trees = BTreeMap::new();
        let bindings = BTreeMap::new();
        let ctx = EvaluationContext::new(&facts, &registry, &arena, &trees, &bindings);

        assert_eq!(ctx.cached_expr(ExprId(0)), None);
        ctx.store_expr(ExprId(0), FactValue::Number(5.0));
        assert_eq!(ctx.cached_expr(ExprId(0)), Some(FactValue::Number(5.0)));
    }
}
