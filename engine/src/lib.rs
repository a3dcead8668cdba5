//! Estimation Engine Core - Rust Engine
//!
//! Decision/pricing graph engine for the estimation subsystem: computes
//! numeric/boolean decisions and rolled-up cost ranges from
//! business-authored rules and end-user-supplied facts.
//!
//! # Architecture
//!
//! - **expr**: typed expression AST (arena) and recursive type resolver
//! - **tree**: branch-based decision trees (validation, evaluation, context)
//! - **models**: domain types (facts, graphs, runs)
//! - **graph**: structural validation and the runtime scheduler
//! - **rollup**: left-to-right arithmetic rollup and cost reporting
//! - **repo**: narrow persistence interface
//! - **runtime**: the engine facade (start/answer/go-back/calculate)
//!
//! # Critical Invariants
//!
//! 1. All expressions are pre-validated, bounded ASTs; nothing user-supplied
//!    executes as code
//! 2. Cycles are a validation error; evaluation is bounded by graph size
//! 3. Facts are append-only per run, batch-tagged; undo removes exactly the
//!    latest batch
//! 4. A single run is evaluated from one thread at a time; distinct runs
//!    share nothing

// Module declarations
pub mod expr;
pub mod graph;
pub mod models;
pub mod repo;
pub mod rollup;
pub mod runtime;
pub mod tree;

// Re-exports for convenience
pub use expr::{
    resolve_type, ExprId, ExpressionArena, ExpressionNode, FunctionKind, Literal, Operator,
    TypeError, ValueType,
};
pub use graph::{
    compute_active_chunk, compute_page_nodes, execute_decision_graph, validate_graph, ActiveChunk,
    GraphValidationError, GraphWarning, ScheduleError, ValidationReport,
};
pub use models::{
    fact::{FactDefinition, FactMap, FactRecord, FactRegistry, FactType, FactValue},
    graph::{
        CostFormula, CostRange, DecisionGraph, FactProduction, FactSource, GraphEdge,
        GraphIntegrityError, GraphNode, InputType,
    },
    run::{Run, RunError},
};
pub use repo::{DataError, MemoryRepository, Repository};
pub use rollup::{
    BucketKind, CostRecord, CostReport, Line, LineNode, LineValue, Operand, PemdasGraph,
    RollupResult, Tier, TierBoundaries,
};
pub use runtime::{Engine, EngineConfig, EngineError, ErrorKind, RunState};
pub use tree::{
    AdjustmentCommand, Branch, BranchOutcome, DecisionTree, EvalError, EvaluationContext,
    ReturnType, TreeValidationError,
};
