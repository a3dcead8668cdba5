// Arithmetic rollup and cost reporting.
//
// - pemdas.rs: layered line folding (left-to-right, bucketed)
// - costs.rs: cost node evaluation and the tiered report builder

pub mod costs;
pub mod pemdas;

pub use costs::{
    build_report, evaluate_cost_nodes, CostError, CostRecord, CostReport, Tier, TierBoundaries,
};
pub use pemdas::{
    evaluate_rollup, BucketKind, Line, LineNode, LineValue, Operand, PemdasGraph, RollupError,
    RollupResult,
};
