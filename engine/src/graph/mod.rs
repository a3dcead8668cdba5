// Graph structural validation and runtime scheduling.
//
// - validation.rs: publish-time cycle/entry/fan-in/bypass analysis
// - scheduler.rs: active-chunk computation over facts and answer history

pub mod scheduler;
pub mod validation;

pub use scheduler::{
    compute_active_chunk, compute_page_nodes, execute_decision_graph, ActiveChunk, ScheduleError,
};
pub use validation::{validate_graph, GraphValidationError, GraphWarning, ValidationReport};
