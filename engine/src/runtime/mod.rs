// Engine facade and run lifecycle.

pub mod engine;

pub use engine::{Engine, EngineConfig, EngineError, ErrorKind, RunState};
