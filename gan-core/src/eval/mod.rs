// gan-core/src/eval/mod.rs

//! Periodic evaluation of checkpoints written by the chief.

pub mod hook;
pub mod runner;
pub mod tracker;

pub use hook::EvaluationHook;
pub use runner::{EvalOptions, EvalReport, EvaluationRunner, ITERATIONS_TAG};
pub use tracker::{CheckpointState, CheckpointTracker};
