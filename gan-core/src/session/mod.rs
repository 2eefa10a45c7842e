// gan-core/src/session/mod.rs

//! Managed training sessions and the per-process training loop.

pub mod driver;
pub mod hooks;
pub mod monitored;

pub use driver::{run_training, TrainingContext, TrainingJob, TrainingReport};
pub use hooks::{SessionHook, StepContext};
pub use monitored::{MonitoredSession, SessionOptions};
