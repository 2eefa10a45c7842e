// gan-core/src/session/hooks.rs

use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// What a hook sees after a training step.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub global_step: u64,
    stop: CancellationToken,
}

impl StepContext {
    pub fn new(global_step: u64, stop: CancellationToken) -> Self {
        Self { global_step, stop }
    }

    /// Asks the session to stop before its next step.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// Callbacks attached to a [`MonitoredSession`](super::MonitoredSession).
///
/// `after_step` runs on a background thread and may overlap with training
/// and with earlier `after_step` calls that are still running.
/// Implementations guard their own state.
pub trait SessionHook: Send + Sync {
    fn name(&self) -> &str {
        "hook"
    }

    fn after_step(&self, ctx: &StepContext) -> Result<()>;

    /// Called once on close, after background work has finished and the
    /// final checkpoint has been saved.
    fn end(&self) -> Result<()>;
}
