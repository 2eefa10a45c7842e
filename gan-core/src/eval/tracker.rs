// gan-core/src/eval/tracker.rs

//! Tracks how many new checkpoints appeared since the last evaluation.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::checkpoint::{latest_checkpoint, CheckpointId};
use crate::error::Result;
use crate::storage::StorageBackend;

/// Snapshot of the tracker's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointState {
    pub latest_checkpoint_id: Option<CheckpointId>,
    pub checkpoints_since_eval: u64,
}

/// Watches a checkpoint directory for new checkpoints.
///
/// All access goes through one guard. [`update`](Self::update) only tries
/// the guard and gives up when another thread holds it; the other operations
/// wait for it but hold it only briefly.
pub struct CheckpointTracker {
    storage: Arc<dyn StorageBackend>,
    dir: PathBuf,
    prefix: String,
    state: Mutex<CheckpointState>,
}

impl CheckpointTracker {
    pub fn new(storage: Arc<dyn StorageBackend>, dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            dir: dir.into(),
            prefix: prefix.into(),
            state: Mutex::new(CheckpointState::default()),
        }
    }

    /// Looks up the latest checkpoint and counts it if it is new.
    ///
    /// Returns `Ok(true)` when a new checkpoint id was recorded. Returns
    /// `Ok(false)` without touching storage if another caller is mid-update.
    ///
    /// # Errors
    ///
    /// Propagates storage listing failures; the state is left unchanged.
    pub fn update(&self) -> Result<bool> {
        let Some(mut state) = self.state.try_lock() else {
            tracing::trace!("Checkpoint tracker busy, skipping update");
            return Ok(false);
        };

        let latest = latest_checkpoint(self.storage.as_ref(), &self.dir, &self.prefix)?;
        if latest == state.latest_checkpoint_id {
            return Ok(false);
        }

        state.checkpoints_since_eval += 1;
        tracing::debug!(
            checkpoint = ?latest,
            since_eval = state.checkpoints_since_eval,
            "Observed new checkpoint"
        );
        state.latest_checkpoint_id = latest;
        Ok(true)
    }

    /// Claims an evaluation if more than `eval_frequency` checkpoints arrived
    /// since the last claim.
    ///
    /// A successful claim resets the counter to zero and returns the latest
    /// checkpoint id. The counter is also reset if the latest checkpoint has
    /// since disappeared, in which case `None` is returned.
    pub fn claim_due(&self, eval_frequency: u64) -> Option<CheckpointId> {
        let mut state = self.state.lock();
        if state.checkpoints_since_eval > eval_frequency {
            state.checkpoints_since_eval = 0;
            state.latest_checkpoint_id.clone()
        } else {
            None
        }
    }

    /// Returns `claimed` if it is still in storage, otherwise the newest
    /// checkpoint present now.
    ///
    /// Retention can prune a claimed checkpoint before it is read when
    /// checkpoints are written faster than they are evaluated.
    pub fn resolve_claim(&self, claimed: CheckpointId) -> Result<Option<CheckpointId>> {
        if self.storage.exists(claimed.path())? {
            return Ok(Some(claimed));
        }

        let latest = latest_checkpoint(self.storage.as_ref(), &self.dir, &self.prefix)?;
        tracing::debug!(claimed = %claimed, fallback = ?latest, "Claimed checkpoint was pruned");
        Ok(latest)
    }

    pub fn latest(&self) -> Option<CheckpointId> {
        self.state.lock().latest_checkpoint_id.clone()
    }

    pub fn snapshot(&self) -> CheckpointState {
        self.state.lock().clone()
    }
}
