// gan-core/src/eval/hook.rs

use parking_lot::Mutex;

use super::runner::{EvalReport, EvaluationRunner};
use super::tracker::CheckpointTracker;
use crate::error::{Result, TrainError};
use crate::session::{SessionHook, StepContext};

/// Evaluates new checkpoints while training runs, and once more at the end.
///
/// Steps only ever try the evaluation guard, so overlapping step callbacks
/// never run two evaluations at once and never queue behind one. The
/// end-of-training evaluation waits for the guard.
pub struct EvaluationHook {
    tracker: CheckpointTracker,
    runner: Mutex<EvaluationRunner>,
    eval_frequency: u64,
    completed: Mutex<Vec<EvalReport>>,
}

impl EvaluationHook {
    pub fn new(tracker: CheckpointTracker, runner: EvaluationRunner, eval_frequency: u64) -> Self {
        Self {
            tracker,
            runner: Mutex::new(runner),
            eval_frequency,
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn tracker(&self) -> &CheckpointTracker {
        &self.tracker
    }

    /// Reports of every evaluation this hook has finished, oldest first.
    pub fn completed(&self) -> Vec<EvalReport> {
        self.completed.lock().clone()
    }

    /// Runs an evaluation if enough new checkpoints have appeared and no
    /// other evaluation is in progress.
    pub fn on_step_complete(&self) -> Result<Option<EvalReport>> {
        // Always look for new checkpoints, even while an evaluation runs
        self.tracker.update()?;

        let Some(mut runner) = self.runner.try_lock() else {
            return Ok(None);
        };
        let Some(claimed) = self.tracker.claim_due(self.eval_frequency) else {
            return Ok(None);
        };
        let Some(checkpoint) = self.tracker.resolve_claim(claimed)? else {
            return Ok(None);
        };

        let report = runner.run(&checkpoint)?;
        self.completed.lock().push(report.clone());
        Ok(Some(report))
    }

    /// Waits for any in-progress evaluation, then evaluates the latest
    /// checkpoint regardless of the counter.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error if no checkpoint exists.
    pub fn on_training_end(&self) -> Result<EvalReport> {
        self.tracker.update()?;

        let mut runner = self.runner.lock();
        let checkpoint = match self.tracker.latest() {
            Some(latest) => self.tracker.resolve_claim(latest)?,
            None => None,
        }
        .ok_or_else(|| TrainError::evaluation("no checkpoint available for final evaluation"))?;

        let report = runner.run(&checkpoint)?;
        self.completed.lock().push(report.clone());
        Ok(report)
    }
}

impl SessionHook for EvaluationHook {
    fn name(&self) -> &str {
        "evaluation"
    }

    fn after_step(&self, _ctx: &StepContext) -> Result<()> {
        self.on_step_complete().map(|_| ())
    }

    fn end(&self) -> Result<()> {
        self.on_training_end().map(|_| ())
    }
}
