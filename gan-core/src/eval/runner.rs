// gan-core/src/eval/runner.rs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointId, CheckpointReader};
use crate::config::TrainerConfig;
use crate::dataset::{Fetch, InputSource, InputSpec};
use crate::error::{Result, TrainError};
use crate::model::{GanModel, Summary, Variables};
use crate::summary::{SummaryAccumulator, SummaryWriter};

/// Tag recording how many batches an evaluation pass consumed.
pub const ITERATIONS_TAG: &str = "eval/iterations";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOptions {
    pub batch_size: usize,
    /// Iteration budget; `None` runs until the input is exhausted.
    pub eval_steps: Option<u64>,
    pub log_every_n: u64,
}

impl EvalOptions {
    pub fn from_config(config: &TrainerConfig) -> Self {
        Self {
            batch_size: config.training.eval_batch_size,
            eval_steps: config.eval.eval_steps,
            log_every_n: config.eval.log_every_n.max(1),
        }
    }
}

/// Result of one evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub checkpoint: CheckpointId,
    /// Global step restored from the checkpoint.
    pub global_step: u64,
    pub iterations: u64,
    /// Mean of every scalar over the pass, plus the iteration count.
    pub summary: Summary,
}

/// Runs evaluation passes against checkpoints.
///
/// Every pass builds its own input pipeline and evaluation graph, so nothing
/// is shared with the training graph or with earlier passes.
pub struct EvaluationRunner {
    model: Arc<dyn GanModel>,
    inputs: Arc<dyn InputSource>,
    reader: CheckpointReader,
    summaries: SummaryWriter,
    options: EvalOptions,
    cancel: CancellationToken,
}

impl EvaluationRunner {
    pub fn new(
        model: Arc<dyn GanModel>,
        inputs: Arc<dyn InputSource>,
        reader: CheckpointReader,
        summaries: SummaryWriter,
        options: EvalOptions,
    ) -> Self {
        Self {
            model,
            inputs,
            reader,
            summaries,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the token that stops in-flight passes early.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Evaluates `checkpoint` and appends one summary record for it.
    ///
    /// The pass ends after `eval_steps` iterations, when the input is
    /// exhausted, or when cancelled. All three are clean stops; the summary
    /// is written in every case.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error if the checkpoint cannot be restored, a
    /// step fails, or the summary cannot be written.
    pub fn run(&mut self, checkpoint: &CheckpointId) -> Result<EvalReport> {
        let variables = self.load(checkpoint)?;
        let global_step = variables.global_step;
        let failed = |message: &str| {
            let message = message.to_string();
            move |e: TrainError| TrainError::evaluation_at(Some(global_step), message, e)
        };

        let pipeline = self
            .inputs
            .open(&InputSpec::evaluation(self.options.batch_size))
            .map_err(failed("failed to build evaluation input"))?;
        let mut graph = self
            .model
            .build_evaluation_graph(pipeline)
            .map_err(failed("failed to build evaluation graph"))?;
        graph
            .restore(variables)
            .map_err(failed("failed to restore variables"))?;

        tracing::info!("Starting evaluation for step: {}", global_step);

        let mut accumulator = SummaryAccumulator::new();
        let mut eval_step = 0u64;
        while self.options.eval_steps.map_or(true, |limit| eval_step < limit) {
            if self.cancel.is_cancelled() {
                tracing::info!(global_step, eval_step, "Evaluation cancelled");
                break;
            }

            match graph.eval_step().map_err(failed("evaluation step failed"))? {
                Fetch::Item(summary) => accumulator.add(&summary),
                Fetch::Exhausted => {
                    tracing::debug!(global_step, eval_step, "Evaluation input exhausted");
                    break;
                }
            }

            if eval_step % self.options.log_every_n == 0 {
                tracing::info!("On evaluation step: {}", eval_step);
            }
            eval_step += 1;
        }

        let mut summary = accumulator.mean();
        summary.insert(ITERATIONS_TAG, eval_step as f64);
        self.summaries
            .write(global_step, &summary)
            .and_then(|()| self.summaries.flush())
            .map_err(failed("failed to write summaries"))?;

        tracing::info!(
            global_step,
            iterations = eval_step,
            summaries = %self.summaries.path().display(),
            "Evaluation finished"
        );

        Ok(EvalReport {
            checkpoint: checkpoint.clone(),
            global_step,
            iterations: eval_step,
            summary,
        })
    }

    fn load(&self, checkpoint: &CheckpointId) -> Result<Variables> {
        let step = checkpoint.step();
        let restored = self
            .reader
            .read(checkpoint)
            .map_err(|e| TrainError::evaluation_at(step, format!("failed to read {checkpoint}"), e))?;
        let variables = Variables::from_bytes(&restored.data)
            .map_err(|e| TrainError::evaluation_at(step, "failed to decode variables", e))?;

        if variables.global_step != restored.global_step() {
            tracing::warn!(
                header = restored.global_step(),
                variables = variables.global_step,
                "Checkpoint header and variables disagree on global step"
            );
        }
        Ok(variables)
    }
}
