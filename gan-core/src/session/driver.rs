// gan-core/src/session/driver.rs

//! The training loop for one process.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::hooks::SessionHook;
use super::monitored::{MonitoredSession, SessionOptions};
use crate::checkpoint::CheckpointReader;
use crate::config::{StorageConfig, TrainerConfig};
use crate::dataset::{DatasetRegistry, InputSource, InputSpec, PairedDataset};
use crate::error::{Result, TrainError};
use crate::eval::{CheckpointTracker, EvalOptions, EvalReport, EvaluationHook, EvaluationRunner};
use crate::model::{AffineTranslator, GanModel};
use crate::storage::{LocalStorage, StorageBackend};
use crate::summary::SummaryWriter;

/// Where this process trains.
#[derive(Debug, Clone)]
pub struct TrainingContext {
    /// Cluster endpoint of this task, empty for a local run.
    pub target: String,
    pub is_chief: bool,
    pub shard_index: u32,
    pub shard_count: u32,
    /// Stops training before the next step when cancelled.
    pub shutdown: CancellationToken,
}

impl TrainingContext {
    /// Single-process chief.
    pub fn local() -> Self {
        Self {
            target: String::new(),
            is_chief: true,
            shard_index: 0,
            shard_count: 1,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Everything a training run needs besides its cluster placement.
#[derive(Clone)]
pub struct TrainingJob {
    pub config: TrainerConfig,
    pub model: Arc<dyn GanModel>,
    pub inputs: Arc<dyn InputSource>,
    /// Rooted at the job directory.
    pub storage: Arc<dyn StorageBackend>,
}

impl TrainingJob {
    /// Builds a job from configuration using the registered datasets and the
    /// baseline translator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the dataset is not
    /// registered, the dataset directory is missing, or the job directory
    /// cannot be created.
    pub fn from_config(config: TrainerConfig, registry: &DatasetRegistry) -> Result<Self> {
        config.validate()?;

        let data = &config.data;
        let domain_a = registry.get_dataset(&data.dataset_name, &data.domain_a, Path::new(""))?;
        let domain_b = registry.get_dataset(&data.dataset_name, &data.domain_b, Path::new(""))?;
        if !data.dataset_dir.is_dir() {
            return Err(TrainError::config(format!(
                "dataset directory '{}' does not exist",
                data.dataset_dir.display()
            )));
        }
        let dataset_storage = LocalStorage::new(&StorageConfig {
            base_path: data.dataset_dir.clone(),
            buffer_size: config.storage.buffer_size,
        })?;

        let storage = LocalStorage::new(&config.storage)?;

        Ok(Self {
            model: Arc::new(AffineTranslator::new()),
            inputs: Arc::new(PairedDataset::new(Arc::new(dataset_storage), domain_a, domain_b)),
            storage: Arc::new(storage),
            config,
        })
    }

    /// Cancelling `cancel` ends any running evaluation pass early, including
    /// the end-of-training pass.
    fn evaluation_hook(&self, cancel: CancellationToken) -> Result<EvaluationHook> {
        let config = &self.config;
        let tracker = CheckpointTracker::new(
            Arc::clone(&self.storage),
            &config.checkpoint.checkpoint_dir,
            &config.checkpoint.prefix,
        );
        let runner = EvaluationRunner::new(
            Arc::clone(&self.model),
            Arc::clone(&self.inputs),
            CheckpointReader::new(Arc::clone(&self.storage)),
            SummaryWriter::new(config.eval_log_dir())?,
            EvalOptions::from_config(config),
        )
        .with_cancellation(cancel);
        Ok(EvaluationHook::new(tracker, runner, config.eval.eval_frequency))
    }
}

/// Outcome of [`run_training`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub final_step: u64,
    /// Steps run by this process; excludes steps restored from a checkpoint.
    pub steps_run: u64,
    /// Evaluations run by the chief, in order. Empty on other tasks.
    pub evaluations: Vec<EvalReport>,
}

/// Trains until the step budget is spent, the input runs out, or a stop is
/// requested. Blocks the calling thread.
///
/// Only the chief evaluates; when it returns, the final evaluation has run.
///
/// # Errors
///
/// Returns the first error from building the graph, a training step, a hook,
/// or closing the session.
pub fn run_training(ctx: &TrainingContext, job: &TrainingJob) -> Result<TrainingReport> {
    let config = &job.config;

    let eval_hook = if ctx.is_chief {
        Some(Arc::new(job.evaluation_hook(ctx.shutdown.child_token())?))
    } else {
        None
    };
    let hooks: Vec<Arc<dyn SessionHook>> = eval_hook
        .iter()
        .map(|hook| Arc::clone(hook) as Arc<dyn SessionHook>)
        .collect();

    let spec = InputSpec::training(config.training.train_batch_size, ctx.shard_index, ctx.shard_count);
    let inputs = job.inputs.open(&spec)?;
    let graph = job
        .model
        .build_training_graph(inputs, config.training.learning_rate)?;

    let mut session = MonitoredSession::open(
        graph,
        hooks,
        Arc::clone(&job.storage),
        config,
        SessionOptions::from_config(config, ctx.is_chief),
    )?;

    let start = session.global_step();
    let train_steps = config.training.train_steps;
    tracing::info!(
        cluster_target = %ctx.target,
        is_chief = ctx.is_chief,
        shard = ctx.shard_index,
        shards = ctx.shard_count,
        start_step = start,
        ?train_steps,
        "Starting training"
    );

    let mut step = start;
    while train_steps.map_or(true, |limit| step < limit) && !session.should_stop() {
        if ctx.shutdown.is_cancelled() {
            tracing::info!(global_step = step, "Shutdown requested, stopping training");
            break;
        }
        step = session.run_step()?;
    }

    session.close()?;
    tracing::info!(final_step = step, steps_run = step - start, "Training finished");

    Ok(TrainingReport {
        final_step: step,
        steps_run: step - start,
        evaluations: eval_hook.map(|hook| hook.completed()).unwrap_or_default(),
    })
}
