// gan-core/src/session/monitored.rs

//! Restartable training session.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::hooks::{SessionHook, StepContext};
use crate::checkpoint::{latest_checkpoint, CheckpointId, CheckpointReader, CheckpointWriter};
use crate::config::TrainerConfig;
use crate::dataset::Fetch;
use crate::error::{Result, TrainError};
use crate::model::{TrainGraph, Variables};
use crate::storage::StorageBackend;
use crate::summary::SummaryWriter;

/// Cadence and role for a [`MonitoredSession`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub is_chief: bool,
    /// Wall-clock interval between checkpoints. Zero saves after every step.
    pub save_checkpoint_every: Duration,
    pub save_summaries_steps: u64,
    /// Where training summaries go.
    pub summary_dir: PathBuf,
}

impl SessionOptions {
    pub fn from_config(config: &TrainerConfig, is_chief: bool) -> Self {
        Self {
            is_chief,
            save_checkpoint_every: Duration::from_secs(config.session.save_checkpoint_secs),
            save_summaries_steps: config.session.save_summaries_steps.max(1),
            summary_dir: config.job_dir().to_path_buf(),
        }
    }
}

/// Wraps a training graph with recovery, checkpointing, summaries and hooks.
///
/// Opening restores the newest checkpoint if there is one. On the chief,
/// checkpoints are saved on a wall-clock interval and summaries every N
/// steps. Each hook's `after_step` runs on its own background thread; errors
/// from finished threads surface on the next step or on close.
pub struct MonitoredSession {
    graph: Box<dyn TrainGraph>,
    hooks: Vec<Arc<dyn SessionHook>>,
    saver: Option<Saver>,
    summaries: Option<SummaryWriter>,
    options: SessionOptions,
    stop: CancellationToken,
    pending: Vec<JoinHandle<Result<()>>>,
}

struct Saver {
    writer: CheckpointWriter,
    last_save: Instant,
    last_saved_step: Option<u64>,
}

impl MonitoredSession {
    /// Restores or initializes `graph` and opens the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the latest checkpoint cannot be read or restored,
    /// or (on the chief) if the summary log cannot be opened.
    pub fn open(
        mut graph: Box<dyn TrainGraph>,
        hooks: Vec<Arc<dyn SessionHook>>,
        storage: Arc<dyn StorageBackend>,
        config: &TrainerConfig,
        options: SessionOptions,
    ) -> Result<Self> {
        let ckpt = &config.checkpoint;
        match latest_checkpoint(storage.as_ref(), &ckpt.checkpoint_dir, &ckpt.prefix)? {
            Some(id) => {
                restore(graph.as_mut(), &CheckpointReader::new(Arc::clone(&storage)), &id)?;
                tracing::info!(checkpoint = %id, global_step = graph.global_step(), "Restored session");
            }
            None => {
                tracing::info!("No checkpoint found, initializing fresh session");
            }
        }

        let (saver, summaries) = if options.is_chief {
            let saver = Saver {
                writer: CheckpointWriter::new(storage, ckpt.clone()),
                last_save: Instant::now(),
                last_saved_step: None,
            };
            (Some(saver), Some(SummaryWriter::new(&options.summary_dir)?))
        } else {
            (None, None)
        };

        let mut session = Self {
            graph,
            hooks,
            saver,
            summaries,
            options,
            stop: CancellationToken::new(),
            pending: Vec::new(),
        };
        // Give the chief's hooks a checkpoint to work with from the start
        session.save_checkpoint()?;
        Ok(session)
    }

    pub fn global_step(&self) -> u64 {
        self.graph.global_step()
    }

    pub fn should_stop(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Token that stops the session before its next step when cancelled.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Runs one training step and returns the global step afterwards.
    ///
    /// Running out of training data requests a stop and returns the
    /// unchanged step.
    pub fn run_step(&mut self) -> Result<u64> {
        self.reap_finished()?;

        let step = match self.graph.train_step()? {
            Fetch::Item(step) => step,
            Fetch::Exhausted => {
                tracing::info!(global_step = self.global_step(), "Training input exhausted");
                self.stop.cancel();
                return Ok(self.global_step());
            }
        };

        if let Some(summaries) = self.summaries.as_mut() {
            if step % self.options.save_summaries_steps == 0 {
                summaries.write(step, &self.graph.summary())?;
                summaries.flush()?;
            }
        }

        let save_due = self
            .saver
            .as_ref()
            .is_some_and(|saver| saver.last_save.elapsed() >= self.options.save_checkpoint_every);
        if save_due {
            self.save_checkpoint()?;
        }

        for hook in &self.hooks {
            let hook = Arc::clone(hook);
            let ctx = StepContext::new(step, self.stop.clone());
            self.pending.push(thread::spawn(move || hook.after_step(&ctx)));
        }

        Ok(step)
    }

    /// Ends the session.
    ///
    /// Waits for background hook work, saves a final checkpoint on the chief,
    /// then calls every hook's `end`.
    pub fn close(mut self) -> Result<()> {
        let background = self.join_pending();
        self.save_checkpoint()?;
        background?;

        for hook in &self.hooks {
            tracing::debug!(hook = hook.name(), "Running end hook");
            hook.end()?;
        }

        if let Some(summaries) = self.summaries.as_mut() {
            summaries.flush()?;
        }
        tracing::info!(global_step = self.global_step(), "Session closed");
        Ok(())
    }

    /// Saves a checkpoint at the current step if this is the chief and the
    /// step has not been saved yet.
    fn save_checkpoint(&mut self) -> Result<Option<CheckpointId>> {
        let Some(saver) = self.saver.as_mut() else {
            return Ok(None);
        };
        let step = self.graph.global_step();
        saver.last_save = Instant::now();
        if saver.last_saved_step == Some(step) {
            return Ok(None);
        }

        let id = saver.writer.write(step, &self.graph.variables().to_bytes()?)?;
        saver.last_saved_step = Some(step);
        tracing::info!(checkpoint = %id, global_step = step, "Saved checkpoint");
        Ok(Some(id))
    }

    fn reap_finished(&mut self) -> Result<()> {
        let (finished, running) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition::<Vec<_>, _>(JoinHandle::is_finished);
        self.pending = running;

        finished.into_iter().try_for_each(join_hook)
    }

    /// Joins every outstanding hook thread and returns the first error.
    fn join_pending(&mut self) -> Result<()> {
        let mut first_error = None;
        for handle in self.pending.drain(..) {
            if let Err(e) = join_hook(handle) {
                tracing::error!("Background hook failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn join_hook(handle: JoinHandle<Result<()>>) -> Result<()> {
    handle
        .join()
        .map_err(|_| TrainError::model("session hook thread panicked"))?
}

fn restore(graph: &mut dyn TrainGraph, reader: &CheckpointReader, id: &CheckpointId) -> Result<()> {
    let checkpoint = reader.read(id)?;
    let variables = Variables::from_bytes(&checkpoint.data)?;
    graph.restore(variables)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::storage::LocalStorage;
    use crate::summary::read_records;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    /// Counts steps; `limit` makes the input run dry.
    pub(crate) struct CountingGraph {
        pub step: u64,
        pub limit: Option<u64>,
    }

    impl TrainGraph for CountingGraph {
        fn global_step(&self) -> u64 {
            self.step
        }

        fn train_step(&mut self) -> Result<Fetch<u64>> {
            if self.limit.is_some_and(|limit| self.step >= limit) {
                return Ok(Fetch::Exhausted);
            }
            self.step += 1;
            Ok(Fetch::Item(self.step))
        }

        fn summary(&self) -> crate::model::Summary {
            let mut summary = crate::model::Summary::new();
            summary.insert("step", self.step as f64);
            summary
        }

        fn variables(&self) -> Variables {
            Variables {
                global_step: self.step,
                ..Default::default()
            }
        }

        fn restore(&mut self, variables: Variables) -> Result<()> {
            self.step = variables.global_step;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        steps: AtomicU64,
        events: Mutex<Vec<String>>,
        fail_after_step: bool,
    }

    impl SessionHook for RecordingHook {
        fn after_step(&self, ctx: &StepContext) -> Result<()> {
            self.steps.fetch_add(1, Ordering::SeqCst);
            if self.fail_after_step {
                return Err(TrainError::model(format!("hook failed at {}", ctx.global_step)));
            }
            Ok(())
        }

        fn end(&self) -> Result<()> {
            self.events.lock().push("end".to_string());
            Ok(())
        }
    }

    struct StopAtHook(u64);

    impl SessionHook for StopAtHook {
        fn after_step(&self, ctx: &StepContext) -> Result<()> {
            if ctx.global_step >= self.0 {
                ctx.request_stop();
            }
            Ok(())
        }

        fn end(&self) -> Result<()> {
            Ok(())
        }
    }

    fn setup(temp: &TempDir) -> (Arc<dyn StorageBackend>, TrainerConfig) {
        let mut config = TrainerConfig::default();
        config.storage = StorageConfig {
            base_path: temp.path().to_path_buf(),
            buffer_size: 4096,
        };
        config.session.save_summaries_steps = 10;
        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&config.storage).unwrap());
        (storage, config)
    }

    fn graph(limit: Option<u64>) -> Box<dyn TrainGraph> {
        Box::new(CountingGraph { step: 0, limit })
    }

    fn latest_step(storage: &Arc<dyn StorageBackend>) -> Option<u64> {
        latest_checkpoint(storage.as_ref(), std::path::Path::new("."), "model")
            .unwrap()
            .and_then(|id| id.step())
    }

    #[test]
    fn test_chief_saves_initial_and_final_checkpoint() {
        let temp = TempDir::new().unwrap();
        let (storage, config) = setup(&temp);
        let options = SessionOptions::from_config(&config, true);

        let mut session =
            MonitoredSession::open(graph(None), vec![], Arc::clone(&storage), &config, options).unwrap();
        assert_eq!(latest_step(&storage), Some(0));

        for _ in 0..25 {
            session.run_step().unwrap();
        }
        session.close().unwrap();

        assert_eq!(latest_step(&storage), Some(25));
        let steps: Vec<u64> = read_records(temp.path()).unwrap().iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![10, 20]);
    }

    #[test]
    fn test_restores_latest_checkpoint() {
        let temp = TempDir::new().unwrap();
        let (storage, config) = setup(&temp);

        let mut session = MonitoredSession::open(
            graph(None),
            vec![],
            Arc::clone(&storage),
            &config,
            SessionOptions::from_config(&config, true),
        )
        .unwrap();
        for _ in 0..7 {
            session.run_step().unwrap();
        }
        session.close().unwrap();

        let session = MonitoredSession::open(
            graph(None),
            vec![],
            storage,
            &config,
            SessionOptions::from_config(&config, false),
        )
        .unwrap();
        assert_eq!(session.global_step(), 7);
    }

    #[test]
    fn test_zero_interval_saves_every_step() {
        let temp = TempDir::new().unwrap();
        let (storage, mut config) = setup(&temp);
        config.session.save_checkpoint_secs = 0;
        config.checkpoint.keep_last_n = 100;

        let mut session = MonitoredSession::open(
            graph(None),
            vec![],
            Arc::clone(&storage),
            &config,
            SessionOptions::from_config(&config, true),
        )
        .unwrap();
        for _ in 0..3 {
            session.run_step().unwrap();
        }

        let saved = storage.list(std::path::Path::new(".")).unwrap();
        assert_eq!(saved.iter().filter(|n| n.ends_with(".ckpt")).count(), 4);
        session.close().unwrap();
    }

    #[test]
    fn test_non_chief_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let (storage, config) = setup(&temp);

        let mut session = MonitoredSession::open(
            graph(None),
            vec![],
            Arc::clone(&storage),
            &config,
            SessionOptions::from_config(&config, false),
        )
        .unwrap();
        for _ in 0..20 {
            session.run_step().unwrap();
        }
        session.close().unwrap();

        assert_eq!(latest_step(&storage), None);
        assert!(read_records(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_exhaustion_requests_stop() {
        let temp = TempDir::new().unwrap();
        let (storage, config) = setup(&temp);
        let mut session = MonitoredSession::open(
            graph(Some(2)),
            vec![],
            storage,
            &config,
            SessionOptions::from_config(&config, false),
        )
        .unwrap();

        assert_eq!(session.run_step().unwrap(), 1);
        assert_eq!(session.run_step().unwrap(), 2);
        assert!(!session.should_stop());
        assert_eq!(session.run_step().unwrap(), 2);
        assert!(session.should_stop());
    }

    #[test]
    fn test_hooks_run_then_end_after_background_work() {
        let temp = TempDir::new().unwrap();
        let (storage, config) = setup(&temp);
        let hook = Arc::new(RecordingHook::default());

        let mut session = MonitoredSession::open(
            graph(None),
            vec![hook.clone() as Arc<dyn SessionHook>],
            storage,
            &config,
            SessionOptions::from_config(&config, true),
        )
        .unwrap();
        for _ in 0..30 {
            session.run_step().unwrap();
        }
        session.close().unwrap();

        assert_eq!(hook.steps.load(Ordering::SeqCst), 30);
        assert_eq!(*hook.events.lock(), vec!["end".to_string()]);
    }

    #[test]
    fn test_hook_can_request_stop() {
        let temp = TempDir::new().unwrap();
        let (storage, config) = setup(&temp);
        let mut session = MonitoredSession::open(
            graph(None),
            vec![Arc::new(StopAtHook(3)) as Arc<dyn SessionHook>],
            storage,
            &config,
            SessionOptions::from_config(&config, false),
        )
        .unwrap();

        let token = session.stop_token();
        let mut steps = 0;
        while !session.should_stop() && steps < 1000 {
            session.run_step().unwrap();
            steps += 1;
            // Let the background hook observe the step
            while steps == 3 && !token.is_cancelled() {
                thread::yield_now();
            }
        }
        assert_eq!(steps, 3);
        session.close().unwrap();
    }

    #[test]
    fn test_hook_error_surfaces_on_close() {
        let temp = TempDir::new().unwrap();
        let (storage, config) = setup(&temp);
        let hook = Arc::new(RecordingHook {
            fail_after_step: true,
            ..Default::default()
        });

        let mut session = MonitoredSession::open(
            graph(None),
            vec![hook.clone() as Arc<dyn SessionHook>],
            storage,
            &config,
            SessionOptions::from_config(&config, false),
        )
        .unwrap();
        session.run_step().unwrap();

        let err = session.close().unwrap_err();
        assert!(err.to_string().contains("hook failed at 1"));
        // End hooks do not run after a failed step callback
        assert!(hook.events.lock().is_empty());
    }
}
