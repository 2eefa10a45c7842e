// gan-core/src/dispatch.rs

//! Routes a process to its role: serve parameters, or train.

use tokio_util::sync::CancellationToken;

use crate::cluster::{resolve, ClusterConfig, ClusterRole, Placement, ServerFactory};
use crate::error::{Result, TrainError};
use crate::session::{run_training, TrainingContext, TrainingJob, TrainingReport};

/// How a dispatched process finished.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Trained(TrainingReport),
    /// A parameter server was asked to shut down.
    Shutdown,
}

/// Resolves this process's role and runs it.
///
/// * no usable cluster: train locally as chief with an empty target;
/// * `ps`: start the cluster server and serve until `shutdown` or a fatal
///   serving error;
/// * `master` / `worker`: start the cluster server, then train against its
///   target. Only `master` is chief.
///
/// The role is validated before any server is started. Training runs on a
/// blocking thread while the server keeps serving on the runtime.
///
/// # Errors
///
/// Returns a configuration error for an invalid role, or the first error
/// from the server or the training run.
pub async fn dispatch(
    cluster: Option<&ClusterConfig>,
    job: TrainingJob,
    factory: &dyn ServerFactory,
    shutdown: CancellationToken,
) -> Result<DispatchOutcome> {
    let task = match resolve(cluster)? {
        Placement::Local => {
            tracing::info!("No cluster configured, running locally as chief");
            let ctx = TrainingContext {
                shutdown,
                ..TrainingContext::local()
            };
            return train(ctx, job).await.map(DispatchOutcome::Trained);
        }
        Placement::Task(task) => task,
    };

    let server = factory.start(&task).await?;
    tracing::info!(
        role = %task.role,
        task = task.task_index,
        endpoint = server.target(),
        "Joined cluster"
    );

    match task.role {
        ClusterRole::ParameterServer => {
            tokio::select! {
                served = server.join() => match served? {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Parameter server shutting down");
                    Ok(DispatchOutcome::Shutdown)
                }
            }
        }
        ClusterRole::Worker { is_chief } => {
            let ctx = TrainingContext {
                target: server.target().to_string(),
                is_chief,
                shard_index: task.shard_index(),
                shard_count: task.shard_count(),
                shutdown: shutdown.clone(),
            };

            let serving = server.join();
            tokio::pin!(serving);
            let training = train(ctx, job);
            tokio::pin!(training);

            tokio::select! {
                trained = &mut training => trained.map(DispatchOutcome::Trained),
                served = &mut serving => {
                    // Stop the training thread before reporting the failure
                    shutdown.cancel();
                    let err = match served {
                        Err(e) => e,
                        Ok(never) => match never {},
                    };
                    if let Err(train_err) = training.await {
                        tracing::warn!("Training also failed: {}", train_err);
                    }
                    Err(err)
                }
            }
        }
        ClusterRole::Chief => Err(TrainError::cluster("local chief resolved as a cluster task")),
    }
}

async fn train(ctx: TrainingContext, job: TrainingJob) -> Result<TrainingReport> {
    tokio::task::spawn_blocking(move || run_training(&ctx, &job))
        .await
        .map_err(|e| TrainError::cluster(format!("training thread failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterServer, TaskAssignment};
    use crate::config::TrainerConfig;
    use crate::dataset::{Fetch, InputPipeline, InputSource, InputSpec, PairedBatch};
    use crate::model::AffineTranslator;
    use crate::storage::LocalStorage;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeFactory {
        started: Mutex<Vec<(String, u32)>>,
        fail_join: bool,
    }

    struct FakeServer {
        target: String,
        fail: bool,
    }

    #[async_trait]
    impl ClusterServer for FakeServer {
        fn target(&self) -> &str {
            &self.target
        }

        async fn join(self: Box<Self>) -> Result<Infallible> {
            if self.fail {
                return Err(TrainError::cluster("listener closed"));
            }
            std::future::pending().await
        }
    }

    #[async_trait]
    impl ServerFactory for FakeFactory {
        async fn start(&self, task: &TaskAssignment) -> Result<Box<dyn ClusterServer>> {
            self.started.lock().push((task.job_name.clone(), task.task_index));
            Ok(Box::new(FakeServer {
                target: format!("fake://{}", task.address()),
                fail: self.fail_join,
            }))
        }
    }

    struct CountingSource {
        opened: AtomicUsize,
        specs: Mutex<Vec<InputSpec>>,
    }

    struct EndlessPipeline;

    impl InputPipeline for EndlessPipeline {
        fn next_batch(&mut self) -> Result<Fetch<PairedBatch>> {
            Ok(Fetch::Item(PairedBatch {
                domain_a: vec![vec![0.0]],
                domain_b: vec![vec![1.0]],
            }))
        }
    }

    impl InputSource for CountingSource {
        fn open(&self, spec: &InputSpec) -> Result<Box<dyn InputPipeline>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.specs.lock().push(spec.clone());
            Ok(Box::new(EndlessPipeline))
        }
    }

    fn job(temp: &TempDir, train_steps: Option<u64>) -> (TrainingJob, Arc<CountingSource>) {
        let mut config = TrainerConfig::default();
        config.storage.base_path = temp.path().to_path_buf();
        config.training.train_steps = train_steps;
        config.eval.eval_steps = Some(2);

        let source = Arc::new(CountingSource {
            opened: AtomicUsize::new(0),
            specs: Mutex::new(Vec::new()),
        });
        let job = TrainingJob {
            storage: Arc::new(LocalStorage::new(&config.storage).unwrap()),
            config,
            model: Arc::new(AffineTranslator::new()),
            inputs: source.clone(),
        };
        (job, source)
    }

    fn cluster(kind: &str, index: u32) -> ClusterConfig {
        ClusterConfig::new(
            [
                ("master".to_string(), vec!["m0:2222".to_string()]),
                ("ps".to_string(), vec!["p0:2222".to_string()]),
                (
                    "worker".to_string(),
                    vec!["w0:2222".to_string(), "w1:2222".to_string(), "w2:2222".to_string()],
                ),
            ],
            kind,
            index,
        )
    }

    fn trained(outcome: DispatchOutcome) -> TrainingReport {
        match outcome {
            DispatchOutcome::Trained(report) => report,
            DispatchOutcome::Shutdown => panic!("expected training"),
        }
    }

    #[tokio::test]
    async fn test_no_cluster_trains_locally_as_chief() {
        let temp = TempDir::new().unwrap();
        let (job, _source) = job(&temp, Some(5));
        let factory = FakeFactory::default();

        let report = trained(dispatch(None, job, &factory, CancellationToken::new()).await.unwrap());

        assert_eq!(report.final_step, 5);
        assert!(!report.evaluations.is_empty());
        assert!(factory.started.lock().is_empty());
    }

    #[tokio::test]
    async fn test_ps_serves_and_never_trains() {
        let temp = TempDir::new().unwrap();
        let (job, source) = job(&temp, Some(5));
        let factory = FakeFactory::default();
        let config = cluster("ps", 0);

        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            dispatch(Some(&config), job, &factory, CancellationToken::new()),
        )
        .await;

        assert!(outcome.is_err(), "parameter server returned");
        assert_eq!(*factory.started.lock(), vec![("ps".to_string(), 0)]);
        assert_eq!(source.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ps_stops_on_shutdown() {
        let temp = TempDir::new().unwrap();
        let (job, _source) = job(&temp, None);
        let factory = FakeFactory::default();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let outcome = dispatch(Some(&cluster("ps", 0)), job, &factory, shutdown)
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Shutdown);
    }

    #[tokio::test]
    async fn test_worker_is_not_chief() {
        let temp = TempDir::new().unwrap();
        let (job, source) = job(&temp, Some(10));
        let factory = FakeFactory::default();

        let report = trained(
            dispatch(Some(&cluster("worker", 2)), job, &factory, CancellationToken::new())
                .await
                .unwrap(),
        );

        assert_eq!(report.final_step, 10);
        assert!(report.evaluations.is_empty());
        assert_eq!(*factory.started.lock(), vec![("worker".to_string(), 2)]);

        let spec = source.specs.lock()[0].clone();
        assert!(spec.is_training);
        assert_eq!((spec.shard_index, spec.shard_count), (3, 4));
    }

    #[tokio::test]
    async fn test_master_is_chief_with_evaluation() {
        let temp = TempDir::new().unwrap();
        let (job, source) = job(&temp, Some(10));
        let factory = FakeFactory::default();

        let report = trained(
            dispatch(Some(&cluster("master", 0)), job, &factory, CancellationToken::new())
                .await
                .unwrap(),
        );

        assert_eq!(report.evaluations.last().unwrap().global_step, 10);
        // One training pipeline plus one per evaluation pass
        assert!(source.opened.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_unknown_role_fails_before_server_starts() {
        let temp = TempDir::new().unwrap();
        let (job, _source) = job(&temp, Some(1));
        let factory = FakeFactory::default();

        let err = dispatch(Some(&cluster("chief", 0)), job, &factory, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_config());
        assert!(factory.started.lock().is_empty());
    }

    #[tokio::test]
    async fn test_server_failure_stops_worker() {
        let temp = TempDir::new().unwrap();
        let (job, _source) = job(&temp, None);
        let factory = FakeFactory {
            fail_join: true,
            ..Default::default()
        };

        let err = dispatch(Some(&cluster("worker", 0)), job, &factory, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("listener closed"));
    }
}
