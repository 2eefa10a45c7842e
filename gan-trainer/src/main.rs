//! GAN Trainer
//!
//! Runs one process of a training job. The cluster topology comes from the
//! `CLUSTER_CONFIG` environment variable; without it the process trains and
//! evaluates on its own.
//!
//! # Usage
//!
//! ```bash
//! # Local run
//! gan-trainer --job-dir ./job --dataset-dir ./data --train-steps 1000
//!
//! # Second worker of a distributed job
//! CLUSTER_CONFIG='{"cluster": {"master": ["m:2222"], "ps": ["p:2222"], "worker": ["w0:2222", "w1:2222"]},
//!                  "task": {"type": "worker", "index": 1}}' \
//!     gan-trainer --job-dir /shared/job --dataset-dir /shared/data
//! ```

mod cli;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gan_core::config::CLUSTER_CONFIG_ENV;
use gan_core::dataset::DatasetRegistry;
use gan_core::{dispatch, ClusterConfig, DispatchOutcome, TcpServerFactory, TrainingJob};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (known, unknown) = cli::split_known_args(std::env::args());
    let args = cli::Args::parse_from(known);

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(args.verbosity.as_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !unknown.is_empty() {
        tracing::warn!("Unknown arguments: {:?}", unknown);
    }

    let config = args.load_config()?;
    let cluster = ClusterConfig::from_env_value(std::env::var(CLUSTER_CONFIG_ENV).ok().as_deref())?;
    let job = TrainingJob::from_config(config, &DatasetRegistry::builtin())?;

    tracing::info!("Starting GAN trainer");
    tracing::info!("  Job dir: {}", job.config.job_dir().display());
    tracing::info!("  Dataset: {}", job.config.data.dataset_name);
    tracing::info!(
        "  Domains: {} -> {}",
        job.config.data.domain_a,
        job.config.data.domain_b
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal, stopping training and evaluation");
            signal_token.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received second shutdown signal, exiting immediately");
            std::process::exit(130);
        }
    });

    match dispatch(cluster.as_ref(), job, &TcpServerFactory, shutdown).await? {
        DispatchOutcome::Trained(report) => {
            tracing::info!(
                "Training complete at step {} ({} steps run, {} evaluations)",
                report.final_step,
                report.steps_run,
                report.evaluations.len()
            );
        }
        DispatchOutcome::Shutdown => {
            tracing::info!("Shutdown complete");
        }
    }

    Ok(())
}
