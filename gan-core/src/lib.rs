// gan-core/src/lib.rs

//! GAN Trainer - Core Library
//!
//! Coordination core for distributed training and periodic evaluation of an
//! image-translation GAN: cluster role resolution, checkpoint lifecycle,
//! evaluation scheduling, the managed training session and the dispatcher,
//! plus the storage, checkpoint and dataset plumbing they run on.

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::TrainerConfig;
pub use error::{Result, TrainError};
pub use storage::{LocalStorage, StorageBackend, StorageReader, StorageWriter};

pub mod checkpoint;
pub use checkpoint::{latest_checkpoint, CheckpointId, CheckpointReader, CheckpointWriter};

pub mod dataset;
pub use dataset::{DatasetRegistry, Fetch, InputPipeline, InputSource, InputSpec, PairedDataset};

pub mod model;
pub use model::{AffineTranslator, GanModel, Summary, Variables};

pub mod summary;
pub use summary::SummaryWriter;

pub mod cluster;
pub use cluster::{ClusterConfig, ClusterRole, ServerFactory, TcpServerFactory};

pub mod eval;
pub use eval::{CheckpointTracker, EvalReport, EvaluationHook, EvaluationRunner};

pub mod session;
pub use session::{run_training, MonitoredSession, TrainingContext, TrainingJob, TrainingReport};

pub mod dispatch;
pub use dispatch::{dispatch, DispatchOutcome};
