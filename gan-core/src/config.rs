// gan-core/src/config.rs

//! Configuration for training, checkpointing and evaluation.
//!
//! Values come from three layers, applied in order: built-in defaults, an
//! optional TOML file, and `GAN_`-prefixed environment variables. Command-line
//! flags are applied last by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, TrainError};

/// Name of the environment variable carrying the cluster topology.
pub const CLUSTER_CONFIG_ENV: &str = "CLUSTER_CONFIG";

// Top-level trainer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub storage: StorageConfig,
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub checkpoint: CheckpointConfig,
    pub session: SessionConfig,
    pub eval: EvalConfig,
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Job directory; checkpoints and summaries live underneath it.
    pub base_path: PathBuf,
    // Buffer size in bytes for I/O operations.
    pub buffer_size: usize,
}

/// Dataset selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Registered dataset name.
    pub dataset_name: String,
    /// Directory holding the per-domain record files.
    pub dataset_dir: PathBuf,
    /// Source translation domain.
    pub domain_a: String,
    /// Target translation domain.
    pub domain_b: String,
}

/// Training loop options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Total step budget; `None` trains until a stop signal.
    pub train_steps: Option<u64>,
    pub train_batch_size: usize,
    pub eval_batch_size: usize,
    pub learning_rate: f32,
}

// Checkpoint configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    // Directory for checkpoints, relative to the job directory.
    pub checkpoint_dir: PathBuf,
    // File name prefix; files are named `<prefix>-<step>.ckpt`.
    pub prefix: String,
    // Compression algorithm: "none", "lz4", or "zstd".
    pub compression: String,
    // Compression level (algorithm-specific).
    pub compression_level: i32,
    // Number of recent checkpoints to keep.
    pub keep_last_n: usize,
    // Whether to use atomic writes (write to temp then rename).
    pub atomic_writes: bool,
}

/// Managed-session cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wall-clock interval between checkpoint saves on the chief; 0 saves
    /// after every step.
    pub save_checkpoint_secs: u64,
    /// Step interval between training summaries on the chief.
    pub save_summaries_steps: u64,
}

/// Evaluation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Iterations per evaluation pass; `None` runs until the input is exhausted.
    pub eval_steps: Option<u64>,
    /// Evaluate once more than this many new checkpoints have appeared.
    pub eval_frequency: u64,
    /// Progress log cadence, in evaluation iterations.
    pub log_every_n: u64,
    /// Directory for evaluation summaries, relative to the job directory.
    pub eval_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./job"),
            buffer_size: 64 * 1024, // 64 KB
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_name: "celeba".to_string(),
            dataset_dir: PathBuf::from("./data"),
            domain_a: "black_hair".to_string(),
            domain_b: "blond_hair".to_string(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_steps: None,
            train_batch_size: 40,
            eval_batch_size: 40,
            learning_rate: 0.002,
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("."),
            prefix: "model".to_string(),
            compression: "lz4".to_string(),
            compression_level: 1,
            keep_last_n: 5,
            atomic_writes: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_checkpoint_secs: 300,
            save_summaries_steps: 50,
        }
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            eval_steps: None,
            eval_frequency: 1,
            log_every_n: 100,
            eval_dir: PathBuf::from("eval"),
        }
    }
}

impl FromStr for TrainerConfig {
    type Err = TrainError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| TrainError::config_with_source("failed to parse TOML config", e))
    }
}

impl TrainerConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrainError::storage_with_source(path, "failed to read config file", e)
        })?;
        content.parse()
    }

    /// Job directory holding checkpoints and summaries.
    pub fn job_dir(&self) -> &Path {
        &self.storage.base_path
    }

    /// Absolute location of the evaluation summaries.
    pub fn eval_log_dir(&self) -> PathBuf {
        self.storage.base_path.join(&self.eval.eval_dir)
    }

    // Apply environment variable overrides.
    //
    // Variables are prefixed with `GAN_` and name the section and field, e.g.
    // `GAN_CHECKPOINT_COMPRESSION` overrides `checkpoint.compression` and
    // `GAN_SESSION_SAVE_CHECKPOINT_SECS` overrides `session.save_checkpoint_secs`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup("GAN_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        if let Some(v) = lookup("GAN_STORAGE_BUFFER_SIZE").and_then(|v| v.parse().ok()) {
            self.storage.buffer_size = v;
        }

        if let Some(val) = lookup("GAN_DATA_DATASET_NAME") {
            self.data.dataset_name = val;
        }
        if let Some(val) = lookup("GAN_DATA_DATASET_DIR") {
            self.data.dataset_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("GAN_CHECKPOINT_COMPRESSION") {
            self.checkpoint.compression = val;
        }
        if let Some(v) = lookup("GAN_CHECKPOINT_COMPRESSION_LEVEL").and_then(|v| v.parse().ok()) {
            self.checkpoint.compression_level = v;
        }
        if let Some(v) = lookup("GAN_CHECKPOINT_KEEP_LAST_N").and_then(|v| v.parse().ok()) {
            self.checkpoint.keep_last_n = v;
        }
        if let Some(v) = lookup("GAN_CHECKPOINT_ATOMIC_WRITES").and_then(|v| v.parse().ok()) {
            self.checkpoint.atomic_writes = v;
        }

        if let Some(v) = lookup("GAN_SESSION_SAVE_CHECKPOINT_SECS").and_then(|v| v.parse().ok()) {
            self.session.save_checkpoint_secs = v;
        }
        if let Some(v) = lookup("GAN_SESSION_SAVE_SUMMARIES_STEPS").and_then(|v| v.parse().ok()) {
            self.session.save_summaries_steps = v;
        }

        if let Some(v) = lookup("GAN_EVAL_LOG_EVERY_N").and_then(|v| v.parse().ok()) {
            self.eval.log_every_n = v;
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.buffer_size == 0 {
            return Err(TrainError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        if self.data.domain_a.is_empty() || self.data.domain_b.is_empty() {
            return Err(TrainError::config("data.domain_a and data.domain_b must be set"));
        }

        if self.training.train_batch_size == 0 || self.training.eval_batch_size == 0 {
            return Err(TrainError::config("batch sizes must be greater than 0"));
        }
        if !(self.training.learning_rate.is_finite() && self.training.learning_rate > 0.0) {
            return Err(TrainError::config(format!(
                "training.learning_rate must be a positive number, got {}",
                self.training.learning_rate
            )));
        }

        let valid_compression = ["none", "lz4", "zstd"];
        if !valid_compression.contains(&self.checkpoint.compression.as_str()) {
            return Err(TrainError::config(format!(
                "checkpoint.compression must be one of {:?}, got '{}'",
                valid_compression, self.checkpoint.compression
            )));
        }
        if self.checkpoint.compression == "zstd"
            && !(1..=22).contains(&self.checkpoint.compression_level)
        {
            return Err(TrainError::config(format!(
                "checkpoint.compression_level for zstd must be 1-22, got {}",
                self.checkpoint.compression_level
            )));
        }
        if self.checkpoint.keep_last_n == 0 {
            return Err(TrainError::config(
                "checkpoint.keep_last_n must be greater than 0",
            ));
        }
        if self.checkpoint.prefix.is_empty() || self.checkpoint.prefix.contains('/') {
            return Err(TrainError::config(format!(
                "checkpoint.prefix must be a plain file name, got '{}'",
                self.checkpoint.prefix
            )));
        }

        if self.session.save_summaries_steps == 0 {
            return Err(TrainError::config(
                "session.save_summaries_steps must be greater than 0",
            ));
        }
        if self.eval.log_every_n == 0 {
            return Err(TrainError::config("eval.log_every_n must be greater than 0"));
        }

        Ok(())
    }
}
