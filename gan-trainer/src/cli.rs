// gan-trainer/src/cli.rs

//! Command-line flags.
//!
//! Flags that are not recognized are split off before parsing so launchers
//! can pass extra arguments without failing the process.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, ValueEnum};
use gan_core::dataset::DatasetRegistry;
use gan_core::{Result, TrainerConfig};

/// Distributed GAN trainer
#[derive(Parser, Debug)]
#[command(name = "gan-trainer")]
#[command(about = "Trains an image-translation GAN and evaluates its checkpoints")]
pub struct Args {
    /// Maximum number of training steps to perform [default: unlimited]
    #[arg(long)]
    pub train_steps: Option<u64>,

    /// Evaluation iterations per checkpoint [default: one pass over the data]
    #[arg(long)]
    pub eval_steps: Option<u64>,

    /// Evaluate once more than this many new checkpoints exist [default: 1]
    #[arg(long)]
    pub eval_frequency: Option<u64>,

    /// Directory for checkpoints and summaries; reuse one to resume training
    #[arg(long)]
    pub job_dir: PathBuf,

    /// Name of the dataset to load [default: celeba]
    #[arg(long, value_parser = parse_dataset_name)]
    pub dataset_name: Option<String>,

    /// Name of domain A [default: black_hair]
    #[arg(long)]
    pub domain_a: Option<String>,

    /// Name of domain B [default: blond_hair]
    #[arg(long)]
    pub domain_b: Option<String>,

    /// Directory where the dataset files are stored
    #[arg(long)]
    pub dataset_dir: PathBuf,

    /// Batch size for training steps [default: 40]
    #[arg(long)]
    pub train_batch_size: Option<usize>,

    /// Batch size for evaluation steps [default: 40]
    #[arg(long)]
    pub eval_batch_size: Option<usize>,

    /// Learning rate [default: 0.002]
    #[arg(long)]
    pub learning_rate: Option<f32>,

    /// Logging verbosity; RUST_LOG takes precedence when set
    #[arg(long, value_enum, ignore_case = true, default_value_t = Verbosity::Info)]
    pub verbosity: Verbosity,

    /// TOML configuration file, applied before environment overrides and flags
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Verbosity {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "ERROR")]
    Error,
    #[value(name = "FATAL")]
    Fatal,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARN")]
    Warn,
}

impl Verbosity {
    /// Filter directive for the log subscriber. FATAL has no tracing level
    /// of its own and maps to `error`.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Fatal => "error",
        }
    }
}

fn parse_dataset_name(name: &str) -> std::result::Result<String, String> {
    let registry = DatasetRegistry::builtin();
    if registry.contains(name) {
        Ok(name.to_string())
    } else {
        Err(format!("expected one of {:?}", registry.names()))
    }
}

impl Args {
    /// Builds the trainer configuration: defaults, then `--config`, then
    /// `GAN_*` environment overrides, then flags.
    pub fn load_config(&self) -> Result<TrainerConfig> {
        let base = match &self.config {
            Some(path) => TrainerConfig::from_file(path)?,
            None => TrainerConfig::default(),
        };
        let config = self.apply(base.with_env_overrides());
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, mut config: TrainerConfig) -> TrainerConfig {
        config.storage.base_path = self.job_dir.clone();
        config.data.dataset_dir = self.dataset_dir.clone();

        if let Some(name) = &self.dataset_name {
            config.data.dataset_name = name.clone();
        }
        if let Some(domain) = &self.domain_a {
            config.data.domain_a = domain.clone();
        }
        if let Some(domain) = &self.domain_b {
            config.data.domain_b = domain.clone();
        }
        if self.train_steps.is_some() {
            config.training.train_steps = self.train_steps;
        }
        if let Some(size) = self.train_batch_size {
            config.training.train_batch_size = size;
        }
        if let Some(size) = self.eval_batch_size {
            config.training.eval_batch_size = size;
        }
        if let Some(lr) = self.learning_rate {
            config.training.learning_rate = lr;
        }
        if self.eval_steps.is_some() {
            config.eval.eval_steps = self.eval_steps;
        }
        if let Some(frequency) = self.eval_frequency {
            config.eval.eval_frequency = frequency;
        }
        config
    }
}

/// Splits raw arguments into those [`Args`] understands and the rest.
///
/// The program name stays in the known list. An unknown `--flag` takes the
/// following token with it unless that token is itself a flag, and loose
/// positional values are treated as unknown.
pub fn split_known_args(raw: impl IntoIterator<Item = String>) -> (Vec<String>, Vec<String>) {
    let command = Args::command();
    let takes_value = |name: &str| -> Option<bool> {
        if matches!(name, "help" | "version") {
            return Some(false);
        }
        command
            .get_arguments()
            .find(|arg| arg.get_long() == Some(name))
            .map(|arg| arg.get_action().takes_values())
    };

    let mut raw = raw.into_iter().peekable();
    let mut known: Vec<String> = raw.next().into_iter().collect();
    let mut unknown = Vec::new();

    while let Some(token) = raw.next() {
        if token == "-h" {
            known.push(token);
            continue;
        }
        let Some(flag) = token.strip_prefix("--") else {
            unknown.push(token);
            continue;
        };

        let (name, inline_value) = match flag.split_once('=') {
            Some((name, _)) => (name, true),
            None => (flag, false),
        };
        let wants_value = !inline_value && raw.peek().is_some_and(|next| !next.starts_with('-'));

        match takes_value(name) {
            Some(takes) => {
                let consume = takes && !inline_value && raw.peek().is_some();
                known.push(token);
                if consume {
                    known.extend(raw.next());
                }
            }
            None => {
                unknown.push(token);
                if wants_value {
                    unknown.extend(raw.next());
                }
            }
        }
    }

    (known, unknown)
}
