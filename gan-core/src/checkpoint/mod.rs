// gan-core/src/checkpoint/mod.rs

//! Durable snapshots of model variables plus the global step.
//!
//! Checkpoints are written by the chief's managed session and discovered by
//! the evaluation hook through [`latest_checkpoint`]. Files are named
//! `<prefix>-<step>.ckpt` with a zero-padded step so the newest checkpoint is
//! also the lexically greatest name.
//!
//! # Example
//!
//! ```no_run
//! use gan_core::checkpoint::{latest_checkpoint, CheckpointReader, CheckpointWriter};
//! use gan_core::config::{CheckpointConfig, StorageConfig};
//! use gan_core::storage::{LocalStorage, StorageBackend};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let storage: Arc<dyn StorageBackend> =
//!     Arc::new(LocalStorage::new(&StorageConfig::default()).unwrap());
//! let writer = CheckpointWriter::new(storage.clone(), CheckpointConfig::default());
//! writer.write(100, b"variables").unwrap();
//!
//! let latest = latest_checkpoint(storage.as_ref(), Path::new("."), "model").unwrap().unwrap();
//! let checkpoint = CheckpointReader::new(storage).read(&latest).unwrap();
//! assert_eq!(checkpoint.global_step(), 100);
//! ```

mod format;
mod naming;
mod reader;
mod writer;

pub use format::CheckpointHeader;
pub use naming::{checkpoint_file_name, latest_checkpoint, CheckpointId};
pub use reader::{Checkpoint, CheckpointReader};
pub use writer::CheckpointWriter;
