// gan-core/src/storage/mod.rs

//! Storage backends.
//!
//! The trainer keeps everything it persists (checkpoints, record files read
//! by the input pipeline) behind [`StorageBackend`] so the session, the
//! checkpoint tracker and the evaluation runner can share one handle.

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{StorageBackend, StorageReader, StorageWriter};
