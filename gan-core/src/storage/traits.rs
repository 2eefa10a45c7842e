// gan-core/src/storage/traits.rs

//! Storage abstraction used for checkpoints and dataset records.

use std::io::{Read, Seek, Write};
use std::path::Path;

use crate::error::Result;

/// A handle for reading a stored object.
pub trait StorageReader: Read + Seek + Send {
    /// Returns the total size of the object in bytes.
    fn size(&self) -> u64;
}

/// A handle for writing a stored object.
pub trait StorageWriter: Write + Send {
    /// Flushes buffered bytes and makes the object durable.
    ///
    /// Must be called to complete the write; the writer is consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or syncing fails.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Operations a storage backend must support.
///
/// Paths are interpreted relative to the backend's root unless absolute.
/// The trait is object-safe and is shared as `Arc<dyn StorageBackend>`
/// between the training session and the evaluation hook.
pub trait StorageBackend: Send + Sync {
    /// Checks if an object exists at the given path.
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Opens an object for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or cannot be opened.
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;

    /// Opens an object for writing, truncating any previous content.
    /// Parent directories are created as needed.
    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>>;

    /// Deletes an object.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Lists entry names directly under `prefix`, sorted.
    ///
    /// A missing directory lists as empty.
    fn list(&self, prefix: &Path) -> Result<Vec<String>>;

    /// Renames an object, replacing the destination if it exists.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Creates a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> Result<()>;
}
