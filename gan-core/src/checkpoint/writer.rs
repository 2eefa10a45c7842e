// gan-core/src/checkpoint/writer.rs

//! Checkpoint writer implementation.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::CheckpointConfig;
use crate::error::{Result, TrainError};
use crate::storage::StorageBackend;

use super::format::{checksum, CheckpointHeader};
use super::naming::{checkpoint_file_name, CheckpointId};

/// Writes checkpoints with compression and integrity verification.
///
/// Each write compresses the payload, prepends a header carrying the global
/// step and an XXHash64 checksum, lands the file atomically (temp file then
/// rename) and prunes all but the newest `keep_last_n` checkpoints.
pub struct CheckpointWriter {
    storage: Arc<dyn StorageBackend>,
    config: CheckpointConfig,
}

impl CheckpointWriter {
    pub fn new(storage: Arc<dyn StorageBackend>, config: CheckpointConfig) -> Self {
        Self { storage, config }
    }

    /// Writes a checkpoint for `global_step` and returns its id.
    ///
    /// Writing the same step twice replaces the earlier file, so the id is
    /// unchanged.
    pub fn write(&self, global_step: u64, data: &[u8]) -> Result<CheckpointId> {
        self.storage.create_dir_all(&self.config.checkpoint_dir)?;

        let compressed = self.compress(data)?;
        let header = CheckpointHeader::new(
            global_step,
            self.config.compression.clone(),
            data.len() as u64,
            checksum(data),
            now_millis(),
        );
        let header_bytes = bincode::serialize(&header)
            .map_err(|e| TrainError::checkpoint_with_source("failed to serialize header", e))?;

        let mut file = Vec::with_capacity(4 + header_bytes.len() + compressed.len());
        file.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        file.extend_from_slice(&header_bytes);
        file.extend_from_slice(&compressed);

        let filename = checkpoint_file_name(&self.config.prefix, global_step);
        let final_path = self.config.checkpoint_dir.join(&filename);

        if self.config.atomic_writes {
            let temp_path = self.config.checkpoint_dir.join(format!(".{filename}.tmp"));
            self.write_to_path(&temp_path, &file)?;
            self.storage.rename(&temp_path, &final_path)?;
        } else {
            self.write_to_path(&final_path, &file)?;
        }

        self.cleanup_old_checkpoints()?;

        Ok(CheckpointId::new(final_path))
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.config.compression.as_str() {
            "none" => Ok(data.to_vec()),
            "lz4" => Ok(lz4_flex::compress_prepend_size(data)),
            "zstd" => zstd::encode_all(data, self.config.compression_level)
                .map_err(|e| TrainError::checkpoint_with_source("zstd compression failed", e)),
            other => Err(TrainError::checkpoint(format!(
                "unknown compression algorithm: {other}"
            ))),
        }
    }

    fn write_to_path(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut writer = self.storage.open_write(path)?;
        writer
            .write_all(data)
            .map_err(|e| TrainError::checkpoint_with_source("failed to write checkpoint data", e))?;
        writer.finish()
    }

    fn cleanup_old_checkpoints(&self) -> Result<()> {
        let prefix = format!("{}-", self.config.prefix);
        let mut matching: Vec<_> = self
            .storage
            .list(&self.config.checkpoint_dir)?
            .into_iter()
            .filter(|e| e.starts_with(&prefix) && e.ends_with(".ckpt"))
            .collect();

        // Zero-padded steps: lexical order is step order
        matching.sort();

        if matching.len() > self.config.keep_last_n {
            let to_delete = matching.len() - self.config.keep_last_n;
            for filename in matching.iter().take(to_delete) {
                tracing::debug!("Removing old checkpoint {}", filename);
                self.storage
                    .delete(&self.config.checkpoint_dir.join(filename))?;
            }
        }

        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::latest_checkpoint;
    use crate::config::StorageConfig;
    use crate::storage::LocalStorage;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_writer(keep_last_n: usize) -> (CheckpointWriter, Arc<dyn StorageBackend>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage_config = StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let storage: Arc<dyn StorageBackend> =
            Arc::new(LocalStorage::new(&storage_config).unwrap());

        let config = CheckpointConfig {
            checkpoint_dir: PathBuf::from("checkpoints"),
            compression: "none".to_string(),
            keep_last_n,
            ..Default::default()
        };

        (CheckpointWriter::new(storage.clone(), config), storage, temp_dir)
    }

    #[test]
    fn test_write_creates_named_file() {
        let (writer, _storage, temp_dir) = create_test_writer(3);

        let id = writer.write(42, b"state").unwrap();

        assert_eq!(id.step(), Some(42));
        assert!(temp_dir.path().join(id.path()).exists());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let (writer, storage, _temp) = create_test_writer(3);
        writer.write(1, b"state").unwrap();

        let entries = storage.list(Path::new("checkpoints")).unwrap();
        assert!(entries.iter().all(|e| !e.starts_with('.')));
    }

    #[test]
    fn test_same_step_keeps_id() {
        let (writer, _storage, _temp) = create_test_writer(3);
        let first = writer.write(7, b"a").unwrap();
        let second = writer.write(7, b"b").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_keep_last_n() {
        let (writer, storage, _temp) = create_test_writer(2);
        for step in [10, 20, 30, 40] {
            writer.write(step, b"state").unwrap();
        }

        let entries = storage.list(Path::new("checkpoints")).unwrap();
        assert_eq!(entries.len(), 2);

        let latest = latest_checkpoint(storage.as_ref(), Path::new("checkpoints"), "model")
            .unwrap()
            .unwrap();
        assert_eq!(latest.step(), Some(40));
    }

    #[test]
    fn test_compression_lz4_differs_from_input() {
        let (mut writer, _storage, _temp) = create_test_writer(3);
        writer.config.compression = "lz4".to_string();
        let data = vec![7u8; 4096];
        let compressed = writer.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
    }

    #[test]
    fn test_unknown_compression() {
        let (mut writer, _storage, _temp) = create_test_writer(3);
        writer.config.compression = "brotli".to_string();
        assert!(writer.write(1, b"x").is_err());
    }
}
