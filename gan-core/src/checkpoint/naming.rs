// gan-core/src/checkpoint/naming.rs

//! Checkpoint identifiers and discovery of the most recent checkpoint.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::storage::StorageBackend;

const EXTENSION: &str = ".ckpt";

/// Identifies one checkpoint by its storage-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointId(PathBuf);

impl CheckpointId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Global step encoded in the file name, if the name is well formed.
    pub fn step(&self) -> Option<u64> {
        let name = self.0.file_name()?.to_str()?;
        let stem = name.strip_suffix(EXTENSION)?;
        let (_, step) = stem.rsplit_once('-')?;
        step.parse().ok()
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// File name for a checkpoint of `prefix` taken at `global_step`.
///
/// Steps are zero-padded so lexical order matches step order.
pub fn checkpoint_file_name(prefix: &str, global_step: u64) -> String {
    format!("{prefix}-{global_step:012}{EXTENSION}")
}

fn parse_step(prefix: &str, name: &str) -> Option<u64> {
    name.strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_suffix(EXTENSION)?
        .parse()
        .ok()
}

/// Finds the checkpoint with the highest global step in `dir`.
///
/// Temporary files (leading `.`) and names that don't match `prefix` are
/// ignored. Returns `Ok(None)` when the directory holds no checkpoint.
pub fn latest_checkpoint(
    storage: &dyn StorageBackend,
    dir: &Path,
    prefix: &str,
) -> Result<Option<CheckpointId>> {
    let latest = storage
        .list(dir)?
        .into_iter()
        .filter(|name| !name.starts_with('.'))
        .filter_map(|name| parse_step(prefix, &name).map(|step| (step, name)))
        .max();

    Ok(latest.map(|(_, name)| CheckpointId::new(dir.join(name))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    fn storage() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        (LocalStorage::new(&config).unwrap(), temp_dir)
    }

    fn touch(temp: &TempDir, name: &str) {
        std::fs::write(temp.path().join(name), b"").unwrap();
    }

    #[test]
    fn test_file_name_sorts_by_step() {
        let a = checkpoint_file_name("model", 9);
        let b = checkpoint_file_name("model", 10);
        assert_eq!(a, "model-000000000009.ckpt");
        assert!(a < b);
    }

    #[test]
    fn test_id_step() {
        let id = CheckpointId::new("ckpt/model-000000000120.ckpt");
        assert_eq!(id.step(), Some(120));
        assert_eq!(CheckpointId::new("events.jsonl").step(), None);
    }

    #[test]
    fn test_latest_empty_dir() {
        let (storage, _temp) = storage();
        assert!(latest_checkpoint(&storage, Path::new("."), "model")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_latest_picks_highest_step() {
        let (storage, temp) = storage();
        touch(&temp, "model-000000000050.ckpt");
        touch(&temp, "model-000000000150.ckpt");
        touch(&temp, "model-000000000100.ckpt");
        touch(&temp, ".model-000000000200.ckpt.tmp");
        touch(&temp, "other-000000000900.ckpt");
        touch(&temp, "events.jsonl");

        let latest = latest_checkpoint(&storage, Path::new("."), "model")
            .unwrap()
            .unwrap();
        assert_eq!(latest.step(), Some(150));
    }
}
