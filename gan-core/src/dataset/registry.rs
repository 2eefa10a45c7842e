// gan-core/src/dataset/registry.rs

//! Named datasets and where their per-domain record files live.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, TrainError};

use super::format::{FixedSizeFormat, LengthPrefixedFormat, RecordFormat};

/// Default dataset used when none is requested.
pub const DEFAULT_DATASET: &str = "celeba";

/// Record layout shared by every domain of a registered dataset.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    /// Height, width and channels of one decoded image.
    pub image_shape: [usize; 3],
    /// Whether records are raw pixels or length-prefixed.
    pub encoding: RecordEncoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEncoding {
    /// Raw `u8` pixels, exactly `h * w * c` bytes per record.
    RawPixels,
    /// `u32` big-endian length followed by that many pixel bytes.
    LengthPrefixed,
}

impl DatasetInfo {
    pub fn pixels_per_image(&self) -> usize {
        self.image_shape.iter().product()
    }

    fn format(&self) -> Arc<dyn RecordFormat> {
        match self.encoding {
            RecordEncoding::RawPixels => Arc::new(FixedSizeFormat::new(self.pixels_per_image())),
            RecordEncoding::LengthPrefixed => Arc::new(LengthPrefixedFormat::new()),
        }
    }
}

/// One domain of a registered dataset, resolved to a file.
#[derive(Clone)]
pub struct Dataset {
    pub name: String,
    pub domain: String,
    /// Record file, relative to the dataset directory.
    pub path: PathBuf,
    pub format: Arc<dyn RecordFormat>,
    pub image_shape: [usize; 3],
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("format", &self.format.name())
            .field("image_shape", &self.image_shape)
            .finish()
    }
}

/// Maps dataset names to their record layout.
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, DatasetInfo>,
}

impl DatasetRegistry {
    /// Registry holding the datasets shipped with the trainer.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(
            DEFAULT_DATASET,
            DatasetInfo {
                image_shape: [64, 64, 3],
                encoding: RecordEncoding::RawPixels,
            },
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, info: DatasetInfo) {
        self.datasets.insert(name.into(), info);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.datasets.contains_key(name)
    }

    /// Resolves one domain of `name` to `<domain>.rec` inside `dataset_dir`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unregistered dataset name.
    pub fn get_dataset(&self, name: &str, domain: &str, dataset_dir: &Path) -> Result<Dataset> {
        let info = self.datasets.get(name).ok_or_else(|| {
            TrainError::config(format!(
                "unknown dataset '{name}', expected one of {:?}",
                self.names()
            ))
        })?;
        if domain.is_empty() || domain.contains('/') {
            return Err(TrainError::dataset(name, format!("invalid domain '{domain}'")));
        }

        Ok(Dataset {
            name: name.to_string(),
            domain: domain.to_string(),
            path: dataset_dir.join(format!("{domain}.rec")),
            format: info.format(),
            image_shape: info.image_shape,
        })
    }
}
