// gan-core/src/dataset/pipeline.rs

//! Paired-domain input pipelines.
//!
//! A pipeline yields batches holding the same number of images from each
//! translation domain. End of data is a value ([`Fetch::Exhausted`]), never an
//! error, so callers can tell a clean stop from a failure.

use std::sync::Arc;

use crate::error::{Result, TrainError};
use crate::storage::StorageBackend;

use super::reader::ShardReader;
use super::registry::Dataset;
use super::sharding::calculate_shards;

/// Outcome of pulling from a finite source.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Item(T),
    Exhausted,
}

impl<T> Fetch<T> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Fetch::Exhausted)
    }

    pub fn item(self) -> Option<T> {
        match self {
            Fetch::Item(item) => Some(item),
            Fetch::Exhausted => None,
        }
    }
}

/// One batch of images from each domain, pixels scaled to `[-1, 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairedBatch {
    pub domain_a: Vec<Vec<f32>>,
    pub domain_b: Vec<Vec<f32>>,
}

impl PairedBatch {
    pub fn len(&self) -> usize {
        self.domain_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domain_a.is_empty()
    }
}

/// Parameters for building one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub batch_size: usize,
    /// Training pipelines repeat forever; evaluation pipelines make one pass.
    pub is_training: bool,
    pub shard_index: u32,
    pub shard_count: u32,
}

impl InputSpec {
    pub fn training(batch_size: usize, shard_index: u32, shard_count: u32) -> Self {
        Self {
            batch_size,
            is_training: true,
            shard_index,
            shard_count,
        }
    }

    /// Single-pass evaluation over the whole input.
    pub fn evaluation(batch_size: usize) -> Self {
        Self {
            batch_size,
            is_training: false,
            shard_index: 0,
            shard_count: 1,
        }
    }
}

pub trait InputPipeline: Send {
    fn next_batch(&mut self) -> Result<Fetch<PairedBatch>>;
}

/// Builds fresh, independent pipelines.
pub trait InputSource: Send + Sync {
    fn open(&self, spec: &InputSpec) -> Result<Box<dyn InputPipeline>>;
}

/// Two registered domains read from record files.
pub struct PairedDataset {
    storage: Arc<dyn StorageBackend>,
    domain_a: Dataset,
    domain_b: Dataset,
}

impl PairedDataset {
    /// `storage` must be rooted at the dataset directory, or the dataset paths
    /// must be absolute.
    pub fn new(storage: Arc<dyn StorageBackend>, domain_a: Dataset, domain_b: Dataset) -> Self {
        Self {
            storage,
            domain_a,
            domain_b,
        }
    }

    fn open_domain(&self, dataset: &Dataset, spec: &InputSpec) -> Result<DomainStream> {
        if spec.shard_index >= spec.shard_count {
            return Err(TrainError::config(format!(
                "shard index {} out of range for {} shards",
                spec.shard_index, spec.shard_count
            )));
        }

        let mut file = self.storage.open_read(&dataset.path)?;
        let shards = calculate_shards(file.as_mut(), spec.shard_count, dataset.format.as_ref())?;
        let shard = shards
            .into_iter()
            .nth(spec.shard_index as usize)
            .ok_or_else(|| TrainError::config("shard index out of range"))?;

        if spec.is_training && shard.records == 0 {
            return Err(TrainError::dataset(
                &dataset.name,
                format!(
                    "domain '{}' has no records for shard {}/{}",
                    dataset.domain, spec.shard_index, spec.shard_count
                ),
            ));
        }

        tracing::debug!(
            dataset = %dataset.name,
            domain = %dataset.domain,
            shard = shard.shard_id,
            records = shard.records,
            "Opened domain shard"
        );

        Ok(DomainStream {
            reader: ShardReader::new(
                Arc::clone(&self.storage),
                dataset.path.clone(),
                shard,
                Arc::clone(&dataset.format),
            ),
            repeat: spec.is_training,
        })
    }
}

impl InputSource for PairedDataset {
    fn open(&self, spec: &InputSpec) -> Result<Box<dyn InputPipeline>> {
        if spec.batch_size == 0 {
            return Err(TrainError::config("batch size must be greater than 0"));
        }

        Ok(Box::new(PairedPipeline {
            a: self.open_domain(&self.domain_a, spec)?,
            b: self.open_domain(&self.domain_b, spec)?,
            batch_size: spec.batch_size,
        }))
    }
}

struct DomainStream {
    reader: ShardReader,
    repeat: bool,
}

impl DomainStream {
    fn next_image(&mut self) -> Result<Option<Vec<f32>>> {
        if let Some(record) = self.reader.next_record()? {
            return Ok(Some(decode_pixels(&record)));
        }
        if !self.repeat {
            return Ok(None);
        }

        self.reader.rewind();
        Ok(self.reader.next_record()?.map(|record| decode_pixels(&record)))
    }
}

struct PairedPipeline {
    a: DomainStream,
    b: DomainStream,
    batch_size: usize,
}

impl InputPipeline for PairedPipeline {
    fn next_batch(&mut self) -> Result<Fetch<PairedBatch>> {
        let mut batch = PairedBatch::default();

        while batch.len() < self.batch_size {
            let (Some(a), Some(b)) = (self.a.next_image()?, self.b.next_image()?) else {
                break;
            };
            batch.domain_a.push(a);
            batch.domain_b.push(b);
        }

        if batch.is_empty() {
            Ok(Fetch::Exhausted)
        } else {
            Ok(Fetch::Item(batch))
        }
    }
}

fn decode_pixels(record: &[u8]) -> Vec<f32> {
    record.iter().map(|&p| f32::from(p) / 127.5 - 1.0).collect()
}
