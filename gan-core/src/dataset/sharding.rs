// gan-core/src/dataset/sharding.rs

use std::io::{Seek, SeekFrom};

use crate::error::{Result, TrainError};
use crate::storage::StorageReader;

use super::format::RecordFormat;

/// A contiguous, record-aligned byte range of a record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSpec {
    pub shard_id: u32,
    pub total_shards: u32,
    pub byte_start: u64,
    pub byte_end: u64,
    pub records: u64,
}

impl ShardSpec {
    /// Returns the size of this shard in bytes
    pub fn size(&self) -> u64 {
        self.byte_end.saturating_sub(self.byte_start)
    }
}

/// Splits a record file into `total_shards` record-aligned shards.
///
/// Records are distributed as evenly as possible; when there are fewer
/// records than shards the trailing shards are empty, so every task index
/// still gets a (possibly empty) shard.
///
/// # Errors
///
/// Returns an error if reading fails or the file ends mid-record.
pub fn calculate_shards(
    reader: &mut dyn StorageReader,
    total_shards: u32,
    format: &dyn RecordFormat,
) -> Result<Vec<ShardSpec>> {
    if total_shards == 0 {
        return Err(TrainError::config("total_shards must be greater than 0"));
    }

    let boundaries = record_boundaries(reader, format)?;
    let records = boundaries.len() as u64 - 1;
    let shards = total_shards as u64;

    let shards = (0..shards)
        .map(|shard| {
            let first = shard * records / shards;
            let last = (shard + 1) * records / shards;
            ShardSpec {
                shard_id: shard as u32,
                total_shards,
                byte_start: boundaries[first as usize],
                byte_end: boundaries[last as usize],
                records: last - first,
            }
        })
        .collect();

    Ok(shards)
}

/// Byte offsets of every record start, followed by the end offset.
fn record_boundaries(reader: &mut dyn StorageReader, format: &dyn RecordFormat) -> Result<Vec<u64>> {
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| TrainError::storage_with_source("<dataset>", "failed to seek", e))?;

    let mut source = reader;
    let mut boundaries = vec![0u64];
    let mut offset = 0u64;
    while let Some(record) = format
        .read_record(&mut source)
        .map_err(|e| TrainError::storage_with_source("<dataset>", "failed to scan records", e))?
    {
        offset += format.encoded_len(record.len());
        boundaries.push(offset);
    }

    Ok(boundaries)
}
