// gan-core/src/dataset/reader.rs

use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, TrainError};
use crate::storage::{StorageBackend, StorageReader};

use super::format::RecordFormat;
use super::sharding::ShardSpec;

/// Reads the records of one shard in file order.
///
/// The underlying file is opened lazily on the first read and kept open
/// until the shard is exhausted or [`ShardReader::rewind`] is called.
pub struct ShardReader {
    storage: Arc<dyn StorageBackend>,
    path: PathBuf,
    shard: ShardSpec,
    format: Arc<dyn RecordFormat>,
    reader: Option<Box<dyn StorageReader>>,
    current_offset: u64,
}

impl ShardReader {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        path: PathBuf,
        shard: ShardSpec,
        format: Arc<dyn RecordFormat>,
    ) -> Self {
        Self {
            storage,
            path,
            current_offset: shard.byte_start,
            shard,
            format,
            reader: None,
        }
    }

    /// Reads the next record, or `Ok(None)` once the shard is exhausted.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        if self.current_offset >= self.shard.byte_end {
            return Ok(None);
        }

        if self.reader.is_none() {
            let mut reader = self.storage.open_read(&self.path)?;
            reader
                .seek(SeekFrom::Start(self.current_offset))
                .map_err(|e| TrainError::storage_with_source(&self.path, "failed to seek", e))?;
            self.reader = Some(reader);
        }

        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let remaining = self.shard.byte_end - self.current_offset;
        let mut bounded = Read::take(reader, remaining);

        match self
            .format
            .read_record(&mut bounded)
            .map_err(|e| TrainError::storage_with_source(&self.path, "failed to read record", e))?
        {
            Some(record) => {
                self.current_offset += self.format.encoded_len(record.len());
                Ok(Some(record))
            }
            None => {
                self.current_offset = self.shard.byte_end;
                self.reader = None;
                Ok(None)
            }
        }
    }

    /// Restarts the shard from its first record.
    pub fn rewind(&mut self) {
        self.current_offset = self.shard.byte_start;
        self.reader = None;
    }

    pub fn shard(&self) -> &ShardSpec {
        &self.shard
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_offset >= self.shard.byte_end
    }
}

impl Iterator for ShardReader {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::dataset::format::FixedSizeFormat;
    use crate::dataset::sharding::calculate_shards;
    use crate::storage::LocalStorage;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup(data: &[u8]) -> (Arc<dyn StorageBackend>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(&StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            buffer_size: 16,
        })
        .unwrap();
        let mut writer = storage.open_write(Path::new("a.rec")).unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
        (Arc::new(storage), temp_dir)
    }

    #[test]
    fn test_reads_only_its_shard() {
        let data: Vec<u8> = (0u8..12).collect();
        let (storage, _temp) = setup(&data);
        let format: Arc<dyn RecordFormat> = Arc::new(FixedSizeFormat::new(2));

        let mut file = storage.open_read(Path::new("a.rec")).unwrap();
        let shards = calculate_shards(file.as_mut(), 2, format.as_ref()).unwrap();

        let reader = ShardReader::new(storage, "a.rec".into(), shards[1].clone(), format);
        let records: Vec<Vec<u8>> = reader.map(|r| r.unwrap()).collect();

        assert_eq!(records, vec![vec![6, 7], vec![8, 9], vec![10, 11]]);
    }

    #[test]
    fn test_rewind_restarts_shard() {
        let (storage, _temp) = setup(&[1, 2, 3, 4]);
        let format: Arc<dyn RecordFormat> = Arc::new(FixedSizeFormat::new(2));
        let shard = ShardSpec {
            shard_id: 0,
            total_shards: 1,
            byte_start: 0,
            byte_end: 4,
            records: 2,
        };

        let mut reader = ShardReader::new(storage, "a.rec".into(), shard, format);
        assert_eq!(reader.next_record().unwrap(), Some(vec![1, 2]));
        assert_eq!(reader.next_record().unwrap(), Some(vec![3, 4]));
        assert_eq!(reader.next_record().unwrap(), None);
        assert!(reader.is_exhausted());

        reader.rewind();
        assert_eq!(reader.next_record().unwrap(), Some(vec![1, 2]));
    }

    #[test]
    fn test_missing_file_is_error() {
        let (storage, _temp) = setup(&[]);
        let shard = ShardSpec {
            shard_id: 0,
            total_shards: 1,
            byte_start: 0,
            byte_end: 8,
            records: 1,
        };
        let mut reader = ShardReader::new(
            storage,
            "missing.rec".into(),
            shard,
            Arc::new(FixedSizeFormat::new(8)),
        );
        assert!(reader.next_record().is_err());
    }
}
