// gan-core/src/checkpoint/reader.rs

//! Checkpoint reader implementation.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, TrainError};
use crate::storage::StorageBackend;

use super::format::{checksum, CheckpointHeader};
use super::naming::CheckpointId;

/// A decoded, verified checkpoint.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub header: CheckpointHeader,
    pub data: Vec<u8>,
}

impl Checkpoint {
    pub fn global_step(&self) -> u64 {
        self.header.global_step
    }
}

/// Reads and verifies checkpoints.
pub struct CheckpointReader {
    storage: Arc<dyn StorageBackend>,
}

impl CheckpointReader {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Reads and decompresses a checkpoint, verifying its integrity.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The magic bytes or version are invalid
    /// - Decompression fails
    /// - The checksum or size doesn't match
    pub fn read(&self, id: &CheckpointId) -> Result<Checkpoint> {
        let bytes = self.read_file(id.path())?;
        let (header, body) = split_header(&bytes)?;

        let data = decompress(body, &header.compression)?;

        if data.len() as u64 != header.uncompressed_size {
            return Err(TrainError::checkpoint(format!(
                "size mismatch in {id}: expected {}, got {}",
                header.uncompressed_size,
                data.len()
            )));
        }
        let computed = checksum(&data);
        if computed != header.checksum {
            return Err(TrainError::checkpoint(format!(
                "checksum mismatch in {id}: expected {}, got {computed}",
                header.checksum
            )));
        }

        Ok(Checkpoint { header, data })
    }

    /// Reads only the header, e.g. to learn the global step of a checkpoint.
    pub fn read_header(&self, id: &CheckpointId) -> Result<CheckpointHeader> {
        let mut reader = self.storage.open_read(id.path())?;

        let mut len_bytes = [0u8; 4];
        reader
            .read_exact(&mut len_bytes)
            .map_err(|e| TrainError::checkpoint_with_source("failed to read header length", e))?;

        let mut header_bytes = vec![0u8; u32::from_le_bytes(len_bytes) as usize];
        reader
            .read_exact(&mut header_bytes)
            .map_err(|e| TrainError::checkpoint_with_source("failed to read header", e))?;

        decode_header(&header_bytes)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let mut reader = self.storage.open_read(path)?;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| TrainError::checkpoint_with_source("failed to read checkpoint file", e))?;
        Ok(bytes)
    }
}

fn split_header(bytes: &[u8]) -> Result<(CheckpointHeader, &[u8])> {
    let Some(len_bytes) = bytes.get(..4) else {
        return Err(TrainError::checkpoint("checkpoint file too small"));
    };
    let mut len = [0u8; 4];
    len.copy_from_slice(len_bytes);
    let header_end = 4 + u32::from_le_bytes(len) as usize;

    let header_bytes = bytes
        .get(4..header_end)
        .ok_or_else(|| TrainError::checkpoint("checkpoint file truncated: header incomplete"))?;

    Ok((decode_header(header_bytes)?, &bytes[header_end..]))
}

fn decode_header(bytes: &[u8]) -> Result<CheckpointHeader> {
    let header: CheckpointHeader = bincode::deserialize(bytes)
        .map_err(|e| TrainError::checkpoint_with_source("failed to deserialize header", e))?;

    if !header.validate_magic() {
        return Err(TrainError::checkpoint(format!(
            "invalid magic bytes: expected {:?}, got {:?}",
            CheckpointHeader::MAGIC,
            header.magic
        )));
    }
    if !header.validate_version() {
        return Err(TrainError::checkpoint(format!(
            "unsupported version: expected {}, got {}",
            CheckpointHeader::VERSION,
            header.version
        )));
    }

    Ok(header)
}

fn decompress(data: &[u8], compression: &str) -> Result<Vec<u8>> {
    match compression {
        "none" => Ok(data.to_vec()),
        "lz4" => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| TrainError::checkpoint_with_source("lz4 decompression failed", e)),
        "zstd" => zstd::decode_all(data)
            .map_err(|e| TrainError::checkpoint_with_source("zstd decompression failed", e)),
        other => Err(TrainError::checkpoint(format!(
            "unknown compression algorithm: {other}"
        ))),
    }
}
