// gan-core/src/checkpoint/format.rs

//! Checkpoint file layout.
//!
//! ```text
//! +------------------------+
//! | Header Length (4 bytes)|  <- u32 little-endian
//! +------------------------+
//! | Header (bincode)       |  <- CheckpointHeader
//! +------------------------+
//! | Compressed Payload     |  <- serialized variables
//! +------------------------+
//! ```

use serde::{Deserialize, Serialize};

/// Header stored in front of every checkpoint payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointHeader {
    /// Magic bytes identifying the file ("GANC")
    pub magic: [u8; 4],
    /// Format version number
    pub version: u32,
    /// Global step the snapshot was taken at
    pub global_step: u64,
    /// Compression algorithm used ("none", "lz4", or "zstd")
    pub compression: String,
    /// Size of the payload before compression
    pub uncompressed_size: u64,
    /// XXHash64 checksum of the uncompressed payload
    pub checksum: u64,
    /// Milliseconds since the Unix epoch when the file was written
    pub created_at_ms: u64,
}

impl CheckpointHeader {
    pub const MAGIC: [u8; 4] = *b"GANC";

    pub const VERSION: u32 = 1;

    pub fn new(
        global_step: u64,
        compression: String,
        uncompressed_size: u64,
        checksum: u64,
        created_at_ms: u64,
    ) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            global_step,
            compression,
            uncompressed_size,
            checksum,
            created_at_ms,
        }
    }

    pub fn validate_magic(&self) -> bool {
        self.magic == Self::MAGIC
    }

    pub fn validate_version(&self) -> bool {
        self.version == Self::VERSION
    }
}

/// XXHash64 (seed 0) of a payload.
pub(crate) fn checksum(data: &[u8]) -> u64 {
    use std::hash::Hasher;
    let mut hasher = twox_hash::XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}
