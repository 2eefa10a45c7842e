// gan-core/src/dataset/format.rs

//! Record encodings for per-domain image files.

use std::fmt;
use std::io::{self, Read};

/// Describes how records are laid out in a file.
pub trait RecordFormat: Send + Sync + fmt::Debug {
    /// Reads the next record payload.
    ///
    /// Returns `Ok(None)` when the reader is at a clean record boundary with
    /// no bytes left. A partially present record is an `UnexpectedEof` error.
    fn read_record(&self, reader: &mut dyn Read) -> io::Result<Option<Vec<u8>>>;

    /// Number of bytes a record with `payload_len` bytes occupies on disk.
    fn encoded_len(&self, payload_len: usize) -> u64;

    /// Name of this record format
    fn name(&self) -> &'static str;
}

/// Fixed-size records, e.g. raw `H x W x C` pixel buffers.
#[derive(Debug, Clone)]
pub struct FixedSizeFormat {
    pub record_size: usize,
}

impl FixedSizeFormat {
    pub fn new(record_size: usize) -> Self {
        Self { record_size }
    }
}

impl RecordFormat for FixedSizeFormat {
    fn read_record(&self, reader: &mut dyn Read) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.record_size];
        match fill(reader, &mut buf)? {
            0 => Ok(None),
            n if n == self.record_size => Ok(Some(buf)),
            n => Err(truncated(n, self.record_size)),
        }
    }

    fn encoded_len(&self, _payload_len: usize) -> u64 {
        self.record_size as u64
    }

    fn name(&self) -> &'static str {
        "fixed-size"
    }
}

/// Length-prefixed records (4-byte big-endian length + data), e.g. encoded images.
#[derive(Debug, Clone, Default)]
pub struct LengthPrefixedFormat;

impl LengthPrefixedFormat {
    pub fn new() -> Self {
        Self
    }
}

impl RecordFormat for LengthPrefixedFormat {
    fn read_record(&self, reader: &mut dyn Read) -> io::Result<Option<Vec<u8>>> {
        let mut len = [0u8; 4];
        match fill(reader, &mut len)? {
            0 => return Ok(None),
            4 => {}
            n => return Err(truncated(n, 4)),
        }

        let expected = u32::from_be_bytes(len) as usize;
        let mut buf = vec![0u8; expected];
        let got = fill(reader, &mut buf)?;
        if got != expected {
            return Err(truncated(got, expected));
        }
        Ok(Some(buf))
    }

    fn encoded_len(&self, payload_len: usize) -> u64 {
        4 + payload_len as u64
    }

    fn name(&self) -> &'static str {
        "length-prefixed"
    }
}

/// Reads until `buf` is full or the reader hits EOF; returns bytes read.
fn fill(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn truncated(got: usize, expected: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("truncated record: got {got} of {expected} bytes"),
    )
}
