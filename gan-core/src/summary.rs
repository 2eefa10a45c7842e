// gan-core/src/summary.rs

//! Append-only summary logs.
//!
//! Each record is one JSON object per line in `<dir>/events.jsonl`:
//!
//! ```text
//! {"step":1200,"wall_time":1718000000.25,"values":{"loss/total":0.031}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, TrainError};
use crate::model::Summary;

/// File name of the summary log inside its directory.
pub const EVENTS_FILE: &str = "events.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub step: u64,
    /// Seconds since the Unix epoch.
    pub wall_time: f64,
    pub values: Summary,
}

/// Appends summary records to `<dir>/events.jsonl`.
pub struct SummaryWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SummaryWriter {
    /// Opens (or creates) the log in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            TrainError::storage_with_source(dir, "failed to create summary directory", e)
        })?;

        let path = dir.join(EVENTS_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TrainError::storage_with_source(&path, "failed to open summary log", e))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffers one record tagged with `step`. Call [`flush`](Self::flush) to
    /// make it durable.
    ///
    /// NaN and infinite scalars are dropped from the record, since JSON has
    /// no encoding for them.
    pub fn write(&mut self, step: u64, values: &Summary) -> Result<()> {
        let finite: Summary = values
            .iter()
            .filter(|(tag, value)| {
                let keep = value.is_finite();
                if !keep {
                    tracing::warn!(step, tag, value, "Dropping non-finite summary value");
                }
                keep
            })
            .map(|(tag, value)| (tag.to_string(), value))
            .collect();
        let record = SummaryRecord {
            step,
            wall_time: wall_time(),
            values: finite,
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| TrainError::serialization(format!("failed to encode summary: {e}")))?;

        writeln!(self.writer, "{line}")
            .map_err(|e| TrainError::storage_with_source(&self.path, "failed to write summary", e))
    }

    /// Flushes buffered records and syncs them to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| TrainError::storage_with_source(&self.path, "failed to flush summaries", e))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| TrainError::storage_with_source(&self.path, "failed to sync summaries", e))
    }
}

/// Reads every record from `<dir>/events.jsonl`. A missing log reads as empty.
pub fn read_records(dir: impl AsRef<Path>) -> Result<Vec<SummaryRecord>> {
    let path = dir.as_ref().join(EVENTS_FILE);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(TrainError::storage_with_source(&path, "failed to open summary log", e))
        }
    };

    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line
            .map_err(|e| TrainError::storage_with_source(&path, "failed to read summary log", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| TrainError::serialization(format!("malformed summary record: {e}")))?;
        records.push(record);
    }
    Ok(records)
}

/// Running mean of every scalar tag seen.
#[derive(Debug, Clone, Default)]
pub struct SummaryAccumulator {
    totals: BTreeMap<String, (f64, u64)>,
}

impl SummaryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, summary: &Summary) {
        for (tag, value) in summary.iter() {
            let entry = self.totals.entry(tag.to_string()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    pub fn mean(&self) -> Summary {
        self.totals
            .iter()
            .map(|(tag, (sum, n))| (tag.clone(), sum / *n as f64))
            .collect()
    }
}

fn wall_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
