//! Result log output.
//!
//! Query results leave the process through a [`LogSink`], which has one
//! channel for differentials and one for snapshots. [`FilesystemLogger`] writes
//! each channel as JSON lines:
//! - `<dir>/vigil.results.log` for differentials
//! - `<dir>/vigil.snapshots.log` for snapshots
//!
//! This is separate from the `tracing` diagnostics, which never carry results.

pub mod json;
pub mod table;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use crate::query::QueryLogItem;

pub const RESULTS_LOG: &str = "vigil.results.log";
pub const SNAPSHOTS_LOG: &str = "vigil.snapshots.log";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("could not encode log record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("could not write log record: {0}")]
    Io(#[from] std::io::Error),
}

pub trait LogSink: Send + Sync {
    /// Differential channel.
    fn log_results(&self, item: &QueryLogItem) -> Result<(), SinkError>;
    /// Snapshot channel.
    fn log_snapshot(&self, item: &QueryLogItem) -> Result<(), SinkError>;
}

pub struct FilesystemLogger {
    dir: PathBuf,
    results: Mutex<File>,
    snapshots: Mutex<File>,
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl FilesystemLogger {
    /// Open (creating if needed) both log files under `dir`.
    pub fn open(dir: &Path) -> Result<Self, SinkError> {
        std::fs::create_dir_all(dir)?;
        Ok(FilesystemLogger {
            dir: dir.to_path_buf(),
            results: Mutex::new(open_append(&dir.join(RESULTS_LOG))?),
            snapshots: Mutex::new(open_append(&dir.join(SNAPSHOTS_LOG))?),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append(file: &Mutex<File>, item: &QueryLogItem) -> Result<(), SinkError> {
        let mut line = json::render(item)?;
        line.push('\n');
        let mut file = file.lock();
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl LogSink for FilesystemLogger {
    fn log_results(&self, item: &QueryLogItem) -> Result<(), SinkError> {
        Self::append(&self.results, item)
    }

    fn log_snapshot(&self, item: &QueryLogItem) -> Result<(), SinkError> {
        Self::append(&self.snapshots, item)
    }
}
