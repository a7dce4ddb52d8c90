use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::ExecutionError;
use crate::report::SinkError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("could not open query source {path}: {source}")]
    EngineOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("no engine_database set in [options]")]
    NoEngineDatabase,
    #[error("scheduler is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, Error>;
