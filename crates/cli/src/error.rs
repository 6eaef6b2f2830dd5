use connectors::error::CatalogError;
use sync_core::error::{QueueError, StateError};
use sync_runtime::error::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint store error: {0}")]
    State(#[from] StateError),

    #[error("Job queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Catalog client error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Sync error: {0}")]
    Sync(SyncError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
