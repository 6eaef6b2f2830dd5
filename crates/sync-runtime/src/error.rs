use connectors::error::StoreError;
use sync_core::error::{QueueError, StateError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Object store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("Checkpoint store operation failed: {0}")]
    State(#[from] StateError),

    #[error("Job queue operation failed: {0}")]
    Queue(#[from] QueueError),

    #[error("No feed folder matching the expected date pattern in bucket '{bucket}'")]
    NoFeedFolder { bucket: String },

    #[error("Feed folder '{folder}' contains no CSV objects")]
    NoFeeds { folder: String },

    #[error("Shutdown requested before all feeds completed; progress has been saved")]
    ShutdownRequested,
}
