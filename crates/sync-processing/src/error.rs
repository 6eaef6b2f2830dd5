use connectors::error::{FeedError, StoreError};
use sync_core::error::{QueueError, StateError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Feed object could not be fetched: {0}")]
    Store(#[from] StoreError),

    #[error("Feed body could not be parsed: {0}")]
    Feed(#[from] FeedError),

    #[error("Checkpoint store failed during ingest: {0}")]
    State(#[from] StateError),

    #[error("Job queue rejected a batch: {0}")]
    Queue(#[from] QueueError),

    #[error("Aborting ingest of '{feed_key}' after {consecutive} consecutive row errors")]
    TooManyRowErrors { feed_key: String, consecutive: u32 },
}

/// Reconciliation gives a row outcome for everything except interruption;
/// a cancelled row must not be counted as a row failure.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Reconciliation cancelled")]
    Cancelled,
}
