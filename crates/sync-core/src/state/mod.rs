use crate::error::StateError;
use crate::state::models::FeedProgress;
use async_trait::async_trait;
use model::counters::{CounterKind, FeedCounters};

pub mod models;
pub mod store;

/// Persistent per-feed progress: the highest contiguously-acknowledged row
/// index plus the four durable counters. The source of truth for resumption.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Records the feed's row count, discovered by the ingestor's first pass.
    /// Creates the checkpoint entry so progress reporting sees the feed
    /// before any batch commits.
    async fn set_total(&self, feed_key: &str, total: u64) -> Result<(), StateError>;

    /// Highest committed row index for the feed; 0 when unknown.
    async fn last_processed(&self, feed_key: &str) -> Result<u64, StateError>;

    /// Advances the checkpoint after a batch has been fully acted on.
    /// Never moves the row index backwards.
    async fn commit_batch(&self, feed_key: &str, new_last: u64, total: u64)
    -> Result<(), StateError>;

    /// Atomically adds `by` to one counter and returns the new value.
    async fn increment_counter(
        &self,
        feed_key: &str,
        kind: CounterKind,
        by: u64,
    ) -> Result<u64, StateError>;

    async fn counters(&self, feed_key: &str) -> Result<FeedCounters, StateError>;

    /// Progress of every known feed, sorted by feed key.
    async fn read_all(&self) -> Result<Vec<FeedProgress>, StateError>;
}
