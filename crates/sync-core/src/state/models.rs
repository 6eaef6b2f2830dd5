use chrono::{DateTime, Utc};
use model::counters::FeedCounters;
use serde::{Deserialize, Serialize};

/// Durable record of a feed's committed progress. Field names are part of
/// the persisted `process_checkpoint.json` contract.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    #[serde(rename = "lastProcessedRow")]
    pub last_processed_row: u64,
    #[serde(rename = "totalProductsInFile")]
    pub total_rows: u64,
    #[serde(rename = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn empty(total_rows: u64) -> Self {
        Self {
            last_processed_row: 0,
            total_rows,
            timestamp: Utc::now(),
        }
    }
}

/// One feed's checkpoint and counters, as read back for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedProgress {
    pub feed_key: String,
    pub checkpoint: Checkpoint,
    pub counters: FeedCounters,
}

impl FeedProgress {
    pub fn is_complete(&self) -> bool {
        self.counters.is_complete()
    }
}
