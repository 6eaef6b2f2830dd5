use serde::{Deserialize, Serialize};
use std::fmt;

/// Durable per-feed counters. All four are monotonically non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    Updated,
    Skipped,
    Failed,
    Total,
}

impl CounterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterKind::Updated => "updated",
            CounterKind::Skipped => "skipped",
            CounterKind::Failed => "failed",
            CounterKind::Total => "total",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCounters {
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    pub total: u64,
}

impl FeedCounters {
    pub fn processed(&self) -> u64 {
        self.updated + self.skipped + self.failed
    }

    /// A feed is complete once every row has been accounted for.
    pub fn is_complete(&self) -> bool {
        self.processed() >= self.total
    }
}
