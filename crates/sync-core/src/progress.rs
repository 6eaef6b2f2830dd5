use crate::state::models::FeedProgress;
use chrono::{DateTime, Utc};
use model::counters::FeedCounters;
use serde::Serialize;
use std::fmt;

/// Snapshot of per-feed and overall progress, rendered for the info trace
/// and the overwritten progress file.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub generated_at: DateTime<Utc>,
    pub feeds: Vec<FeedProgress>,
}

impl ProgressReport {
    pub fn new(feeds: Vec<FeedProgress>) -> Self {
        Self {
            generated_at: Utc::now(),
            feeds,
        }
    }

    pub fn overall(&self) -> FeedCounters {
        let mut overall = FeedCounters::default();
        for feed in &self.feeds {
            overall.updated += feed.counters.updated;
            overall.skipped += feed.counters.skipped;
            overall.failed += feed.counters.failed;
            overall.total += feed.counters.total;
        }
        overall
    }

    /// True once every known feed has accounted for all of its rows.
    pub fn is_complete(&self) -> bool {
        !self.feeds.is_empty() && self.feeds.iter().all(FeedProgress::is_complete)
    }
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "catalog sync progress @ {}",
            self.generated_at.to_rfc3339()
        )?;
        for feed in &self.feeds {
            let c = feed.counters;
            writeln!(
                f,
                "  {}: {}/{} rows (updated={} skipped={} failed={}) last_row={}",
                feed.feed_key,
                c.processed(),
                c.total,
                c.updated,
                c.skipped,
                c.failed,
                feed.checkpoint.last_processed_row,
            )?;
        }
        let overall = self.overall();
        write!(
            f,
            "  overall: {}/{} rows (updated={} skipped={} failed={})",
            overall.processed(),
            overall.total,
            overall.updated,
            overall.skipped,
            overall.failed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::models::Checkpoint;

    fn feed(key: &str, updated: u64, skipped: u64, failed: u64, total: u64) -> FeedProgress {
        FeedProgress {
            feed_key: key.to_string(),
            checkpoint: Checkpoint {
                last_processed_row: updated + skipped + failed,
                total_rows: total,
                timestamp: Utc::now(),
            },
            counters: FeedCounters {
                updated,
                skipped,
                failed,
                total,
            },
        }
    }

    #[test]
    fn overall_sums_per_feed_counters() {
        let report = ProgressReport::new(vec![feed("a.csv", 1, 2, 3, 10), feed("b.csv", 4, 0, 0, 4)]);
        let overall = report.overall();
        assert_eq!(overall.updated, 5);
        assert_eq!(overall.skipped, 2);
        assert_eq!(overall.failed, 3);
        assert_eq!(overall.total, 14);
    }

    #[test]
    fn completion_requires_every_feed() {
        let incomplete =
            ProgressReport::new(vec![feed("a.csv", 5, 5, 0, 10), feed("b.csv", 1, 0, 0, 4)]);
        assert!(!incomplete.is_complete());

        let complete =
            ProgressReport::new(vec![feed("a.csv", 5, 5, 0, 10), feed("b.csv", 4, 0, 0, 4)]);
        assert!(complete.is_complete());

        assert!(!ProgressReport::new(Vec::new()).is_complete());
    }

    #[test]
    fn render_mentions_each_feed_and_overall() {
        let report = ProgressReport::new(vec![feed("a.csv", 1, 0, 0, 2)]);
        let text = report.to_string();
        assert!(text.contains("a.csv: 1/2 rows"));
        assert!(text.contains("overall: 1/2 rows"));
    }
}
