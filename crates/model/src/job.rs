use crate::row::{Header, Row};
use serde::{Deserialize, Serialize};

/// Unit of work carried through the durable queue: a contiguous row range
/// of one feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: String,
    pub feed_key: String,
    pub header: Header,
    /// Cell data per row, in feed order.
    pub rows: Vec<Vec<String>>,
    /// 1-based index of the final row in this batch within the feed.
    pub last_row_index: u64,
    pub total_rows_in_feed: u64,
}

impl BatchJob {
    pub fn new(
        feed_key: impl Into<String>,
        header: Header,
        rows: Vec<Vec<String>>,
        last_row_index: u64,
        total_rows_in_feed: u64,
    ) -> Self {
        let feed_key = feed_key.into();
        Self {
            job_id: job_id_for(&feed_key, last_row_index),
            feed_key,
            header,
            rows,
            last_row_index,
            total_rows_in_feed,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 1-based index of the first row in this batch.
    pub fn first_row_index(&self) -> u64 {
        self.last_row_index + 1 - self.rows.len() as u64
    }

    pub fn row(&self, idx: usize) -> Row<'_> {
        Row::new(&self.header, &self.rows[idx])
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row::new(&self.header, cells))
    }

    /// A job is well-formed when it carries at least one row, a feed key,
    /// and a row range that fits inside the feed.
    pub fn is_well_formed(&self) -> bool {
        !self.rows.is_empty()
            && !self.feed_key.is_empty()
            && self.last_row_index >= self.rows.len() as u64
            && self.last_row_index <= self.total_rows_in_feed
    }
}

/// Deterministic job id: re-enqueuing the same row range of the same feed
/// coalesces in the queue.
pub fn job_id_for(feed_key: &str, last_row_index: u64) -> String {
    format!("{feed_key}_{last_row_index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(rows: usize, last: u64, total: u64) -> BatchJob {
        let header = Header::new(vec!["part_number".into()]);
        let cells = (0..rows).map(|i| vec![format!("P-{i}")]).collect();
        BatchJob::new("feed.csv", header, cells, last, total)
    }

    #[test]
    fn job_id_is_deterministic() {
        assert_eq!(job(5, 5, 100).job_id, job(5, 5, 100).job_id);
        assert_eq!(job_id_for("feed.csv", 50), "feed.csv_50");
    }

    #[test]
    fn row_range_arithmetic() {
        let j = job(10, 30, 100);
        assert_eq!(j.first_row_index(), 21);
        assert_eq!(j.len(), 10);
        assert!(j.is_well_formed());
    }

    #[test]
    fn malformed_jobs_detected() {
        assert!(!job(0, 0, 100).is_well_formed());
        assert!(!job(10, 5, 100).is_well_formed());
        assert!(!job(10, 200, 100).is_well_formed());
    }
}
