use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    rows_ingested: AtomicU64,
    batches_enqueued: AtomicU64,
    remote_calls: AtomicU64,
    retries: AtomicU64,
    updates_pushed: AtomicU64,
    row_failures: AtomicU64,
}

/// Process-wide counters, shared by handle. Per-feed accounting lives in the
/// checkpoint store; these exist for the progress trace and final summary.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub rows_ingested: u64,
    pub batches_enqueued: u64,
    pub remote_calls: u64,
    pub retries: u64,
    pub updates_pushed: u64,
    pub row_failures: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rows_ingested(&self, count: u64) {
        self.inner.rows_ingested.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_batches_enqueued(&self, count: u64) {
        self.inner
            .batches_enqueued
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_remote_calls(&self, count: u64) {
        self.inner.remote_calls.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_retries(&self, count: u64) {
        self.inner.retries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_updates_pushed(&self, count: u64) {
        self.inner
            .updates_pushed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_row_failures(&self, count: u64) {
        self.inner.row_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_ingested: self.inner.rows_ingested.load(Ordering::Relaxed),
            batches_enqueued: self.inner.batches_enqueued.load(Ordering::Relaxed),
            remote_calls: self.inner.remote_calls.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            updates_pushed: self.inner.updates_pushed.load(Ordering::Relaxed),
            row_failures: self.inner.row_failures.load(Ordering::Relaxed),
        }
    }
}
