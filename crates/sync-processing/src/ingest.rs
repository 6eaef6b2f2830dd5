use crate::{breaker::FailureBudget, error::IngestError};
use connectors::{
    feed::{CsvFeed, count_rows},
    store::ObjectStore,
};
use model::{feed::FeedObject, job::BatchJob, row::Header};
use std::sync::Arc;
use sync_core::{metrics::Metrics, queue::SledJobQueue, state::CheckpointStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How many consecutive unreadable rows abort a feed's ingest.
const ROW_ERROR_BUDGET: u32 = 3;

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub feed_key: String,
    pub total_rows: u64,
    pub batches_enqueued: usize,
}

/// Streams one CSV object into batch jobs. The body is fetched once; the
/// first pass records the feed's row count, the second cuts fixed-size
/// batches and enqueues them.
pub struct FeedIngestor {
    store: Arc<dyn ObjectStore>,
    queue: Arc<SledJobQueue>,
    state: Arc<dyn CheckpointStore>,
    metrics: Metrics,
    batch_size: usize,
}

impl FeedIngestor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        queue: Arc<SledJobQueue>,
        state: Arc<dyn CheckpointStore>,
        metrics: Metrics,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            queue,
            state,
            metrics,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(
        &self,
        cancel: &CancellationToken,
        object: &FeedObject,
    ) -> Result<IngestSummary, IngestError> {
        let feed_key = object.feed_key();
        info!(feed = %feed_key, key = %object.key, "ingesting feed");

        let body = self.store.fetch(&object.bucket, &object.key).await?;

        // Totals land before any job so the completion detector and the
        // progress report see the feed immediately.
        let total = count_rows(&body);
        self.state.set_total(&feed_key, total).await?;
        self.metrics.add_rows_ingested(total);

        let resume_from = self.state.last_processed(&feed_key).await?;
        if resume_from > 0 {
            info!(feed = %feed_key, resume_from, "resuming feed past its checkpoint");
        }

        let (header, records) = CsvFeed::open(&body)?.into_rows();

        let mut budget = FailureBudget::new(ROW_ERROR_BUDGET);
        let mut batch: Vec<Vec<String>> = Vec::with_capacity(self.batch_size);
        let mut row_index: u64 = 0;
        let mut batches_enqueued = 0usize;

        for record in records {
            if cancel.is_cancelled() {
                info!(feed = %feed_key, "ingest interrupted by shutdown");
                return Ok(IngestSummary {
                    feed_key,
                    total_rows: total,
                    batches_enqueued,
                });
            }

            match record {
                Ok(cells) => {
                    budget.record_success();
                    row_index += 1;
                    batch.push(cells);
                    if batch.len() == self.batch_size
                        && self
                            .flush(&feed_key, &header, &mut batch, row_index, total, resume_from)
                            .await?
                    {
                        batches_enqueued += 1;
                    }
                }
                Err(e) => {
                    warn!(feed = %feed_key, error = %e, "unreadable feed row");
                    if budget.record_failure() {
                        return Err(IngestError::TooManyRowErrors {
                            feed_key,
                            consecutive: budget.consecutive(),
                        });
                    }
                }
            }
        }

        if !batch.is_empty()
            && self
                .flush(&feed_key, &header, &mut batch, row_index, total, resume_from)
                .await?
        {
            batches_enqueued += 1;
        }

        info!(
            feed = %feed_key,
            rows = row_index,
            batches = batches_enqueued,
            "feed ingest finished"
        );
        Ok(IngestSummary {
            feed_key,
            total_rows: total,
            batches_enqueued,
        })
    }

    /// Enqueues the accumulated batch. Batches already covered by the
    /// checkpoint are dropped; the queue's id coalescing handles the rest.
    async fn flush(
        &self,
        feed_key: &str,
        header: &Header,
        batch: &mut Vec<Vec<String>>,
        last_row_index: u64,
        total: u64,
        resume_from: u64,
    ) -> Result<bool, IngestError> {
        let rows = std::mem::take(batch);

        if last_row_index <= resume_from {
            debug!(feed = %feed_key, last_row_index, "batch already checkpointed, skipping");
            return Ok(false);
        }

        let job = BatchJob::new(feed_key, header.clone(), rows, last_row_index, total);
        let accepted = self.queue.enqueue(&job).await?;
        if accepted {
            self.metrics.add_batches_enqueued(1);
        }
        Ok(accepted)
    }
}
