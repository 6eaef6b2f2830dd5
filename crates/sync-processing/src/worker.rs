use crate::{
    error::ReconcileError, output::OutputFiles, reconcile::Reconciler,
    retry::classify_catalog_error,
};
use connectors::{catalog::CatalogApi, error::CatalogError};
use futures::StreamExt;
use model::{
    catalog::{BulkItemRef, UpdatePayload},
    counters::CounterKind,
    job::BatchJob,
    outcome::RowOutcome,
};
use std::{future::Future, pin::Pin, sync::Arc};
use sync_core::{
    metrics::Metrics,
    queue::JobError,
    retry::RetryPolicy,
    state::CheckpointStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Executes one batch job: reconcile every row, push the aggregated bulk
/// update, then settle counters and the checkpoint. A job either finishes
/// all three stages or goes back to the queue untouched.
pub struct BatchWorker {
    reconciler: Reconciler,
    catalog: Arc<dyn CatalogApi>,
    state: Arc<dyn CheckpointStore>,
    metrics: Metrics,
    output: Arc<OutputFiles>,
    retry: RetryPolicy,
    /// Fan-out bound for per-row reconciliation inside one job. Admission is
    /// still paced by the rate gate; this only caps queued futures.
    row_concurrency: usize,
    /// Pulled to request a pipeline-wide stop when the checkpoint store is
    /// gone; progress must never be guessed at.
    shutdown: CancellationToken,
}

impl BatchWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        state: Arc<dyn CheckpointStore>,
        metrics: Metrics,
        output: Arc<OutputFiles>,
        retry: RetryPolicy,
        row_concurrency: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(catalog.clone(), retry.clone(), metrics.clone()),
            catalog,
            state,
            metrics,
            output,
            retry,
            row_concurrency: row_concurrency.max(1),
            shutdown,
        }
    }

    pub async fn process_job(&self, cancel: &CancellationToken, job: BatchJob) -> Result<(), JobError> {
        if !job.is_well_formed() {
            warn!(job_id = %job.job_id, "discarding malformed job");
            return Err(JobError::Discard(format!(
                "malformed job '{}' ({} rows, last index {}, total {})",
                job.job_id,
                job.len(),
                job.last_row_index,
                job.total_rows_in_feed
            )));
        }

        // Rows reconcile concurrently but results come back in row order, so
        // the bulk payload list stays ordered.
        let mut row_futures: Vec<
            Pin<Box<dyn Future<Output = Result<RowOutcome, ReconcileError>> + Send + '_>>,
        > = Vec::with_capacity(job.len());
        for row in job.iter_rows() {
            row_futures.push(Box::pin(self.reconciler.reconcile_row(cancel, row)));
        }
        let outcomes: Vec<Result<RowOutcome, ReconcileError>> =
            futures::stream::iter(row_futures)
                .buffered(self.row_concurrency)
                .collect()
                .await;

        let mut settled = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(o) => settled.push(o),
                Err(ReconcileError::Cancelled) => {
                    return Err(JobError::Retry(format!(
                        "job '{}' interrupted by cancellation",
                        job.job_id
                    )));
                }
            }
        }
        let outcomes = settled;

        let payloads: Vec<(u64, UpdatePayload)> = outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, outcome)| match outcome {
                RowOutcome::Update(payload) => {
                    Some((job.first_row_index() + i as u64, payload.clone()))
                }
                _ => None,
            })
            .collect();

        if !payloads.is_empty() {
            self.push_bulk_update(cancel, &job, &payloads).await?;
        }

        self.settle_counters(&job, &outcomes).await?;
        self.commit_progress(&job).await?;
        Ok(())
    }

    async fn push_bulk_update(
        &self,
        cancel: &CancellationToken,
        job: &BatchJob,
        payloads: &[(u64, UpdatePayload)],
    ) -> Result<(), JobError> {
        let bodies: Vec<UpdatePayload> = payloads.iter().map(|(_, p)| p.clone()).collect();

        let result = self
            .retry
            .run(
                || self.catalog.bulk_update(cancel, &bodies),
                classify_catalog_error,
            )
            .await;

        match result {
            Ok(results) => {
                for entry in results.iter().filter(|r| r.error.is_some()) {
                    warn!(
                        job_id = %job.job_id,
                        remote_id = entry.id,
                        error = entry.error.as_deref().unwrap_or(""),
                        "catalog reported a per-product error inside an accepted bulk call"
                    );
                }

                self.metrics.add_updates_pushed(bodies.len() as u64);
                for (row_index, payload) in payloads {
                    self.output.append_update(
                        &job.feed_key,
                        *row_index,
                        payload.remote_id,
                        &payload.part_number,
                    );
                }
                info!(
                    job_id = %job.job_id,
                    feed = %job.feed_key,
                    updates = bodies.len(),
                    "bulk update accepted"
                );
                Ok(())
            }
            Err(err) => {
                let inner = err.into_inner();
                if matches!(inner, CatalogError::Cancelled) {
                    return Err(JobError::Retry(format!(
                        "job '{}' cancelled during bulk update",
                        job.job_id
                    )));
                }

                // Attribution for every payload in the failed call, then the
                // queue redelivers the whole job.
                let items: Vec<BulkItemRef> = bodies
                    .iter()
                    .map(|p| BulkItemRef {
                        part_number: p.part_number.clone(),
                        remote_id: p.remote_id,
                    })
                    .collect();
                self.output.append_error_text(
                    &format!("bulk update failed for job '{}'", job.job_id),
                    &format!("{inner}; payloads: {items:?}"),
                );
                self.metrics.add_retries(1);
                Err(JobError::Retry(format!(
                    "bulk update of {} products failed: {inner}",
                    bodies.len()
                )))
            }
        }
    }

    async fn settle_counters(
        &self,
        job: &BatchJob,
        outcomes: &[RowOutcome],
    ) -> Result<(), JobError> {
        let updated = outcomes
            .iter()
            .filter(|o| matches!(o, RowOutcome::Update(_)))
            .count() as u64;
        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, RowOutcome::NoChange))
            .count() as u64;
        let failed = outcomes.iter().filter(|o| o.is_failure()).count() as u64;

        for (row_offset, outcome) in outcomes.iter().enumerate() {
            let row_index = job.first_row_index() + row_offset as u64;
            match outcome {
                RowOutcome::MissingPart => self.output.append_error_text(
                    &format!("row {row_index} of '{}'", job.feed_key),
                    "row carries no part_number",
                ),
                RowOutcome::NotFound { part_number } => self.output.append_error_text(
                    &format!("row {row_index} of '{}'", job.feed_key),
                    &format!("part '{part_number}' not found in catalog"),
                ),
                RowOutcome::FetchFailed { part_number, reason } => self.output.append_error_text(
                    &format!("row {row_index} of '{}'", job.feed_key),
                    &format!("part '{part_number}': {reason}"),
                ),
                _ => {}
            }
        }

        self.metrics.add_row_failures(failed);
        self.bump(&job.feed_key, CounterKind::Updated, updated).await?;
        self.bump(&job.feed_key, CounterKind::Skipped, skipped).await?;
        self.bump(&job.feed_key, CounterKind::Failed, failed).await?;
        Ok(())
    }

    async fn commit_progress(&self, job: &BatchJob) -> Result<(), JobError> {
        let last = self
            .state
            .last_processed(&job.feed_key)
            .await
            .map_err(|e| self.state_failure("read checkpoint", &e))?;
        let new_last = (last + job.len() as u64).min(job.total_rows_in_feed);
        self.state
            .commit_batch(&job.feed_key, new_last, job.total_rows_in_feed)
            .await
            .map_err(|e| self.state_failure("commit checkpoint", &e))?;
        Ok(())
    }

    async fn bump(&self, feed_key: &str, kind: CounterKind, by: u64) -> Result<(), JobError> {
        if by == 0 {
            return Ok(());
        }
        self.state
            .increment_counter(feed_key, kind, by)
            .await
            .map_err(|e| self.state_failure("increment counter", &e))?;
        Ok(())
    }

    /// Checkpoint-store failures are infrastructure: log, ask the pipeline
    /// to stop, and keep the job queued so no progress is invented.
    fn state_failure(&self, action: &str, err: &sync_core::error::StateError) -> JobError {
        self.output.append_error(action, err);
        warn!(error = %err, "checkpoint store failure, requesting shutdown");
        self.shutdown.cancel();
        JobError::Retry(format!("{action} failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use model::catalog::{BulkUpdateResult, MetaEntry, RemoteProduct};
    use model::row::Header;
    use std::sync::Mutex;
    use std::time::Duration;
    use sync_core::state::store::DurableStateStore;
    use tempfile::tempdir;

    /// Catalog double where every part resolves to id 42 and the bulk call
    /// replays a scripted result sequence.
    struct ScriptedCatalog {
        remote_sku: String,
        bulk: Mutex<Vec<Result<Vec<BulkUpdateResult>, CatalogError>>>,
        bulk_calls: Mutex<u32>,
        bulk_sizes: Mutex<Vec<usize>>,
    }

    impl ScriptedCatalog {
        fn new(
            remote_sku: &str,
            bulk: Vec<Result<Vec<BulkUpdateResult>, CatalogError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                remote_sku: remote_sku.to_string(),
                bulk: Mutex::new(bulk),
                bulk_calls: Mutex::new(0),
                bulk_sizes: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CatalogApi for ScriptedCatalog {
        async fn lookup_id_by_part_number(
            &self,
            _cancel: &CancellationToken,
            _part_number: &str,
        ) -> Result<Option<u64>, CatalogError> {
            Ok(Some(42))
        }

        async fn fetch_by_id(
            &self,
            _cancel: &CancellationToken,
            remote_id: u64,
        ) -> Result<RemoteProduct, CatalogError> {
            Ok(RemoteProduct {
                id: remote_id,
                sku: self.remote_sku.clone(),
                description: String::new(),
                meta_data: model::catalog::META_COLUMNS
                    .iter()
                    .map(|(key, _)| MetaEntry::new(*key, ""))
                    .collect(),
            })
        }

        async fn bulk_update(
            &self,
            _cancel: &CancellationToken,
            payloads: &[UpdatePayload],
        ) -> Result<Vec<BulkUpdateResult>, CatalogError> {
            *self.bulk_calls.lock().unwrap() += 1;
            self.bulk_sizes.lock().unwrap().push(payloads.len());
            self.bulk.lock().unwrap().remove(0)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        state: Arc<DurableStateStore>,
        output: Arc<OutputFiles>,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        Fixture {
            state: Arc::new(DurableStateStore::open(dir.path().join("state")).unwrap()),
            output: Arc::new(OutputFiles::create(dir.path().join("output-files")).unwrap()),
            _dir: dir,
        }
    }

    fn worker(f: &Fixture, catalog: Arc<ScriptedCatalog>) -> BatchWorker {
        BatchWorker::new(
            catalog,
            f.state.clone(),
            Metrics::new(),
            f.output.clone(),
            RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(4)),
            4,
            CancellationToken::new(),
        )
    }

    fn job(rows: Vec<Vec<String>>, last: u64, total: u64) -> BatchJob {
        let header = Header::new(vec!["part_number".into(), "sku".into()]);
        BatchJob::new("feed.csv", header, rows, last, total)
    }

    fn ok_bulk(ids: &[u64]) -> Result<Vec<BulkUpdateResult>, CatalogError> {
        Ok(ids
            .iter()
            .map(|id| BulkUpdateResult {
                id: *id,
                error: None,
            })
            .collect())
    }

    fn status(code: u16) -> CatalogError {
        CatalogError::Status {
            status: code,
            context: "test".into(),
        }
    }

    #[tokio::test]
    async fn one_changed_row_updates_counters_and_checkpoint() {
        let f = fixture();
        f.state.set_total("feed.csv", 1).await.unwrap();
        let catalog = ScriptedCatalog::new("sku-old", vec![ok_bulk(&[42])]);
        let worker = worker(&f, catalog.clone());

        worker
            .process_job(
                &CancellationToken::new(),
                job(vec![vec!["X-1".into(), "sku-new".into()]], 1, 1),
            )
            .await
            .unwrap();

        let counters = f.state.counters("feed.csv").await.unwrap();
        assert_eq!((counters.updated, counters.skipped, counters.failed), (1, 0, 0));
        assert_eq!(f.state.last_processed("feed.csv").await.unwrap(), 1);
        assert_eq!(*catalog.bulk_calls.lock().unwrap(), 1);
        assert_eq!(*catalog.bulk_sizes.lock().unwrap(), vec![1]);

        let updates = std::fs::read_to_string(f.output.dir().join("updates-log.txt")).unwrap();
        assert!(updates.contains("feed=feed.csv row=1 id=42 part_number=X-1"));
    }

    #[tokio::test]
    async fn unchanged_rows_skip_the_bulk_call() {
        let f = fixture();
        f.state.set_total("feed.csv", 1).await.unwrap();
        let catalog = ScriptedCatalog::new("sku-new", vec![]);
        let worker = worker(&f, catalog.clone());

        worker
            .process_job(
                &CancellationToken::new(),
                job(vec![vec!["X-1".into(), "sku-new".into()]], 1, 1),
            )
            .await
            .unwrap();

        let counters = f.state.counters("feed.csv").await.unwrap();
        assert_eq!((counters.updated, counters.skipped, counters.failed), (0, 1, 0));
        assert_eq!(*catalog.bulk_calls.lock().unwrap(), 0);
        assert_eq!(f.state.last_processed("feed.csv").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_part_number_counts_failed_and_advances() {
        let f = fixture();
        f.state.set_total("feed.csv", 1).await.unwrap();
        let catalog = ScriptedCatalog::new("sku-old", vec![]);
        let worker = worker(&f, catalog);

        worker
            .process_job(
                &CancellationToken::new(),
                job(vec![vec!["".into(), "sku-new".into()]], 1, 1),
            )
            .await
            .unwrap();

        let counters = f.state.counters("feed.csv").await.unwrap();
        assert_eq!((counters.updated, counters.skipped, counters.failed), (0, 0, 1));
        assert_eq!(f.state.last_processed("feed.csv").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transient_bulk_failure_retries_into_one_update() {
        let f = fixture();
        f.state.set_total("feed.csv", 1).await.unwrap();
        let catalog = ScriptedCatalog::new("sku-old", vec![Err(status(504)), ok_bulk(&[42])]);
        let worker = worker(&f, catalog.clone());

        worker
            .process_job(
                &CancellationToken::new(),
                job(vec![vec!["X-1".into(), "sku-new".into()]], 1, 1),
            )
            .await
            .unwrap();

        assert_eq!(*catalog.bulk_calls.lock().unwrap(), 2);
        let counters = f.state.counters("feed.csv").await.unwrap();
        assert_eq!(counters.updated, 1);

        // Exactly one update line in spite of the retry.
        let updates = std::fs::read_to_string(f.output.dir().join("updates-log.txt")).unwrap();
        assert_eq!(updates.lines().count(), 1);
    }

    #[tokio::test]
    async fn permanent_bulk_failure_returns_the_job_to_the_queue() {
        let f = fixture();
        f.state.set_total("feed.csv", 2).await.unwrap();
        let catalog = ScriptedCatalog::new(
            "sku-old",
            (0..5).map(|_| Err(status(502))).collect(),
        );
        let worker = worker(&f, catalog.clone());

        let result = worker
            .process_job(
                &CancellationToken::new(),
                job(
                    vec![
                        vec!["X-1".into(), "sku-new".into()],
                        vec!["X-2".into(), "sku-new".into()],
                    ],
                    2,
                    2,
                ),
            )
            .await;

        assert!(matches!(result, Err(JobError::Retry(_))));
        assert_eq!(*catalog.bulk_calls.lock().unwrap(), 5);

        // Nothing was settled: the queue owns the job again.
        let counters = f.state.counters("feed.csv").await.unwrap();
        assert_eq!((counters.updated, counters.skipped, counters.failed), (0, 0, 0));
        assert_eq!(f.state.last_processed("feed.csv").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_jobs_are_discarded() {
        let f = fixture();
        let catalog = ScriptedCatalog::new("sku-old", vec![]);
        let worker = worker(&f, catalog);

        let result = worker
            .process_job(&CancellationToken::new(), job(Vec::new(), 0, 10))
            .await;

        assert!(matches!(result, Err(JobError::Discard(_))));
    }
}
