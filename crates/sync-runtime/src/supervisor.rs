use crate::{
    discovery::{ExecutionMode, is_csv_object, newest_feed_folder},
    error::SyncError,
};
use connectors::{catalog::CatalogApi, store::ObjectStore};
use model::{
    counters::CounterKind,
    events::{JobEvent, JobState},
    feed::FeedObject,
};
use std::{sync::Arc, time::Duration};
use sync_core::{
    events::EventBus,
    gate::RateGate,
    metrics::Metrics,
    progress::ProgressReport,
    queue::SledJobQueue,
    state::CheckpointStore,
};
use sync_processing::{ingest::FeedIngestor, output::OutputFiles, worker::BatchWorker};
use tokio::{task::JoinSet, time::interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub bucket: String,
    pub mode: ExecutionMode,
    pub batch_size: usize,
    /// Queue worker pool size.
    pub concurrency: usize,
    pub completion_interval: Duration,
    pub progress_interval: Duration,
}

impl SupervisorConfig {
    pub fn new(bucket: impl Into<String>, mode: ExecutionMode) -> Self {
        Self {
            bucket: bucket.into(),
            mode,
            batch_size: 25,
            concurrency: 2,
            completion_interval: Duration::from_secs(5),
            progress_interval: Duration::from_secs(15),
        }
    }
}

/// Everything the supervisor orchestrates, wired once at startup.
pub struct SupervisorParams {
    pub store: Arc<dyn ObjectStore>,
    pub catalog: Arc<dyn CatalogApi>,
    pub queue: Arc<SledJobQueue>,
    pub state: Arc<dyn CheckpointStore>,
    pub gate: Arc<RateGate>,
    pub bus: EventBus,
    pub metrics: Metrics,
    pub output: Arc<OutputFiles>,
    pub config: SupervisorConfig,
}

/// Pipeline lifecycle: select the newest feed folder, ingest every CSV in
/// it, run the worker pool, watch for completion, and drain gracefully on
/// completion or signal.
pub struct Supervisor {
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogApi>,
    queue: Arc<SledJobQueue>,
    state: Arc<dyn CheckpointStore>,
    gate: Arc<RateGate>,
    bus: EventBus,
    metrics: Metrics,
    output: Arc<OutputFiles>,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(params: SupervisorParams) -> Self {
        Self {
            store: params.store,
            catalog: params.catalog,
            queue: params.queue,
            state: params.state,
            gate: params.gate,
            bus: params.bus,
            metrics: params.metrics,
            output: params.output,
            config: params.config,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<ProgressReport, SyncError> {
        let feeds = self.discover_feeds().await?;
        info!(feeds = feeds.len(), "starting catalog sync");

        // Job-event accounting runs for the whole pipeline lifetime so a
        // burst of enqueues can never overflow the subscription and lose a
        // terminal failure. `drain` is signalled once the workers have
        // joined; the task then settles whatever is still buffered.
        let drain = CancellationToken::new();
        let event_task = {
            let mut events = self.bus.subscribe::<JobEvent>(256).await;
            let state = self.state.clone();
            let output = self.output.clone();
            let drain = drain.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        maybe = events.recv() => match maybe {
                            Some(event) => handle_job_event(&state, &output, &event).await,
                            None => break,
                        },
                        _ = drain.cancelled() => {
                            while let Ok(event) = events.try_recv() {
                                handle_job_event(&state, &output, &event).await;
                            }
                            break;
                        }
                    }
                }
            })
        };

        // Worker pool consuming the durable queue.
        let worker = Arc::new(BatchWorker::new(
            self.catalog.clone(),
            self.state.clone(),
            self.metrics.clone(),
            self.output.clone(),
            self.gate.retry_policy().clone(),
            self.gate.config().max_concurrent,
            cancel.clone(),
        ));
        let job_cancel = cancel.clone();
        let consumer_handles = self.queue.consume(self.config.concurrency, cancel.clone(), {
            let worker = worker.clone();
            move |job| {
                let worker = worker.clone();
                let cancel = job_cancel.clone();
                async move { worker.process_job(&cancel, job).await }
            }
        });

        // Periodic progress snapshots, independent of the completion scan.
        let progress_task = {
            let state = self.state.clone();
            let output = self.output.clone();
            let cancel = cancel.clone();
            let period = self.config.progress_interval;
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => match state.read_all().await {
                            Ok(feeds) => {
                                let report = ProgressReport::new(feeds);
                                output.write_progress(&report);
                                output.append_info(&format!("{report}"));
                                debug!("progress snapshot written");
                            }
                            Err(e) => warn!(error = %e, "progress snapshot failed"),
                        },
                    }
                }
            })
        };

        // One ingestor per CSV, all concurrent. A feed whose ingest aborts
        // is logged and dropped from the completion set; the others go on.
        let mut ingests = JoinSet::new();
        for feed in feeds {
            let ingestor = FeedIngestor::new(
                self.store.clone(),
                self.queue.clone(),
                self.state.clone(),
                self.metrics.clone(),
                self.config.batch_size,
            );
            let cancel = cancel.clone();
            let output = self.output.clone();
            ingests.spawn(async move {
                match ingestor.run(&cancel, &feed).await {
                    Ok(summary) => Some(summary.feed_key),
                    Err(e) => {
                        error!(key = %feed.key, error = %e, "feed ingest failed");
                        output.append_error(&format!("ingest of '{}' aborted", feed.key), &e);
                        None
                    }
                }
            });
        }

        let mut tracked: Vec<String> = Vec::new();
        while let Some(joined) = ingests.join_next().await {
            match joined {
                Ok(Some(feed_key)) => tracked.push(feed_key),
                Ok(None) => {}
                Err(e) => error!(error = %e, "ingest task panicked"),
            }
        }
        info!(tracked = tracked.len(), "ingestion finished, waiting for workers");

        // Completion scan until done or cancelled.
        let mut completed = tracked.is_empty();
        if !completed {
            let mut scan = interval(self.config.completion_interval);
            scan.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = scan.tick() => {
                        if self.completion_reached(&tracked).await? {
                            info!("every feed is fully accounted for");
                            completed = true;
                            break;
                        }
                    }
                }
            }
        }

        // Drain: stop accepting deliveries, let in-flight jobs finish,
        // settle the remaining events, flush the final snapshot.
        cancel.cancel();
        for handle in consumer_handles {
            if let Err(e) = handle.await {
                error!(error = %e, "queue worker task failed to join");
            }
        }
        drain.cancel();
        if let Err(e) = event_task.await {
            error!(error = %e, "event accounting task failed to join");
        }
        progress_task.abort();

        let report = ProgressReport::new(self.state.read_all().await?);
        self.output.write_progress(&report);
        self.output.append_info("final progress snapshot flushed");
        let overall = report.overall();
        info!(
            updated = overall.updated,
            skipped = overall.skipped,
            failed = overall.failed,
            total = overall.total,
            "catalog sync finished"
        );

        if completed {
            Ok(report)
        } else {
            Err(SyncError::ShutdownRequested)
        }
    }

    async fn discover_feeds(&self) -> Result<Vec<FeedObject>, SyncError> {
        let folders = self.store.list_folders(&self.config.bucket).await?;
        let Some(folder) = newest_feed_folder(&folders, self.config.mode) else {
            return Err(SyncError::NoFeedFolder {
                bucket: self.config.bucket.clone(),
            });
        };
        info!(folder = %folder, "selected newest feed folder");

        let objects = self.store.list_objects(&self.config.bucket, &folder).await?;
        let feeds: Vec<FeedObject> = objects
            .into_iter()
            .filter(|key| is_csv_object(key))
            .map(|key| FeedObject::new(&self.config.bucket, key))
            .collect();

        if feeds.is_empty() {
            return Err(SyncError::NoFeeds { folder });
        }
        Ok(feeds)
    }

    async fn completion_reached(&self, tracked: &[String]) -> Result<bool, SyncError> {
        let all = self.state.read_all().await?;
        Ok(tracked.iter().all(|feed_key| {
            all.iter()
                .find(|p| &p.feed_key == feed_key)
                .is_some_and(|p| p.is_complete())
        }))
    }
}

/// Settles one queue event: terminal failures charge the whole batch to the
/// feed's `failed` counter; everything else is trace-level noise.
async fn handle_job_event(
    state: &Arc<dyn CheckpointStore>,
    output: &Arc<OutputFiles>,
    event: &JobEvent,
) {
    match &event.state {
        JobState::Failed { attempts, error } => {
            output.append_error_text(
                &format!("job '{}' failed terminally", event.job_id),
                &format!("{error} (after {attempts} attempts, {} rows)", event.rows),
            );
            if let Err(e) = state
                .increment_counter(&event.feed_key, CounterKind::Failed, event.rows)
                .await
            {
                error!(
                    feed = %event.feed_key,
                    error = %e,
                    "failed to account a terminal job failure"
                );
            }
        }
        JobState::Error { error } => {
            output.append_error_text(&format!("queue error for job '{}'", event.job_id), error);
        }
        other => debug!(job_id = %event.job_id, state = ?other, "job state change"),
    }
}
