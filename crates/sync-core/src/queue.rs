use crate::{error::QueueError, events::EventBus};
use model::{
    events::{JobEvent, JobState},
    job::BatchJob,
};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, future::Future, path::Path, sync::Arc, time::Duration};
use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Deliveries per job before it fails terminally.
    pub max_attempts: u32,
    /// First redelivery delay; doubles per attempt.
    pub initial_backoff: Duration,
    /// Upper bound on a single delivery.
    pub job_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(5),
            job_timeout: Duration::from_secs(180),
        }
    }
}

/// Verdict a job handler returns on failure.
#[derive(Debug)]
pub enum JobError {
    /// Redeliver after backoff, up to the attempt budget.
    Retry(String),
    /// Terminal without redelivery (malformed jobs).
    Discard(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    job: BatchJob,
    attempts: u32,
    state: RecordState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum RecordState {
    Waiting,
    Active,
    Failed,
}

/// Durable at-least-once queue of batch jobs, backed by sled. Job records
/// persist across restarts: `Waiting` and `Active` records found at open are
/// re-dispatched, `Failed` records are terminal. Duplicate enqueues of the
/// same job id are suppressed, so re-enqueuing a row range coalesces.
pub struct SledJobQueue {
    tree: sled::Tree,
    pending: Mutex<VecDeque<String>>,
    notify: Notify,
    bus: EventBus,
    config: QueueConfig,
}

impl SledJobQueue {
    pub fn open(
        path: impl AsRef<Path>,
        bus: EventBus,
        config: QueueConfig,
    ) -> Result<Arc<Self>, QueueError> {
        let db = sled::open(path)?;
        let tree = db.open_tree("jobs")?;

        // Crash recovery: anything not terminal goes back on the dispatch
        // list, with its attempt count preserved.
        let mut pending = VecDeque::new();
        for item in tree.iter() {
            let (key, value) = item?;
            let mut record: JobRecord = bincode::deserialize(&value)?;
            let job_id = String::from_utf8_lossy(&key).into_owned();
            match record.state {
                RecordState::Failed => {}
                RecordState::Active => {
                    record.state = RecordState::Waiting;
                    tree.insert(&key, bincode::serialize(&record)?)?;
                    pending.push_back(job_id);
                }
                RecordState::Waiting => pending.push_back(job_id),
            }
        }
        if !pending.is_empty() {
            info!(jobs = pending.len(), "recovered queued jobs from previous run");
        }

        Ok(Arc::new(Self {
            tree,
            pending: Mutex::new(pending),
            notify: Notify::new(),
            bus,
            config,
        }))
    }

    /// Enqueues a job unless one with the same id is already known (waiting,
    /// active or terminally failed). Returns whether the job was accepted.
    pub async fn enqueue(&self, job: &BatchJob) -> Result<bool, QueueError> {
        let record = JobRecord {
            job: job.clone(),
            attempts: 0,
            state: RecordState::Waiting,
        };
        let encoded = bincode::serialize(&record)?;
        let swap =
            self.tree
                .compare_and_swap(job.job_id.as_bytes(), None as Option<&[u8]>, Some(encoded))?;
        if swap.is_err() {
            debug!(job_id = %job.job_id, "duplicate enqueue suppressed");
            return Ok(false);
        }
        self.tree.flush_async().await?;

        self.push(job.job_id.clone()).await;
        self.publish(job, JobState::Waiting).await;
        Ok(true)
    }

    /// Spawns `concurrency` worker loops feeding deliveries to `handler`.
    /// The loops drain their in-flight job and exit once `cancel` fires.
    pub fn consume<F, Fut>(
        self: &Arc<Self>,
        concurrency: usize,
        cancel: CancellationToken,
        handler: F,
    ) -> Vec<JoinHandle<()>>
    where
        F: Fn(BatchJob) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        (0..concurrency.max(1))
            .map(|worker| {
                let queue = self.clone();
                let cancel = cancel.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    Self::worker_loop(queue, worker, cancel, handler).await;
                })
            })
            .collect()
    }

    async fn worker_loop<F, Fut>(
        queue: Arc<Self>,
        worker: usize,
        cancel: CancellationToken,
        handler: F,
    ) where
        F: Fn(BatchJob) -> Fut,
        Fut: Future<Output = Result<(), JobError>>,
    {
        loop {
            let job_id = tokio::select! {
                _ = cancel.cancelled() => break,
                id = queue.next_pending() => id,
            };

            let record = match queue.load(&job_id) {
                Ok(Some(record)) => record,
                // Completed or pruned in the meantime.
                Ok(None) => continue,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "failed to load job record");
                    continue;
                }
            };

            Self::deliver(&queue, &cancel, &job_id, record, &handler).await;
        }
        debug!(worker, "queue worker stopped");
    }

    async fn deliver<F, Fut>(
        queue: &Arc<Self>,
        cancel: &CancellationToken,
        job_id: &str,
        mut record: JobRecord,
        handler: &F,
    ) where
        F: Fn(BatchJob) -> Fut,
        Fut: Future<Output = Result<(), JobError>>,
    {
        record.state = RecordState::Active;
        if let Err(e) = queue.store(job_id, &record) {
            error!(job_id = %job_id, error = %e, "failed to mark job active");
            queue
                .publish(&record.job, JobState::Error { error: e.to_string() })
                .await;
            return;
        }
        queue.publish(&record.job, JobState::Active).await;

        match timeout(queue.config.job_timeout, handler(record.job.clone())).await {
            Ok(Ok(())) => {
                if let Err(e) = queue.remove(job_id) {
                    warn!(job_id = %job_id, error = %e, "completed job could not be removed");
                }
                queue.publish(&record.job, JobState::Completed).await;
            }
            Ok(Err(JobError::Discard(reason))) => {
                Self::fail_terminally(queue, job_id, record, reason).await;
            }
            Ok(Err(JobError::Retry(reason))) => {
                Self::retry_or_fail(queue, cancel, job_id, record, reason).await;
            }
            Err(_) => {
                let reason = format!(
                    "delivery timed out after {}s",
                    queue.config.job_timeout.as_secs()
                );
                Self::retry_or_fail(queue, cancel, job_id, record, reason).await;
            }
        }
    }

    async fn retry_or_fail(
        queue: &Arc<Self>,
        cancel: &CancellationToken,
        job_id: &str,
        mut record: JobRecord,
        reason: String,
    ) {
        record.attempts += 1;
        if record.attempts >= queue.config.max_attempts {
            Self::fail_terminally(queue, job_id, record, reason).await;
            return;
        }

        record.state = RecordState::Waiting;
        if let Err(e) = queue.store(job_id, &record) {
            error!(job_id = %job_id, error = %e, "failed to persist retry state");
            return;
        }

        let delay = backoff_delay(queue.config.initial_backoff, record.attempts);
        warn!(
            job_id = %job_id,
            attempt = record.attempts,
            delay_ms = delay.as_millis() as u64,
            error = %reason,
            "job failed, scheduling redelivery"
        );
        queue.publish(&record.job, JobState::Waiting).await;

        let queue = queue.clone();
        let cancel = cancel.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(delay) => queue.push(job_id).await,
                // On shutdown the record stays Waiting in sled and is
                // recovered at the next open.
                _ = cancel.cancelled() => {}
            }
        });
    }

    async fn fail_terminally(queue: &Arc<Self>, job_id: &str, mut record: JobRecord, reason: String) {
        record.state = RecordState::Failed;
        if let Err(e) = queue.store(job_id, &record) {
            error!(job_id = %job_id, error = %e, "failed to persist terminal failure");
        }
        error!(
            job_id = %job_id,
            feed = %record.job.feed_key,
            rows = record.job.len(),
            attempts = record.attempts,
            error = %reason,
            "job failed terminally"
        );
        queue
            .publish(
                &record.job,
                JobState::Failed {
                    attempts: record.attempts,
                    error: reason,
                },
            )
            .await;
    }

    async fn next_pending(&self) -> String {
        loop {
            if let Some(id) = self.pending.lock().await.pop_front() {
                return id;
            }
            self.notify.notified().await;
        }
    }

    async fn push(&self, job_id: String) {
        self.pending.lock().await.push_back(job_id);
        self.notify.notify_one();
    }

    fn load(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError> {
        match self.tree.get(job_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn store(&self, job_id: &str, record: &JobRecord) -> Result<(), QueueError> {
        self.tree
            .insert(job_id.as_bytes(), bincode::serialize(record)?)?;
        Ok(())
    }

    fn remove(&self, job_id: &str) -> Result<(), QueueError> {
        self.tree.remove(job_id.as_bytes())?;
        Ok(())
    }

    async fn publish(&self, job: &BatchJob, state: JobState) {
        self.bus
            .publish(JobEvent {
                job_id: job.job_id.clone(),
                feed_key: job.feed_key.clone(),
                rows: job.len() as u64,
                state,
            })
            .await;
    }
}

fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(6);
    initial.saturating_mul(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::row::Header;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn test_job(feed: &str, last: u64) -> BatchJob {
        let header = Header::new(vec!["part_number".into()]);
        BatchJob::new(feed, header, vec![vec!["P-1".into()]], last, 100)
    }

    fn test_config() -> QueueConfig {
        QueueConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
            job_timeout: Duration::from_secs(2),
        }
    }

    async fn wait_for_state(
        rx: &mut tokio::sync::mpsc::Receiver<Arc<JobEvent>>,
        want: fn(&JobState) -> bool,
    ) -> Arc<JobEvent> {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.expect("event stream ended");
                if want(&event.state) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for job event")
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_suppressed() {
        let dir = tempdir().unwrap();
        let bus = EventBus::new();
        let queue = SledJobQueue::open(dir.path(), bus.clone(), test_config()).unwrap();

        let job = test_job("feed.csv", 1);
        assert!(queue.enqueue(&job).await.unwrap());
        assert!(!queue.enqueue(&job).await.unwrap());

        let mut events = bus.subscribe::<JobEvent>(16).await;
        let deliveries = Arc::new(AtomicUsize::new(0));
        let counted = deliveries.clone();
        let cancel = CancellationToken::new();
        let handles = queue.consume(2, cancel.clone(), move |_job| {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok::<(), JobError>(())
            }
        });

        wait_for_state(&mut events, |s| matches!(s, JobState::Completed)).await;
        cancel.cancel();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_redelivered_then_succeeds() {
        let dir = tempdir().unwrap();
        let bus = EventBus::new();
        let queue = SledJobQueue::open(dir.path(), bus.clone(), test_config()).unwrap();
        let mut events = bus.subscribe::<JobEvent>(32).await;

        queue.enqueue(&test_job("feed.csv", 1)).await.unwrap();

        let deliveries = Arc::new(AtomicUsize::new(0));
        let counted = deliveries.clone();
        let cancel = CancellationToken::new();
        let handles = queue.consume(1, cancel.clone(), move |_job| {
            let counted = counted.clone();
            async move {
                if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(JobError::Retry("503 from remote".into()))
                } else {
                    Ok(())
                }
            }
        });

        wait_for_state(&mut events, |s| matches!(s, JobState::Completed)).await;
        cancel.cancel();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(deliveries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn attempts_exhaust_into_terminal_failure() {
        let dir = tempdir().unwrap();
        let bus = EventBus::new();
        let queue = SledJobQueue::open(dir.path(), bus.clone(), test_config()).unwrap();
        let mut events = bus.subscribe::<JobEvent>(64).await;

        queue.enqueue(&test_job("feed.csv", 1)).await.unwrap();

        let deliveries = Arc::new(AtomicUsize::new(0));
        let counted = deliveries.clone();
        let cancel = CancellationToken::new();
        let handles = queue.consume(1, cancel.clone(), move |_job| {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(JobError::Retry("permanent 502".into()))
            }
        });

        let failed = wait_for_state(&mut events, |s| matches!(s, JobState::Failed { .. })).await;
        cancel.cancel();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(deliveries.load(Ordering::SeqCst), 3);
        match &failed.state {
            JobState::Failed { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn discard_fails_without_redelivery() {
        let dir = tempdir().unwrap();
        let bus = EventBus::new();
        let queue = SledJobQueue::open(dir.path(), bus.clone(), test_config()).unwrap();
        let mut events = bus.subscribe::<JobEvent>(16).await;

        queue.enqueue(&test_job("feed.csv", 1)).await.unwrap();

        let deliveries = Arc::new(AtomicUsize::new(0));
        let counted = deliveries.clone();
        let cancel = CancellationToken::new();
        let handles = queue.consume(1, cancel.clone(), move |_job| {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(JobError::Discard("malformed job".into()))
            }
        });

        wait_for_state(&mut events, |s| matches!(s, JobState::Failed { .. })).await;
        cancel.cancel();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiting_jobs_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let bus = EventBus::new();
            let queue = SledJobQueue::open(dir.path(), bus, test_config()).unwrap();
            queue.enqueue(&test_job("feed.csv", 7)).await.unwrap();
            // Dropped without being consumed, as in a crash.
        }

        let bus = EventBus::new();
        let queue = SledJobQueue::open(dir.path(), bus.clone(), test_config()).unwrap();
        let mut events = bus.subscribe::<JobEvent>(16).await;

        let cancel = CancellationToken::new();
        let handles = queue.consume(1, cancel.clone(), move |job| async move {
            assert_eq!(job.job_id, "feed.csv_7");
            Ok::<(), JobError>(())
        });

        wait_for_state(&mut events, |s| matches!(s, JobState::Completed)).await;
        cancel.cancel();
        for h in handles {
            h.await.unwrap();
        }
    }
}
