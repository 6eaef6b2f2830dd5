use std::fmt::Debug;

/// Marker for messages carried on the event bus.
pub trait Event: Send + Sync + Debug + 'static {
    fn event_type(&self) -> &'static str;
}

/// Queue delivery state of one batch job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for a worker slot (fresh enqueue or scheduled retry).
    Waiting,
    /// Handed to a worker.
    Active,
    /// Handler succeeded; the job record is gone.
    Completed,
    /// Attempts exhausted or the job was discarded; terminal.
    Failed { attempts: u32, error: String },
    /// Queue-internal error while handling the job.
    Error { error: String },
}

/// Published by the job queue on every state transition.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job_id: String,
    pub feed_key: String,
    /// Number of rows the job covers, for terminal-failure accounting.
    pub rows: u64,
    pub state: JobState,
}

impl Event for JobEvent {
    fn event_type(&self) -> &'static str {
        "queue.job"
    }
}
