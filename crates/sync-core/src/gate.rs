use crate::retry::RetryPolicy;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Pacer = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Admission limits for outbound remote calls.
#[derive(Debug, Clone, Copy)]
pub struct RateGateConfig {
    /// Maximum calls in flight at once.
    pub max_concurrent: usize,
    /// Minimum interval between successive dispatches.
    pub min_spacing: Duration,
}

impl RateGateConfig {
    pub fn development() -> Self {
        Self {
            max_concurrent: 2,
            min_spacing: Duration::from_millis(500),
        }
    }

    pub fn production() -> Self {
        Self {
            max_concurrent: 5,
            min_spacing: Duration::from_millis(150),
        }
    }
}

#[derive(Error, Debug)]
pub enum GateError<E> {
    #[error("Task cancelled before completion")]
    Cancelled,

    #[error("Gated task failed: {0}")]
    Task(E),
}

/// Single admission point for the remote API: bounded concurrency plus
/// minimum spacing between dispatches. Created once at startup and injected
/// into every component that talks to the catalog. The gate also owns the
/// shared backoff policy, but never retries on its own.
pub struct RateGate {
    permits: Semaphore,
    pacer: Option<Pacer>,
    retry: RetryPolicy,
    config: RateGateConfig,
}

impl RateGate {
    pub fn new(config: RateGateConfig, retry: RetryPolicy) -> Self {
        let pacer = Quota::with_period(config.min_spacing).map(RateLimiter::direct);
        Self {
            permits: Semaphore::new(config.max_concurrent.max(1)),
            pacer,
            retry,
            config,
        }
    }

    pub fn config(&self) -> RateGateConfig {
        self.config
    }

    /// Backoff policy callers use when a gated task fails transiently.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Admits `task` once a concurrency slot and a spacing interval are both
    /// available, then runs it to completion. Cancellation while waiting
    /// discards the task; cancellation mid-flight aborts it.
    pub async fn schedule<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        id: &str,
        task: F,
    ) -> Result<T, GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _permit = tokio::select! {
            permit = self.permits.acquire() => {
                permit.map_err(|_| GateError::Cancelled)?
            }
            _ = cancel.cancelled() => return Err(GateError::Cancelled),
        };

        if let Some(pacer) = &self.pacer {
            tokio::select! {
                _ = pacer.until_ready() => {}
                _ = cancel.cancelled() => return Err(GateError::Cancelled),
            }
        }

        debug!(task = id, "admitted remote call");

        tokio::select! {
            out = task() => out.map_err(GateError::Task),
            _ = cancel.cancelled() => Err(GateError::Cancelled),
        }
    }
}
