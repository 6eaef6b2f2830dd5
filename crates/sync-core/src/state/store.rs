use crate::error::StateError;
use crate::state::{
    CheckpointStore,
    models::{Checkpoint, FeedProgress},
};
use async_trait::async_trait;
use chrono::Utc;
use model::counters::{CounterKind, FeedCounters};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokio::sync::Mutex;

const CHECKPOINT_FILE: &str = "process_checkpoint.json";

/// Checkpoint store backed by a sled tree for hot counters and a single
/// JSON file for the durable checkpoint map. The JSON file is rewritten
/// atomically (write temp, rename); all checkpoint writes funnel through
/// one mutex so the file has a single writer.
pub struct DurableStateStore {
    counter_tree: sled::Tree,
    checkpoint_path: PathBuf,
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl DurableStateStore {
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self, StateError> {
        let state_dir = state_dir.as_ref();
        std::fs::create_dir_all(state_dir)?;

        let db = sled::open(state_dir.join("kv"))?;
        let counter_tree = db.open_tree("counters")?;

        let checkpoint_path = state_dir.join(CHECKPOINT_FILE);
        let checkpoints = if checkpoint_path.exists() {
            let body = std::fs::read_to_string(&checkpoint_path)?;
            serde_json::from_str(&body)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            counter_tree,
            checkpoint_path,
            checkpoints: Mutex::new(checkpoints),
        })
    }

    /// Rewrites the checkpoint file from the in-memory map. Callers hold the
    /// checkpoint mutex, so the temp file name cannot race with itself.
    async fn persist(&self, map: &HashMap<String, Checkpoint>) -> Result<(), StateError> {
        let body = serde_json::to_string_pretty(map)?;
        let tmp = self.checkpoint_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.checkpoint_path).await?;
        Ok(())
    }

    fn counter_key(feed_key: &str, kind: CounterKind) -> String {
        format!("cnt:{feed_key}:{kind}")
    }

    fn read_counter(&self, feed_key: &str, kind: CounterKind) -> Result<u64, StateError> {
        let key = Self::counter_key(feed_key, kind);
        match self.counter_tree.get(&key)? {
            Some(cell) => decode_counter(&key, &cell),
            None => Ok(0),
        }
    }
}

fn decode_counter(key: &str, cell: &[u8]) -> Result<u64, StateError> {
    let bytes: [u8; 8] = cell
        .try_into()
        .map_err(|_| StateError::CorruptCounter(key.to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}

#[async_trait]
impl CheckpointStore for DurableStateStore {
    async fn set_total(&self, feed_key: &str, total: u64) -> Result<(), StateError> {
        let mut map = self.checkpoints.lock().await;
        let entry = map
            .entry(feed_key.to_string())
            .or_insert_with(|| Checkpoint::empty(total));
        entry.total_rows = total;
        entry.timestamp = Utc::now();
        self.persist(&map).await?;

        self.counter_tree.insert(
            Self::counter_key(feed_key, CounterKind::Total),
            total.to_be_bytes().to_vec(),
        )?;
        Ok(())
    }

    async fn last_processed(&self, feed_key: &str) -> Result<u64, StateError> {
        let map = self.checkpoints.lock().await;
        Ok(map
            .get(feed_key)
            .map(|cp| cp.last_processed_row)
            .unwrap_or(0))
    }

    async fn commit_batch(
        &self,
        feed_key: &str,
        new_last: u64,
        total: u64,
    ) -> Result<(), StateError> {
        let mut map = self.checkpoints.lock().await;
        let entry = map
            .entry(feed_key.to_string())
            .or_insert_with(|| Checkpoint::empty(total));

        // Monotonic: a slower batch can never rewind a faster one.
        entry.last_processed_row = entry.last_processed_row.max(new_last.min(total));
        entry.total_rows = total;
        entry.timestamp = Utc::now();
        self.persist(&map).await
    }

    async fn increment_counter(
        &self,
        feed_key: &str,
        kind: CounterKind,
        by: u64,
    ) -> Result<u64, StateError> {
        let key = Self::counter_key(feed_key, kind);
        let cell = self.counter_tree.update_and_fetch(&key, |old| {
            let current = old
                .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                .map(u64::from_be_bytes)
                .unwrap_or(0);
            Some(current.saturating_add(by).to_be_bytes().to_vec())
        })?;

        match cell {
            Some(cell) => decode_counter(&key, &cell),
            None => Err(StateError::CorruptCounter(key)),
        }
    }

    async fn counters(&self, feed_key: &str) -> Result<FeedCounters, StateError> {
        Ok(FeedCounters {
            updated: self.read_counter(feed_key, CounterKind::Updated)?,
            skipped: self.read_counter(feed_key, CounterKind::Skipped)?,
            failed: self.read_counter(feed_key, CounterKind::Failed)?,
            total: self.read_counter(feed_key, CounterKind::Total)?,
        })
    }

    async fn read_all(&self) -> Result<Vec<FeedProgress>, StateError> {
        let map = self.checkpoints.lock().await;
        let mut feeds = Vec::with_capacity(map.len());
        for (feed_key, checkpoint) in map.iter() {
            feeds.push(FeedProgress {
                feed_key: feed_key.clone(),
                checkpoint: checkpoint.clone(),
                counters: self.counters(feed_key).await?,
            });
        }
        feeds.sort_by(|a, b| a.feed_key.cmp(&b.feed_key));
        Ok(feeds)
    }
}
