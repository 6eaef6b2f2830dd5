use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Checkpoint file operation failed: {0}")]
    CheckpointIo(#[from] std::io::Error),

    #[error("Checkpoint serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Counter store operation failed: {0}")]
    Store(#[from] sled::Error),

    #[error("Corrupt counter cell for '{0}'")]
    CorruptCounter(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue backend operation failed: {0}")]
    Backend(#[from] sled::Error),

    #[error("Job record encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}
