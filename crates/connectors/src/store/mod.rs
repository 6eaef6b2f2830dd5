use crate::error::StoreError;
use async_trait::async_trait;

pub mod fs;

/// Narrow view of the object store holding feed folders. The concrete SDK
/// lives behind this seam; the pipeline only lists and fetches.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Top-level folder names in the bucket, without trailing separators.
    async fn list_folders(&self, bucket: &str) -> Result<Vec<String>, StoreError>;

    /// Object keys (`folder/name`) directly under `folder`.
    async fn list_objects(&self, bucket: &str, folder: &str) -> Result<Vec<String>, StoreError>;

    /// Full object body, which must be valid UTF-8.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<String, StoreError>;
}
