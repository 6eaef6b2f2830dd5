use crate::error::StoreError;
use crate::store::ObjectStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Filesystem-backed object store: a bucket is a directory under the root,
/// a folder is a subdirectory, an object is a file. Used in development and
/// in the test suites; production deployments plug a real SDK in behind the
/// same trait.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn io(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list_folders(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(bucket);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| Self::io(&dir, e))?;

        let mut folders = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::io(&dir, e))? {
            let meta = entry.metadata().await.map_err(|e| Self::io(&dir, e))?;
            if meta.is_dir() {
                folders.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        folders.sort();
        Ok(folders)
    }

    async fn list_objects(&self, bucket: &str, folder: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(bucket).join(folder);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| Self::io(&dir, e))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::io(&dir, e))? {
            let meta = entry.metadata().await.map_err(|e| Self::io(&dir, e))?;
            if meta.is_file() {
                keys.push(format!(
                    "{folder}/{}",
                    entry.file_name().to_string_lossy()
                ));
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn fetch(&self, bucket: &str, key: &str) -> Result<String, StoreError> {
        let path = self.root.join(bucket).join(key);
        match fs::read_to_string(&path).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(format!("{bucket}/{key}")))
            }
            Err(e) => Err(Self::io(&path, e)),
        }
    }
}
