// File-based storage backend. One JSON file per key under the data
// directory; writes go through a temp file and rename so a crash mid-write
// never leaves a torn document behind.

use crate::error::CoreError;
use crate::storage::{StorageBackend, StorageResult};
use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;

pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn save(&self, key: &str, json: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        debug!("Saving {} bytes to {:?}", json.len(), path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Io(format!("Failed to create directory: {}", e)))?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| CoreError::Io(format!("Failed to write {:?}: {}", tmp, e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CoreError::Io(format!("Failed to move {:?} into place: {}", tmp, e)))?;

        Ok(())
    }

    async fn load(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key);

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("No document at {:?}", path);
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoreError::Io(format!("Failed to read {:?}: {}", path, e)))?;
        Ok(Some(json))
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| CoreError::Io(format!("Failed to remove {:?}: {}", path, e)))?;
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(tokio::fs::try_exists(&self.path_for(key)).await.unwrap_or(false))
    }
}
