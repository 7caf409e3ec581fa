//! Append-only storage for forensic records, anchors, and the replay log.
//!
//! The `StorageBackend` trait mirrors `shared/crates/storage`'s
//! `StorageBackend` (get/put/delete/exists/list_keys over raw bytes);
//! `FsStorage` is this crate's filesystem-backed implementation, needed
//! because the forensic/anchor formats are specified as on-disk JSON
//! files (`<id>.json`) rather than an opaque KV store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("io error for {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// In-memory backend, useful for tests and for the forensic writer's
/// retry buffer (spec.md §7: "alert is persisted in memory and
/// re-tried on next batch" when the disk write fails).
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.read().await.contains_key(key))
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.data.read().await.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }
}

/// Filesystem-backed backend. Each key becomes `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|source| StorageError::Io { path: dir.display().to_string(), source })?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Writes `value` canonically under `key`, retrying with exponential
    /// backoff up to `max_attempts` times (spec.md §7: forensic write
    /// failure policy).
    pub async fn put_with_retry<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        max_attempts: u32,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let mut attempt = 0;
        loop {
            match self.put(key, bytes.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt + 1 < max_attempts => {
                    attempt += 1;
                    let backoff_ms = 50u64 * (1 << attempt.min(10));
                    tracing::warn!(key, attempt, backoff_ms, error = %err, "forensic write failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl StorageBackend for FsStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path: path.display().to_string(), source }),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|source| StorageError::Io { path: tmp.display().to_string(), source })?;
        file.write_all(&value).await.map_err(|source| StorageError::Io { path: tmp.display().to_string(), source })?;
        file.flush().await.map_err(|source| StorageError::Io { path: tmp.display().to_string(), source })?;
        fs::rename(&tmp, &path).await.map_err(|source| StorageError::Io { path: path.display().to_string(), source })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(fs::metadata(self.path_for(key)).await.is_ok())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|source| StorageError::Io { path: self.dir.display().to_string(), source })?;
        while let Some(entry) =
            entries.next_entry().await.map_err(|source| StorageError::Io { path: self.dir.display().to_string(), source })?
        {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if stem.starts_with(prefix) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Append-only JSON-lines writer for the optional alert replay log
/// (spec.md §6: "Alert log: optional append-only JSON-lines stream").
pub struct JsonLinesLog {
    path: PathBuf,
    file: RwLock<fs::File>,
}

impl JsonLinesLog {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| StorageError::Io { path: path.display().to_string(), source })?;
        Ok(Self { path, file: RwLock::new(file) })
    }

    pub async fn append<T: Serialize>(&self, record: &T) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.write().await;
        file.write_all(&line).await.map_err(|source| StorageError::Io { path: self.path.display().to_string(), source })?;
        file.flush().await.map_err(|source| StorageError::Io { path: self.path.display().to_string(), source })?;
        Ok(())
    }
}
