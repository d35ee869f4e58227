//! Local contest snapshot storage.
//!
//! `read` never fails outward: a missing or unreadable snapshot is
//! reported as empty defaults so the agent can always answer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ContestRecord, Error};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// The persisted snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCacheRecord {
    #[serde(default)]
    pub contests: Vec<ContestRecord>,
    /// Capture time in epoch milliseconds; 0 when never written.
    #[serde(default)]
    pub timestamp: i64,
    /// Backend-reported time of its own upstream fetch.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl ClientCacheRecord {
    /// Milliseconds since capture; huge when never written.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis().saturating_sub(self.timestamp)
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn read(&self) -> ClientCacheRecord;
    async fn write(&self, record: ClientCacheRecord) -> Result<(), Error>;
}

/// JSON file store. Writes go to a sibling temp file and are renamed in.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn try_read(&self) -> Result<Option<ClientCacheRecord>, Error> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Storage(format!("{}: {e}", self.path.display()))),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn read(&self) -> ClientCacheRecord {
        match self.try_read().await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No snapshot at {}", self.path.display());
                ClientCacheRecord::default()
            }
            Err(e) => {
                warn!("Storage error: {}", e);
                ClientCacheRecord::default()
            }
        }
    }

    async fn write(&self, record: ClientCacheRecord) -> Result<(), Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(&record)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            "Saved {} contests to {}",
            record.contests.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Process-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: RwLock<ClientCacheRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: ClientCacheRecord) -> Self {
        Self {
            record: RwLock::new(record),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self) -> ClientCacheRecord {
        self.record.read().await.clone()
    }

    async fn write(&self, record: ClientCacheRecord) -> Result<(), Error> {
        *self.record.write().await = record;
        Ok(())
    }
}
