//! Local filesystem storage implementation.
//!
//! Every file is rewritten whole and atomically (temp file, then rename).
//! Writes are serialized through a lock so concurrent upserts never lose
//! each other's changes. Runs from separate processes are kept apart by an
//! advisory lock on `run.lock`.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::models::{CanonicalEvent, PipelineRun, StoredStats};
use crate::storage::{EventStore, RunLease};

const EVENTS_KEY: &str = "events.json";
const RUNS_KEY: &str = "runs.json";
const STATS_KEY: &str = "stats.json";
const LOCK_KEY: &str = "run.lock";

/// Header for events.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventsFile {
    updated_at: DateTime<Utc>,
    count: usize,
    events: Vec<CanonicalEvent>,
}

impl EventsFile {
    fn new(events: Vec<CanonicalEvent>) -> Self {
        Self {
            updated_at: Utc::now(),
            count: events.len(),
            events,
        }
    }
}

/// Local filesystem storage backend.
pub struct LocalStore {
    root_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root_dir(&self) -> &PathBuf {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    async fn read_events(&self) -> StoreResult<Vec<CanonicalEvent>> {
        Ok(self
            .read_json::<EventsFile>(EVENTS_KEY)
            .await?
            .map(|file| file.events)
            .unwrap_or_default())
    }
}

#[async_trait]
impl EventStore for LocalStore {
    async fn load_events(&self) -> StoreResult<Vec<CanonicalEvent>> {
        self.read_events().await
    }

    async fn upsert_batch(&self, events: &[CanonicalEvent]) -> StoreResult<usize> {
        let _guard = self.write_lock.lock().await;

        let mut existing = self.read_events().await?;
        let mut positions: HashMap<String, usize> = existing
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        for event in events {
            match positions.get(&event.id) {
                Some(&i) => existing[i] = event.clone(),
                None => {
                    positions.insert(event.id.clone(), existing.len());
                    existing.push(event.clone());
                }
            }
        }

        let file = EventsFile::new(existing);
        self.write_json(EVENTS_KEY, &file).await?;
        log::debug!("Upserted {} events ({} stored)", events.len(), file.count);
        Ok(events.len())
    }

    async fn append_log(&self, run: &PipelineRun) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut runs: Vec<PipelineRun> = self.read_json(RUNS_KEY).await?.unwrap_or_default();
        runs.push(run.clone());
        self.write_json(RUNS_KEY, &runs).await
    }

    async fn write_stats(&self, stats: &StoredStats) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(STATS_KEY, stats).await
    }

    async fn load_stats(&self) -> StoreResult<Option<StoredStats>> {
        self.read_json(STATS_KEY).await
    }

    async fn load_runs(&self) -> StoreResult<Vec<PipelineRun>> {
        Ok(self.read_json(RUNS_KEY).await?.unwrap_or_default())
    }

    fn try_lease(&self) -> StoreResult<Option<RunLease>> {
        std::fs::create_dir_all(&self.root_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.path(LOCK_KEY))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(RunLease::new(file))),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                log::debug!("{} is held by another run", LOCK_KEY);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
