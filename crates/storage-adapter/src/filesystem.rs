//! Filesystem-backed cache store
//!
//! Artifacts live as `<name>-<version>.bin` files (both parts escaped) under
//! the cache root, next to an `index.json` holding one metadata record per
//! model. Both are written through a temporary file and an atomic rename.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::error::{Error, Result};
use common::models::CachedModelRecord;
use common::utils::format_bytes;
use crate::store::CacheStore;

/// Name of the metadata index file
pub const INDEX_FILE: &str = "index.json";

/// Extension of artifact files
pub const ARTIFACT_EXTENSION: &str = "bin";

const TEMP_EXTENSION: &str = "tmp";

/// Cache store writing artifacts and an index into a directory
pub struct FilesystemCacheStore {
    /// Cache root directory
    root: PathBuf,

    /// Metadata index (model name -> record)
    index: RwLock<HashMap<String, CachedModelRecord>>,

    /// Serialises index writes
    persist_lock: Mutex<()>,
}

impl FilesystemCacheStore {
    /// Opens (creating if needed) a cache directory and reconciles its index
    /// against the files actually present
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;

        let index = Self::load_index(&root).await;

        let store = Self {
            root,
            index: RwLock::new(index),
            persist_lock: Mutex::new(()),
        };

        store.reconcile().await?;

        Ok(store)
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn load_index(root: &Path) -> HashMap<String, CachedModelRecord> {
        let path = root.join(INDEX_FILE);

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!("Failed to read cache index {:?}, starting empty: {}", path, e);
                return HashMap::new();
            }
        };

        match serde_json::from_slice::<Vec<CachedModelRecord>>(&data) {
            Ok(records) => records
                .into_iter()
                .map(|record| (record.model_name.clone(), record))
                .collect(),
            Err(e) => {
                warn!("Cache index {:?} is unreadable, starting empty: {}", path, e);
                HashMap::new()
            }
        }
    }

    /// Drops records whose artifact is missing and deletes files the index
    /// does not reference
    async fn reconcile(&self) -> Result<()> {
        let mut dropped = 0usize;

        for record in self.records() {
            if tokio::fs::metadata(&record.location).await.is_err() {
                warn!(
                    model = %record.model_name,
                    location = ?record.location,
                    "Cached artifact missing, dropping index entry"
                );
                self.index.write().remove(&record.model_name);
                dropped += 1;
            }
        }

        let referenced: HashSet<OsString> = self
            .records()
            .iter()
            .filter_map(|record| record.location.file_name().map(|name| name.to_os_string()))
            .collect();

        let mut removed = 0usize;
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_artifact = path.extension().map_or(false, |ext| ext == ARTIFACT_EXTENSION);
            let is_temp = path.extension().map_or(false, |ext| ext == TEMP_EXTENSION);
            let is_referenced = path
                .file_name()
                .map_or(false, |name| referenced.contains(name));

            if is_temp || (is_artifact && !is_referenced) {
                debug!("Removing unreferenced cache file {:?}", path);
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        if dropped > 0 {
            self.persist().await?;
        }

        info!(
            root = ?self.root,
            entries = self.index.read().len(),
            total = %format_bytes(self.total_bytes()),
            dropped,
            removed,
            "Model cache opened"
        );

        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;

        // Snapshot under the persist lock so the last writer stores the latest state
        let mut records = self.records();
        records.sort_by(|a, b| a.model_name.cmp(&b.model_name));

        let json = serde_json::to_vec_pretty(&records)?;
        let temp_path = self.root.join(format!("{}.{}", INDEX_FILE, TEMP_EXTENSION));

        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, self.root.join(INDEX_FILE)).await?;

        Ok(())
    }

    fn artifact_file_name(model_name: &str, version: &str) -> String {
        format!(
            "{}-{}.{}",
            escape(model_name),
            escape(version),
            ARTIFACT_EXTENSION
        )
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9._]`
///
/// The mapping is one-to-one and never emits `-`, so `<name>-<version>`
/// cannot collide for distinct name/version pairs.
fn escape(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for byte in component.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'_' {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("%{:02X}", byte));
        }
    }
    escaped
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheStore for FilesystemCacheStore {
    fn record(&self, model_name: &str) -> Option<CachedModelRecord> {
        self.index.read().get(model_name).cloned()
    }

    fn records(&self) -> Vec<CachedModelRecord> {
        self.index.read().values().cloned().collect()
    }

    async fn read(&self, record: &CachedModelRecord) -> Result<Bytes> {
        let data = tokio::fs::read(&record.location).await?;

        if data.len() as u64 != record.size_bytes {
            return Err(Error::Storage(format!(
                "Cached artifact for {} is truncated: expected {} bytes, found {}",
                record.model_name,
                record.size_bytes,
                data.len()
            )));
        }

        Ok(Bytes::from(data))
    }

    async fn write(&self, model_name: &str, version: &str, artifact: Bytes) -> Result<CachedModelRecord> {
        let file_name = Self::artifact_file_name(model_name, version);
        let location = self.root.join(&file_name);
        let temp_path = self.root.join(format!("{}.{}", file_name, TEMP_EXTENSION));

        tokio::fs::write(&temp_path, &artifact).await?;
        tokio::fs::rename(&temp_path, &location).await?;

        let record = CachedModelRecord {
            model_name: model_name.to_string(),
            version: version.to_string(),
            cached_at: Utc::now(),
            size_bytes: artifact.len() as u64,
            location: location.clone(),
        };

        let previous = self
            .index
            .write()
            .insert(model_name.to_string(), record.clone());

        self.persist().await?;

        if let Some(previous) = previous {
            if previous.location != location {
                debug!(
                    model = %model_name,
                    old_version = %previous.version,
                    new_version = %version,
                    "Replacing cached artifact"
                );
                remove_file_if_exists(&previous.location).await?;
            }
        }

        Ok(record)
    }

    fn detach(&self, model_name: &str) -> Option<CachedModelRecord> {
        self.index.write().remove(model_name)
    }

    async fn purge(&self, record: &CachedModelRecord) -> Result<()> {
        self.persist().await?;

        // A rewrite of the same name and version may already own the file again
        let reused = self
            .index
            .read()
            .values()
            .any(|other| other.location == record.location);

        if !reused {
            remove_file_if_exists(&record.location).await?;
        }

        Ok(())
    }
}
