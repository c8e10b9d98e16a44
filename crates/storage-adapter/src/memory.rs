//! In-memory cache store
//!
//! Used where nothing should touch the disk, such as tests and ephemeral runs.

use std::collections::HashMap;
use std::path::PathBuf;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use common::error::{Error, Result};
use common::models::CachedModelRecord;
use crate::store::CacheStore;

/// Cache store holding artifacts in a map
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, (CachedModelRecord, Bytes)>>,
}

impl MemoryCacheStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an artifact with an explicit timestamp
    pub fn insert_at(&self, model_name: &str, version: &str, artifact: Bytes, cached_at: DateTime<Utc>) -> CachedModelRecord {
        let record = CachedModelRecord {
            model_name: model_name.to_string(),
            version: version.to_string(),
            cached_at,
            size_bytes: artifact.len() as u64,
            location: PathBuf::from(format!("memory://{}", model_name)),
        };

        self.entries
            .write()
            .insert(model_name.to_string(), (record.clone(), artifact));

        record
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn record(&self, model_name: &str) -> Option<CachedModelRecord> {
        self.entries.read().get(model_name).map(|(record, _)| record.clone())
    }

    fn records(&self) -> Vec<CachedModelRecord> {
        self.entries.read().values().map(|(record, _)| record.clone()).collect()
    }

    async fn read(&self, record: &CachedModelRecord) -> Result<Bytes> {
        self.entries
            .read()
            .get(&record.model_name)
            .filter(|(stored, _)| stored.version == record.version)
            .map(|(_, artifact)| artifact.clone())
            .ok_or_else(|| Error::Storage(format!("No cached artifact for {}", record.model_name)))
    }

    async fn write(&self, model_name: &str, version: &str, artifact: Bytes) -> Result<CachedModelRecord> {
        Ok(self.insert_at(model_name, version, artifact, Utc::now()))
    }

    fn detach(&self, model_name: &str) -> Option<CachedModelRecord> {
        self.entries.write().remove(model_name).map(|(record, _)| record)
    }

    async fn purge(&self, _record: &CachedModelRecord) -> Result<()> {
        // The artifact left the map together with its record
        Ok(())
    }
}
