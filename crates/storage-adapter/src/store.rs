//! Cache store abstraction

use async_trait::async_trait;
use bytes::Bytes;

use common::error::Result;
use common::models::CachedModelRecord;

/// Key-value store of model artifacts and their metadata records
///
/// The metadata index is the source of truth for what is cached; index
/// lookups are synchronous so callers can consult them while holding a lock.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Gets the record for a model, if one is cached
    fn record(&self, model_name: &str) -> Option<CachedModelRecord>;

    /// Gets all records
    fn records(&self) -> Vec<CachedModelRecord>;

    /// Sums the size of all cached artifacts
    fn total_bytes(&self) -> u64 {
        self.records().iter().map(|r| r.size_bytes).sum()
    }

    /// Reads the artifact behind a record
    async fn read(&self, record: &CachedModelRecord) -> Result<Bytes>;

    /// Persists an artifact, replacing any previous version of the model
    async fn write(&self, model_name: &str, version: &str, artifact: Bytes) -> Result<CachedModelRecord>;

    /// Drops a model's record from the index, leaving its artifact in place
    ///
    /// Synchronous so a caller can decide and detach under its own lock.
    /// Follow with [`purge`](Self::purge).
    fn detach(&self, model_name: &str) -> Option<CachedModelRecord>;

    /// Deletes the artifact behind a detached record
    async fn purge(&self, record: &CachedModelRecord) -> Result<()>;

    /// Removes a model's record and artifact; returns the removed record
    async fn remove(&self, model_name: &str) -> Result<Option<CachedModelRecord>> {
        let removed = self.detach(model_name);
        if let Some(record) = &removed {
            self.purge(record).await?;
        }
        Ok(removed)
    }
}
