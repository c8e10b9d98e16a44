//! Model loader implementation
//!
//! Resolves a model name to a resident model: memory first, then the on-disk
//! cache (valid only when its version matches the registry), then the model's
//! source. At most one load per model name is in flight; concurrent callers
//! await the same shared load.
//!
//! The load body runs on its own task. A caller that stops waiting (for
//! example through [`ModelLoader::load_with_timeout`]) does not cancel it; the
//! load completes and the model becomes resident for the next caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use common::error::{Error, Result};
use common::models::{LoadSource, ModelDescriptor};
use common::utils::{execute_with_timeout, format_bytes};
use settings::CacheSettings;
use storage_adapter::CacheStore;

use crate::fetcher::{ModelFetcher, ProgressCallback};
use crate::registry::ModelRegistry;
use crate::runtime::{LoadedModel, ModelRuntime};

type SharedLoad = Shared<BoxFuture<'static, Result<(Arc<LoadedModel>, LoadSource)>>>;

/// Forwards download progress to every caller waiting on one load
#[derive(Default)]
struct ProgressFanout {
    listeners: Mutex<Vec<ProgressCallback>>,
    last: Mutex<Option<(u64, u64)>>,
}

impl ProgressFanout {
    /// Adds a listener; a late joiner first receives the latest report
    fn subscribe(&self, callback: Option<ProgressCallback>) {
        let Some(callback) = callback else {
            return;
        };

        self.listeners.lock().push(callback.clone());

        let last = *self.last.lock();
        if let Some((loaded, total)) = last {
            callback(loaded, total);
        }
    }

    fn report(&self, loaded: u64, total: u64) {
        *self.last.lock() = Some((loaded, total));

        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(loaded, total);
        }
    }
}

/// Per-model load state
enum LoadState {
    Loading {
        load: SharedLoad,
        progress: Arc<ProgressFanout>,
    },
    Loaded(Arc<LoadedModel>),
    Failed(Error),
}

fn is_protected(states: &HashMap<String, LoadState>, name: &str) -> bool {
    matches!(
        states.get(name),
        Some(LoadState::Loading { .. }) | Some(LoadState::Loaded(_))
    )
}

/// Snapshot of a model's load state
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    NotLoaded,
    Loading,
    Loaded,
    Failed(Error),
}

/// Loader limits
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Cap on total cached bytes on disk
    pub max_cache_bytes: u64,

    /// Cap on total resident memory
    pub max_resident_bytes: u64,

    /// Run cleanup after every fresh download
    pub auto_cleanup: bool,
}

impl From<&CacheSettings> for LoaderOptions {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            max_cache_bytes: settings.max_bytes,
            max_resident_bytes: settings.max_resident_bytes,
            auto_cleanup: settings.auto_cleanup,
        }
    }
}

/// Result of a successful load
#[derive(Debug, Clone)]
pub struct LoadResult {
    /// Resident model
    pub model: Arc<LoadedModel>,

    /// Wall time this caller waited
    pub load_time_ms: u64,

    /// Where the model came from
    pub source: LoadSource,
}

impl LoadResult {
    /// True unless the artifact had to be fetched from its source
    pub fn from_cache(&self) -> bool {
        self.source.is_cached()
    }
}

/// Outcome of a cache cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Evicted model names, in eviction order
    pub evicted: Vec<String>,

    /// Bytes freed
    pub freed_bytes: u64,

    /// Cached bytes left after the pass
    pub remaining_bytes: u64,

    /// Over-cap candidates kept because they were resident or loading
    pub skipped: Vec<String>,
}

struct LoaderInner {
    registry: Arc<ModelRegistry>,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn ModelFetcher>,
    runtime: Arc<dyn ModelRuntime>,
    options: LoaderOptions,

    /// Load state per model name
    states: Mutex<HashMap<String, LoadState>>,

    /// Bytes held by resident models; only changed under the `states` lock
    resident_bytes: AtomicU64,

    /// Monotonic access counter for LRU ordering
    access_clock: AtomicU64,

    /// Serialises cleanup passes
    cleanup_lock: tokio::sync::Mutex<()>,
}

/// Model loader with single-flight loads, an on-disk cache and a resident
/// memory budget
#[derive(Clone)]
pub struct ModelLoader {
    inner: Arc<LoaderInner>,
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Checks an artifact against the descriptor's SHA-256, if one is set
fn verify_checksum(descriptor: &ModelDescriptor, artifact: &[u8]) -> Result<()> {
    if let Some(expected) = &descriptor.sha256 {
        let actual = hex::encode(Sha256::digest(artifact));

        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Error::InvalidModel(format!(
                "Checksum mismatch for model {}: expected {}, got {}",
                descriptor.name, expected, actual
            )));
        }

        debug!("Checksum verification passed for model {}", descriptor.name);
    }

    Ok(())
}

impl ModelLoader {
    /// Creates a new model loader
    pub fn new(
        registry: Arc<ModelRegistry>,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn ModelFetcher>,
        runtime: Arc<dyn ModelRuntime>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                registry,
                store,
                fetcher,
                runtime,
                options,
                states: Mutex::new(HashMap::new()),
                resident_bytes: AtomicU64::new(0),
                access_clock: AtomicU64::new(0),
                cleanup_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Model registry backing this loader
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.inner.registry
    }

    /// Loads a model, joining an in-flight load of the same name if present
    ///
    /// `progress` receives download progress whether this call starts the
    /// load or joins one already running.
    pub async fn load(&self, name: &str, progress: Option<ProgressCallback>) -> Result<LoadResult> {
        let start = Instant::now();

        let pending = {
            let mut states = self.inner.states.lock();

            match states.get(name) {
                Some(LoadState::Loaded(model)) => {
                    self.inner.touch(model);
                    return Ok(LoadResult {
                        model: model.clone(),
                        load_time_ms: elapsed_ms(start),
                        source: LoadSource::Memory,
                    });
                }
                Some(LoadState::Loading { load, progress: fanout }) => {
                    debug!(model = %name, "Joining in-flight load");
                    fanout.subscribe(progress);
                    load.clone()
                }
                _ => {
                    self.inner.registry.require(name)?;

                    let fanout = Arc::new(ProgressFanout::default());
                    fanout.subscribe(progress);

                    let load = LoaderInner::spawn_load(&self.inner, name.to_string(), fanout.clone());
                    states.insert(
                        name.to_string(),
                        LoadState::Loading {
                            load: load.clone(),
                            progress: fanout,
                        },
                    );
                    load
                }
            }
        };

        let (model, source) = pending.await?;
        self.inner.touch(&model);

        Ok(LoadResult {
            model,
            load_time_ms: elapsed_ms(start),
            source,
        })
    }

    /// Loads a model, giving up waiting after `timeout`
    ///
    /// The load itself keeps running and populates the cache when it finishes.
    pub async fn load_with_timeout(
        &self,
        name: &str,
        timeout: Duration,
        progress: Option<ProgressCallback>,
    ) -> Result<LoadResult> {
        execute_with_timeout(self.load(name, progress), timeout, &format!("load of model {}", name)).await
    }

    /// Checks if a model is resident
    pub fn is_loaded(&self, name: &str) -> bool {
        matches!(self.inner.states.lock().get(name), Some(LoadState::Loaded(_)))
    }

    /// Gets a resident model
    pub fn get_loaded(&self, name: &str) -> Option<Arc<LoadedModel>> {
        match self.inner.states.lock().get(name) {
            Some(LoadState::Loaded(model)) => {
                self.inner.touch(model);
                Some(model.clone())
            }
            _ => None,
        }
    }

    /// Gets the load state of a model
    pub fn status(&self, name: &str) -> LoadStatus {
        match self.inner.states.lock().get(name) {
            None => LoadStatus::NotLoaded,
            Some(LoadState::Loading { .. }) => LoadStatus::Loading,
            Some(LoadState::Loaded(_)) => LoadStatus::Loaded,
            Some(LoadState::Failed(e)) => LoadStatus::Failed(e.clone()),
        }
    }

    /// Last load error of a model, if its most recent load failed
    pub fn last_error(&self, name: &str) -> Option<Error> {
        match self.inner.states.lock().get(name) {
            Some(LoadState::Failed(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Releases a resident model; the cached artifact stays on disk
    ///
    /// Returns whether a resident model was released.
    pub fn unload(&self, name: &str) -> Result<bool> {
        let mut states = self.inner.states.lock();

        match states.get(name) {
            Some(LoadState::Loading { .. }) => Err(Error::ConcurrentOperation(format!(
                "Model {} is currently loading",
                name
            ))),
            Some(LoadState::Loaded(_)) => {
                if let Some(LoadState::Loaded(model)) = states.remove(name) {
                    self.inner.resident_bytes.fetch_sub(model.memory_bytes, Ordering::SeqCst);
                    info!("Unloaded model {} ({})", name, format_bytes(model.memory_bytes));
                }
                Ok(true)
            }
            Some(LoadState::Failed(_)) => {
                states.remove(name);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Evicts oldest cached artifacts until the cache is under its cap
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        self.inner.cleanup().await
    }

    /// All resident models
    pub fn loaded_models(&self) -> Vec<Arc<LoadedModel>> {
        self.inner
            .states
            .lock()
            .values()
            .filter_map(|state| match state {
                LoadState::Loaded(model) => Some(model.clone()),
                _ => None,
            })
            .collect()
    }

    /// Bytes held by resident models
    pub fn resident_bytes(&self) -> u64 {
        self.inner.resident_bytes.load(Ordering::SeqCst)
    }

    /// Bytes held by the on-disk cache
    pub fn cached_bytes(&self) -> u64 {
        self.inner.store.total_bytes()
    }
}

impl LoaderInner {
    fn touch(&self, model: &LoadedModel) {
        let tick = self.access_clock.fetch_add(1, Ordering::SeqCst) + 1;
        model.touch(tick);
    }

    fn spawn_load(inner: &Arc<Self>, name: String, fanout: Arc<ProgressFanout>) -> SharedLoad {
        let task_inner = Arc::clone(inner);
        let task_name = name.clone();
        let progress: ProgressCallback = Arc::new(move |loaded, total| fanout.report(loaded, total));

        let task = tokio::spawn(async move {
            let result = task_inner.load_uncached(&task_name, Some(progress)).await;
            task_inner.settle(&task_name, result)
        });

        // Weak so a pending handle stored in `states` does not keep the loader alive
        let weak: Weak<Self> = Arc::downgrade(inner);

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let error = Error::Internal(format!("Load task for model {} aborted: {}", name, e));
                    if let Some(inner) = weak.upgrade() {
                        inner.states.lock().insert(name, LoadState::Failed(error.clone()));
                    }
                    Err(error)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Records the outcome of a load and makes the model resident on success
    fn settle(
        &self,
        name: &str,
        result: Result<(Arc<LoadedModel>, LoadSource)>,
    ) -> Result<(Arc<LoadedModel>, LoadSource)> {
        let mut states = self.states.lock();

        let result = result.and_then(|(model, source)| {
            self.admit(&mut states, name, &model)?;
            Ok((model, source))
        });

        match &result {
            Ok((model, source)) => {
                info!(
                    model = %name,
                    version = %model.version,
                    source = ?source,
                    memory = %format_bytes(model.memory_bytes),
                    "Model loaded"
                );
                states.insert(name.to_string(), LoadState::Loaded(model.clone()));
            }
            Err(e) => {
                warn!(model = %name, error = %e, "Model load failed");
                states.insert(name.to_string(), LoadState::Failed(e.clone()));
            }
        }

        result
    }

    /// Reserves resident memory for a model, unloading least recently used
    /// models if needed
    fn admit(&self, states: &mut HashMap<String, LoadState>, name: &str, model: &LoadedModel) -> Result<()> {
        let budget = self.options.max_resident_bytes;
        let required = model.memory_bytes;

        if required > budget {
            return Err(Error::Memory(format!(
                "Model {} needs {} but the resident budget is {}",
                name,
                format_bytes(required),
                format_bytes(budget)
            )));
        }

        let mut resident = self.resident_bytes.load(Ordering::SeqCst);

        if resident + required > budget {
            let mut candidates: Vec<(String, u64, u64)> = states
                .iter()
                .filter_map(|(other, state)| match state {
                    LoadState::Loaded(loaded) if other != name => {
                        Some((other.clone(), loaded.last_access(), loaded.memory_bytes))
                    }
                    _ => None,
                })
                .collect();

            // Oldest access first
            candidates.sort_by_key(|(_, last_access, _)| *last_access);

            for (victim, _, bytes) in candidates {
                if resident + required <= budget {
                    break;
                }

                states.remove(&victim);
                resident -= bytes;
                self.resident_bytes.fetch_sub(bytes, Ordering::SeqCst);
                info!("Unloaded model {} to make room for {}", victim, name);
            }
        }

        self.resident_bytes.fetch_add(required, Ordering::SeqCst);
        Ok(())
    }

    async fn load_uncached(
        &self,
        name: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<(Arc<LoadedModel>, LoadSource)> {
        let descriptor = self.registry.require(name)?.clone();

        if let Some(artifact) = self.read_cached(&descriptor).await {
            let model = self.runtime.initialize(&descriptor, artifact).await?;
            return Ok((Arc::new(model), LoadSource::Disk));
        }

        info!(model = %name, version = %descriptor.version, "Fetching model from source");

        let artifact = self.fetcher.fetch(&descriptor, progress).await?;
        verify_checksum(&descriptor, &artifact)?;

        self.store
            .write(name, &descriptor.version, artifact.clone())
            .await?;

        if self.options.auto_cleanup {
            if let Err(e) = self.cleanup().await {
                warn!("Cache cleanup after downloading {} failed: {}", name, e);
            }
        }

        let model = self.runtime.initialize(&descriptor, artifact).await?;
        Ok((Arc::new(model), LoadSource::Remote))
    }

    /// Reads a valid cached artifact; any problem counts as a cache miss
    async fn read_cached(&self, descriptor: &ModelDescriptor) -> Option<Bytes> {
        let record = self.store.record(&descriptor.name)?;

        if record.version != descriptor.version {
            info!(
                model = %descriptor.name,
                cached_version = %record.version,
                expected_version = %descriptor.version,
                "Cached version is stale"
            );
            return None;
        }

        match self.store.read(&record).await {
            Ok(artifact) => match verify_checksum(descriptor, &artifact) {
                Ok(()) => Some(artifact),
                Err(e) => {
                    warn!("Cached artifact for {} failed verification: {}", descriptor.name, e);
                    None
                }
            },
            Err(e) => {
                warn!("Cached artifact for {} is unreadable: {}", descriptor.name, e);
                None
            }
        }
    }

    async fn cleanup(&self) -> Result<CleanupReport> {
        let _guard = self.cleanup_lock.lock().await;

        let cap = self.options.max_cache_bytes;
        let mut records = self.store.records();
        let mut total: u64 = records.iter().map(|record| record.size_bytes).sum();

        let mut report = CleanupReport {
            remaining_bytes: total,
            ..CleanupReport::default()
        };

        if total <= cap {
            return Ok(report);
        }

        info!(
            "Model cache holds {} (cap {}), evicting oldest entries",
            format_bytes(total),
            format_bytes(cap)
        );

        records.sort_by(|a, b| {
            a.cached_at
                .cmp(&b.cached_at)
                .then_with(|| a.model_name.cmp(&b.model_name))
        });

        for record in records {
            if total <= cap {
                break;
            }

            // Checked and detached under the states lock: a load starting
            // afterwards no longer sees the record, one already running is
            // protected
            let detached = {
                let states = self.states.lock();
                if is_protected(&states, &record.model_name) {
                    None
                } else {
                    Some(self.store.detach(&record.model_name))
                }
            };

            let Some(detached) = detached else {
                debug!("Skipping eviction of in-use model {}", record.model_name);
                report.skipped.push(record.model_name);
                continue;
            };

            if let Some(removed) = detached {
                self.store.purge(&removed).await?;
                total = total.saturating_sub(removed.size_bytes);
                report.freed_bytes += removed.size_bytes;
                info!(
                    "Evicted cached model {} ({})",
                    removed.model_name,
                    format_bytes(removed.size_bytes)
                );
                report.evicted.push(removed.model_name);
            }
        }

        report.remaining_bytes = total;

        if total > cap {
            warn!(
                "Model cache still holds {} after cleanup; remaining entries are in use",
                format_bytes(total)
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use common::models::ModelPriority;
    use storage_adapter::MemoryCacheStore;
    use crate::runtime::ArtifactRuntime;

    struct StubFetcher {
        payloads: HashMap<String, Bytes>,
        delay: Duration,
        failure: Mutex<Option<Error>>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new(payloads: &[(&str, usize)], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                payloads: payloads
                    .iter()
                    .map(|(name, len)| (name.to_string(), Bytes::from(vec![1u8; *len])))
                    .collect(),
                delay,
                failure: Mutex::new(None),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelFetcher for StubFetcher {
        async fn fetch(&self, descriptor: &ModelDescriptor, progress: Option<ProgressCallback>) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;

            if let Some(error) = self.failure.lock().clone() {
                return Err(error);
            }

            let artifact = self
                .payloads
                .get(&descriptor.name)
                .cloned()
                .ok_or_else(|| Error::NotFound(descriptor.name.clone()))?;

            if let Some(progress) = progress {
                progress(artifact.len() as u64, artifact.len() as u64);
            }

            Ok(artifact)
        }
    }

    fn registry(names: &[&str]) -> Arc<ModelRegistry> {
        let descriptors = names
            .iter()
            .map(|name| {
                ModelDescriptor::new(*name, format!("stub://{}", name), "1.0", 0, &[], ModelPriority::Standard)
            })
            .collect();
        Arc::new(ModelRegistry::new(descriptors).unwrap())
    }

    fn options(max_cache_bytes: u64, max_resident_bytes: u64) -> LoaderOptions {
        LoaderOptions {
            max_cache_bytes,
            max_resident_bytes,
            auto_cleanup: false,
        }
    }

    fn loader(
        registry: Arc<ModelRegistry>,
        store: Arc<MemoryCacheStore>,
        fetcher: Arc<StubFetcher>,
        options: LoaderOptions,
    ) -> ModelLoader {
        ModelLoader::new(registry, store, fetcher, Arc::new(ArtifactRuntime::default()), options)
    }

    #[tokio::test]
    async fn test_concurrent_loads_fetch_once() {
        let fetcher = StubFetcher::new(&[("m", 100)], Duration::from_millis(50));
        let store = Arc::new(MemoryCacheStore::new());
        let loader = loader(registry(&["m"]), store.clone(), fetcher.clone(), options(10_000, 10_000));

        let loads = (0..8).map(|_| loader.load("m", None));
        let results = futures::future::join_all(loads).await;

        assert_eq!(fetcher.calls(), 1);
        let first = results[0].as_ref().unwrap().model.clone();
        for result in &results {
            let result = result.as_ref().unwrap();
            assert!(Arc::ptr_eq(&result.model, &first));
            assert_eq!(result.source, LoadSource::Remote);
        }

        assert!(loader.is_loaded("m"));
        assert!(store.record("m").is_some());
    }

    #[tokio::test]
    async fn test_joining_caller_receives_progress() {
        let fetcher = StubFetcher::new(&[("m", 100)], Duration::from_millis(100));
        let store = Arc::new(MemoryCacheStore::new());
        let loader = loader(registry(&["m"]), store, fetcher.clone(), options(10_000, 10_000));

        let reports: Arc<Mutex<Vec<(&'static str, u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let callback = |tag: &'static str| -> ProgressCallback {
            let reports = reports.clone();
            Arc::new(move |loaded, total| reports.lock().push((tag, loaded, total)))
        };

        let first = loader.clone();
        let first_cb = callback("first");
        let starter = tokio::spawn(async move { first.load("m", Some(first_cb)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        loader.load("m", Some(callback("second"))).await.unwrap();
        starter.await.unwrap().unwrap();

        assert_eq!(fetcher.calls(), 1);
        let reports = reports.lock().clone();
        assert!(reports.contains(&("first", 100, 100)));
        assert!(reports.contains(&("second", 100, 100)));

        // Late joiners get the last report replayed
        let fanout = ProgressFanout::default();
        fanout.report(40, 100);
        let late: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = late.clone();
        fanout.subscribe(Some(Arc::new(move |loaded, total| sink.lock().push((loaded, total)))));
        fanout.report(100, 100);
        assert_eq!(*late.lock(), vec![(40, 100), (100, 100)]);
    }

    #[tokio::test]
    async fn test_cleanup_spares_model_being_loaded() {
        let fetcher = StubFetcher::new(&[("x", 10)], Duration::from_millis(200));
        let store = Arc::new(MemoryCacheStore::new());
        let at = |minute| Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap();

        // Stale record of the model about to load is the oldest entry
        store.insert_at("x", "0.9", Bytes::from(vec![1u8; 60]), at(0));
        store.insert_at("y", "1.0", Bytes::from(vec![1u8; 60]), at(1));

        let loader = loader(registry(&["x", "y"]), store.clone(), fetcher, options(100, 10_000));

        let background = loader.clone();
        let handle = tokio::spawn(async move { background.load("x", None).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(loader.status("x"), LoadStatus::Loading);

        let report = loader.cleanup().await.unwrap();
        assert_eq!(report.skipped, vec!["x".to_string()]);
        assert_eq!(report.evicted, vec!["y".to_string()]);
        assert!(store.record("y").is_none());

        handle.await.unwrap().unwrap();
        assert_eq!(store.record("x").unwrap().version, "1.0");
    }

    #[tokio::test]
    async fn test_memory_then_disk_then_remote() {
        let fetcher = StubFetcher::new(&[("m", 100)], Duration::ZERO);
        let store = Arc::new(MemoryCacheStore::new());
        let loader = loader(registry(&["m"]), store, fetcher.clone(), options(10_000, 10_000));

        let first = loader.load("m", None).await.unwrap();
        assert!(!first.from_cache());

        let second = loader.load("m", None).await.unwrap();
        assert_eq!(second.source, LoadSource::Memory);

        assert!(loader.unload("m").unwrap());
        assert_eq!(loader.resident_bytes(), 0);

        let third = loader.load("m", None).await.unwrap();
        assert_eq!(third.source, LoadSource::Disk);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_version_is_a_miss() {
        let fetcher = StubFetcher::new(&[("m", 100)], Duration::ZERO);
        let store = Arc::new(MemoryCacheStore::new());
        store.insert_at("m", "0.9", Bytes::from_static(b"old"), Utc::now());

        let loader = loader(registry(&["m"]), store.clone(), fetcher.clone(), options(10_000, 10_000));
        let result = loader.load("m", None).await.unwrap();

        assert_eq!(result.source, LoadSource::Remote);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(store.record("m").unwrap().version, "1.0");
    }

    #[tokio::test]
    async fn test_unload_while_loading_is_rejected() {
        let fetcher = StubFetcher::new(&[("m", 100)], Duration::from_millis(200));
        let store = Arc::new(MemoryCacheStore::new());
        let loader = loader(registry(&["m"]), store, fetcher, options(10_000, 10_000));

        let background = loader.clone();
        let handle = tokio::spawn(async move { background.load("m", None).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(loader.status("m"), LoadStatus::Loading);
        assert!(matches!(loader.unload("m"), Err(Error::ConcurrentOperation(_))));

        handle.await.unwrap().unwrap();
        assert!(loader.unload("m").unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_evicts_oldest_and_spares_resident() {
        let fetcher = StubFetcher::new(&[], Duration::ZERO);
        let store = Arc::new(MemoryCacheStore::new());
        let at = |minute| Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap();

        store.insert_at("a", "1.0", Bytes::from(vec![1u8; 40]), at(0));
        store.insert_at("b", "1.0", Bytes::from(vec![1u8; 40]), at(1));
        store.insert_at("c", "1.0", Bytes::from(vec![1u8; 40]), at(2));
        store.insert_at("d", "1.0", Bytes::from(vec![1u8; 40]), at(3));

        let loader = loader(registry(&["a", "b", "c", "d"]), store.clone(), fetcher, options(100, 10_000));

        // Oldest entry is resident and must survive
        assert_eq!(loader.load("a", None).await.unwrap().source, LoadSource::Disk);

        let report = loader.cleanup().await.unwrap();

        assert_eq!(report.evicted, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(report.skipped, vec!["a".to_string()]);
        assert_eq!(report.freed_bytes, 80);
        assert_eq!(report.remaining_bytes, 80);
        assert!(store.record("a").is_some());
        assert!(store.record("d").is_some());
        assert!(store.total_bytes() <= 100);

        // Under the cap nothing happens
        assert_eq!(loader.cleanup().await.unwrap().evicted, Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_auto_cleanup_after_download() {
        let fetcher = StubFetcher::new(&[("new", 60)], Duration::ZERO);
        let store = Arc::new(MemoryCacheStore::new());
        store.insert_at("old", "1.0", Bytes::from(vec![1u8; 60]), Utc::now());

        let options = LoaderOptions {
            auto_cleanup: true,
            ..options(100, 10_000)
        };
        let loader = loader(registry(&["old", "new"]), store.clone(), fetcher, options);

        loader.load("new", None).await.unwrap();

        assert!(store.record("old").is_none());
        assert!(store.record("new").is_some());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_invalid_model() {
        let fetcher = StubFetcher::new(&[("m", 10)], Duration::ZERO);
        let store = Arc::new(MemoryCacheStore::new());

        let mut descriptor = ModelDescriptor::new("m", "stub://m", "1.0", 10, &[], ModelPriority::Critical);
        descriptor.sha256 = Some("00".repeat(32));
        let registry = Arc::new(ModelRegistry::new(vec![descriptor]).unwrap());

        let loader = loader(registry, store.clone(), fetcher, options(10_000, 10_000));
        let err = loader.load("m", None).await.unwrap_err();

        assert!(matches!(err, Error::InvalidModel(_)));
        assert!(store.record("m").is_none());
        assert_eq!(loader.last_error("m"), Some(err));
    }

    #[tokio::test]
    async fn test_model_larger_than_budget_is_memory_error() {
        let fetcher = StubFetcher::new(&[("a", 100), ("b", 100), ("huge", 500)], Duration::ZERO);
        let store = Arc::new(MemoryCacheStore::new());
        let loader = loader(registry(&["a", "b", "huge"]), store.clone(), fetcher, options(10_000, 250));

        loader.load("a", None).await.unwrap();
        loader.load("b", None).await.unwrap();
        assert_eq!(loader.resident_bytes(), 240);

        let err = loader.load("huge", None).await.unwrap_err();
        assert!(matches!(err, Error::Memory(_)));

        // Nothing was unloaded for a model that could never fit
        assert!(loader.is_loaded("a"));
        assert!(loader.is_loaded("b"));
        assert_eq!(loader.resident_bytes(), 240);
        assert!(store.record("huge").is_some());
    }

    #[tokio::test]
    async fn test_resident_budget_evicts_to_fit() {
        let fetcher = StubFetcher::new(&[("a", 100), ("b", 100), ("c", 100)], Duration::ZERO);
        let store = Arc::new(MemoryCacheStore::new());
        let loader = loader(registry(&["a", "b", "c"]), store, fetcher, options(10_000, 250));

        loader.load("a", None).await.unwrap();
        loader.load("b", None).await.unwrap();
        loader.get_loaded("a").unwrap();
        loader.load("c", None).await.unwrap();

        assert!(loader.is_loaded("a"));
        assert!(!loader.is_loaded("b"));
        assert!(loader.is_loaded("c"));
        assert_eq!(loader.resident_bytes(), 240);
    }

    #[tokio::test]
    async fn test_timeout_leaves_load_running() {
        let fetcher = StubFetcher::new(&[("m", 100)], Duration::from_millis(150));
        let store = Arc::new(MemoryCacheStore::new());
        let loader = loader(registry(&["m"]), store, fetcher.clone(), options(10_000, 10_000));

        let err = loader
            .load_with_timeout("m", Duration::from_millis(10), None)
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(loader.is_loaded("m"));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_retried_fresh() {
        let fetcher = StubFetcher::new(&[("m", 100)], Duration::ZERO);
        *fetcher.failure.lock() = Some(Error::Network("connection reset".to_string()));

        let store = Arc::new(MemoryCacheStore::new());
        let loader = loader(registry(&["m"]), store, fetcher.clone(), options(10_000, 10_000));

        assert!(matches!(loader.load("m", None).await, Err(Error::Network(_))));
        assert!(matches!(loader.status("m"), LoadStatus::Failed(Error::Network(_))));

        *fetcher.failure.lock() = None;
        loader.load("m", None).await.unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(loader.last_error("m"), None);
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_found() {
        let fetcher = StubFetcher::new(&[], Duration::ZERO);
        let store = Arc::new(MemoryCacheStore::new());
        let loader = loader(registry(&[]), store, fetcher.clone(), options(10_000, 10_000));

        assert!(loader.load("ghost", None).await.unwrap_err().is_not_found());
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(loader.status("ghost"), LoadStatus::NotLoaded);
    }
}
