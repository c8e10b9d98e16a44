//! Photo Curator
//!
//! This module wires the workspace crates into one [`PhotoCurator`] facade:
//! the model registry, cache store and loader, the retry/fallback
//! orchestrator, and the clustering and curation engines. Hosts construct it
//! once and share it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use tracing::{debug, info};

use common::photos::{PhotoItem, ScoredItem};
use common::utils::format_bytes;
use curation_engine::{
    diff_feedback, ClusterSet, ClusteringEngine, ClusteringParams, CurationGoal, Curator, FeedbackDiff,
};
use model_manager::{
    ArtifactRuntime, CleanupReport, ErrorHandler, FallbackTable, LoadOrchestrator, LoadOutcome, LoaderOptions,
    ModelLoader, ModelRegistry, ProgressCallback, SourceFetcher,
};
use settings::{ConfigManager, CuratorSettings};
use storage_adapter::FilesystemCacheStore;

pub use common;
pub use curation_engine;
pub use model_manager;
pub use settings;

/// Entry point of the curation core
pub struct PhotoCurator {
    /// Settings the curator was built from
    settings: Arc<CuratorSettings>,

    /// Single-flight model loader
    loader: ModelLoader,

    /// Retry and fallback layer over the loader
    orchestrator: LoadOrchestrator,

    /// Clustering with the configured parameters
    clustering: ClusteringEngine,

    /// Ranking and selection
    curator: Curator,
}

impl PhotoCurator {
    /// Builds the curator from layered configuration
    pub async fn from_config(config: &ConfigManager) -> Result<Self> {
        Self::new(config.settings().clone()).await
    }

    /// Builds the curator from typed settings
    pub async fn new(settings: CuratorSettings) -> Result<Self> {
        info!("Initializing photo curator");

        let registry = Arc::new(Self::build_registry(&settings)?);

        let store = FilesystemCacheStore::open(&settings.cache.dir)
            .await
            .with_context(|| format!("Failed to open model cache at {:?}", settings.cache.dir))?;

        let fetcher = SourceFetcher::new(settings.registry.fetch_timeout())
            .context("Failed to create model fetcher")?;

        let loader = ModelLoader::new(
            registry.clone(),
            Arc::new(store),
            Arc::new(fetcher),
            Arc::new(ArtifactRuntime::default()),
            LoaderOptions::from(&settings.cache),
        );

        let handler = ErrorHandler::from_settings(&settings.retry, &registry, FallbackTable::builtin());
        let orchestrator = LoadOrchestrator::new(loader.clone(), Arc::new(handler));

        let params = ClusteringParams::from(&settings.clustering);

        debug!(
            models = registry.len(),
            cache_dir = ?settings.cache.dir,
            cached = %format_bytes(loader.cached_bytes()),
            "Photo curator ready"
        );

        Ok(Self {
            settings: Arc::new(settings),
            loader,
            orchestrator,
            clustering: ClusteringEngine::new(params),
            curator: Curator::new(params),
        })
    }

    fn build_registry(settings: &CuratorSettings) -> Result<ModelRegistry> {
        match &settings.registry.catalog {
            Some(path) => ModelRegistry::from_file(path)
                .with_context(|| format!("Failed to read model catalog {:?}", path)),
            None => Ok(ModelRegistry::builtin(&settings.registry.base_url)),
        }
    }

    pub fn settings(&self) -> &CuratorSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.loader.registry()
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        self.orchestrator.handler()
    }

    /// Loads a model with retries and fallbacks
    pub async fn load_model(&self, name: &str, progress: Option<ProgressCallback>) -> Result<LoadOutcome> {
        let outcome = self
            .orchestrator
            .load(name, progress)
            .await
            .with_context(|| format!("Failed to load model {}", name))?;
        Ok(outcome)
    }

    /// Like [`load_model`](Self::load_model) but stops waiting after `timeout`
    pub async fn load_model_with_timeout(
        &self,
        name: &str,
        timeout: Duration,
        progress: Option<ProgressCallback>,
    ) -> Result<LoadOutcome> {
        let outcome = self
            .orchestrator
            .load_with_timeout(name, timeout, progress)
            .await
            .with_context(|| format!("Failed to load model {}", name))?;
        Ok(outcome)
    }

    /// Releases a resident model; the cached artifact stays on disk
    pub fn unload_model(&self, name: &str) -> Result<bool> {
        Ok(self.loader.unload(name)?)
    }

    /// Evicts cached artifacts until the cache is under its cap
    pub async fn cleanup_cache(&self) -> Result<CleanupReport> {
        let report = self.loader.cleanup().await.context("Cache cleanup failed")?;
        Ok(report)
    }

    /// Runs the time, location and visual clustering passes
    pub fn cluster(&self, items: &[PhotoItem]) -> Result<ClusterSet> {
        Ok(self.clustering.cluster_all(items)?)
    }

    /// Ranks the items passing the goal's filters
    pub fn curate(&self, items: &[PhotoItem], goal: &CurationGoal, target_count: Option<usize>) -> Result<Vec<ScoredItem>> {
        Ok(self.curator.curate(items, goal, target_count)?)
    }

    /// Selects `target_count` items spread across the collection's moments
    pub fn smart_select(&self, items: &[PhotoItem], goal: &CurationGoal, target_count: usize) -> Result<Vec<ScoredItem>> {
        Ok(self.curator.smart_select(items, goal, target_count)?)
    }

    /// Diffs a proposed selection against what the user kept
    pub fn feedback<I, J, S, T>(&self, original: I, user_final: J) -> FeedbackDiff
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        diff_feedback(original, user_final)
    }
}

/// Reads a JSON array of photo items
pub fn read_photos(path: &Path) -> Result<Vec<PhotoItem>> {
    let data = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let items: Vec<PhotoItem> =
        serde_json::from_str(&data).with_context(|| format!("Failed to parse photo items in {:?}", path))?;
    Ok(items)
}

/// Resolves a goal from a preset name or a JSON goal file
pub fn resolve_goal(preset: Option<&str>, goal_file: Option<&Path>) -> Result<CurationGoal> {
    match (preset, goal_file) {
        (_, Some(path)) => {
            let data = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
            let goal: CurationGoal =
                serde_json::from_str(&data).with_context(|| format!("Failed to parse goal in {:?}", path))?;
            Ok(goal)
        }
        (Some(name), None) => Ok(CurationGoal::preset(name)?),
        (None, None) => Ok(CurationGoal::best_of()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use common::error::Error;
    use common::models::LoadSource;
    use tempfile::TempDir;

    /// Writes artifacts and a catalog pointing at them; `missing` models get
    /// a source that does not exist
    fn write_catalog(dir: &Path, models: &[(&str, &[&str])], missing: &[&str]) -> std::path::PathBuf {
        let mut entries = Vec::new();

        for (name, features) in models {
            let artifact = dir.join(format!("{}.bin", name));
            if !missing.contains(name) {
                std::fs::write(&artifact, vec![7u8; 1024]).unwrap();
            }
            entries.push(serde_json::json!({
                "name": name,
                "source": format!("file://{}", artifact.display()),
                "version": "1.0.0",
                "size_bytes": 1024,
                "features": features,
                "priority": "standard",
            }));
        }

        let catalog = dir.join("catalog.json");
        std::fs::write(&catalog, serde_json::to_string(&entries).unwrap()).unwrap();
        catalog
    }

    async fn curator(dir: &TempDir, missing: &[&str]) -> PhotoCurator {
        let catalog = write_catalog(
            dir.path(),
            &[
                ("face-detector", &["faces", "group-shots"]),
                ("face-detector-lite", &["faces"]),
            ],
            missing,
        );

        let config = ConfigManager::builder()
            .set("cache.dir", dir.path().join("cache").display())
            .set("registry.catalog", catalog.display())
            .set("retry.base_delay_ms", 1)
            .set("retry.max_delay_ms", 5)
            .build()
            .unwrap();

        PhotoCurator::from_config(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_load_from_local_catalog() {
        let dir = TempDir::new().unwrap();
        let curator = curator(&dir, &[]).await;
        assert_eq!(curator.registry().len(), 2);

        let first = curator.load_model("face-detector", None).await.unwrap();
        assert_eq!(first.served_by, "face-detector");
        assert_eq!(first.source, LoadSource::Remote);
        assert!(!first.used_fallback());

        let second = curator.load_model("face-detector", None).await.unwrap();
        assert_eq!(second.source, LoadSource::Memory);

        assert!(curator.unload_model("face-detector").unwrap());
        let third = curator.load_model("face-detector", None).await.unwrap();
        assert_eq!(third.source, LoadSource::Disk);

        let report = curator.cleanup_cache().await.unwrap();
        assert!(report.evicted.is_empty());
        assert_eq!(report.remaining_bytes, 1024);
    }

    #[tokio::test]
    async fn test_missing_model_falls_back() {
        let dir = TempDir::new().unwrap();
        let curator = curator(&dir, &["face-detector"]).await;

        let outcome = curator.load_model("face-detector", None).await.unwrap();
        assert_eq!(outcome.served_by, "face-detector-lite");
        assert!(outcome.used_fallback());
        assert_eq!(outcome.degraded_features, vec!["group-shots".to_string()]);
        assert!(outcome.user_message.is_some());

        assert!(!curator.error_handler().history_for("face-detector").is_empty());
    }

    #[tokio::test]
    async fn test_unknown_model_error_is_typed() {
        let dir = TempDir::new().unwrap();
        let curator = curator(&dir, &[]).await;

        let err = curator.load_model("nope", None).await.unwrap_err();
        let root = err.downcast_ref::<Error>().unwrap();
        assert!(root.is_not_found());
    }

    #[tokio::test]
    async fn test_curation_through_facade() {
        let dir = TempDir::new().unwrap();
        let curator = curator(&dir, &[]).await;

        let base = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut items = Vec::new();
        for (i, minutes) in [0, 30, 90, 300].iter().enumerate() {
            let mut item = PhotoItem::new(format!("p{}", i), base + ChronoDuration::minutes(*minutes));
            item.face_count = (i % 2) as u32;
            items.push(item);
        }

        let clusters = curator.cluster(&items).unwrap();
        assert_eq!(clusters.time.len(), 2);
        assert!(clusters.location.is_empty());

        let goal = resolve_goal(Some("portraits"), None).unwrap();
        assert_eq!(goal.name, "portraits");

        let curated = curator.curate(&items, &CurationGoal::best_of(), Some(2)).unwrap();
        assert_eq!(curated.len(), 2);

        let selected = curator.smart_select(&items, &CurationGoal::best_of(), 2).unwrap();
        let ids: Vec<_> = selected.iter().map(|s| s.id.clone()).collect();
        assert!(ids.contains(&"p3".to_string()));

        let diff = curator.feedback(&ids, ["p0"]);
        assert_eq!(diff.added.len() + diff.accepted.len(), 1);
    }

    #[test]
    fn test_read_photos_and_goal_file() {
        let dir = TempDir::new().unwrap();

        let photos = dir.path().join("photos.json");
        std::fs::write(
            &photos,
            r#"[{"id": "a", "timestamp": "2024-06-01T10:00:00Z", "faceCount": 2, "isFavorite": true}]"#,
        )
        .unwrap();
        let items = read_photos(&photos).unwrap();
        assert_eq!(items[0].face_count, 2);
        assert!(items[0].is_favorite);

        let goal_path = dir.path().join("goal.json");
        std::fs::write(&goal_path, r#"{"name": "kids", "filters": {"minFaces": 1}}"#).unwrap();
        let goal = resolve_goal(Some("landscapes"), Some(&goal_path)).unwrap();
        assert_eq!(goal.name, "kids");
        assert_eq!(goal.filters.min_faces, Some(1));

        assert!(resolve_goal(Some("nope"), None).is_err());
    }
}
