//! Built-in configuration defaults
//!
//! Every key the typed schema reads has a default here, so an empty
//! environment and no config file still yield a valid configuration.

use std::path::PathBuf;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError};

/// Default cache cap: 512 MiB of model artifacts on disk
pub const DEFAULT_CACHE_MAX_BYTES: i64 = 512 * 1024 * 1024;

/// Default resident budget: 256 MiB of models held in memory
pub const DEFAULT_MAX_RESIDENT_BYTES: i64 = 256 * 1024 * 1024;

/// Default base URL of the built-in model catalog
pub const DEFAULT_MODEL_BASE_URL: &str = "https://models.photo-curator.app/v1";

/// Name of the application directory under the platform config/cache dirs
pub const APP_DIR_NAME: &str = "photo-curator";

/// Default configuration values
pub struct DefaultConfig;

impl DefaultConfig {
    /// Platform cache directory for model artifacts
    pub fn cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join(APP_DIR_NAME)
            .join("models")
    }

    /// Platform location of the optional TOML config file
    pub fn config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("curator.toml"))
    }

    /// Registers all defaults on a builder
    pub fn apply(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            // Model cache
            .set_default("cache.dir", Self::cache_dir().to_string_lossy().to_string())?
            .set_default("cache.max_bytes", DEFAULT_CACHE_MAX_BYTES)?
            .set_default("cache.max_resident_bytes", DEFAULT_MAX_RESIDENT_BYTES)?
            .set_default("cache.auto_cleanup", true)?
            // Model catalog
            .set_default("registry.base_url", DEFAULT_MODEL_BASE_URL)?
            .set_default("registry.fetch_timeout_secs", 300_i64)?
            // Retry policy
            .set_default("retry.base_delay_ms", 500_i64)?
            .set_default("retry.multiplier", 2.0)?
            .set_default("retry.max_delay_ms", 30_000_i64)?
            .set_default("retry.jitter_ratio", 0.1)?
            .set_default("retry.history_capacity", 50_i64)?
            .set_default("retry.critical_attempts", 5_i64)?
            .set_default("retry.standard_attempts", 3_i64)?
            .set_default("retry.optional_attempts", 1_i64)?
            // Clustering
            .set_default("clustering.time_window_hours", 2.0)?
            .set_default("clustering.location_radius_km", 1.0)?
            .set_default("clustering.visual_threshold", 0.85)?
            // Logging
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)
    }
}
