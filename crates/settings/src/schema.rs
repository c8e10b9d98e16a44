//! Typed configuration schema
//!
//! The layered configuration is deserialized into [`CuratorSettings`] and
//! validated once at startup.

use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use common::error::{Error, Result};

/// Root of the typed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratorSettings {
    /// Model cache settings
    pub cache: CacheSettings,

    /// Model catalog and source settings
    pub registry: RegistrySettings,

    /// Retry and fallback settings
    pub retry: RetrySettings,

    /// Default clustering parameters
    pub clustering: ClusteringSettings,

    /// Logging settings
    pub logging: LoggingSettings,
}

/// Model cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Directory holding cached artifacts and the metadata index
    pub dir: PathBuf,

    /// Cap on total cached bytes on disk
    pub max_bytes: u64,

    /// Cap on total bytes of resident (in-memory) models
    pub max_resident_bytes: u64,

    /// Run cache cleanup after every fresh download
    pub auto_cleanup: bool,
}

/// Model catalog and source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Base URL the built-in catalog resolves model sources against
    pub base_url: String,

    /// JSON catalog replacing the built-in one
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// Overall timeout for a single HTTP fetch
    pub fetch_timeout_secs: u64,
}

impl RegistrySettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Retry and fallback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Delay before the first retry
    pub base_delay_ms: u64,

    /// Exponential backoff multiplier
    pub multiplier: f64,

    /// Upper bound on any single delay
    pub max_delay_ms: u64,

    /// Maximum random jitter as a fraction of the delay
    pub jitter_ratio: f64,

    /// Number of classified errors kept for diagnostics
    pub history_capacity: usize,

    /// Attempt budget for critical models
    pub critical_attempts: u32,

    /// Attempt budget for standard models
    pub standard_attempts: u32,

    /// Attempt budget for optional models
    pub optional_attempts: u32,
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Default clustering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringSettings {
    /// Maximum gap between consecutive photos of one time cluster
    pub time_window_hours: f64,

    /// Maximum distance from the seed photo of a location cluster
    pub location_radius_km: f64,

    /// Minimum similarity to join a visual cluster
    pub visual_threshold: f32,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter directive, e.g. `info` or `model_manager=debug`
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,

    /// Also write daily-rolling log files into this directory
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl CuratorSettings {
    /// Checks cross-field constraints the deserializer cannot express
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_bytes == 0 {
            return Err(Error::Config("cache.max_bytes must be greater than zero".to_string()));
        }

        if self.cache.max_resident_bytes == 0 {
            return Err(Error::Config("cache.max_resident_bytes must be greater than zero".to_string()));
        }

        if self.registry.fetch_timeout_secs == 0 {
            return Err(Error::Config("registry.fetch_timeout_secs must be greater than zero".to_string()));
        }

        if self.retry.multiplier < 1.0 {
            return Err(Error::Config(format!(
                "retry.multiplier must be at least 1.0, got {}",
                self.retry.multiplier
            )));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(Error::Config(format!(
                "retry.jitter_ratio must be within [0, 1], got {}",
                self.retry.jitter_ratio
            )));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }

        if self.retry.history_capacity == 0 {
            return Err(Error::Config("retry.history_capacity must be greater than zero".to_string()));
        }

        if self.clustering.time_window_hours < 0.0 || self.clustering.location_radius_km < 0.0 {
            return Err(Error::Config("clustering windows must not be negative".to_string()));
        }

        if !(0.0..=1.0).contains(&self.clustering.visual_threshold) {
            return Err(Error::Config(format!(
                "clustering.visual_threshold must be within [0, 1], got {}",
                self.clustering.visual_threshold
            )));
        }

        Ok(())
    }
}
