//! Configuration manager
//!
//! Layers built-in defaults, an optional TOML file, `CURATOR__*` environment
//! variables and programmatic overrides, in that order of precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;
use config::{Config, Environment, File};
use tracing::debug;

use common::error::{Error, Result};
use crate::defaults::DefaultConfig;
use crate::schema::CuratorSettings;

/// Prefix of environment variables read by the manager
pub const ENV_PREFIX: &str = "CURATOR";

fn config_error(err: config::ConfigError) -> Error {
    Error::Config(err.to_string())
}

/// Configuration manager
pub struct ConfigManager {
    /// Raw layered configuration, for keyed access
    config: Config,

    /// Typed, validated view of the same configuration
    settings: CuratorSettings,
}

/// Builder for [`ConfigManager`]
#[derive(Debug, Default)]
pub struct ConfigManagerBuilder {
    file: Option<PathBuf>,
    use_env: bool,
    overrides: Vec<(String, String)>,
}

impl ConfigManagerBuilder {
    /// Reads the given TOML file; a missing file is not an error
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Reads `CURATOR__SECTION__KEY` environment variables
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Sets a key with the highest precedence
    pub fn set(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.overrides.push((key.into(), value.to_string()));
        self
    }

    /// Builds and validates the configuration
    pub fn build(self) -> Result<ConfigManager> {
        let mut builder = DefaultConfig::apply(Config::builder()).map_err(config_error)?;

        if let Some(path) = &self.file {
            debug!("Reading configuration file {:?}", path);
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }

        if self.use_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        for (key, value) in &self.overrides {
            builder = builder.set_override(key.as_str(), value.as_str()).map_err(config_error)?;
        }

        let config = builder.build().map_err(config_error)?;
        let settings: CuratorSettings = config.clone().try_deserialize().map_err(config_error)?;
        settings.validate()?;

        Ok(ConfigManager { config, settings })
    }
}

impl ConfigManager {
    /// Creates a configuration from defaults, the platform config file and
    /// the environment
    pub fn new() -> Result<Self> {
        let mut builder = Self::builder().with_env();
        if let Some(path) = DefaultConfig::config_file() {
            builder = builder.file(path);
        }
        builder.build()
    }

    /// Creates a configuration from defaults, the given file and the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::builder().file(path).with_env().build()
    }

    /// Starts an empty builder (defaults only)
    pub fn builder() -> ConfigManagerBuilder {
        ConfigManagerBuilder::default()
    }

    /// Typed settings
    pub fn settings(&self) -> &CuratorSettings {
        &self.settings
    }

    /// Gets a string value
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.config.get_string(key).map_err(config_error)
    }

    /// Gets a path value
    pub fn get_path(&self, key: &str) -> Result<PathBuf> {
        self.get_string(key).map(PathBuf::from)
    }

    /// Gets a floating point value
    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.config.get_float(key).map_err(config_error)
    }

    /// Gets a non-negative integer value
    pub fn get_usize(&self, key: &str) -> Result<usize> {
        let value = self.config.get_int(key).map_err(config_error)?;
        usize::try_from(value)
            .map_err(|_| Error::Config(format!("{} must not be negative, got {}", key, value)))
    }

    /// Gets a boolean value
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.config.get_bool(key).map_err(config_error)
    }

    /// Gets a duration stored as integer milliseconds
    pub fn get_duration(&self, key: &str) -> Result<Duration> {
        self.get_usize(key).map(|ms| Duration::from_millis(ms as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let manager = ConfigManager::builder().build().unwrap();
        let settings = manager.settings();

        assert_eq!(settings.retry.critical_attempts, 5);
        assert_eq!(settings.retry.jitter_ratio, 0.1);
        assert_eq!(settings.clustering.time_window_hours, 2.0);
        assert!(settings.cache.auto_cleanup);
        assert_eq!(settings.logging.directory, None);
        assert_eq!(settings.registry.catalog, None);
        assert_eq!(settings.registry.fetch_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_keyed_getters() {
        let manager = ConfigManager::builder()
            .set("retry.base_delay_ms", 250)
            .build()
            .unwrap();

        assert_eq!(manager.get_duration("retry.base_delay_ms").unwrap(), Duration::from_millis(250));
        assert_eq!(manager.get_usize("retry.history_capacity").unwrap(), 50);
        assert_eq!(manager.get_f64("retry.multiplier").unwrap(), 2.0);
        assert!(manager.get_bool("cache.auto_cleanup").unwrap());
        assert!(manager.get_path("cache.dir").unwrap().ends_with("models"));
        assert!(manager.get_string("no.such.key").is_err());
    }

    #[test]
    fn test_file_layer_and_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[cache]\nmax_bytes = 1000\n\n[clustering]\nvisual_threshold = 0.9").unwrap();

        let manager = ConfigManager::builder()
            .file(file.path())
            .set("cache.max_bytes", 2000)
            .build()
            .unwrap();

        assert_eq!(manager.settings().cache.max_bytes, 2000);
        assert_eq!(manager.settings().clustering.visual_threshold, 0.9);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = ConfigManager::builder().set("retry.jitter_ratio", 1.5).build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = ConfigManager::builder().set("cache.max_bytes", 0).build();
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
