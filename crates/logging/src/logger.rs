//! Subscriber initialisation
//!
//! `RUST_LOG` wins over the configured level so a single run can be made
//! verbose without touching the config file.

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use common::error::{Error, Result};
use settings::LoggingSettings;

/// File name prefix of rolling log files
pub const LOG_FILE_PREFIX: &str = "curator.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background file writer alive; drop it on shutdown to flush
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Global logger setup
pub struct Logger;

impl Logger {
    /// Installs the global subscriber
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(settings: &LoggingSettings) -> Result<LoggingGuard> {
        let filter = Self::build_filter(&settings.level)?;

        let mut layers: Vec<BoxedLayer> = Vec::new();

        let stderr_layer = if settings.json {
            fmt::layer().json().with_writer(std::io::stderr).boxed()
        } else {
            fmt::layer().with_target(true).with_writer(std::io::stderr).boxed()
        };
        layers.push(stderr_layer);

        let file_guard = match &settings.directory {
            Some(directory) => {
                let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
                Some(guard)
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e)))?;

        info!(
            level = %settings.level,
            json = settings.json,
            directory = ?settings.directory,
            "Logging initialised"
        );

        Ok(LoggingGuard {
            _file_guard: file_guard,
        })
    }

    /// Builds the filter from `RUST_LOG`, falling back to `default_level`
    pub fn build_filter(default_level: &str) -> Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(default_level).map_err(|e| {
                Error::Config(format!("Invalid log level '{}': {}", default_level, e))
            }),
        }
    }
}
