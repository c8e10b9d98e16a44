//! Configuration management for Photo Curator
//!
//! This crate layers built-in defaults, an optional TOML file and environment
//! variables into a typed, validated [`CuratorSettings`].

pub mod defaults;
pub mod manager;
pub mod schema;

// Re-export commonly used types
pub use defaults::DefaultConfig;
pub use manager::{ConfigManager, ConfigManagerBuilder};
pub use schema::{
    CacheSettings, ClusteringSettings, CuratorSettings, LoggingSettings, RegistrySettings, RetrySettings,
};
