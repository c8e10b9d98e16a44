//! Model catalog and cache records
//!
//! This module defines the data model shared by the registry, the cache store
//! and the loader.

use std::fmt;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Priority class of a model; drives the retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPriority {
    /// Core features depend on the model
    Critical,
    /// Regular feature model
    Standard,
    /// Peripheral, nice-to-have model
    Optional,
}

impl fmt::Display for ModelPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelPriority::Critical => write!(f, "critical"),
            ModelPriority::Standard => write!(f, "standard"),
            ModelPriority::Optional => write!(f, "optional"),
        }
    }
}

/// Static description of a model, defined at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique model name
    pub name: String,

    /// Source locator (URL or filesystem path)
    pub source: String,

    /// Model version
    pub version: String,

    /// Expected artifact size in bytes
    pub size_bytes: u64,

    /// Feature tags this model unlocks
    pub features: Vec<String>,

    /// Hex-encoded SHA-256 of the artifact, if known
    #[serde(default)]
    pub sha256: Option<String>,

    /// Priority class
    pub priority: ModelPriority,
}

impl ModelDescriptor {
    /// Creates a descriptor with no checksum
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        version: impl Into<String>,
        size_bytes: u64,
        features: &[&str],
        priority: ModelPriority,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            version: version.into(),
            size_bytes,
            features: features.iter().map(|f| f.to_string()).collect(),
            sha256: None,
            priority,
        }
    }

    /// Returns true if the model unlocks the given feature tag
    pub fn unlocks(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

/// Metadata record for an artifact persisted in the cache store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedModelRecord {
    /// Model name
    pub model_name: String,

    /// Version of the cached artifact
    pub version: String,

    /// When the artifact was written
    pub cached_at: DateTime<Utc>,

    /// Artifact size in bytes
    pub size_bytes: u64,

    /// On-disk location of the artifact
    pub location: PathBuf,
}

/// Where a load result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// Model was already resident
    Memory,
    /// Model was read from the on-disk cache
    Disk,
    /// Model was fetched from its source locator
    Remote,
}

impl LoadSource {
    /// Returns true unless the artifact had to be fetched
    pub fn is_cached(&self) -> bool {
        !matches!(self, LoadSource::Remote)
    }
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadSource::Memory => write!(f, "memory"),
            LoadSource::Disk => write!(f, "disk"),
            LoadSource::Remote => write!(f, "remote"),
        }
    }
}
