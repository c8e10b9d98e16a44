//! Inference runtime seam
//!
//! Turns a verified artifact into a resident model. The concrete inference
//! backend is outside this crate; the default runtime keeps the raw artifact
//! and accounts memory the way the backend would.

use std::sync::atomic::{AtomicU64, Ordering};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use common::error::{Error, Result};
use common::models::ModelDescriptor;

/// A model held in memory and ready for inference
#[derive(Debug)]
pub struct LoadedModel {
    /// Model name
    pub name: String,

    /// Version that was loaded
    pub version: String,

    /// Feature tags unlocked by this model
    pub features: Vec<String>,

    /// Backing artifact
    pub artifact: Bytes,

    /// Resident memory footprint in bytes
    pub memory_bytes: u64,

    /// When the model became resident
    pub loaded_at: DateTime<Utc>,

    /// Logical access tick, used for LRU unloading
    last_access: AtomicU64,
}

impl LoadedModel {
    pub fn new(descriptor: &ModelDescriptor, artifact: Bytes, memory_bytes: u64) -> Self {
        Self {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            features: descriptor.features.clone(),
            artifact,
            memory_bytes,
            loaded_at: Utc::now(),
            last_access: AtomicU64::new(0),
        }
    }

    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::SeqCst)
    }

    pub(crate) fn touch(&self, tick: u64) {
        self.last_access.store(tick, Ordering::SeqCst);
    }
}

/// Backend that prepares artifacts for inference
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Initialises a model from its verified artifact
    async fn initialize(&self, descriptor: &ModelDescriptor, artifact: Bytes) -> Result<LoadedModel>;
}

/// Runtime that keeps the artifact as-is
///
/// Memory use is the artifact size plus a fixed overhead ratio for runtime
/// buffers (20% unless configured otherwise).
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRuntime {
    overhead_ratio: f64,
}

impl Default for ArtifactRuntime {
    fn default() -> Self {
        Self { overhead_ratio: 0.2 }
    }
}

impl ArtifactRuntime {
    pub fn with_overhead(overhead_ratio: f64) -> Self {
        Self {
            overhead_ratio: overhead_ratio.max(0.0),
        }
    }

    /// Estimated resident bytes for an artifact of the given size
    pub fn memory_requirement(&self, artifact_len: u64) -> u64 {
        artifact_len + (artifact_len as f64 * self.overhead_ratio) as u64
    }
}

#[async_trait]
impl ModelRuntime for ArtifactRuntime {
    async fn initialize(&self, descriptor: &ModelDescriptor, artifact: Bytes) -> Result<LoadedModel> {
        if artifact.is_empty() {
            return Err(Error::InvalidModel(format!(
                "Model {} has an empty artifact",
                descriptor.name
            )));
        }

        let memory_bytes = self.memory_requirement(artifact.len() as u64);
        Ok(LoadedModel::new(descriptor, artifact, memory_bytes))
    }
}
