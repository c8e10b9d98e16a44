//! Model registry
//!
//! Static catalog of the models the application knows about. Built once at
//! startup and shared read-only.

use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use common::error::{Error, Result};
use common::models::{ModelDescriptor, ModelPriority};

const MIB: u64 = 1024 * 1024;

/// Catalog of model descriptors keyed by name
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    /// Creates a registry; names must be unique
    pub fn new(descriptors: Vec<ModelDescriptor>) -> Result<Self> {
        let mut models = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if descriptor.name.is_empty() {
                return Err(Error::InvalidArgument("Model name must not be empty".to_string()));
            }

            let name = descriptor.name.clone();
            if models.insert(name.clone(), descriptor).is_some() {
                return Err(Error::InvalidArgument(format!("Duplicate model in registry: {}", name)));
            }
        }

        Ok(Self { models })
    }

    /// Built-in catalog; sources are resolved relative to `base_url`
    pub fn builtin(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let source = |name: &str, version: &str| format!("{}/{}/{}/model.bin", base, name, version);

        let entry = |name: &str, version: &str, mib: u64, features: &[&str], priority| {
            ModelDescriptor::new(name, source(name, version), version, mib * MIB, features, priority)
        };

        let descriptors = vec![
            entry("face-detector", "2.1.0", 8, &["faces", "group-shots"], ModelPriority::Critical),
            entry("face-detector-lite", "1.4.0", 2, &["faces"], ModelPriority::Standard),
            entry("face-embedder", "1.2.0", 20, &["people-grouping"], ModelPriority::Standard),
            entry("image-embedder", "3.0.0", 60, &["visual-similarity", "duplicates"], ModelPriority::Critical),
            entry("image-embedder-lite", "1.1.0", 15, &["visual-similarity"], ModelPriority::Standard),
            entry("aesthetic-scorer", "1.3.0", 12, &["quality-scoring"], ModelPriority::Standard),
            entry("aesthetic-scorer-lite", "1.0.0", 3, &["quality-scoring"], ModelPriority::Optional),
            entry("expression-classifier", "1.0.2", 5, &["smiles", "eyes-open"], ModelPriority::Optional),
            entry("scene-classifier", "2.0.0", 25, &["scene-labels"], ModelPriority::Optional),
        ];

        let models = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.name.clone(), descriptor))
            .collect();

        Self { models }
    }

    /// Parses a JSON array of descriptors
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptors: Vec<ModelDescriptor> = serde_json::from_str(json)?;
        Self::new(descriptors)
    }

    /// Reads a JSON catalog file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&json)?;
        info!("Loaded {} model descriptors from {:?}", registry.len(), path);
        Ok(registry)
    }

    /// Looks up a model by name
    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.get(name)
    }

    /// Looks up a model by name, failing if it is unknown
    pub fn require(&self, name: &str) -> Result<&ModelDescriptor> {
        self.get(name)
            .ok_or_else(|| Error::NotFound(format!("Model not in registry: {}", name)))
    }

    /// All descriptors, sorted by name
    pub fn list(&self) -> Vec<&ModelDescriptor> {
        let mut descriptors: Vec<_> = self.models.values().collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Descriptors unlocking a feature tag, sorted by name
    pub fn models_for_feature(&self, feature: &str) -> Vec<&ModelDescriptor> {
        self.list()
            .into_iter()
            .filter(|descriptor| descriptor.unlocks(feature))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
