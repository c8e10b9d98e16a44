//! Fallback strategies
//!
//! Static table mapping a model to the models that can stand in for it once
//! its retry budget is spent, plus what the user loses in the meantime.

use std::collections::HashMap;

/// What to do when a model cannot be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackStrategy {
    /// Replacement models, in preference order
    pub fallback_models: Vec<String>,

    /// Feature tags unavailable while a fallback (or nothing) serves
    pub degraded_features: Vec<String>,

    /// Message shown to the user
    pub user_message: String,
}

impl FallbackStrategy {
    pub fn new(fallback_models: &[&str], degraded_features: &[&str], user_message: &str) -> Self {
        Self {
            fallback_models: fallback_models.iter().map(|m| m.to_string()).collect(),
            degraded_features: degraded_features.iter().map(|f| f.to_string()).collect(),
            user_message: user_message.to_string(),
        }
    }
}

/// Fallback strategies keyed by model name
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
    strategies: HashMap<String, FallbackStrategy>,
}

impl FallbackTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategies for the built-in catalog
    pub fn builtin() -> Self {
        Self::new()
            .with(
                "face-detector",
                FallbackStrategy::new(
                    &["face-detector-lite"],
                    &["group-shots"],
                    "Face detection is running in a lighter mode. Group shot detection may miss some faces.",
                ),
            )
            .with(
                "image-embedder",
                FallbackStrategy::new(
                    &["image-embedder-lite"],
                    &["duplicates"],
                    "Visual similarity is running in a lighter mode. Duplicate detection is paused.",
                ),
            )
            .with(
                "aesthetic-scorer",
                FallbackStrategy::new(
                    &["aesthetic-scorer-lite"],
                    &[],
                    "Quality scoring is using a simpler model. Rankings may be less precise.",
                ),
            )
            .with(
                "face-embedder",
                FallbackStrategy::new(&[], &["people-grouping"], "Grouping photos by person is unavailable right now."),
            )
            .with(
                "expression-classifier",
                FallbackStrategy::new(&[], &["smiles", "eyes-open"], "Smile and blink detection is unavailable right now."),
            )
            .with(
                "scene-classifier",
                FallbackStrategy::new(&[], &["scene-labels"], "Scene labels are unavailable right now."),
            )
    }

    /// Adds or replaces a strategy
    pub fn with(mut self, model_name: &str, strategy: FallbackStrategy) -> Self {
        self.strategies.insert(model_name.to_string(), strategy);
        self
    }

    /// Strategy for a model, if any
    pub fn get(&self, model_name: &str) -> Option<&FallbackStrategy> {
        self.strategies.get(model_name)
    }

    /// First fallback model for a model, if any
    pub fn first_fallback(&self, model_name: &str) -> Option<&str> {
        self.get(model_name)
            .and_then(|strategy| strategy.fallback_models.first())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelRegistry;

    #[test]
    fn test_builtin_fallbacks_exist_in_registry() {
        let table = FallbackTable::builtin();
        let registry = ModelRegistry::builtin("https://models.example.com");

        for strategy in table.strategies.values() {
            for model in &strategy.fallback_models {
                assert!(registry.get(model).is_some(), "unknown fallback {}", model);
            }
        }

        assert_eq!(table.first_fallback("face-detector"), Some("face-detector-lite"));
        assert_eq!(table.first_fallback("scene-classifier"), None);
        assert_eq!(table.first_fallback("unknown"), None);
    }
}
