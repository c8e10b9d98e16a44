//! Curation goals
//!
//! A goal pairs hard filters with the weights of the composite score. Goals
//! arrive as JSON from the host or come from the built-in presets.

use serde::{Deserialize, Serialize};

use common::error::{Error, Result};

/// Hard filters; unset filters accept everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoalFilters {
    pub min_faces: Option<u32>,
    pub max_faces: Option<u32>,
    pub require_smiles: Option<bool>,
    pub landscape_only: Option<bool>,
    pub portrait_only: Option<bool>,
}

/// Weights of the four score factors
///
/// Weights are used as given; they need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalWeights {
    pub technical: f32,
    pub compositional: f32,
    pub content: f32,
    pub personal: f32,
}

impl Default for GoalWeights {
    fn default() -> Self {
        Self {
            technical: 0.35,
            compositional: 0.25,
            content: 0.25,
            personal: 0.15,
        }
    }
}

impl GoalWeights {
    pub fn new(technical: f32, compositional: f32, content: f32, personal: f32) -> Self {
        Self {
            technical,
            compositional,
            content,
            personal,
        }
    }
}

/// A named curation objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurationGoal {
    #[serde(default = "default_goal_name")]
    pub name: String,

    #[serde(default)]
    pub filters: GoalFilters,

    #[serde(default)]
    pub weights: GoalWeights,
}

fn default_goal_name() -> String {
    "custom".to_string()
}

impl Default for CurationGoal {
    fn default() -> Self {
        Self::best_of()
    }
}

/// Names accepted by [`CurationGoal::preset`]
pub const PRESET_NAMES: &[&str] = &["best-of", "portraits", "landscapes", "group-shots", "favorites"];

impl CurationGoal {
    pub fn new(name: impl Into<String>, filters: GoalFilters, weights: GoalWeights) -> Self {
        Self {
            name: name.into(),
            filters,
            weights,
        }
    }

    /// Overall best photos, no filters
    pub fn best_of() -> Self {
        Self::new("best-of", GoalFilters::default(), GoalWeights::default())
    }

    /// Close-ups of one or two people in portrait frame
    pub fn portraits() -> Self {
        let filters = GoalFilters {
            min_faces: Some(1),
            max_faces: Some(2),
            portrait_only: Some(true),
            ..GoalFilters::default()
        };
        Self::new("portraits", filters, GoalWeights::new(0.25, 0.2, 0.45, 0.1))
    }

    /// Scenery without people in landscape frame
    pub fn landscapes() -> Self {
        let filters = GoalFilters {
            max_faces: Some(0),
            landscape_only: Some(true),
            ..GoalFilters::default()
        };
        Self::new("landscapes", filters, GoalWeights::new(0.4, 0.45, 0.05, 0.1))
    }

    /// Three or more people, someone smiling
    pub fn group_shots() -> Self {
        let filters = GoalFilters {
            min_faces: Some(3),
            require_smiles: Some(true),
            ..GoalFilters::default()
        };
        Self::new("group-shots", filters, GoalWeights::new(0.2, 0.2, 0.5, 0.1))
    }

    /// Leans on what the user already marked as favorite
    pub fn favorites() -> Self {
        Self::new("favorites", GoalFilters::default(), GoalWeights::new(0.2, 0.1, 0.2, 0.5))
    }

    /// Resolves a built-in goal by name
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "best-of" => Ok(Self::best_of()),
            "portraits" => Ok(Self::portraits()),
            "landscapes" => Ok(Self::landscapes()),
            "group-shots" => Ok(Self::group_shots()),
            "favorites" => Ok(Self::favorites()),
            _ => Err(Error::NotFound(format!(
                "Unknown goal preset '{}', expected one of: {}",
                name,
                PRESET_NAMES.join(", ")
            ))),
        }
    }

    /// Rejects contradictory filters and non-finite or negative weights
    pub fn validate(&self) -> Result<()> {
        let filters = &self.filters;

        if let (Some(min), Some(max)) = (filters.min_faces, filters.max_faces) {
            if min > max {
                return Err(Error::InvalidArgument(format!(
                    "Goal '{}' has minFaces {} above maxFaces {}",
                    self.name, min, max
                )));
            }
        }

        if filters.landscape_only == Some(true) && filters.portrait_only == Some(true) {
            return Err(Error::InvalidArgument(format!(
                "Goal '{}' cannot be both landscape-only and portrait-only",
                self.name
            )));
        }

        let w = &self.weights;
        for (factor, weight) in [
            ("technical", w.technical),
            ("compositional", w.compositional),
            ("content", w.content),
            ("personal", w.personal),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::InvalidArgument(format!(
                    "Goal '{}' has an invalid {} weight: {}",
                    self.name, factor, weight
                )));
            }
        }

        Ok(())
    }
}
