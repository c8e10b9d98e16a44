//! Curation engine for Photo Curator
//!
//! Groups a photo collection by time, place and visual similarity, then
//! scores and selects photos against a curation goal. Everything here is
//! synchronous and free of shared mutable state.

pub mod clustering;
pub mod curator;
pub mod feedback;
pub mod filters;
pub mod geo;
pub mod goals;
pub mod input;
pub mod scoring;
pub mod similarity;

// Re-export commonly used types
pub use clustering::{
    cluster_by_location, cluster_by_time, cluster_by_visual_similarity, ClusterSet, ClusteringEngine,
    ClusteringParams,
};
pub use curator::Curator;
pub use feedback::{diff_feedback, FeedbackDiff};
pub use filters::apply_filters;
pub use goals::{CurationGoal, GoalFilters, GoalWeights};
pub use scoring::{factor_scores, score};
pub use similarity::{compare, find_similar, normalize, normalize_in_place, SimilarMatch};
