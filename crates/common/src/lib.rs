//! Common utilities and types for Photo Curator
//!
//! This crate provides shared functionality used across the Photo Curator
//! workspace, including the error taxonomy, the model and photo data model,
//! and utility functions.

pub mod error;
pub mod models;
pub mod photos;
pub mod utils;

// Re-export commonly used types
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use photos::*;
