//! Logging for Photo Curator
//!
//! This crate installs the global `tracing` subscriber: an environment-driven
//! filter, human-readable or JSON output on stderr, and optional daily-rolling
//! log files.

pub mod logger;

// Re-export commonly used types
pub use logger::{Logger, LoggingGuard};
