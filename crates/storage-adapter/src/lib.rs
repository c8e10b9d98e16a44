//! Persistent storage for Photo Curator
//!
//! This crate provides the key-value area that holds downloaded model
//! artifacts together with their metadata records, keyed by model name.

pub mod filesystem;
pub mod memory;
pub mod store;

// Re-export commonly used types
pub use filesystem::FilesystemCacheStore;
pub use memory::MemoryCacheStore;
pub use store::CacheStore;
