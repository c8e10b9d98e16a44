//! Model lifecycle management for Photo Curator
//!
//! This crate resolves model names to resident models: a static registry, a
//! single-flight loader backed by an on-disk cache with eviction, and an
//! orchestrator that retries failed loads and falls back to lighter models.

pub mod fallback;
pub mod fetcher;
pub mod loader;
pub mod messages;
pub mod orchestrator;
pub mod recovery;
pub mod registry;
pub mod runtime;

// Re-export commonly used types
pub use fallback::{FallbackStrategy, FallbackTable};
pub use fetcher::{FileFetcher, HttpFetcher, ModelFetcher, ProgressCallback, SourceFetcher};
pub use loader::{CleanupReport, LoadResult, LoadStatus, LoaderOptions, ModelLoader};
pub use messages::{user_message, RecoveryAction, UserMessage};
pub use orchestrator::{LoadOrchestrator, LoadOutcome, LoadSummary};
pub use recovery::{ErrorHandler, ErrorRecord, RecoveryDecision, RetryBudgets, RetryPolicy, RetryState};
pub use registry::ModelRegistry;
pub use runtime::{ArtifactRuntime, LoadedModel, ModelRuntime};
