//! Load orchestration with retry and fallback
//!
//! Drives [`ModelLoader`] through the decisions of [`ErrorHandler`]: failed
//! attempts are retried after a backoff delay until the model's budget is
//! spent, then the first configured fallback model is tried under the same
//! policy. If nothing succeeds, the error of the originally requested model is
//! returned unchanged.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tracing::{info, warn};

use common::error::Result;
use common::models::LoadSource;
use common::utils::execute_with_timeout;

use crate::fetcher::ProgressCallback;
use crate::loader::ModelLoader;
use crate::recovery::{ErrorHandler, RetryState};
use crate::runtime::LoadedModel;

/// Result of an orchestrated load
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// Model the caller asked for
    pub requested: String,

    /// Model that actually serves the request
    pub served_by: String,

    /// The resident model
    pub model: Arc<LoadedModel>,

    /// Where the serving model came from
    pub source: LoadSource,

    /// Attempts across the whole fallback chain
    pub attempts: u32,

    /// Total wall time, retry delays included
    pub load_time_ms: u64,

    /// Features unavailable because a fallback is serving
    pub degraded_features: Vec<String>,

    /// Message to show when degraded
    pub user_message: Option<String>,
}

impl LoadOutcome {
    pub fn used_fallback(&self) -> bool {
        self.requested != self.served_by
    }

    pub fn from_cache(&self) -> bool {
        self.source.is_cached()
    }

    /// Serializable summary without the model handle
    pub fn summary(&self) -> LoadSummary {
        LoadSummary {
            requested: self.requested.clone(),
            served_by: self.served_by.clone(),
            version: self.model.version.clone(),
            source: self.source,
            attempts: self.attempts,
            load_time_ms: self.load_time_ms,
            degraded_features: self.degraded_features.clone(),
            user_message: self.user_message.clone(),
        }
    }
}

/// Printable view of a [`LoadOutcome`]
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub requested: String,
    pub served_by: String,
    pub version: String,
    pub source: LoadSource,
    pub attempts: u32,
    pub load_time_ms: u64,
    pub degraded_features: Vec<String>,
    pub user_message: Option<String>,
}

/// Loads models with retries and fallbacks
#[derive(Clone)]
pub struct LoadOrchestrator {
    loader: ModelLoader,
    handler: Arc<ErrorHandler>,
}

impl LoadOrchestrator {
    pub fn new(loader: ModelLoader, handler: Arc<ErrorHandler>) -> Self {
        Self { loader, handler }
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    pub fn handler(&self) -> &Arc<ErrorHandler> {
        &self.handler
    }

    /// Loads a model, retrying and falling back as configured
    pub async fn load(&self, name: &str, progress: Option<ProgressCallback>) -> Result<LoadOutcome> {
        let start = Instant::now();
        let mut visited = HashSet::new();

        let mut outcome = self.load_chain(name, progress, &mut visited).await?;
        outcome.load_time_ms = start.elapsed().as_millis() as u64;

        if outcome.used_fallback() {
            info!(
                requested = %outcome.requested,
                served_by = %outcome.served_by,
                attempts = outcome.attempts,
                degraded = ?outcome.degraded_features,
                "Serving model request with a fallback"
            );
        }

        Ok(outcome)
    }

    /// Like [`load`](Self::load), but gives up waiting after `timeout`
    pub async fn load_with_timeout(
        &self,
        name: &str,
        timeout: Duration,
        progress: Option<ProgressCallback>,
    ) -> Result<LoadOutcome> {
        execute_with_timeout(self.load(name, progress), timeout, &format!("load of model {}", name)).await
    }

    fn load_chain<'a>(
        &'a self,
        name: &'a str,
        progress: Option<ProgressCallback>,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<LoadOutcome>> {
        async move {
            visited.insert(name.to_string());
            let mut state = RetryState::new(name);

            loop {
                let attempt = state.begin_attempt();

                let error = match self.loader.load(name, progress.clone()).await {
                    Ok(result) => {
                        return Ok(LoadOutcome {
                            requested: name.to_string(),
                            served_by: name.to_string(),
                            model: result.model,
                            source: result.source,
                            attempts: attempt,
                            load_time_ms: result.load_time_ms,
                            degraded_features: Vec::new(),
                            user_message: None,
                        });
                    }
                    Err(error) => error,
                };

                let decision = self.handler.handle(&error, name, attempt);
                state.record_failure(&error, &decision);

                if decision.should_retry {
                    warn!(
                        model = %name,
                        attempt,
                        error = %error,
                        delay_ms = decision.delay.as_millis() as u64,
                        "Model load failed, retrying"
                    );
                    tokio::time::sleep(decision.delay).await;
                    continue;
                }

                let fallback = decision
                    .fallback_model
                    .filter(|candidate| !visited.contains(candidate));

                if let Some(fallback) = fallback {
                    warn!(model = %name, fallback = %fallback, "Switching to fallback model");

                    match self.load_chain(&fallback, progress.clone(), visited).await {
                        Ok(mut outcome) => {
                            outcome.requested = name.to_string();
                            outcome.attempts += state.attempts;

                            if let Some(strategy) = self.handler.fallback_strategy(name) {
                                for feature in &strategy.degraded_features {
                                    if !outcome.degraded_features.contains(feature) {
                                        outcome.degraded_features.push(feature.clone());
                                    }
                                }
                                outcome.user_message = Some(strategy.user_message.clone());
                            }

                            return Ok(outcome);
                        }
                        Err(fallback_error) => {
                            warn!(
                                model = %name,
                                fallback = %fallback,
                                error = %fallback_error,
                                "Fallback model failed too"
                            );
                        }
                    }
                }

                return Err(error);
            }
        }
        .boxed()
    }
}
