//! Error classification and retry decisions
//!
//! [`ErrorHandler::handle`] turns a failed load attempt into a decision:
//! retry the same model after a backoff delay, switch to a fallback model, or
//! give up. Every classified error is kept in a bounded history for
//! diagnostics.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use common::error::{Error, ErrorKind};
use common::models::ModelPriority;
use settings::RetrySettings;

use crate::fallback::{FallbackStrategy, FallbackTable};
use crate::messages::{user_message, UserMessage};
use crate::registry::ModelRegistry;

/// Errors kept per call chain
const CHAIN_HISTORY_CAPACITY: usize = 10;

/// Exponential backoff with bounded jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,

    /// Growth factor per attempt
    pub multiplier: f64,

    /// Cap on the un-jittered delay
    pub max_delay: Duration,

    /// Maximum jitter as a fraction of the delay
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_ratio: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            base_delay: settings.base_delay(),
            multiplier: settings.multiplier,
            max_delay: settings.max_delay(),
            jitter_ratio: settings.jitter_ratio,
        }
    }

    /// Delay after failed attempt `attempt` (1-based), without jitter
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());

        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Delay after failed attempt `attempt`, plus up to `jitter_ratio` extra
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);

        if self.jitter_ratio <= 0.0 {
            return delay;
        }

        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
        delay + delay.mul_f64(jitter)
    }
}

/// Attempt budgets per model
#[derive(Debug, Clone)]
pub struct RetryBudgets {
    per_model: HashMap<String, u32>,
    default_attempts: u32,
}

impl RetryBudgets {
    /// Same budget for every model
    pub fn uniform(attempts: u32) -> Self {
        Self {
            per_model: HashMap::new(),
            default_attempts: attempts.max(1),
        }
    }

    /// Budgets derived from each model's priority class
    pub fn from_registry(registry: &ModelRegistry, settings: &RetrySettings) -> Self {
        let per_model = registry
            .list()
            .into_iter()
            .map(|descriptor| {
                let attempts = match descriptor.priority {
                    ModelPriority::Critical => settings.critical_attempts,
                    ModelPriority::Standard => settings.standard_attempts,
                    ModelPriority::Optional => settings.optional_attempts,
                };
                (descriptor.name.clone(), attempts.max(1))
            })
            .collect();

        Self {
            per_model,
            default_attempts: settings.standard_attempts.max(1),
        }
    }

    /// Overrides the budget of one model
    pub fn with_model(mut self, model_name: &str, attempts: u32) -> Self {
        self.per_model.insert(model_name.to_string(), attempts.max(1));
        self
    }

    /// Total attempts allowed for a model, first attempt included
    pub fn attempts_for(&self, model_name: &str) -> u32 {
        self.per_model
            .get(model_name)
            .copied()
            .unwrap_or(self.default_attempts)
    }
}

/// A classified error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub model_name: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Attempt number that failed
    pub attempt: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Decision for a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryDecision {
    /// Classified kind of the failure
    pub kind: ErrorKind,

    /// Retry the same model after `delay`
    pub should_retry: bool,

    /// Delay before the retry; zero when not retrying
    pub delay: Duration,

    /// Model to try instead, once retries are exhausted
    pub fallback_model: Option<String>,
}

/// Retry bookkeeping for one model within one call chain
#[derive(Debug, Clone)]
pub struct RetryState {
    pub model_name: String,
    pub attempts: u32,
    pub next_delay: Duration,
    errors: VecDeque<ErrorRecord>,
}

impl RetryState {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            attempts: 0,
            next_delay: Duration::ZERO,
            errors: VecDeque::with_capacity(CHAIN_HISTORY_CAPACITY),
        }
    }

    /// Starts the next attempt and returns its number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Records a failed attempt and the delay before the next one
    pub fn record_failure(&mut self, error: &Error, decision: &RecoveryDecision) {
        if self.errors.len() == CHAIN_HISTORY_CAPACITY {
            self.errors.pop_front();
        }

        self.errors.push_back(ErrorRecord {
            model_name: self.model_name.clone(),
            kind: decision.kind,
            message: error.to_string(),
            attempt: self.attempts,
            occurred_at: Utc::now(),
        });
        self.next_delay = decision.delay;
    }

    /// Errors seen in this chain, oldest first
    pub fn errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.errors.iter()
    }
}

/// Classifies load errors and decides how to recover
pub struct ErrorHandler {
    policy: RetryPolicy,
    budgets: RetryBudgets,
    fallbacks: FallbackTable,
    history_capacity: usize,
    history: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorHandler {
    /// Creates a new error handler
    pub fn new(policy: RetryPolicy, budgets: RetryBudgets, fallbacks: FallbackTable, history_capacity: usize) -> Self {
        let history_capacity = history_capacity.max(1);

        Self {
            policy,
            budgets,
            fallbacks,
            history_capacity,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
        }
    }

    /// Handler configured from settings and the registry's priority classes
    pub fn from_settings(settings: &RetrySettings, registry: &ModelRegistry, fallbacks: FallbackTable) -> Self {
        Self::new(
            RetryPolicy::from_settings(settings),
            RetryBudgets::from_registry(registry, settings),
            fallbacks,
            settings.history_capacity,
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Classifies a failed attempt and decides what to do next
    ///
    /// `attempt` is the 1-based number of the attempt that failed.
    pub fn handle(&self, error: &Error, model_name: &str, attempt: u32) -> RecoveryDecision {
        let kind = error.kind();
        self.record(model_name, kind, error, attempt);

        let budget = self.budgets.attempts_for(model_name);

        if kind.is_retryable() && attempt < budget {
            let delay = self.policy.delay_for(attempt);
            debug!(
                model = %model_name,
                kind = %kind,
                attempt,
                budget,
                delay_ms = delay.as_millis() as u64,
                "Retrying model load"
            );

            return RecoveryDecision {
                kind,
                should_retry: true,
                delay,
                fallback_model: None,
            };
        }

        let fallback_model = self.fallbacks.first_fallback(model_name).map(str::to_string);

        warn!(
            model = %model_name,
            kind = %kind,
            attempt,
            fallback = ?fallback_model,
            "Giving up on model load"
        );

        RecoveryDecision {
            kind,
            should_retry: false,
            delay: Duration::ZERO,
            fallback_model,
        }
    }

    /// Fallback strategy configured for a model
    pub fn fallback_strategy(&self, model_name: &str) -> Option<&FallbackStrategy> {
        self.fallbacks.get(model_name)
    }

    /// User-facing message for an error
    pub fn user_message(&self, error: &Error, model_name: Option<&str>) -> UserMessage {
        user_message(error.kind(), model_name)
    }

    fn record(&self, model_name: &str, kind: ErrorKind, error: &Error, attempt: u32) {
        let mut history = self.history.lock();

        while history.len() >= self.history_capacity {
            history.pop_front();
        }

        history.push_back(ErrorRecord {
            model_name: model_name.to_string(),
            kind,
            message: error.to_string(),
            attempt,
            occurred_at: Utc::now(),
        });
    }

    /// Recorded errors, oldest first
    pub fn history(&self) -> Vec<ErrorRecord> {
        self.history.lock().iter().cloned().collect()
    }

    /// Recorded errors of one model, oldest first
    pub fn history_for(&self, model_name: &str) -> Vec<ErrorRecord> {
        self.history
            .lock()
            .iter()
            .filter(|record| record.model_name == model_name)
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(budget: u32, history_capacity: usize) -> ErrorHandler {
        ErrorHandler::new(
            RetryPolicy::default(),
            RetryBudgets::uniform(budget),
            FallbackTable::builtin(),
            history_capacity,
        )
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
            jitter_ratio: 0.1,
        };

        assert_eq!(policy.base_delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.base_delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.base_delay_for(3), Duration::from_millis(400));

        let delays: Vec<_> = (1..=64).map(|attempt| policy.base_delay_for(attempt)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
        assert_eq!(policy.base_delay_for(u32::MAX), policy.max_delay);

        for attempt in 1..10 {
            let base = policy.base_delay_for(attempt);
            let jittered = policy.delay_for(attempt);
            assert!(jittered >= base);
            assert!(jittered <= base + base.mul_f64(0.1) + Duration::from_nanos(1));
        }
    }

    #[test]
    fn test_retry_until_budget_then_fallback() {
        let handler = handler(3, 10);
        let error = Error::Network("connection reset".to_string());

        let first = handler.handle(&error, "face-detector", 1);
        assert!(first.should_retry);
        assert_eq!(first.kind, ErrorKind::Network);
        assert!(first.delay >= Duration::from_millis(500));

        assert!(handler.handle(&error, "face-detector", 2).should_retry);

        let last = handler.handle(&error, "face-detector", 3);
        assert!(!last.should_retry);
        assert_eq!(last.delay, Duration::ZERO);
        assert_eq!(last.fallback_model.as_deref(), Some("face-detector-lite"));
    }

    #[test]
    fn test_invalid_model_is_never_retried() {
        let handler = handler(5, 10);
        let decision = handler.handle(&Error::InvalidModel("corrupt".to_string()), "scene-classifier", 1);

        assert!(!decision.should_retry);
        assert_eq!(decision.kind, ErrorKind::InvalidModel);
        assert_eq!(decision.fallback_model, None);
    }

    #[test]
    fn test_unclassified_errors_use_message_content() {
        let handler = handler(1, 10);
        let decision = handler.handle(&Error::Internal("disk quota exceeded".to_string()), "m", 1);
        assert_eq!(decision.kind, ErrorKind::Storage);
    }

    #[test]
    fn test_budgets_follow_priority() {
        let registry = ModelRegistry::builtin("https://models.example.com");
        let settings = RetrySettings {
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            jitter_ratio: 0.1,
            history_capacity: 50,
            critical_attempts: 5,
            standard_attempts: 3,
            optional_attempts: 1,
        };

        let budgets = RetryBudgets::from_registry(&registry, &settings).with_model("scene-classifier", 2);

        assert_eq!(budgets.attempts_for("face-detector"), 5);
        assert_eq!(budgets.attempts_for("face-embedder"), 3);
        assert_eq!(budgets.attempts_for("expression-classifier"), 1);
        assert_eq!(budgets.attempts_for("scene-classifier"), 2);
        assert_eq!(budgets.attempts_for("unregistered"), 3);
    }

    #[test]
    fn test_history_is_bounded() {
        let handler = handler(1, 3);

        for attempt in 1..=5 {
            handler.handle(&Error::Timeout(format!("attempt {}", attempt)), "m", attempt);
        }

        let history = handler.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].attempt, 3);
        assert_eq!(history[2].attempt, 5);
        assert_eq!(handler.history_for("other").len(), 0);

        handler.clear_history();
        assert!(handler.history().is_empty());
    }

    #[test]
    fn test_retry_state_tracks_chain() {
        let handler = handler(3, 10);
        let mut state = RetryState::new("m");
        let error = Error::Network("offline".to_string());

        for _ in 0..12 {
            let attempt = state.begin_attempt();
            let decision = handler.handle(&error, "m", attempt);
            state.record_failure(&error, &decision);
        }

        assert_eq!(state.attempts, 12);
        assert_eq!(state.errors().count(), CHAIN_HISTORY_CAPACITY);
        assert_eq!(state.errors().next().map(|r| r.attempt), Some(3));
    }
}
