//! Selection feedback
//!
//! Compares what the engine proposed with what the user kept. The diff is
//! logged and returned; nothing is learned from it.

use std::collections::BTreeSet;
use serde::Serialize;
use tracing::info;

/// Set difference between a proposed and a final selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackDiff {
    /// Proposed and kept
    pub accepted: BTreeSet<String>,
    /// Proposed but removed
    pub rejected: BTreeSet<String>,
    /// Kept without being proposed
    pub added: BTreeSet<String>,
}

impl FeedbackDiff {
    /// Share of proposed items the user kept; `None` when nothing was proposed
    pub fn acceptance_rate(&self) -> Option<f64> {
        let proposed = self.accepted.len() + self.rejected.len();
        if proposed == 0 {
            None
        } else {
            Some(self.accepted.len() as f64 / proposed as f64)
        }
    }
}

/// Diffs the engine's selection against the user's final selection
pub fn diff_feedback<I, J, S, T>(original: I, user_final: J) -> FeedbackDiff
where
    I: IntoIterator<Item = S>,
    J: IntoIterator<Item = T>,
    S: AsRef<str>,
    T: AsRef<str>,
{
    let original: BTreeSet<String> = original.into_iter().map(|id| id.as_ref().to_string()).collect();
    let user_final: BTreeSet<String> = user_final.into_iter().map(|id| id.as_ref().to_string()).collect();

    let diff = FeedbackDiff {
        accepted: original.intersection(&user_final).cloned().collect(),
        rejected: original.difference(&user_final).cloned().collect(),
        added: user_final.difference(&original).cloned().collect(),
    };

    info!(
        accepted = diff.accepted.len(),
        rejected = diff.rejected.len(),
        added = diff.added.len(),
        "Selection feedback"
    );

    diff
}
