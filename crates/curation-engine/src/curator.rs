//! Curation
//!
//! `curate` ranks every item passing the goal's filters. `smart_select`
//! spreads the selection across time clusters so one busy hour does not crowd
//! out the rest of the day.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use common::error::Result;
use common::photos::{PhotoItem, ScoredItem};

use crate::clustering::{cluster_by_time, ClusteringParams};
use crate::filters::apply_filters;
use crate::goals::CurationGoal;
use crate::input::validate_items;
use crate::scoring::{rank_order, score};

/// A scored item alongside the photo it came from
struct Candidate<'a> {
    item: &'a PhotoItem,
    scored: ScoredItem,
}

fn by_rank(a: &Candidate<'_>, b: &Candidate<'_>) -> std::cmp::Ordering {
    rank_order((&a.scored, a.item), (&b.scored, b.item))
}

/// Assigns ranks 1..=n in order
fn finish(candidates: Vec<Candidate<'_>>) -> Vec<ScoredItem> {
    candidates
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| ScoredItem {
            rank: index + 1,
            ..candidate.scored
        })
        .collect()
}

/// Ranks and selects photos against curation goals
#[derive(Debug, Clone, Default)]
pub struct Curator {
    params: ClusteringParams,
}

impl Curator {
    pub fn new(params: ClusteringParams) -> Self {
        Self { params }
    }

    fn ranked<'a>(&self, items: &'a [PhotoItem], goal: &CurationGoal) -> Result<Vec<Candidate<'a>>> {
        validate_items(items)?;
        goal.validate()?;

        let mut candidates: Vec<Candidate<'a>> = apply_filters(items, goal)
            .into_iter()
            .map(|item| Candidate {
                item,
                scored: score(item, goal),
            })
            .collect();

        candidates.sort_by(by_rank);

        debug!(
            goal = %goal.name,
            total = items.len(),
            passed = candidates.len(),
            "Filtered and scored collection"
        );

        Ok(candidates)
    }

    /// Filters, scores and sorts; keeps at most `target_count` items if given
    pub fn curate(
        &self,
        items: &[PhotoItem],
        goal: &CurationGoal,
        target_count: Option<usize>,
    ) -> Result<Vec<ScoredItem>> {
        let mut candidates = self.ranked(items, goal)?;

        if let Some(target) = target_count {
            candidates.truncate(target);
        }

        info!(goal = %goal.name, selected = candidates.len(), "Curated collection");

        Ok(finish(candidates))
    }

    /// Selects `target_count` items spread across time clusters
    ///
    /// Slots are split evenly across clusters, earliest clusters taking the
    /// remainder. Each cluster fills its slots with its best items; slots left
    /// empty by small clusters go to the best remaining items overall.
    pub fn smart_select(
        &self,
        items: &[PhotoItem],
        goal: &CurationGoal,
        target_count: usize,
    ) -> Result<Vec<ScoredItem>> {
        let candidates = self.ranked(items, goal)?;

        if target_count == 0 || candidates.is_empty() {
            return Ok(Vec::new());
        }

        let passed: Vec<PhotoItem> = candidates.iter().map(|c| c.item.clone()).collect();
        let clusters = cluster_by_time(&passed, self.params.time_window_hours)?;

        // Item id -> index of its time cluster
        let cluster_of: HashMap<&str, usize> = clusters
            .iter()
            .enumerate()
            .flat_map(|(index, cluster)| cluster.members.iter().map(move |id| (id.as_str(), index)))
            .collect();

        let base = target_count / clusters.len();
        let remainder = target_count % clusters.len();
        let mut quotas: Vec<usize> = (0..clusters.len())
            .map(|index| base + usize::from(index < remainder))
            .collect();

        let mut chosen: HashSet<&str> = HashSet::with_capacity(target_count);

        // Candidates are ranked, so each cluster's first members are its best
        for candidate in &candidates {
            let id = candidate.item.id.as_str();
            if let Some(&index) = cluster_of.get(id) {
                if quotas[index] > 0 {
                    quotas[index] -= 1;
                    chosen.insert(id);
                }
            }
        }

        let from_clusters = chosen.len();

        for candidate in &candidates {
            if chosen.len() >= target_count {
                break;
            }
            chosen.insert(candidate.item.id.as_str());
        }

        debug!(
            clusters = clusters.len(),
            from_clusters,
            backfilled = chosen.len() - from_clusters,
            "Smart selection allocation"
        );

        let selected: Vec<Candidate<'_>> = candidates
            .into_iter()
            .filter(|c| chosen.contains(c.item.id.as_str()))
            .map(|mut c| {
                if let Some(&index) = cluster_of.get(c.item.id.as_str()) {
                    c.scored
                        .reasoning
                        .push(format!("Represents moment {} of {}", index + 1, clusters.len()));
                }
                c
            })
            .collect();

        info!(goal = %goal.name, selected = selected.len(), target = target_count, "Smart selection");

        Ok(finish(selected))
    }
}
