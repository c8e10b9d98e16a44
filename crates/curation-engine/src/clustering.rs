//! Clustering engine
//!
//! Three independent partitions of the same collection:
//!
//! - time: consecutive captures separated by at most a time window
//! - location: greedy single-link groups within a radius of a seed photo
//! - visual: the same greedy grouping over embedding similarity
//!
//! Location and visual passes depend on input order (first claim wins) and
//! never emit singletons. The time pass emits every segment.

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use common::error::{Error, Result};
use common::photos::{ClusterCandidate, ClusterKind, ClusterRepresentative, GeoPoint, PhotoItem};
use settings::ClusteringSettings;

use crate::geo::{centroid, haversine_km};
use crate::input::validate_items;
use crate::similarity::compare;

/// Minimum size of a location or visual cluster
pub const MIN_GROUP_SIZE: usize = 2;

/// Clustering parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusteringParams {
    /// Largest gap between consecutive captures of one time cluster
    pub time_window_hours: f64,

    /// Largest distance from the seed photo of a location cluster
    pub location_radius_km: f64,

    /// Smallest similarity to the seed photo of a visual cluster
    pub visual_threshold: f32,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            time_window_hours: 2.0,
            location_radius_km: 1.0,
            visual_threshold: 0.85,
        }
    }
}

impl From<&ClusteringSettings> for ClusteringParams {
    fn from(settings: &ClusteringSettings) -> Self {
        Self {
            time_window_hours: settings.time_window_hours,
            location_radius_km: settings.location_radius_km,
            visual_threshold: settings.visual_threshold,
        }
    }
}

/// Output of all three passes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterSet {
    pub time: Vec<ClusterCandidate>,
    pub location: Vec<ClusterCandidate>,
    pub visual: Vec<ClusterCandidate>,
}

fn cluster_id(kind: ClusterKind, index: usize) -> String {
    format!("{}-{}", kind, index)
}

fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if !(value >= 0.0) {
        return Err(Error::InvalidArgument(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Splits items into time segments
///
/// Items are ordered by capture time; a new cluster starts whenever the gap to
/// the previous capture exceeds `window_hours`.
pub fn cluster_by_time(items: &[PhotoItem], window_hours: f64) -> Result<Vec<ClusterCandidate>> {
    check_non_negative("time window", window_hours)?;

    let mut ordered: Vec<&PhotoItem> = items.iter().collect();
    ordered.sort_by_key(|item| item.timestamp);

    let window_ms = (window_hours * 3_600_000.0).round() as i64;
    let mut segments: Vec<Vec<&PhotoItem>> = Vec::new();

    for item in ordered {
        match segments.last_mut() {
            Some(segment) => {
                let previous = segment[segment.len() - 1];
                let gap_ms = (item.timestamp - previous.timestamp).num_milliseconds();

                if gap_ms > window_ms {
                    segments.push(vec![item]);
                } else {
                    segment.push(item);
                }
            }
            None => segments.push(vec![item]),
        }
    }

    let clusters: Vec<ClusterCandidate> = segments
        .into_iter()
        .enumerate()
        .map(|(index, segment)| {
            let start = segment[0].timestamp;
            let end = segment[segment.len() - 1].timestamp;

            ClusterCandidate {
                id: cluster_id(ClusterKind::Time, index),
                kind: ClusterKind::Time,
                members: segment.iter().map(|item| item.id.clone()).collect(),
                representative: ClusterRepresentative::TimeRange { start, end },
            }
        })
        .collect();

    debug!("Time clustering: {} items into {} clusters", items.len(), clusters.len());

    Ok(clusters)
}

/// Greedy single-link grouping by distance to a seed photo
///
/// Items without a location are skipped.
pub fn cluster_by_location(items: &[PhotoItem], radius_km: f64) -> Result<Vec<ClusterCandidate>> {
    check_non_negative("location radius", radius_km)?;

    let located: Vec<(&PhotoItem, GeoPoint)> = items
        .iter()
        .filter_map(|item| item.location.map(|location| (item, location)))
        .collect();

    let groups = greedy_groups(located.len(), |seed, other| {
        Ok(haversine_km(located[seed].1, located[other].1) <= radius_km)
    })?;

    let clusters: Vec<ClusterCandidate> = groups
        .into_iter()
        .enumerate()
        .map(|(index, group)| {
            let points: Vec<GeoPoint> = group.iter().map(|&i| located[i].1).collect();
            let representative = centroid(&points)
                .map(ClusterRepresentative::Centroid)
                .unwrap_or(ClusterRepresentative::None);

            ClusterCandidate {
                id: cluster_id(ClusterKind::Location, index),
                kind: ClusterKind::Location,
                members: group.iter().map(|&i| located[i].0.id.clone()).collect(),
                representative,
            }
        })
        .collect();

    debug!(
        "Location clustering: {} located items into {} clusters",
        located.len(),
        clusters.len()
    );

    Ok(clusters)
}

/// Greedy single-link grouping by embedding similarity to a seed photo
///
/// Items without an embedding are skipped; embeddings of differing length
/// fail with [`Error::DimensionMismatch`].
pub fn cluster_by_visual_similarity(items: &[PhotoItem], threshold: f32) -> Result<Vec<ClusterCandidate>> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::InvalidArgument(format!(
            "Similarity threshold must be within [0, 1], got {}",
            threshold
        )));
    }

    let embedded: Vec<(&PhotoItem, &[f32])> = items
        .iter()
        .filter_map(|item| item.embedding.as_deref().map(|vector| (item, vector)))
        .collect();

    if let Some((_, first)) = embedded.first() {
        if let Some((_, odd)) = embedded.iter().find(|(_, vector)| vector.len() != first.len()) {
            return Err(Error::DimensionMismatch {
                expected: first.len(),
                actual: odd.len(),
            });
        }
    }

    let groups = greedy_groups(embedded.len(), |seed, other| {
        Ok(compare(embedded[seed].1, embedded[other].1)? >= threshold)
    })?;

    let clusters: Vec<ClusterCandidate> = groups
        .into_iter()
        .enumerate()
        .map(|(index, group)| ClusterCandidate {
            id: cluster_id(ClusterKind::Visual, index),
            kind: ClusterKind::Visual,
            members: group.iter().map(|&i| embedded[i].0.id.clone()).collect(),
            representative: ClusterRepresentative::None,
        })
        .collect();

    debug!(
        "Visual clustering: {} embedded items into {} clusters",
        embedded.len(),
        clusters.len()
    );

    Ok(clusters)
}

/// Greedy claim loop shared by the location and visual passes
///
/// Each unclaimed index in order becomes a seed and claims every later
/// unclaimed index `joins(seed, other)` accepts. Groups smaller than
/// [`MIN_GROUP_SIZE`] are dropped, but their seed stays claimed.
fn greedy_groups<F>(len: usize, joins: F) -> Result<Vec<Vec<usize>>>
where
    F: Fn(usize, usize) -> Result<bool>,
{
    let mut claimed = vec![false; len];
    let mut groups = Vec::new();

    for seed in 0..len {
        if claimed[seed] {
            continue;
        }
        claimed[seed] = true;

        let mut group = vec![seed];
        for other in (seed + 1)..len {
            if !claimed[other] && joins(seed, other)? {
                claimed[other] = true;
                group.push(other);
            }
        }

        if group.len() >= MIN_GROUP_SIZE {
            groups.push(group);
        }
    }

    Ok(groups)
}

/// Runs the clustering passes with one set of parameters
#[derive(Debug, Clone, Default)]
pub struct ClusteringEngine {
    params: ClusteringParams,
}

impl ClusteringEngine {
    pub fn new(params: ClusteringParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClusteringParams {
        &self.params
    }

    pub fn by_time(&self, items: &[PhotoItem]) -> Result<Vec<ClusterCandidate>> {
        cluster_by_time(items, self.params.time_window_hours)
    }

    pub fn by_location(&self, items: &[PhotoItem]) -> Result<Vec<ClusterCandidate>> {
        cluster_by_location(items, self.params.location_radius_km)
    }

    pub fn by_visual_similarity(&self, items: &[PhotoItem]) -> Result<Vec<ClusterCandidate>> {
        cluster_by_visual_similarity(items, self.params.visual_threshold)
    }

    /// Validates the collection and runs all three passes in parallel
    pub fn cluster_all(&self, items: &[PhotoItem]) -> Result<ClusterSet> {
        validate_items(items)?;

        let (time, (location, visual)) = rayon::join(
            || self.by_time(items),
            || rayon::join(|| self.by_location(items), || self.by_visual_similarity(items)),
        );

        Ok(ClusterSet {
            time: time?,
            location: location?,
            visual: visual?,
        })
    }
}

/// Sizes of each cluster, largest first; used for log summaries
pub fn cluster_sizes(clusters: &[ClusterCandidate]) -> Vec<usize> {
    let mut sizes: Vec<usize> = clusters.par_iter().map(ClusterCandidate::len).collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn at_minutes(id: &str, minutes: i64) -> PhotoItem {
        let base = Utc.with_ymd_and_hms(2024, 7, 14, 9, 0, 0).unwrap();
        PhotoItem::new(id, base + Duration::minutes(minutes))
    }

    fn members(clusters: &[ClusterCandidate]) -> Vec<Vec<&str>> {
        clusters
            .iter()
            .map(|c| c.members.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_time_window_splits_on_gap() {
        let items = vec![
            at_minutes("m300", 300),
            at_minutes("m0", 0),
            at_minutes("m90", 90),
            at_minutes("m30", 30),
        ];

        let clusters = cluster_by_time(&items, 2.0).unwrap();

        assert_eq!(members(&clusters), vec![vec!["m0", "m30", "m90"], vec!["m300"]]);
        assert_eq!(clusters[0].id, "time-0");
        assert_eq!(clusters[1].id, "time-1");
        assert!(clusters[1].contains("m300") && !clusters[1].contains("m90"));
        assert_eq!(
            clusters[0].representative,
            ClusterRepresentative::TimeRange {
                start: items[1].timestamp,
                end: items[2].timestamp,
            }
        );
    }

    #[test]
    fn test_time_gap_equal_to_window_stays_together() {
        let items = vec![at_minutes("a", 0), at_minutes("b", 120)];
        assert_eq!(cluster_by_time(&items, 2.0).unwrap().len(), 1);
        assert!(cluster_by_time(&[], 2.0).unwrap().is_empty());
        assert!(cluster_by_time(&items, -1.0).is_err());
    }

    #[test]
    fn test_location_greedy_claims() {
        let mut items = vec![
            at_minutes("louvre", 0),
            at_minutes("no-gps", 1),
            at_minutes("tuileries", 2),
            at_minutes("london", 3),
            at_minutes("orsay", 4),
            at_minutes("london-eye", 5),
            at_minutes("rome", 6),
        ];
        items[0].location = Some(GeoPoint::new(48.8606, 2.3376));
        items[2].location = Some(GeoPoint::new(48.8634, 2.3275));
        items[3].location = Some(GeoPoint::new(51.5007, -0.1246));
        items[4].location = Some(GeoPoint::new(48.8600, 2.3266));
        items[5].location = Some(GeoPoint::new(51.5033, -0.1196));
        items[6].location = Some(GeoPoint::new(41.9028, 12.4964));

        let clusters = cluster_by_location(&items, 1.0).unwrap();

        assert_eq!(
            members(&clusters),
            vec![vec!["louvre", "tuileries", "orsay"], vec!["london", "london-eye"]]
        );
        assert_eq!(clusters[1].id, "location-1");
        assert!(matches!(clusters[0].representative, ClusterRepresentative::Centroid(_)));
    }

    #[test]
    fn test_visual_clusters_and_singletons() {
        let mut items: Vec<PhotoItem> = (0..5).map(|i| at_minutes(&format!("p{}", i), i)).collect();
        items[0].embedding = Some(vec![1.0, 0.0, 0.0]);
        items[1].embedding = Some(vec![0.0, 1.0, 0.0]);
        items[2].embedding = Some(vec![0.98, 0.05, 0.0]);
        items[3].embedding = None;
        items[4].embedding = Some(vec![0.0, 0.0, 1.0]);

        let clusters = cluster_by_visual_similarity(&items, 0.9).unwrap();

        assert_eq!(members(&clusters), vec![vec!["p0", "p2"]]);
        assert_eq!(clusters[0].representative, ClusterRepresentative::None);
    }

    #[test]
    fn test_visual_dimension_mismatch() {
        let mut items = vec![at_minutes("a", 0), at_minutes("b", 1)];
        items[0].embedding = Some(vec![1.0, 0.0]);
        items[1].embedding = Some(vec![1.0, 0.0, 0.0]);

        assert_eq!(
            cluster_by_visual_similarity(&items, 0.5).unwrap_err(),
            Error::DimensionMismatch { expected: 2, actual: 3 }
        );
    }

    #[test]
    fn test_passes_are_independent_partitions() {
        let mut items: Vec<PhotoItem> = (0..6).map(|i| at_minutes(&format!("p{}", i), i * 100)).collect();
        for (i, item) in items.iter_mut().enumerate() {
            item.location = Some(GeoPoint::new(10.0 + (i / 3) as f64, 10.0));
            item.embedding = Some(vec![1.0, (i % 2) as f32]);
        }

        let set = ClusteringEngine::default().cluster_all(&items).unwrap();

        for clusters in [&set.time, &set.location, &set.visual] {
            let mut seen: Vec<&str> = clusters.iter().flat_map(|c| c.members.iter().map(String::as_str)).collect();
            let total = seen.len();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), total, "an item appears twice in one pass");
        }

        assert_eq!(set.location.len(), 2);
        assert_eq!(cluster_sizes(&set.location), vec![3, 3]);
    }

    #[test]
    fn test_cluster_all_rejects_duplicates() {
        let items = vec![at_minutes("a", 0), at_minutes("a", 1)];
        assert!(ClusteringEngine::default().cluster_all(&items).is_err());
    }
}
