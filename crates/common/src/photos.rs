//! Photo collection data model
//!
//! Input items produced by upstream feature extraction, and the cluster and
//! ranking records produced by the curation engine.

use std::fmt;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Geographic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    #[serde(alias = "long", alias = "lng")]
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a new coordinate
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Per-photo quality signals in `[0,1]`, supplied upstream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubScores {
    pub sharpness: f32,
    pub exposure: f32,
    pub color_balance: f32,
    pub composition: f32,
    pub rule_of_thirds: f32,
    pub smile: f32,
    pub eyes_open: f32,
    pub emotional_sentiment: f32,
}

impl Default for SubScores {
    /// Missing signals are neutral
    fn default() -> Self {
        Self {
            sharpness: 0.5,
            exposure: 0.5,
            color_balance: 0.5,
            composition: 0.5,
            rule_of_thirds: 0.5,
            smile: 0.5,
            eyes_open: 0.5,
            emotional_sentiment: 0.5,
        }
    }
}

/// A photo in the collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoItem {
    /// Stable photo id
    pub id: String,

    /// Capture time
    pub timestamp: DateTime<Utc>,

    /// Capture location, if known
    #[serde(default)]
    pub location: Option<GeoPoint>,

    /// Visual embedding, if computed
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,

    /// Quality signals
    #[serde(default)]
    pub sub_scores: SubScores,

    /// Number of detected faces
    #[serde(default)]
    pub face_count: u32,

    /// Number of detected faces that are smiling
    #[serde(default)]
    pub smiling_faces: u32,

    /// Pixel width
    #[serde(default)]
    pub width: u32,

    /// Pixel height
    #[serde(default)]
    pub height: u32,

    /// User marked the photo as favorite
    #[serde(default)]
    pub is_favorite: bool,
}

impl PhotoItem {
    /// Creates an item with neutral signals and no location or embedding
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            location: None,
            embedding: None,
            sub_scores: SubScores::default(),
            face_count: 0,
            smiling_faces: 0,
            width: 0,
            height: 0,
            is_favorite: false,
        }
    }

    /// Frame orientation derived from the pixel dimensions
    pub fn orientation(&self) -> Orientation {
        if self.width > self.height {
            Orientation::Landscape
        } else if self.height > self.width {
            Orientation::Portrait
        } else {
            Orientation::Square
        }
    }

    /// Borrowed view of the embedding tagged with this item's id
    pub fn embedding_ref(&self) -> Option<EmbeddingRef<'_>> {
        self.embedding.as_deref().map(|vector| EmbeddingRef {
            owner_id: &self.id,
            vector,
        })
    }
}

/// Frame orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

/// Fixed-length feature vector owned by an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Owning entity id
    pub owner_id: String,
    /// Vector components
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(owner_id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            owner_id: owner_id.into(),
            vector,
        }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    pub fn view(&self) -> EmbeddingRef<'_> {
        EmbeddingRef {
            owner_id: &self.owner_id,
            vector: &self.vector,
        }
    }
}

/// Borrowed embedding, used to avoid cloning vectors out of photo items
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingRef<'a> {
    pub owner_id: &'a str,
    pub vector: &'a [f32],
}

/// Which similarity measure produced a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    Time,
    Location,
    Visual,
}

impl fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterKind::Time => write!(f, "time"),
            ClusterKind::Location => write!(f, "location"),
            ClusterKind::Visual => write!(f, "visual"),
        }
    }
}

/// Summary value describing a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterRepresentative {
    /// First and last capture time of a time cluster
    TimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Mean coordinate of a location cluster
    Centroid(GeoPoint),
    /// Visual clusters carry no representative
    None,
}

/// A group of photos sharing a similarity measure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCandidate {
    /// Cluster id, unique within one clustering pass
    pub id: String,
    /// Similarity measure
    pub kind: ClusterKind,
    /// Member photo ids in claim order
    pub members: Vec<String>,
    /// Representative value
    pub representative: ClusterRepresentative,
}

impl ClusterCandidate {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m == id)
    }
}

/// The four weighted factors of a composite score
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FactorScores {
    pub technical: f32,
    pub compositional: f32,
    pub content: f32,
    pub personal: f32,
}

/// A ranked photo with its explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    /// Photo id
    pub id: String,
    /// 1-based rank within the result
    pub rank: usize,
    /// Composite score in `[0,1]`
    pub score: f32,
    /// Per-factor sub-scores
    pub factors: FactorScores,
    /// Human-readable reasons, most important first
    pub reasoning: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_orientation() {
        let mut item = PhotoItem::new("a", Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        item.width = 4000;
        item.height = 3000;
        assert_eq!(item.orientation(), Orientation::Landscape);

        item.width = 3000;
        item.height = 4000;
        assert_eq!(item.orientation(), Orientation::Portrait);

        item.width = 0;
        item.height = 0;
        assert_eq!(item.orientation(), Orientation::Square);
    }

    #[test]
    fn test_photo_json_input() {
        let json = r#"{
            "id": "IMG_0001",
            "timestamp": "2024-06-01T12:00:00Z",
            "location": {"lat": 48.85, "long": 2.35},
            "subScores": {"sharpness": 0.9},
            "faceCount": 2,
            "isFavorite": true
        }"#;

        let item: PhotoItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.location, Some(GeoPoint::new(48.85, 2.35)));
        assert_eq!(item.sub_scores.sharpness, 0.9);
        assert_eq!(item.sub_scores.exposure, 0.5);
        assert_eq!(item.face_count, 2);
        assert!(item.is_favorite);
        assert!(item.embedding_ref().is_none());
    }
}
