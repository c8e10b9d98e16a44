//! Composite scoring
//!
//! Four factors are blended from the item's sub-scores and combined with the
//! goal's weights. The composite is clamped to `[0,1]`.

use std::cmp::Ordering;

use common::photos::{FactorScores, PhotoItem, ScoredItem, SubScores};

use crate::goals::CurationGoal;

/// Personal factor for favorites
const FAVORITE_SCORE: f32 = 1.0;

/// Personal factor for everything else
const NEUTRAL_PERSONAL_SCORE: f32 = 0.5;

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn technical(s: &SubScores) -> f32 {
    unit(0.4 * unit(s.sharpness) + 0.35 * unit(s.exposure) + 0.25 * unit(s.color_balance))
}

fn compositional(s: &SubScores) -> f32 {
    unit(0.6 * unit(s.composition) + 0.4 * unit(s.rule_of_thirds))
}

fn content(item: &PhotoItem) -> f32 {
    let s = &item.sub_scores;

    // Smiles and open eyes only mean something when there are faces
    if item.face_count == 0 {
        return unit(s.emotional_sentiment);
    }

    unit(0.4 * unit(s.smile) + 0.3 * unit(s.eyes_open) + 0.3 * unit(s.emotional_sentiment))
}

fn personal(item: &PhotoItem) -> f32 {
    if item.is_favorite {
        FAVORITE_SCORE
    } else {
        NEUTRAL_PERSONAL_SCORE
    }
}

/// Per-factor scores of an item, each in `[0,1]`
pub fn factor_scores(item: &PhotoItem) -> FactorScores {
    FactorScores {
        technical: technical(&item.sub_scores),
        compositional: compositional(&item.sub_scores),
        content: content(item),
        personal: personal(item),
    }
}

/// Reasons paired with the weighted contribution they explain
fn reasoning(item: &PhotoItem, factors: &FactorScores, goal: &CurationGoal) -> Vec<String> {
    let w = &goal.weights;
    let mut reasons: Vec<(f32, String)> = Vec::new();

    if factors.technical >= 0.8 {
        reasons.push((w.technical * factors.technical, "Sharp and well exposed".to_string()));
    } else if factors.technical < 0.4 {
        reasons.push((w.technical * factors.technical, "Technical quality is low".to_string()));
    }

    if factors.compositional >= 0.8 {
        reasons.push((w.compositional * factors.compositional, "Strong composition".to_string()));
    }

    if item.face_count >= 3 {
        reasons.push((
            w.content * factors.content,
            format!("Group shot with {} people", item.face_count),
        ));
    }

    if item.smiling_faces > 0 {
        let noun = if item.smiling_faces == 1 { "face" } else { "faces" };
        reasons.push((
            w.content * factors.content,
            format!("{} smiling {}", item.smiling_faces, noun),
        ));
    }

    if item.is_favorite {
        reasons.push((w.personal * factors.personal, "Marked as favorite".to_string()));
    }

    // Most influential first; ties keep insertion order
    reasons.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    reasons.into_iter().map(|(_, reason)| reason).collect()
}

/// Scores an item against a goal; `rank` is left at 0 for the caller to set
pub fn score(item: &PhotoItem, goal: &CurationGoal) -> ScoredItem {
    let factors = factor_scores(item);
    let w = &goal.weights;

    let composite = unit(
        w.technical * factors.technical
            + w.compositional * factors.compositional
            + w.content * factors.content
            + w.personal * factors.personal,
    );

    ScoredItem {
        id: item.id.clone(),
        rank: 0,
        score: composite,
        factors,
        reasoning: reasoning(item, &factors, goal),
    }
}

/// Ranking order: score descending, then earlier capture, then id ascending
pub fn rank_order(a: (&ScoredItem, &PhotoItem), b: (&ScoredItem, &PhotoItem)) -> Ordering {
    b.0.score
        .partial_cmp(&a.0.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.1.timestamp.cmp(&b.1.timestamp))
        .then_with(|| a.1.id.cmp(&b.1.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::goals::GoalWeights;

    fn photo() -> PhotoItem {
        PhotoItem::new("p", Utc::now())
    }

    #[test]
    fn test_neutral_item() {
        let item = photo();
        let factors = factor_scores(&item);

        assert!((factors.technical - 0.5).abs() < 1e-6);
        assert!((factors.compositional - 0.5).abs() < 1e-6);
        assert!((factors.content - 0.5).abs() < 1e-6);
        assert_eq!(factors.personal, 0.5);

        let scored = score(&item, &CurationGoal::best_of());
        assert!((scored.score - 0.5).abs() < 1e-6);
        assert!(scored.reasoning.is_empty());
    }

    #[test]
    fn test_composite_is_clamped() {
        let mut item = photo();
        item.is_favorite = true;
        item.sub_scores.sharpness = 1.0;
        item.sub_scores.exposure = 1.0;
        item.sub_scores.color_balance = 1.0;

        let mut goal = CurationGoal::best_of();
        goal.weights = GoalWeights::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(score(&item, &goal).score, 1.0);

        goal.weights = GoalWeights::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(score(&item, &goal).score, 0.0);
    }

    #[test]
    fn test_out_of_range_sub_scores_are_clamped() {
        let mut item = photo();
        item.sub_scores.sharpness = 7.0;
        item.sub_scores.exposure = f32::NAN;
        item.sub_scores.color_balance = -3.0;

        let factors = factor_scores(&item);
        assert!((factors.technical - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_reasoning_order() {
        let mut item = photo();
        item.face_count = 4;
        item.smiling_faces = 3;
        item.sub_scores.smile = 1.0;
        item.sub_scores.eyes_open = 1.0;
        item.sub_scores.emotional_sentiment = 1.0;
        item.is_favorite = true;

        let goal = CurationGoal::new(
            "people",
            Default::default(),
            GoalWeights::new(0.1, 0.1, 0.7, 0.1),
        );
        let scored = score(&item, &goal);

        assert_eq!(
            scored.reasoning,
            vec![
                "Group shot with 4 people".to_string(),
                "3 smiling faces".to_string(),
                "Marked as favorite".to_string(),
            ]
        );
        assert_eq!(scored.factors.content, 1.0);
    }
}
