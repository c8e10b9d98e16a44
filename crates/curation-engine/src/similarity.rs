//! Embedding similarity
//!
//! Similarities are cosine similarity remapped from `[-1,1]` to `[0,1]`.
//! Vectors compared with each other must have the same length.

use std::cmp::Ordering;
use rayon::prelude::*;
use serde::Serialize;

use common::error::{Error, Result};
use common::photos::EmbeddingRef;

/// A candidate that passed the similarity threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarMatch {
    pub id: String,
    pub similarity: f32,
}

/// Sums run in `f64`: squares of finite `f32` components neither underflow
/// nor overflow there
fn l2_norm(vector: &[f32]) -> f64 {
    vector.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

fn check_dimensions(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// L2-normalized copy; a zero vector stays zero
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let mut normalized = vector.to_vec();
    normalize_in_place(&mut normalized);
    normalized
}

/// L2-normalizes in place; a zero vector stays zero
pub fn normalize_in_place(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm > 0.0 && norm.is_finite() {
        for x in vector.iter_mut() {
            *x = (f64::from(*x) / norm) as f32;
        }
    }
}

/// Cosine of two equal-length vectors; `None` for zero-magnitude or
/// non-finite input
fn cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    let mut dot_product = 0.0_f64;
    let mut a_norm = 0.0_f64;
    let mut b_norm = 0.0_f64;

    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot_product += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        return None;
    }

    let cosine = dot_product / (a_norm.sqrt() * b_norm.sqrt());
    cosine.is_finite().then(|| cosine.clamp(-1.0, 1.0))
}

/// Cosine similarity in `[-1,1]`; `0` if either vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(cosine(a, b).map_or(0.0, |c| c as f32))
}

/// Similarity in `[0,1]`
///
/// Returns `0` when either vector has zero magnitude or non-finite
/// components, and fails with [`Error::DimensionMismatch`] when lengths
/// differ.
pub fn compare(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(cosine(a, b).map_or(0.0, |c| ((c + 1.0) / 2.0).clamp(0.0, 1.0) as f32))
}

/// Orders matches by similarity descending, then id ascending
fn by_similarity(a: &SimilarMatch, b: &SimilarMatch) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

/// Finds candidates at least `threshold` similar to `target`
///
/// The target's own id is never returned.
pub fn find_similar(
    target: EmbeddingRef<'_>,
    candidates: &[EmbeddingRef<'_>],
    threshold: f32,
) -> Result<Vec<SimilarMatch>> {
    let scored = candidates
        .par_iter()
        .filter(|candidate| candidate.owner_id != target.owner_id)
        .map(|candidate| {
            compare(target.vector, candidate.vector).map(|similarity| SimilarMatch {
                id: candidate.owner_id.to_string(),
                similarity,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut matches: Vec<_> = scored
        .into_iter()
        .filter(|m| m.similarity >= threshold)
        .collect();

    matches.sort_by(by_similarity);

    Ok(matches)
}
