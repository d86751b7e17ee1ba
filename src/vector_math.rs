use std::cmp::Ordering;

use crate::core::errors::RagError;

/// Squared Euclidean distance. Lower means more similar.
pub fn squared_l2(query: &[f32], candidate: &[f32]) -> Result<f32, RagError> {
    if query.len() != candidate.len() {
        return Err(RagError::DimensionMismatch {
            expected: candidate.len(),
            actual: query.len(),
        });
    }

    Ok(query
        .iter()
        .zip(candidate.iter())
        .map(|(a, b)| {
            let diff = a - b;
            diff * diff
        })
        .sum())
}

/// Ranks candidates by ascending squared L2 distance. Ties keep input order.
pub fn rank_ascending_by_l2(
    query: &[f32],
    candidates: &[Vec<f32>],
) -> Result<Vec<(usize, f32)>, RagError> {
    let mut scores = Vec::with_capacity(candidates.len());
    for (idx, candidate) in candidates.iter().enumerate() {
        scores.push((idx, squared_l2(query, candidate)?));
    }

    scores.sort_by(|left, right| {
        left.1
            .partial_cmp(&right.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.0.cmp(&right.0))
    });
    Ok(scores)
}

pub fn is_finite_vector(vector: &[f32]) -> bool {
    vector.iter().all(|v| v.is_finite())
}
