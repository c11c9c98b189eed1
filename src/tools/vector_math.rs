use std::cmp::Ordering;
use std::collections::HashMap;

use ndarray::ArrayView1;
use thiserror::Error;

/// Rank-fusion smoothing constant used by Qdrant and most RRF implementations.
pub const RRF_K: f32 = 60.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VectorMathError {
    #[error("vectors must not be empty")]
    Empty,
    #[error("vector length mismatch: {0} != {1}")]
    LengthMismatch(usize, usize),
}

pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, VectorMathError> {
    if query.is_empty() || candidate.is_empty() {
        return Err(VectorMathError::Empty);
    }
    if query.len() != candidate.len() {
        return Err(VectorMathError::LengthMismatch(query.len(), candidate.len()));
    }

    let q = ArrayView1::from(query);
    let c = ArrayView1::from(candidate);

    let dot = q.dot(&c);
    let denom = q.dot(&q).sqrt() * c.dot(&c).sqrt();
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }

    Ok(dot / denom)
}

/// Maximal marginal relevance selection.
///
/// Returns up to `k` `(candidate index, query similarity)` pairs in
/// selection order. `lambda = 1.0` is pure relevance, `0.0` pure diversity.
pub fn mmr_select(
    query: &[f32],
    candidates: &[Vec<f32>],
    k: usize,
    lambda: f32,
) -> Result<Vec<(usize, f32)>, VectorMathError> {
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect::<Result<_, _>>()?;

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best: Option<(usize, f32)> = None;

        for (pos, &idx) in remaining.iter().enumerate() {
            let mut redundancy = 0.0f32;
            for &chosen in &selected {
                let sim = cosine_similarity(&candidates[idx], &candidates[chosen])?;
                redundancy = redundancy.max(sim);
            }
            let score = lambda * relevance[idx] - (1.0 - lambda) * redundancy;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((pos, score));
            }
        }

        match best {
            Some((pos, _)) => selected.push(remaining.remove(pos)),
            None => break,
        }
    }

    Ok(selected.into_iter().map(|idx| (idx, relevance[idx])).collect())
}

/// Reciprocal rank fusion over several ranked id lists. Ties keep the order
/// in which ids were first seen.
pub fn reciprocal_rank_fusion(rankings: &[Vec<String>]) -> Vec<(String, f32)> {
    let mut scores: HashMap<&str, f32> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();

    for ranking in rankings {
        for (rank, id) in ranking.iter().enumerate() {
            let entry = scores.entry(id.as_str()).or_insert_with(|| {
                first_seen.push(id.as_str());
                0.0
            });
            *entry += 1.0 / (RRF_K + rank as f32 + 1.0);
        }
    }

    let mut fused: Vec<(String, f32)> = first_seen
        .into_iter()
        .map(|id| (id.to_string(), scores.get(id).copied().unwrap_or(0.0)))
        .collect();
    fused.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn cosine_is_one_for_identical_vectors() {
        let vec = vec![1.0, 2.0, 3.0, 4.0];
        let score = cosine_similarity(&vec, &vec).expect("cosine should work");
        assert!(approx_eq(score, 1.0));
    }

    #[test]
    fn cosine_is_zero_for_orthogonal_vectors() {
        let score = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).expect("cosine should work");
        assert!(approx_eq(score, 0.0));
    }

    #[test]
    fn cosine_rejects_mismatched_lengths() {
        assert_eq!(
            cosine_similarity(&[1.0], &[1.0, 0.0]),
            Err(VectorMathError::LengthMismatch(1, 2))
        );
    }

    #[test]
    fn mmr_prefers_diverse_second_pick() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![1.0, 0.1], vec![1.0, 0.11], vec![0.7, 0.7]];

        let pure = mmr_select(&query, &candidates, 2, 1.0).unwrap();
        assert_eq!(pure.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1]);

        let diverse = mmr_select(&query, &candidates, 2, 0.3).unwrap();
        assert_eq!(diverse.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn rrf_rewards_agreement() {
        let dense = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let keyword = vec!["b".to_string(), "c".to_string()];
        let fused = reciprocal_rank_fusion(&[dense, keyword]);

        assert_eq!(fused[0].0, "b");
        assert_eq!(fused.len(), 3);
    }
}
