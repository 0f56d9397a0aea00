//! Similarity scoring between two embeddings.

use crate::types::Embedding;

/// Default cosine similarity above which two embeddings are the same face.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Strategy for scoring a pair of embeddings and classifying the score.
pub trait SimilarityMatcher: Send + Sync {
    /// Similarity of two equal-length embeddings. Must be symmetric.
    fn similarity(&self, a: &Embedding, b: &Embedding) -> f32;

    /// Threshold above which a score counts as a match.
    fn threshold(&self) -> f32;

    /// Strictly greater than the threshold; equality is not a match.
    fn is_match(&self, score: f32) -> bool {
        is_match(score, self.threshold())
    }
}

/// Cosine similarity matcher.
#[derive(Debug, Clone, Copy)]
pub struct CosineMatcher {
    pub threshold: f32,
}

impl CosineMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for CosineMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl SimilarityMatcher for CosineMatcher {
    fn similarity(&self, a: &Embedding, b: &Embedding) -> f32 {
        cosine_similarity(&a.values, &b.values)
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// `dot(a, b) / (‖a‖ · ‖b‖)`, or `0.0` if either vector has zero norm.
///
/// Returns a value in [-1, 1], unclamped. Accumulates in f64 and takes a
/// single square root of `‖a‖² · ‖b‖²`, which keeps the result exactly
/// symmetric and makes `cosine_similarity(a, a) == 1.0` for nonzero `a`.
/// Callers are responsible for passing equal-length slices.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "cosine_similarity on unequal lengths");

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b).sqrt()) as f32
}

/// `score > threshold`.
pub fn is_match(score: f32, threshold: f32) -> bool {
    score > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let m = CosineMatcher::default();
        assert_eq!(m.similarity(&emb(&[1.0, 0.0, 0.0]), &emb(&[1.0, 0.0, 0.0])), 1.0);
    }

    #[test]
    fn test_self_similarity_is_one() {
        let samples: [&[f32]; 4] = [
            &[0.3, -1.7, 2.2, 0.01],
            &[1.0, 1.0],
            &[1e-3, 4e-3, -9e-3],
            &[123.0, -456.0, 789.0],
        ];
        for a in samples {
            assert_eq!(cosine_similarity(a, a), 1.0, "self-similarity of {a:?}");
        }
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_symmetric() {
        let pairs: [(&[f32], &[f32]); 3] = [
            (&[0.1, 0.7, -0.3], &[0.9, -0.2, 0.4]),
            (&[3.0, 4.0, 0.0], &[0.0, 4.0, 3.0]),
            (&[-1.5, 2.5, 1e-4], &[7.0, -0.25, 3.0]),
        ];
        for (a, b) in pairs {
            assert_eq!(cosine_similarity(a, b), cosine_similarity(b, a));
        }
    }

    #[test]
    fn test_similarity_not_clamped_or_scaled() {
        // 45 degrees apart.
        let s = cosine_similarity(&[1.0, 0.0], &[1.0, 1.0]);
        assert!((s - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_is_match_is_strict() {
        assert!(is_match(0.51, 0.5));
        assert!(!is_match(0.5, 0.5));
        assert!(!is_match(0.2, 0.5));

        let m = CosineMatcher::new(0.8);
        assert_eq!(m.threshold(), 0.8);
        assert!(m.is_match(0.81));
        assert!(!m.is_match(0.8));
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(CosineMatcher::default().threshold, DEFAULT_THRESHOLD);
    }
}
