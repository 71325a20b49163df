//! Vector arithmetic used by ranking.
//!
//! Embeddings are plain `f32` slices. Accumulation happens in `f64` so that
//! scores for long vectors stay stable, and every function is a pure
//! left-to-right fold so results are bit-for-bit reproducible.

use crate::error::{Result, SearchError};

/// Sum of elementwise products.
pub fn dot(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(SearchError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum())
}

/// Euclidean (L2) norm.
pub fn norm(a: &[f32]) -> f64 {
    a.iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt()
}

/// Cosine similarity in `[-1, 1]`.
///
/// Fails with [`SearchError::DimensionMismatch`] for unequal lengths and with
/// [`SearchError::DegenerateVector`] when either norm is exactly zero. A zero
/// result is always `+0.0`, so equal scores compare equal under `total_cmp`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    let dot = dot(a, b)?;
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return Err(SearchError::DegenerateVector);
    }
    // -0.0 + 0.0 == +0.0
    Ok((dot / denom).clamp(-1.0, 1.0) + 0.0)
}

/// `true` if every component is finite.
pub fn is_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// L2-normalize a vector. Returns a zero vector unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orthogonal_score_is_positive_zero() {
        let s = cosine_similarity(&[0.0, -1.0], &[-1.0, 0.0]).unwrap();
        assert_eq!(s, 0.0);
        assert!(s.is_sign_positive());
    }

    #[test]
    fn test_dot_and_norm() {
        assert_eq!(dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]).unwrap(), 32.0);
        assert_eq!(norm(&[3.0, 4.0]), 5.0);
        assert_eq!(norm(&[]), 0.0);
    }

    #[test]
    fn test_dot_dimension_mismatch() {
        let err = dot(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            SearchError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_self_similarity_is_one() {
        let a = [0.3, -1.2, 4.5, 0.0, 7.25];
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-12, "got {sim}");
    }

    #[test]
    fn test_orthogonal_is_zero() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 2.0, 0.0]).unwrap();
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn test_opposite_is_minus_one() {
        let sim = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]).unwrap();
        assert!((sim + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_magnitude_independent() {
        let a = cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]).unwrap();
        let b = cosine_similarity(&[10.0, 10.0], &[0.5, 0.0]).unwrap();
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn test_zero_vector_is_degenerate() {
        let err = cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, SearchError::DegenerateVector));
        let err = cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]).unwrap_err();
        assert!(matches!(err, SearchError::DegenerateVector));
    }

    #[test]
    fn test_mismatch_checked_before_degenerate() {
        let err = cosine_similarity(&[0.0, 0.0], &[0.0]).unwrap_err();
        assert!(matches!(err, SearchError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_is_finite() {
        assert!(is_finite(&[0.0, -1.0, 3.5]));
        assert!(!is_finite(&[0.0, f32::NAN]));
        assert!(!is_finite(&[f32::INFINITY]));
    }

    #[test]
    fn test_l2_normalize() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }
}
