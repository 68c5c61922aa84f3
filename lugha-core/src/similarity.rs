//! Cosine similarity between embedding vectors.

use crate::error::SimilarityError;

/// Compute the cosine similarity of two equal-length vectors.
///
/// Accumulates in `f64` and clamps the result into `[-1, 1]` so rounding never
/// pushes a score out of range. Zero-magnitude (including empty) vectors are
/// rejected rather than producing a division by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        if !x.is_finite() || !y.is_finite() {
            return Err(SimilarityError::NonFinite);
        }
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(SimilarityError::ZeroVector);
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(similarity.clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let v = vec![0.3, -1.2, 4.0, 0.0];
        let s = cosine_similarity(&v, &v).unwrap();
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_orthogonal_vectors() {
        let s = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(s.abs() < 1e-12);
    }

    #[test]
    fn test_opposite_vectors() {
        let s = cosine_similarity(&[1.0, 2.0, 3.0], &[-1.0, -2.0, -3.0]).unwrap();
        assert!((s + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_invariant() {
        let a = cosine_similarity(&[1.0, 2.0], &[2.0, 1.0]).unwrap();
        let b = cosine_similarity(&[10.0, 20.0], &[2.0, 1.0]).unwrap();
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err, SimilarityError::DimensionMismatch { left: 2, right: 3 });
    }

    #[test]
    fn test_zero_vector() {
        let err = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap_err();
        assert_eq!(err, SimilarityError::ZeroVector);
    }

    #[test]
    fn test_empty_vectors_are_zero() {
        assert_eq!(
            cosine_similarity(&[], &[]).unwrap_err(),
            SimilarityError::ZeroVector
        );
    }

    #[test]
    fn test_non_finite_component() {
        let err = cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]).unwrap_err();
        assert_eq!(err, SimilarityError::NonFinite);
    }
}
