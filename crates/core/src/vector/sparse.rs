//! Sparse vector kernels
//!
//! Inputs must have strictly increasing ids; both lists are walked once in
//! merge order.

use crate::point::SparseElem;

/// Dot product over the ids present in both vectors.
///
/// # Examples
///
/// ```
/// use simdex_core::vector::sparse::sparse_dot;
/// use simdex_core::SparseElem;
///
/// let a = [SparseElem::new(1, 2.0), SparseElem::new(5, 1.0)];
/// let b = [SparseElem::new(5, 3.0), SparseElem::new(7, 4.0)];
/// assert_eq!(sparse_dot(&a, &b), 3.0);
/// ```
pub fn sparse_dot(a: &[SparseElem], b: &[SparseElem]) -> f32 {
    let (mut i, mut j) = (0, 0);
    let mut sum = 0.0f32;

    while i < a.len() && j < b.len() {
        match a[i].id.cmp(&b[j].id) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].value * b[j].value;
                i += 1;
                j += 1;
            }
        }
    }

    sum
}

fn sparse_norm(v: &[SparseElem]) -> f32 {
    v.iter().map(|e| e.value * e.value).sum::<f32>().sqrt()
}

/// Cosine distance `1 - cos(a, b)`; zero vectors are at distance 1.0.
pub fn sparse_cosine_distance(a: &[SparseElem], b: &[SparseElem]) -> f32 {
    let norm_a = sparse_norm(a);
    let norm_b = sparse_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let similarity = sparse_dot(a, b) / (norm_a * norm_b);
    1.0 - similarity.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(pairs: &[(u32, f32)]) -> Vec<SparseElem> {
        pairs.iter().map(|&(id, value)| SparseElem::new(id, value)).collect()
    }

    #[test]
    fn test_sparse_dot_disjoint() {
        let a = v(&[(1, 1.0), (3, 1.0)]);
        let b = v(&[(2, 1.0), (4, 1.0)]);
        assert_eq!(sparse_dot(&a, &b), 0.0);
    }

    #[test]
    fn test_sparse_cosine() {
        let a = v(&[(1, 1.0), (2, 2.0)]);
        let b = v(&[(1, 2.0), (2, 4.0)]);
        assert!(sparse_cosine_distance(&a, &b).abs() < 1e-6);

        let c = v(&[(9, 1.0)]);
        assert!((sparse_cosine_distance(&a, &c) - 1.0).abs() < 1e-6);
    }
}
