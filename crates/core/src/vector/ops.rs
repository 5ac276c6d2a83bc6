//! Dense vector kernels
//!
//! All functions are hot-path code: they are marked `#[inline]`, iterate
//! with `zip` so the compiler can auto-vectorize, and only debug-check that
//! both inputs have the same length.

/// Manhattan distance: sum(|a\[i\] - b\[i\]|)
#[inline]
pub fn l1_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Computes the Euclidean (L2) distance between two vectors.
///
/// # Examples
///
/// ```
/// use simdex_core::vector::ops::l2_distance;
///
/// let distance = l2_distance(&[0.0, 0.0], &[3.0, 4.0]);
/// assert!((distance - 5.0).abs() < 1e-6);
/// ```
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f32>()
        .sqrt()
}

/// Chebyshev distance: max(|a\[i\] - b\[i\]|)
#[inline]
pub fn linf_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

/// Sum of element-wise products.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine distance: `1 - cos(a, b)`, in the range [0, 2].
///
/// A zero vector has no direction and is treated as orthogonal to
/// everything (distance 1.0). Similarity is clamped to [-1, 1] to absorb
/// rounding error.
///
/// # Examples
///
/// ```
/// use simdex_core::vector::ops::cosine_distance;
///
/// assert!(cosine_distance(&[1.0, 2.0], &[2.0, 4.0]).abs() < 1e-6);
/// assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
/// assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
/// ```
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = magnitude(a);
    let norm_b = magnitude(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let similarity = dot_product(a, b) / (norm_a * norm_b);
    1.0 - similarity.clamp(-1.0, 1.0)
}

/// Manhattan distance over integers, saturating at `i32::MAX`.
#[inline]
pub fn l1_distance_i32(a: &[i32], b: &[i32]) -> i32 {
    debug_assert_eq!(a.len(), b.len());
    let sum: i64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (i64::from(x) - i64::from(y)).abs())
        .sum();
    saturate(sum)
}

/// Squared Euclidean distance over integers, saturating at `i32::MAX`.
#[inline]
pub fn l2_squared_i32(a: &[i32], b: &[i32]) -> i32 {
    debug_assert_eq!(a.len(), b.len());
    let sum = a.iter().zip(b.iter()).fold(0i64, |acc, (&x, &y)| {
        let diff = i64::from(x) - i64::from(y);
        acc.saturating_add(diff.saturating_mul(diff))
    });
    saturate(sum)
}

/// Squared Euclidean distance over byte vectors.
#[inline]
pub fn l2_squared_u8(a: &[u8], b: &[u8]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let sum: u64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let diff = u64::from(x.abs_diff(y));
            diff * diff
        })
        .sum();
    sum as f32
}

/// Number of differing bits between two byte vectors.
///
/// # Examples
///
/// ```
/// use simdex_core::vector::ops::bit_hamming;
///
/// assert_eq!(bit_hamming(&[0b1010, 0xff], &[0b0110, 0xff]), 2);
/// ```
#[inline]
pub fn bit_hamming(a: &[u8], b: &[u8]) -> i32 {
    debug_assert_eq!(a.len(), b.len());
    let bits: u64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| u64::from((x ^ y).count_ones()))
        .sum();
    saturate(bits as i64)
}

/// L2 norm of a vector.
#[inline(always)]
pub(crate) fn magnitude(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[inline(always)]
fn saturate(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
