//! Distance kernels
//!
//! Plain numeric routines behind the spaces in [`crate::space`]. Kernels
//! assume their inputs were already validated by the owning space (equal
//! lengths for dense inputs, strictly increasing ids for sparse inputs) and
//! never allocate except where noted.
//!
//! # Usage
//!
//! ```
//! use simdex_core::vector::ops::{l2_distance, cosine_distance};
//!
//! let a = [0.0, 0.0];
//! let b = [3.0, 4.0];
//! assert!((l2_distance(&a, &b) - 5.0).abs() < 1e-6);
//! assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
//! ```

pub mod edit;
pub mod ops;
pub mod sparse;

pub use edit::{levenshtein, normalized_levenshtein};
pub use ops::{
    bit_hamming, cosine_distance, dot_product, l1_distance, l1_distance_i32, l2_distance,
    l2_squared_i32, l2_squared_u8, linf_distance,
};
pub use sparse::{sparse_cosine_distance, sparse_dot};
