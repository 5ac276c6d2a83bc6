//! Distance spaces
//!
//! A space knows which point encoding it accepts and how to measure the
//! distance between two such points. Spaces are registered per distance
//! value type: real-valued spaces produce `f32`, integer-valued spaces
//! produce `i32`. [`create_space`] looks a name up in the registry of the
//! requested value type only, so callers that do not know which registry a
//! name belongs to can try one and fall back to the other on
//! [`SimdexError::UnknownSpace`].

mod bytes;
mod dense;
mod sparse;
mod text;

pub use bytes::{BitHammingSpace, ByteL2SqrSpace};
pub use dense::{DenseIntSpace, DenseRealSpace, IntMetric, RealMetric};
pub use sparse::{SparseMetric, SparseSpace};
pub use text::{LevenSpace, NormLevenSpace};

use crate::config::MAX_DIMENSION;
use crate::point::{DistanceKind, PointData, PointKind, PointRef};
use crate::{Params, Result, SimdexError};
use std::fmt::Debug;

/// Distance value produced by a space: `f32` or `i32`
pub trait DistValue: Copy + PartialOrd + Debug + Send + Sync + 'static {
    const KIND: DistanceKind;

    /// Distance reported for points a space cannot compare.
    const MAX: Self;

    /// Element type of dense points under this distance kind.
    type Elem: Copy + Debug + PartialEq + Send + Sync + 'static;

    fn dense(point: PointRef<'_>) -> Option<&[Self::Elem]>;

    fn dense_ref(values: &[Self::Elem]) -> PointRef<'_>;

    fn dense_data(values: Vec<Self::Elem>) -> PointData;

    fn to_f32(self) -> f32;

    /// Convert a caller-supplied radius into this distance type.
    fn from_f32(value: f32) -> Self;

    /// Spaces registered for this distance type.
    fn registry() -> &'static [SpaceEntry<Self>];
}

impl DistValue for f32 {
    const KIND: DistanceKind = DistanceKind::Real;
    const MAX: Self = f32::MAX;
    type Elem = f32;

    fn dense(point: PointRef<'_>) -> Option<&[f32]> {
        match point {
            PointRef::Real(v) => Some(v),
            _ => None,
        }
    }

    fn dense_ref(values: &[f32]) -> PointRef<'_> {
        PointRef::Real(values)
    }

    fn dense_data(values: Vec<f32>) -> PointData {
        PointData::Real(values)
    }

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }

    fn registry() -> &'static [SpaceEntry<Self>] {
        &REAL_SPACES
    }
}

impl DistValue for i32 {
    const KIND: DistanceKind = DistanceKind::Integer;
    const MAX: Self = i32::MAX;
    type Elem = i32;

    fn dense(point: PointRef<'_>) -> Option<&[i32]> {
        match point {
            PointRef::Integer(v) => Some(v),
            _ => None,
        }
    }

    fn dense_ref(values: &[i32]) -> PointRef<'_> {
        PointRef::Integer(values)
    }

    fn dense_data(values: Vec<i32>) -> PointData {
        PointData::Integer(values)
    }

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        // `as` saturates and maps NaN to 0
        value.floor() as i32
    }

    fn registry() -> &'static [SpaceEntry<Self>] {
        &INT_SPACES
    }
}

/// A distance function over one point encoding
pub trait Space<D: DistValue>: Send + Sync {
    /// Registered name of the space
    fn name(&self) -> &'static str;

    /// The only point encoding this space accepts
    fn point_kind(&self) -> PointKind;

    /// Dimension fixed by the `dim` parameter, if any
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Distance between two points already accepted by [`Space::check`].
    fn distance(&self, a: PointRef<'_>, b: PointRef<'_>) -> D;

    /// Verify that `point` can be used with this space.
    fn check(&self, point: PointRef<'_>) -> Result<()> {
        if point.kind() != self.point_kind() {
            return Err(SimdexError::SpaceIncompatible(format!(
                "Space '{}' expects {:?} points, got {:?}",
                self.name(),
                self.point_kind(),
                point.kind()
            )));
        }

        if point.kind() == PointKind::Dense && D::dense(point).is_none() {
            return Err(SimdexError::SpaceIncompatible(format!(
                "Space '{}' expects dense values matching {:?} distances",
                self.name(),
                D::KIND
            )));
        }

        if let Some(expected) = self.dimension() {
            if point.len() != expected {
                return Err(SimdexError::DimensionMismatch {
                    expected,
                    actual: point.len(),
                });
            }
        }

        Ok(())
    }
}

/// Registry entry: name, accepted encoding and constructor
pub struct SpaceEntry<D: DistValue> {
    pub name: &'static str,
    pub point_kind: PointKind,
    build: fn(&Params) -> Result<Box<dyn Space<D>>>,
}

static REAL_SPACES: [SpaceEntry<f32>; 9] = [
    SpaceEntry { name: "l2", point_kind: PointKind::Dense, build: |p| DenseRealSpace::create(RealMetric::L2, p) },
    SpaceEntry { name: "l1", point_kind: PointKind::Dense, build: |p| DenseRealSpace::create(RealMetric::L1, p) },
    SpaceEntry { name: "linf", point_kind: PointKind::Dense, build: |p| DenseRealSpace::create(RealMetric::Linf, p) },
    SpaceEntry { name: "cosinesimil", point_kind: PointKind::Dense, build: |p| DenseRealSpace::create(RealMetric::Cosine, p) },
    SpaceEntry { name: "negdotprod", point_kind: PointKind::Dense, build: |p| DenseRealSpace::create(RealMetric::NegDot, p) },
    SpaceEntry { name: "l2sqr_sift", point_kind: PointKind::ByteVector, build: ByteL2SqrSpace::create },
    SpaceEntry { name: "cosinesimil_sparse", point_kind: PointKind::Sparse, build: |p| SparseSpace::create(SparseMetric::Cosine, p) },
    SpaceEntry { name: "negdotprod_sparse", point_kind: PointKind::Sparse, build: |p| SparseSpace::create(SparseMetric::NegDot, p) },
    SpaceEntry { name: "normleven", point_kind: PointKind::String, build: NormLevenSpace::create },
];

static INT_SPACES: [SpaceEntry<i32>; 4] = [
    SpaceEntry { name: "leven", point_kind: PointKind::String, build: LevenSpace::create },
    SpaceEntry { name: "bit_hamming", point_kind: PointKind::ByteVector, build: BitHammingSpace::create },
    SpaceEntry { name: "l1_int", point_kind: PointKind::Dense, build: |p| DenseIntSpace::create(IntMetric::L1, p) },
    SpaceEntry { name: "l2sqr_int", point_kind: PointKind::Dense, build: |p| DenseIntSpace::create(IntMetric::L2Sqr, p) },
];

/// Create a space registered for distance type `D`.
///
/// # Errors
///
/// [`SimdexError::UnknownSpace`] if no space of that name is registered for
/// `D`; [`SimdexError::InvalidParam`] if the parameters are rejected.
///
/// # Examples
///
/// ```
/// use simdex_core::{create_space, Params, PointKind, SimdexError};
///
/// let space = create_space::<f32>("cosinesimil", &Params::new()).unwrap();
/// assert_eq!(space.point_kind(), PointKind::Dense);
///
/// let missing = create_space::<i32>("cosinesimil", &Params::new());
/// assert!(matches!(missing, Err(SimdexError::UnknownSpace(_))));
/// ```
pub fn create_space<D: DistValue>(name: &str, params: &Params) -> Result<Box<dyn Space<D>>> {
    let entry = D::registry()
        .iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| SimdexError::UnknownSpace(name.to_string()))?;
    (entry.build)(params)
}

/// Names of all spaces registered for distance type `D`.
pub fn space_names<D: DistValue>() -> impl Iterator<Item = &'static str> {
    D::registry().iter().map(|entry| entry.name)
}

/// Reads the optional `dim` parameter shared by dense and byte spaces.
fn read_dimension(params: &Params) -> Result<Option<usize>> {
    let mut reader = params.reader();
    let dim = reader.get_opt::<usize>("dim")?;
    reader.finish()?;

    match dim {
        Some(0) => Err(SimdexError::InvalidParam(
            "Parameter 'dim' must be greater than 0".to_string(),
        )),
        Some(d) if d > MAX_DIMENSION => Err(SimdexError::InvalidParam(format!(
            "Parameter 'dim' too large (max {})",
            MAX_DIMENSION
        ))),
        other => Ok(other),
    }
}

/// Rejects any parameter; for spaces that take none.
fn no_params(params: &Params) -> Result<()> {
    params.reader().finish()
}
