//! Point representations
//!
//! Every indexed item is one of four encodings. [`PointData`] owns its
//! contents and is what an index stores; [`PointRef`] is the borrowed view
//! used for queries and distance computation, so a caller's buffer can be
//! searched without copying it.

use crate::{Result, SimdexError};
use serde::{Deserialize, Serialize};

/// Encoding of the points held by an index.
///
/// The discriminants are part of the C ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointKind {
    /// Dense numeric vector (`f32` or `i32`, following the distance kind)
    Dense = 0,
    /// Sparse list of `(id, value)` pairs with strictly increasing ids
    Sparse = 1,
    /// Fixed-width vector of raw bytes
    ByteVector = 2,
    /// Opaque byte string
    String = 3,
}

impl TryFrom<i32> for PointKind {
    type Error = SimdexError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(PointKind::Dense),
            1 => Ok(PointKind::Sparse),
            2 => Ok(PointKind::ByteVector),
            3 => Ok(PointKind::String),
            other => Err(SimdexError::InvalidArgument(format!(
                "Unknown point kind: {}",
                other
            ))),
        }
    }
}

/// Value type produced by a distance function.
///
/// The discriminants are part of the C ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceKind {
    Real = 0,
    Integer = 1,
}

impl TryFrom<i32> for DistanceKind {
    type Error = SimdexError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(DistanceKind::Real),
            1 => Ok(DistanceKind::Integer),
            other => Err(SimdexError::InvalidArgument(format!(
                "Unknown distance kind: {}",
                other
            ))),
        }
    }
}

/// One entry of a sparse vector. Layout matches the C struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SparseElem {
    pub id: u32,
    pub value: f32,
}

impl SparseElem {
    pub fn new(id: u32, value: f32) -> Self {
        Self { id, value }
    }
}

/// Owned point contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PointData {
    Real(Vec<f32>),
    Integer(Vec<i32>),
    Sparse(Vec<SparseElem>),
    Bytes(Vec<u8>),
    Text(Vec<u8>),
}

impl PointData {
    /// Borrow the contents as a [`PointRef`].
    pub fn view(&self) -> PointRef<'_> {
        match self {
            PointData::Real(v) => PointRef::Real(v),
            PointData::Integer(v) => PointRef::Integer(v),
            PointData::Sparse(v) => PointRef::Sparse(v),
            PointData::Bytes(v) => PointRef::Bytes(v),
            PointData::Text(v) => PointRef::Text(v),
        }
    }
}

/// Borrowed point contents
///
/// The lifetime ties the view to the buffer it was built from; a view never
/// outlives the call that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointRef<'a> {
    Real(&'a [f32]),
    Integer(&'a [i32]),
    Sparse(&'a [SparseElem]),
    Bytes(&'a [u8]),
    Text(&'a [u8]),
}

impl<'a> PointRef<'a> {
    pub fn kind(&self) -> PointKind {
        match self {
            PointRef::Real(_) | PointRef::Integer(_) => PointKind::Dense,
            PointRef::Sparse(_) => PointKind::Sparse,
            PointRef::Bytes(_) => PointKind::ByteVector,
            PointRef::Text(_) => PointKind::String,
        }
    }

    /// Number of elements: components for dense points, pairs for sparse
    /// points, bytes for byte vectors and strings.
    pub fn len(&self) -> usize {
        match self {
            PointRef::Real(v) => v.len(),
            PointRef::Integer(v) => v.len(),
            PointRef::Sparse(v) => v.len(),
            PointRef::Bytes(v) => v.len(),
            PointRef::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the contents in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            PointRef::Real(v) => std::mem::size_of_val(*v),
            PointRef::Integer(v) => std::mem::size_of_val(*v),
            PointRef::Sparse(v) => std::mem::size_of_val(*v),
            PointRef::Bytes(v) | PointRef::Text(v) => v.len(),
        }
    }

    /// Copy the viewed contents into an owned [`PointData`].
    pub fn to_data(&self) -> PointData {
        match *self {
            PointRef::Real(v) => PointData::Real(v.to_vec()),
            PointRef::Integer(v) => PointData::Integer(v.to_vec()),
            PointRef::Sparse(v) => PointData::Sparse(v.to_vec()),
            PointRef::Bytes(v) => PointData::Bytes(v.to_vec()),
            PointRef::Text(v) => PointData::Text(v.to_vec()),
        }
    }
}

/// A stored point: caller-assigned id plus owned contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: i32,
    pub data: PointData,
}

impl Point {
    pub fn new(id: i32, data: PointData) -> Self {
        Self { id, data }
    }

    pub fn view(&self) -> PointRef<'_> {
        self.data.view()
    }

    /// Approximate heap footprint of this point in bytes.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.view().byte_len()
    }
}

/// Checks that a sparse vector is non-empty and its ids strictly increase.
///
/// Sparse distance functions merge two id lists in a single pass, so
/// duplicated or unordered ids would silently produce wrong distances.
///
/// # Examples
///
/// ```
/// use simdex_core::point::validate_sparse;
/// use simdex_core::SparseElem;
///
/// let ok = [SparseElem::new(1, 0.5), SparseElem::new(4, 1.0), SparseElem::new(9, 2.0)];
/// assert!(validate_sparse(&ok).is_ok());
///
/// let dup = [SparseElem::new(3, 0.5), SparseElem::new(3, 1.0)];
/// assert!(validate_sparse(&dup).is_err());
/// ```
pub fn validate_sparse(elems: &[SparseElem]) -> Result<()> {
    if elems.is_empty() {
        return Err(SimdexError::InvalidSparseElement(
            "Sparse vector has no elements".to_string(),
        ));
    }

    for (i, pair) in elems.windows(2).enumerate() {
        if pair[1].id <= pair[0].id {
            return Err(SimdexError::InvalidSparseElement(format!(
                "Sparse ids must be strictly increasing: id {} at position {} follows id {}",
                pair[1].id,
                i + 1,
                pair[0].id
            )));
        }
    }

    Ok(())
}
