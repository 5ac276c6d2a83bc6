//! Simdex - Core library
//!
//! Similarity search engine behind the `simdex` C API: distance spaces over
//! four point encodings, exact and graph-based search methods, and index
//! persistence.
//!
//! # Overview
//!
//! ```
//! use simdex_core::{create_method, create_space, Params, Point, PointData};
//!
//! # fn main() -> simdex_core::Result<()> {
//! let space = create_space::<f32>("l2", &Params::new())?;
//! let points = vec![
//!     Point::new(0, PointData::Real(vec![0.0, 0.0])),
//!     Point::new(1, PointData::Real(vec![3.0, 4.0])),
//! ];
//!
//! let mut method = create_method::<f32>("brute_force")?;
//! method.create_index(space.as_ref(), &points, &Params::new(), false)?;
//!
//! let query = PointData::Real(vec![3.0, 3.0]);
//! let neighbors = method
//!     .knn(space.as_ref(), &points, query.view(), 1)?
//!     .into_sorted_vec();
//! assert_eq!(neighbors[0].id, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod index;
pub mod params;
pub mod point;
pub mod query;
pub mod space;
pub mod storage;
pub mod vector;

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, SimdexError>;

/// Error types for engine operations
#[derive(Debug, Error)]
pub enum SimdexError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Unknown space: {0}")]
    UnknownSpace(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Space incompatible: {0}")]
    SpaceIncompatible(String),

    #[error("Invalid sparse element: {0}")]
    InvalidSparseElement(String),

    #[error("Index build failed: {0}")]
    BuildFailed(String),

    #[error("Index has not been built")]
    NotBuilt,

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),
}

impl SimdexError {
    /// Status code reported across the C boundary for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SimdexError::InvalidArgument(_)
            | SimdexError::DimensionMismatch { .. }
            | SimdexError::InvalidParam(_)
            | SimdexError::UnknownMethod(_) => ErrorCode::InvalidArgument,
            SimdexError::UnknownSpace(_) | SimdexError::SpaceIncompatible(_) => {
                ErrorCode::SpaceIncompatible
            }
            SimdexError::InvalidSparseElement(_) => ErrorCode::InvalidSparseElement,
            SimdexError::BuildFailed(_) => ErrorCode::IndexBuildFailed,
            SimdexError::NotBuilt => ErrorCode::IndexNotBuilt,
            SimdexError::QueryFailed(_) => ErrorCode::QueryExecutionFailed,
            SimdexError::StorageError(_)
            | SimdexError::IoError(_)
            | SimdexError::SerializationError(_) => ErrorCode::DataIoFailed,
        }
    }
}

/// Status codes shared with C callers.
///
/// The numeric values are part of the ABI. Values 6, 11 and 12 are reserved.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success = 0,
    NullPointer = 1,
    InvalidArgument = 2,
    OutOfMemory = 3,
    BufferTooSmall = 4,
    SpaceIncompatible = 5,
    InvalidSparseElement = 7,
    IndexBuildFailed = 8,
    QueryExecutionFailed = 9,
    DataIoFailed = 10,
    Runtime = 13,
    IndexNotBuilt = 14,
}

impl ErrorCode {
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::NullPointer => "NullPointer",
            ErrorCode::InvalidArgument => "InvalidArgument",
            ErrorCode::OutOfMemory => "OutOfMemory",
            ErrorCode::BufferTooSmall => "BufferTooSmall",
            ErrorCode::SpaceIncompatible => "SpaceIncompatible",
            ErrorCode::InvalidSparseElement => "InvalidSparseElement",
            ErrorCode::IndexBuildFailed => "IndexBuildFailed",
            ErrorCode::QueryExecutionFailed => "QueryExecutionFailed",
            ErrorCode::DataIoFailed => "DataIOFailed",
            ErrorCode::Runtime => "Runtime",
            ErrorCode::IndexNotBuilt => "IndexNotBuilt",
        }
    }
}

// Re-export commonly used items
pub use index::{create_method, SearchMethod};
pub use params::{ParamReader, Params};
pub use point::{DistanceKind, Point, PointData, PointKind, PointRef, SparseElem};
pub use query::{KnnQueue, Neighbor};
pub use space::{create_space, DistValue, Space};
