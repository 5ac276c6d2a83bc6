//! Global configuration constants for simdex.
//!
//! Tuning defaults and input validation limits are defined here. Runtime
//! configuration arrives as `name=value` parameters (see [`crate::params`]).

/// Default number of bidirectional links per HNSW node above layer 0.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8–64. Default: 16.
pub const HNSW_DEFAULT_M: usize = 16;

/// Upper bound accepted for the HNSW `M` parameter.
pub const HNSW_MAX_M: usize = 2048;

/// Default ef parameter during HNSW index construction.
///
/// Controls the size of the dynamic candidate list during insertion.
/// Higher values produce a better graph but slow down build time.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default ef parameter during HNSW search.
///
/// Controls the size of the dynamic candidate list during query.
/// Higher values improve recall at the cost of latency.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 50;

/// Maximum allowed dense or byte-vector dimension.
pub const MAX_DIMENSION: usize = 65_536;

/// Maximum number of results (`k`) per knn query.
pub const MAX_K: usize = 100_000;

/// Bounds for the per-handle worker pool used by batch queries.
pub const MIN_THREAD_POOL_SIZE: usize = 1;
pub const MAX_THREAD_POOL_SIZE: usize = 1024;

/// Suffix appended to an index path for its raw point dump.
pub const DATA_FILE_SUFFIX: &str = ".dat";

/// On-disk format version for index and point files.
pub const STORAGE_VERSION: u32 = 1;

/// Build progress is logged every this many percent of inserted points.
pub const PROGRESS_STEP_PERCENT: usize = 10;
