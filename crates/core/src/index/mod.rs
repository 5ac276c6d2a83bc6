//! Search methods
//!
//! A method turns the points held by an index into a searchable structure:
//!
//! - [`FlatIndex`] (`brute_force`, alias `seq_search`): exhaustive scan, exact
//! - [`HnswIndex`] (`hnsw`): hierarchical navigable small world graph,
//!   approximate
//!
//! Methods never own points. Each call receives the space and the point
//! slice from the caller; a built structure covers the first
//! [`SearchMethod::indexed_count`] points of that slice.

pub mod flat;
pub mod hnsw;

pub use flat::FlatIndex;
pub use hnsw::{HnswConfig, HnswIndex};

use crate::config::PROGRESS_STEP_PERCENT;
use crate::point::{Point, PointRef};
use crate::query::{KnnQueue, Neighbor};
use crate::space::{DistValue, Space};
use crate::{Params, Result, SimdexError};

/// Operations every search method provides
pub trait SearchMethod<D: DistValue>: Send + Sync {
    /// Registered name of the method
    fn name(&self) -> &'static str;

    /// Build the structure over `points`, replacing any previous one.
    fn create_index(
        &mut self,
        space: &dyn Space<D>,
        points: &[Point],
        params: &Params,
        progress: bool,
    ) -> Result<()>;

    /// Apply query-time parameters. An empty set restores the defaults.
    fn set_query_params(&mut self, params: &Params) -> Result<()>;

    /// k nearest neighbors of `query`.
    fn knn(
        &self,
        space: &dyn Space<D>,
        points: &[Point],
        query: PointRef<'_>,
        k: usize,
    ) -> Result<KnnQueue<D>>;

    /// All neighbors within `radius` of `query`, unordered.
    fn range(
        &self,
        space: &dyn Space<D>,
        points: &[Point],
        query: PointRef<'_>,
        radius: D,
    ) -> Result<Vec<Neighbor<D>>>;

    /// Number of points the built structure covers.
    fn indexed_count(&self) -> usize;

    /// Serialize the built structure.
    fn save_state(&self) -> Result<Vec<u8>>;

    /// Restore a structure produced by [`SearchMethod::save_state`].
    fn load_state(&mut self, bytes: &[u8]) -> Result<()>;

    /// Approximate heap bytes used by the structure.
    fn memory_usage(&self) -> usize;
}

/// Create a search method by name.
///
/// # Examples
///
/// ```
/// use simdex_core::create_method;
///
/// assert_eq!(create_method::<f32>("seq_search").unwrap().name(), "brute_force");
/// assert_eq!(create_method::<i32>("hnsw").unwrap().name(), "hnsw");
/// assert!(create_method::<f32>("annoy").is_err());
/// ```
pub fn create_method<D: DistValue>(name: &str) -> Result<Box<dyn SearchMethod<D>>> {
    match name {
        "brute_force" | "seq_search" => Ok(Box::new(FlatIndex::new())),
        "hnsw" => Ok(Box::new(HnswIndex::new(HnswConfig::default()))),
        other => Err(SimdexError::UnknownMethod(other.to_string())),
    }
}

/// Names accepted by [`create_method`], aliases excluded.
pub fn method_names() -> &'static [&'static str] {
    &["brute_force", "hnsw"]
}

/// Fails if the caller holds fewer points than the structure was built over,
/// which happens after loading an index without its data.
pub(crate) fn ensure_covered(indexed: usize, available: usize) -> Result<()> {
    if available < indexed {
        return Err(SimdexError::QueryFailed(format!(
            "Index was built over {} points but only {} are loaded",
            indexed, available
        )));
    }
    Ok(())
}

/// Verifies every point against the space before building.
pub(crate) fn check_points<D: DistValue>(space: &dyn Space<D>, points: &[Point]) -> Result<()> {
    for (position, point) in points.iter().enumerate() {
        space.check(point.view()).map_err(|e| {
            SimdexError::BuildFailed(format!("Point at position {}: {}", position, e))
        })?;
    }
    Ok(())
}

/// Logs build progress at fixed percentage steps.
pub(crate) struct Progress {
    method: &'static str,
    total: usize,
    enabled: bool,
    next_percent: usize,
}

impl Progress {
    pub(crate) fn new(method: &'static str, total: usize, enabled: bool) -> Self {
        Self {
            method,
            total,
            enabled,
            next_percent: PROGRESS_STEP_PERCENT,
        }
    }

    pub(crate) fn update(&mut self, done: usize) {
        if !self.enabled || self.total == 0 {
            return;
        }

        let percent = done * 100 / self.total;
        if percent >= self.next_percent {
            tracing::info!(method = self.method, done, total = self.total, "{}% built", percent);
            self.next_percent = (percent / PROGRESS_STEP_PERCENT + 1) * PROGRESS_STEP_PERCENT;
        }
    }
}
