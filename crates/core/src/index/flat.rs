//! Flat (brute-force) index implementation
//!
//! The FlatIndex provides exact nearest neighbor search by computing the
//! distance between the query and every indexed point. While this is
//! computationally expensive for large datasets (O(n) per query), it
//! guarantees exact results and is suitable for:
//! - Small to medium datasets
//! - Validation and testing of approximate search methods
//! - Spaces where no graph method performs well

use super::{check_points, ensure_covered, Progress, SearchMethod};
use crate::point::{Point, PointRef};
use crate::query::{KnnQueue, Neighbor};
use crate::space::{DistValue, Space};
use crate::{Params, Result};
use serde::{Deserialize, Serialize};

/// Flat index using brute-force search
///
/// The structure is just the number of points covered; every query scans
/// them in insertion order.
///
/// # Examples
/// ```
/// use simdex_core::index::FlatIndex;
/// use simdex_core::{create_space, Params, Point, PointData, SearchMethod};
///
/// let space = create_space::<f32>("l2", &Params::new()).unwrap();
/// let points: Vec<Point> = (0..10)
///     .map(|i| Point::new(i, PointData::Real(vec![i as f32, 0.0])))
///     .collect();
///
/// let mut index = FlatIndex::new();
/// index.create_index(space.as_ref(), &points, &Params::new(), false).unwrap();
///
/// let query = PointData::Real(vec![6.2, 0.0]);
/// let hits = index.knn(space.as_ref(), &points, query.view(), 3).unwrap().into_sorted_vec();
/// let ids: Vec<i32> = hits.iter().map(|n| n.id).collect();
/// assert_eq!(ids, vec![6, 7, 5]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatIndex {
    /// Number of points covered by the last build
    indexed: usize,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: DistValue> SearchMethod<D> for FlatIndex {
    fn name(&self) -> &'static str {
        "brute_force"
    }

    fn create_index(
        &mut self,
        space: &dyn Space<D>,
        points: &[Point],
        params: &Params,
        progress: bool,
    ) -> Result<()> {
        params.reader().finish()?;
        check_points(space, points)?;

        let mut progress = Progress::new("brute_force", points.len(), progress);
        progress.update(points.len());

        self.indexed = points.len();
        Ok(())
    }

    fn set_query_params(&mut self, params: &Params) -> Result<()> {
        params.reader().finish()
    }

    fn knn(
        &self,
        space: &dyn Space<D>,
        points: &[Point],
        query: PointRef<'_>,
        k: usize,
    ) -> Result<KnnQueue<D>> {
        ensure_covered(self.indexed, points.len())?;

        let mut queue = KnnQueue::new(k);
        for (position, point) in points[..self.indexed].iter().enumerate() {
            let distance = space.distance(query, point.view());
            queue.push(distance, position, point.id);
        }
        Ok(queue)
    }

    fn range(
        &self,
        space: &dyn Space<D>,
        points: &[Point],
        query: PointRef<'_>,
        radius: D,
    ) -> Result<Vec<Neighbor<D>>> {
        ensure_covered(self.indexed, points.len())?;

        Ok(points[..self.indexed]
            .iter()
            .enumerate()
            .filter_map(|(position, point)| {
                let distance = space.distance(query, point.view());
                (distance <= radius).then_some(Neighbor {
                    id: point.id,
                    position,
                    distance,
                })
            })
            .collect())
    }

    fn indexed_count(&self) -> usize {
        self.indexed
    }

    fn save_state(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        *self = bincode::deserialize(bytes)?;
        Ok(())
    }

    fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::create_space;
    use crate::{PointData, SimdexError};

    fn line_points(n: i32) -> Vec<Point> {
        (0..n)
            .map(|i| Point::new(100 + i, PointData::Real(vec![i as f32])))
            .collect()
    }

    #[test]
    fn test_knn_exact_order() {
        let space = create_space::<f32>("l1", &Params::new()).unwrap();
        let points = line_points(20);
        let mut index = FlatIndex::new();
        SearchMethod::<f32>::create_index(&mut index, space.as_ref(), &points, &Params::new(), false)
            .unwrap();

        let query = PointData::Real(vec![10.4]);
        let hits = index
            .knn(space.as_ref(), &points, query.view(), 4)
            .unwrap()
            .into_sorted_vec();
        let ids: Vec<i32> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![110, 111, 109, 112]);
    }

    #[test]
    fn test_k_larger_than_count() {
        let space = create_space::<f32>("l2", &Params::new()).unwrap();
        let points = line_points(3);
        let mut index = FlatIndex::new();
        SearchMethod::<f32>::create_index(&mut index, space.as_ref(), &points, &Params::new(), false)
            .unwrap();

        let query = PointData::Real(vec![0.0]);
        let queue = index.knn(space.as_ref(), &points, query.view(), 10).unwrap();
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_range() {
        let space = create_space::<f32>("l1", &Params::new()).unwrap();
        let points = line_points(10);
        let mut index = FlatIndex::new();
        SearchMethod::<f32>::create_index(&mut index, space.as_ref(), &points, &Params::new(), false)
            .unwrap();

        let query = PointData::Real(vec![5.0]);
        let mut hits = index.range(space.as_ref(), &points, query.view(), 1.0).unwrap();
        hits.sort_by_key(|n| n.id);
        let ids: Vec<i32> = hits.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![104, 105, 106]);
    }

    #[test]
    fn test_points_added_after_build_are_not_searched() {
        let space = create_space::<f32>("l1", &Params::new()).unwrap();
        let mut points = line_points(3);
        let mut index = FlatIndex::new();
        SearchMethod::<f32>::create_index(&mut index, space.as_ref(), &points, &Params::new(), false)
            .unwrap();

        points.push(Point::new(999, PointData::Real(vec![50.0])));
        let query = PointData::Real(vec![50.0]);
        let hits = index
            .knn(space.as_ref(), &points, query.view(), 1)
            .unwrap()
            .into_sorted_vec();
        assert_eq!(hits[0].id, 102);
    }

    #[test]
    fn test_missing_points_fail_query() {
        let space = create_space::<f32>("l1", &Params::new()).unwrap();
        let points = line_points(5);
        let mut index = FlatIndex::new();
        SearchMethod::<f32>::create_index(&mut index, space.as_ref(), &points, &Params::new(), false)
            .unwrap();

        let query = PointData::Real(vec![0.0]);
        let result = index.knn(space.as_ref(), &points[..2], query.view(), 1);
        assert!(matches!(result, Err(SimdexError::QueryFailed(_))));
    }

    #[test]
    fn test_rejects_params() {
        let space = create_space::<f32>("l1", &Params::new()).unwrap();
        let mut index = FlatIndex::new();
        let params = Params::parse(["M=16"]).unwrap();
        let result =
            SearchMethod::<f32>::create_index(&mut index, space.as_ref(), &[], &params, false);
        assert!(matches!(result, Err(SimdexError::InvalidParam(_))));
    }

    #[test]
    fn test_state_round_trip() {
        let space = create_space::<f32>("l1", &Params::new()).unwrap();
        let points = line_points(7);
        let mut index = FlatIndex::new();
        SearchMethod::<f32>::create_index(&mut index, space.as_ref(), &points, &Params::new(), false)
            .unwrap();

        let bytes = SearchMethod::<f32>::save_state(&index).unwrap();
        let mut restored = FlatIndex::new();
        SearchMethod::<f32>::load_state(&mut restored, &bytes).unwrap();
        assert_eq!(SearchMethod::<f32>::indexed_count(&restored), 7);
    }
}
