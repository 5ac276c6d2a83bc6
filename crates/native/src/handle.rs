//! Index handle
//!
//! An [`IndexHandle`] lives in memory from the caller's allocator. Its first
//! field is an [`IndexHeader`] recording the point kind and distance kind the
//! handle was created with, so C code can read the kinds at a fixed offset.
//! Behind the header, [`IndexState`] holds the engine instance typed by its
//! distance value; every operation dispatches on that enum.
//!
//! Lifecycle: created empty and unbuilt, points are appended in insertion
//! order, `build` makes it searchable, `reset` drops points and structure and
//! returns it to unbuilt, `destroy` releases everything through the allocator
//! captured at creation.

use crate::alloc::{AllocBox, AllocBuf, Allocator};
use crate::borrow::BorrowedBuffer;
use crate::error::{FfiError, FfiResult};
use crate::fill::ResultSink;
use crate::pool::WorkerPool;
use rayon::prelude::*;
use simdex_core::config::MAX_K;
use simdex_core::query::sort_neighbors;
use simdex_core::storage::{
    data_path, load_index_file, load_points, save_index_file, save_points, IndexFileHeader,
};
use simdex_core::{
    create_method, create_space, DistValue, DistanceKind, ErrorCode, KnnQueue, Neighbor, Params,
    Point, PointKind, PointRef, SearchMethod, SimdexError, Space,
};
use std::path::Path;
use std::time::Instant;

/// Kinds fixed at creation. Always the first field of [`IndexHandle`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub point_kind: PointKind,
    pub distance_kind: DistanceKind,
}

/// A search hit with its distance widened to `f32`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: i32,
    pub distance: f32,
}

impl<D: DistValue> From<Neighbor<D>> for Hit {
    fn from(n: Neighbor<D>) -> Self {
        Self {
            id: n.id,
            distance: n.distance.to_f32(),
        }
    }
}

/// Engine instance typed by distance value
pub enum IndexState {
    Real(TypedIndex<f32>),
    Integer(TypedIndex<i32>),
}

macro_rules! with_index {
    ($state:expr, $index:ident => $body:expr) => {
        match $state {
            IndexState::Real($index) => $body,
            IndexState::Integer($index) => $body,
        }
    };
}

impl IndexState {
    /// Resolve the space name against both registries, then check it
    /// against the requested kinds.
    fn create(
        space: &str,
        space_params: &Params,
        method: &str,
        point_kind: PointKind,
        distance_kind: DistanceKind,
    ) -> FfiResult<Self> {
        // Method names are shared by both distance types
        create_method::<f32>(method)?;

        let state = match create_space::<f32>(space, space_params) {
            Ok(s) => IndexState::Real(TypedIndex::new(s, space_params, method)),
            Err(SimdexError::UnknownSpace(_)) => match create_space::<i32>(space, space_params) {
                Ok(s) => IndexState::Integer(TypedIndex::new(s, space_params, method)),
                Err(SimdexError::UnknownSpace(_)) => {
                    return Err(FfiError::new(
                        ErrorCode::SpaceIncompatible,
                        format!("Unknown space '{}'", space),
                    ))
                }
                Err(e) => return Err(e.into()),
            },
            Err(e) => return Err(e.into()),
        };

        let resolved = state.distance_kind();
        if resolved != distance_kind {
            return Err(FfiError::new(
                ErrorCode::SpaceIncompatible,
                format!(
                    "Space '{}' produces {:?} distances, not {:?}",
                    space, resolved, distance_kind
                ),
            ));
        }

        let accepted = with_index!(&state, index => index.point_kind());
        if accepted != point_kind {
            return Err(FfiError::new(
                ErrorCode::SpaceIncompatible,
                format!(
                    "Space '{}' accepts {:?} points, not {:?}",
                    space, accepted, point_kind
                ),
            ));
        }

        Ok(state)
    }

    fn distance_kind(&self) -> DistanceKind {
        match self {
            IndexState::Real(_) => DistanceKind::Real,
            IndexState::Integer(_) => DistanceKind::Integer,
        }
    }
}

/// Engine state for one distance value type
pub struct TypedIndex<D: DistValue> {
    space: Box<dyn Space<D>>,
    space_params: Params,
    method_name: String,
    /// Built structure; `None` while unbuilt
    method: Option<Box<dyn SearchMethod<D>>>,
    points: Vec<Point>,
    /// Width fixed by the first dense or byte-vector point
    dimension: Option<usize>,
    /// Query-time parameters, re-applied after every build or load
    query_params: Option<Params>,
}

impl<D: DistValue> TypedIndex<D> {
    fn new(space: Box<dyn Space<D>>, space_params: &Params, method_name: &str) -> Self {
        Self {
            space,
            space_params: space_params.clone(),
            method_name: method_name.to_string(),
            method: None,
            points: Vec::new(),
            dimension: None,
            query_params: None,
        }
    }

    fn point_kind(&self) -> PointKind {
        self.space.point_kind()
    }

    fn built(&self) -> FfiResult<&dyn SearchMethod<D>> {
        self.method.as_deref().ok_or_else(|| {
            FfiError::new(
                ErrorCode::IndexNotBuilt,
                "Index has not been built; call simdex_index_build first",
            )
        })
    }

    fn check_point(&self, point: PointRef<'_>) -> FfiResult<()> {
        self.space.check(point)?;
        if let Some(expected) = self.dimension {
            if is_fixed_width(point.kind()) && point.len() != expected {
                return Err(SimdexError::DimensionMismatch {
                    expected,
                    actual: point.len(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn insert(&mut self, point: PointRef<'_>, id: Option<i32>) -> FfiResult<()> {
        self.check_point(point)?;
        let id = match id {
            Some(id) => id,
            None => i32::try_from(self.points.len())
                .map_err(|_| FfiError::invalid("Too many points for positional ids"))?,
        };

        if self.dimension.is_none() && is_fixed_width(point.kind()) {
            self.dimension = Some(point.len());
        }
        self.points.push(Point::new(id, point.to_data()));
        Ok(())
    }

    fn build(&mut self, params: &Params, progress: bool) -> FfiResult<()> {
        // Release the old structure before building the new one
        self.method = None;

        let mut method = create_method::<D>(&self.method_name)?;
        method.create_index(self.space.as_ref(), &self.points, params, progress)?;
        if let Some(query_params) = &self.query_params {
            method.set_query_params(query_params)?;
        }
        self.method = Some(method);
        Ok(())
    }

    fn reset(&mut self) {
        self.method = None;
        self.points = Vec::new();
        self.dimension = None;
    }

    fn set_query_params(&mut self, params: &Params) -> FfiResult<()> {
        match self.method.as_mut() {
            Some(method) => method.set_query_params(params)?,
            None => create_method::<D>(&self.method_name)?.set_query_params(params)?,
        }
        self.query_params = Some(params.clone());
        Ok(())
    }

    fn knn_queue(&self, query: PointRef<'_>, k: usize) -> FfiResult<KnnQueue<D>> {
        check_k(k)?;
        self.check_point(query)?;
        let method = self.built()?;
        Ok(method.knn(self.space.as_ref(), &self.points, query, k)?)
    }

    fn range_hits(&self, query: PointRef<'_>, radius: f32) -> FfiResult<Vec<Neighbor<D>>> {
        if radius.is_nan() {
            return Err(FfiError::invalid("Radius must not be NaN"));
        }
        self.check_point(query)?;
        let method = self.built()?;
        Ok(method.range(self.space.as_ref(), &self.points, query, D::from_f32(radius))?)
    }

    fn knn_batch(
        &self,
        queries: &[PointRef<'_>],
        k: usize,
        sinks: &mut [ResultSink<'_>],
        workers: &WorkerPool,
        parallelism: usize,
    ) -> FfiResult<()> {
        if queries.len() != sinks.len() {
            return Err(FfiError::invalid(format!(
                "{} queries but {} result buffers",
                queries.len(),
                sinks.len()
            )));
        }
        check_k(k)?;
        for (i, query) in queries.iter().enumerate() {
            self.check_point(*query)
                .map_err(|e| FfiError::new(e.code(), format!("Query {}: {}", i, e.message())))?;
        }
        let method = self.built()?;
        let width = workers.resolve(parallelism)?;

        let space = self.space.as_ref();
        let points = self.points.as_slice();
        let run = |(query, sink): (&PointRef<'_>, &mut ResultSink<'_>)| -> FfiResult<()> {
            let queue = method.knn(space, points, *query, k)?;
            sink.fill_knn(queue).map(|_| ())
        };

        tracing::debug!(queries = queries.len(), k, width, "Running batch knn");
        if width == 1 || queries.len() < 2 {
            queries.iter().zip(sinks.iter_mut()).try_for_each(run)
        } else {
            let pool = workers.get(width)?;
            pool.install(|| {
                queries
                    .par_iter()
                    .zip(sinks.par_iter_mut())
                    .try_for_each(run)
            })
        }
    }

    fn point(&self, position: usize) -> FfiResult<PointRef<'_>> {
        self.points
            .get(position)
            .map(Point::view)
            .ok_or_else(|| {
                FfiError::invalid(format!(
                    "Position {} out of range (index holds {} points)",
                    position,
                    self.points.len()
                ))
            })
    }

    fn distance(&self, i: usize, j: usize) -> FfiResult<f32> {
        let a = self.point(i)?;
        let b = self.point(j)?;
        Ok(self.space.distance(a, b).to_f32())
    }

    fn memory_usage(&self) -> usize {
        match &self.method {
            Some(method) => {
                method.memory_usage()
                    + self.points.iter().map(Point::memory_usage).sum::<usize>()
                    + std::mem::size_of::<Self>()
            }
            None => 0,
        }
    }

    fn save(&self, path: &Path, include_data: bool) -> FfiResult<()> {
        let method = self.built()?;
        let header = IndexFileHeader::new(
            self.point_kind(),
            D::KIND,
            self.space.name(),
            self.space_params.clone(),
            self.method_name.as_str(),
            self.dimension,
            method.indexed_count(),
        );
        save_index_file(path, &header, &method.save_state()?)?;
        if include_data {
            save_points(&data_path(path), &self.points)?;
        }
        Ok(())
    }

    fn restore(&mut self, header: &IndexFileHeader, state: &[u8], points: Vec<Point>) -> FfiResult<()> {
        for (position, point) in points.iter().enumerate() {
            self.space.check(point.view()).map_err(|e| {
                FfiError::new(
                    ErrorCode::DataIoFailed,
                    format!("Stored point at position {}: {}", position, e),
                )
            })?;
        }

        let mut method = create_method::<D>(&self.method_name)?;
        method.load_state(state)?;
        if !points.is_empty() && points.len() < method.indexed_count() {
            return Err(FfiError::new(
                ErrorCode::DataIoFailed,
                format!(
                    "Data file holds {} points but the index covers {}",
                    points.len(),
                    method.indexed_count()
                ),
            ));
        }
        if let Some(query_params) = &self.query_params {
            method.set_query_params(query_params)?;
        }

        self.points = points;
        self.dimension = header.dimension;
        self.method = Some(method);
        Ok(())
    }
}

/// Dense and byte-vector points share one width per index.
fn is_fixed_width(kind: PointKind) -> bool {
    matches!(kind, PointKind::Dense | PointKind::ByteVector)
}

fn check_k(k: usize) -> FfiResult<()> {
    if k > MAX_K {
        return Err(FfiError::invalid(format!("k too large: {} (max {})", k, MAX_K)));
    }
    Ok(())
}

/// A nearest-neighbor index in caller-allocated memory
#[repr(C)]
pub struct IndexHandle {
    header: IndexHeader,
    allocator: Allocator,
    state: IndexState,
    workers: WorkerPool,
}

impl IndexHandle {
    /// Create an empty, unbuilt index.
    ///
    /// The space name is looked up among real-valued spaces first, then
    /// integer-valued ones. The space must produce `distance_kind` values and
    /// accept `point_kind` points, otherwise creation fails with
    /// `SpaceIncompatible`.
    pub fn create(
        space: &str,
        space_params: &Params,
        method: &str,
        point_kind: PointKind,
        distance_kind: DistanceKind,
        allocator: Allocator,
    ) -> FfiResult<AllocBox<IndexHandle>> {
        let state = IndexState::create(space, space_params, method, point_kind, distance_kind)?;
        let handle = allocator.boxed(IndexHandle {
            header: IndexHeader {
                point_kind,
                distance_kind,
            },
            allocator,
            state,
            workers: WorkerPool::default(),
        })?;

        tracing::info!(space, method, ?point_kind, ?distance_kind, "Created index");
        Ok(handle)
    }

    /// Load an index saved with [`IndexHandle::save`].
    ///
    /// Without `include_data` the handle is built but holds no points;
    /// queries fail with `QueryExecutionFailed` until enough points are
    /// inserted again.
    pub fn load(
        path: &Path,
        point_kind: PointKind,
        distance_kind: DistanceKind,
        allocator: Allocator,
        include_data: bool,
    ) -> FfiResult<AllocBox<IndexHandle>> {
        let (header, state) = load_index_file(path)?;
        if header.point_kind != point_kind || header.distance_kind != distance_kind {
            return Err(FfiError::new(
                ErrorCode::SpaceIncompatible,
                format!(
                    "Index file holds {:?}/{:?} data, requested {:?}/{:?}",
                    header.point_kind, header.distance_kind, point_kind, distance_kind
                ),
            ));
        }

        let points = if include_data {
            load_points(&data_path(path))?
        } else {
            Vec::new()
        };

        let mut handle = Self::create(
            &header.space_name,
            &header.space_params,
            &header.method_name,
            point_kind,
            distance_kind,
            allocator,
        )?;
        with_index!(&mut handle.state, index => index.restore(&header, &state, points))?;

        tracing::info!(
            path = %path.display(),
            points = handle.data_count(),
            include_data,
            "Loaded index"
        );
        Ok(handle)
    }

    pub fn header(&self) -> IndexHeader {
        debug_assert_eq!(self.header.distance_kind, self.state.distance_kind());
        self.header
    }

    pub fn allocator(&self) -> Allocator {
        self.allocator
    }

    pub fn space_name(&self) -> &'static str {
        with_index!(&self.state, index => index.space.name())
    }

    pub fn method_name(&self) -> &str {
        with_index!(&self.state, index => index.method_name.as_str())
    }

    pub fn is_built(&self) -> bool {
        with_index!(&self.state, index => index.method.is_some())
    }

    /// Append one point. `None` assigns the insertion position as id.
    pub fn insert(&mut self, point: PointRef<'_>, id: Option<i32>) -> FfiResult<()> {
        with_index!(&mut self.state, index => index.insert(point, id))
    }

    /// Append points in order. Stops at the first failure; points before it
    /// stay inserted. Returns the number inserted.
    pub fn insert_batch<'p, I>(&mut self, items: I) -> FfiResult<usize>
    where
        I: IntoIterator<Item = FfiResult<(PointRef<'p>, Option<i32>)>>,
    {
        let mut inserted = 0;
        for item in items {
            let (point, id) = item.map_err(|e| batch_error(inserted, e))?;
            self.insert(point, id).map_err(|e| batch_error(inserted, e))?;
            inserted += 1;
        }
        tracing::debug!(inserted, total = self.data_count(), "Inserted batch");
        Ok(inserted)
    }

    /// Build the search structure over all points held, replacing any
    /// previous structure.
    pub fn build(&mut self, params: &Params, progress: bool) -> FfiResult<()> {
        tracing::debug!(points = self.data_count(), params = %params, "Building index");
        let started = Instant::now();
        let result = with_index!(&mut self.state, index => index.build(params, progress));
        match &result {
            Ok(()) => tracing::info!(
                space = self.space_name(),
                method = self.method_name(),
                points = self.data_count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Built index"
            ),
            Err(e) => tracing::warn!(error = %e, "Index build failed"),
        }
        result
    }

    /// Drop all points and the built structure.
    pub fn reset(&mut self) {
        with_index!(&mut self.state, index => index.reset());
        tracing::debug!(space = self.space_name(), "Reset index");
    }

    /// Apply query-time parameters now and after every later build or load.
    pub fn set_query_params(&mut self, params: &Params) -> FfiResult<()> {
        with_index!(&mut self.state, index => index.set_query_params(params))
    }

    pub fn knn(&self, query: PointRef<'_>, k: usize) -> FfiResult<Vec<Hit>> {
        with_index!(&self.state, index => {
            let queue = index.knn_queue(query, k)?;
            Ok(queue.into_sorted_vec().into_iter().map(Hit::from).collect())
        })
    }

    /// Number of hits a knn query returns; runs the search.
    pub fn knn_size(&self, query: PointRef<'_>, k: usize) -> FfiResult<usize> {
        with_index!(&self.state, index => index.knn_queue(query, k).map(|q| q.len()))
    }

    pub fn knn_fill(&self, query: PointRef<'_>, k: usize, sink: &mut ResultSink<'_>) -> FfiResult<usize> {
        with_index!(&self.state, index => sink.fill_knn(index.knn_queue(query, k)?))
    }

    /// Run many knn queries. Result `i` always belongs to query `i`.
    ///
    /// `parallelism` 0 uses the handle's pool size, 1 runs on the calling
    /// thread. Every query is validated before any search starts. When
    /// searches fail on several workers, the error returned is the first one
    /// observed, not necessarily the lowest index.
    pub fn knn_batch(
        &self,
        queries: &[PointRef<'_>],
        k: usize,
        sinks: &mut [ResultSink<'_>],
        parallelism: usize,
    ) -> FfiResult<()> {
        let workers = &self.workers;
        with_index!(&self.state, index => index.knn_batch(queries, k, sinks, workers, parallelism))
    }

    pub fn range(&self, query: PointRef<'_>, radius: f32) -> FfiResult<Vec<Hit>> {
        with_index!(&self.state, index => {
            let mut hits = index.range_hits(query, radius)?;
            sort_neighbors(&mut hits);
            Ok(hits.into_iter().map(Hit::from).collect())
        })
    }

    /// Number of hits a range query returns; runs the search.
    pub fn range_size(&self, query: PointRef<'_>, radius: f32) -> FfiResult<usize> {
        with_index!(&self.state, index => index.range_hits(query, radius).map(|h| h.len()))
    }

    pub fn range_fill(&self, query: PointRef<'_>, radius: f32, sink: &mut ResultSink<'_>) -> FfiResult<usize> {
        with_index!(&self.state, index => sink.fill_range(index.range_hits(query, radius)?))
    }

    pub fn data_count(&self) -> usize {
        with_index!(&self.state, index => index.points.len())
    }

    /// Distance between the points at two insertion positions.
    pub fn distance(&self, i: usize, j: usize) -> FfiResult<f32> {
        with_index!(&self.state, index => index.distance(i, j))
    }

    /// Borrowed view of the point at `position`.
    pub fn point(&self, position: usize) -> FfiResult<PointRef<'_>> {
        with_index!(&self.state, index => index.point(position))
    }

    /// Element count of the point at `position`.
    pub fn point_size(&self, position: usize) -> FfiResult<usize> {
        Ok(self.point(position)?.len())
    }

    /// Copy of a dense point, to be released by the caller.
    pub fn borrow_dense(&self, position: usize) -> FfiResult<BorrowedBuffer> {
        match self.point(position)? {
            PointRef::Real(values) => BorrowedBuffer::copy_of(&self.allocator, values),
            PointRef::Integer(values) => BorrowedBuffer::copy_of(&self.allocator, values),
            other => Err(FfiError::invalid(format!(
                "Index holds {:?} points, not Dense",
                other.kind()
            ))),
        }
    }

    /// Copy of a sparse point, to be released by the caller.
    pub fn borrow_sparse(&self, position: usize) -> FfiResult<BorrowedBuffer> {
        match self.point(position)? {
            PointRef::Sparse(elems) => BorrowedBuffer::copy_of(&self.allocator, elems),
            other => Err(FfiError::invalid(format!(
                "Index holds {:?} points, not Sparse",
                other.kind()
            ))),
        }
    }

    /// NUL-terminated copy of a string point from `allocator`.
    pub fn point_string(&self, position: usize, allocator: &Allocator) -> FfiResult<AllocBuf<u8>> {
        match self.point(position)? {
            PointRef::Text(bytes) => allocator.c_string(bytes),
            other => Err(FfiError::invalid(format!(
                "Index holds {:?} points, not String",
                other.kind()
            ))),
        }
    }

    /// Approximate bytes held by a built index; 0 while unbuilt.
    pub fn memory_usage(&self) -> usize {
        with_index!(&self.state, index => index.memory_usage())
    }

    pub fn thread_pool_size(&self) -> usize {
        self.workers.size()
    }

    pub fn set_thread_pool_size(&mut self, size: usize) -> FfiResult<()> {
        self.workers.set_size(size)
    }

    /// Save the built structure to `path` and, with `include_data`, the
    /// points to `path` + `.dat`.
    pub fn save(&self, path: &Path, include_data: bool) -> FfiResult<()> {
        with_index!(&self.state, index => index.save(path, include_data))?;
        tracing::info!(path = %path.display(), include_data, "Saved index");
        Ok(())
    }
}

fn batch_error(position: usize, err: FfiError) -> FfiError {
    FfiError::new(
        err.code(),
        format!("Batch entry {}: {} ({} entries inserted)", position, err.message(), position),
    )
}
