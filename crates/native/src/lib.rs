//! Native C API for the simdex similarity search engine
//!
//! Exposes a C-compatible interface over `simdex-core`: index handles that
//! live in memory from a caller-supplied allocator, four point encodings,
//! k-nearest-neighbor and range queries, and persistence.
//!
//! # Safety
//!
//! The exported functions take raw pointers from C. Each one validates its
//! arguments before touching the engine, runs under a panic guard, and
//! reports failures as an [`ErrorCode`] with details in a thread-local slot
//! (see [`simdex_last_error_detail`]).
//!
//! # Architecture
//!
//! - **IndexHandle**: header with the point and distance kinds, followed by
//!   an engine instance typed by distance value
//! - **Allocator**: every buffer handed to C comes from, and goes back to,
//!   the caller's allocator
//! - **Thread-local errors**: code, message and source location of the last
//!   failure on the calling thread
//! - **Result buffers**: all-or-nothing fills in ascending distance order
//!
//! The same operations are available from Rust through [`IndexHandle`]
//! methods returning [`FfiResult`].
//!
//! # Example (C)
//!
//! ```c
//! #include "simdex.h"
//!
//! static void* my_alloc(size_t size, void* ctx) { return malloc(size); }
//! static void my_free(void* ptr, void* ctx) { free(ptr); }
//!
//! int main() {
//!     SimdexAllocator allocator = { my_alloc, my_free, NULL };
//!     SimdexIndex* index = NULL;
//!
//!     simdex_init();
//!     if (simdex_index_create("l2", NULL, "hnsw", SIMDEX_POINT_DENSE,
//!                             SIMDEX_DIST_REAL, &allocator, &index) != SIMDEX_OK) {
//!         fprintf(stderr, "create failed: %s\n", simdex_last_error());
//!         return 1;
//!     }
//!
//!     float points[3][2] = {{0, 0}, {1, 0}, {0, 1}};
//!     simdex_add_data_point_batch(index, points, 3, 2, NULL, NULL);
//!     simdex_index_build(index, NULL, false);
//!
//!     float query[2] = {0.9f, 0.1f};
//!     int32_t ids[2];
//!     float distances[2];
//!     SimdexResultBuffer result = { ids, distances, 0, 2 };
//!     simdex_knn_query_fill(index, query, 2, 2, &result);
//!
//!     for (size_t i = 0; i < result.size; i++) {
//!         printf("%d: %.3f\n", ids[i], distances[i]);
//!     }
//!
//!     simdex_index_destroy(index);
//!     return 0;
//! }
//! ```

pub mod alloc;
pub mod borrow;
pub mod encode;
pub mod error;
pub mod fill;
pub mod handle;
pub mod params;
pub mod pool;

pub use alloc::{AllocBox, AllocBuf, Allocator, RawAllocator};
pub use borrow::{BorrowToken, BorrowedBuffer};
pub use error::{last_error_code, last_error_message, FfiError, FfiResult};
pub use fill::{ResultBuffer, ResultSink};
pub use handle::{Hit, IndexHandle, IndexHeader};
pub use params::{ParamType, ParamValue, ParamsHandle};
pub use simdex_core::{DistanceKind, ErrorCode, PointKind, SparseElem};

use crate::encode::{point_bytes, view_flat_entry, view_point};
use crate::error::{clear_last_error, set_last_error, with_last_error};
use crate::params::params_or_empty;
use std::ffi::{c_void, CStr};
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Once;

// =============================================================================
// Call Guard
// =============================================================================

/// Run an exported function body: reset the error slot, catch panics, and
/// record any failure for `simdex_last_error_detail`.
fn ffi_call<F>(call: &'static str, body: F) -> ErrorCode
where
    F: FnOnce() -> FfiResult<()>,
{
    clear_last_error();
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => ErrorCode::Success,
        Ok(Err(err)) => fail(call, err),
        Err(_) => fail(
            call,
            FfiError::new(ErrorCode::Runtime, format!("Panic occurred in {}", call)),
        ),
    }
}

fn fail(call: &'static str, err: FfiError) -> ErrorCode {
    tracing::warn!(
        call,
        code = err.code().name(),
        file = err.location().file(),
        line = err.location().line(),
        "{}",
        err.message()
    );
    set_last_error(&err);
    err.code()
}

#[track_caller]
unsafe fn handle_ref<'a>(handle: *const IndexHandle) -> FfiResult<&'a IndexHandle> {
    handle.as_ref().ok_or_else(|| FfiError::null("Index handle"))
}

#[track_caller]
unsafe fn handle_mut<'a>(handle: *mut IndexHandle) -> FfiResult<&'a mut IndexHandle> {
    handle.as_mut().ok_or_else(|| FfiError::null("Index handle"))
}

#[track_caller]
fn out_ptr<T>(out: *mut T, what: &str) -> FfiResult<NonNull<T>> {
    NonNull::new(out).ok_or_else(|| FfiError::null(what))
}

#[track_caller]
unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> FfiResult<&'a str> {
    if ptr.is_null() {
        return Err(FfiError::null(what));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| FfiError::invalid(format!("{} is not valid UTF-8", what)))
}

/// `len` entries at `ptr`, or `None` for NULL.
unsafe fn optional_slice<'a, T>(ptr: *const T, len: usize) -> Option<&'a [T]> {
    if ptr.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(ptr, len))
    }
}

#[track_caller]
fn kinds(point_kind: i32, dist_kind: i32) -> FfiResult<(PointKind, DistanceKind)> {
    Ok((PointKind::try_from(point_kind)?, DistanceKind::try_from(dist_kind)?))
}

/// Hand a NUL-terminated copy of `text` to C.
unsafe fn write_string(
    text: &[u8],
    allocator: *const RawAllocator,
    out_str: *mut *mut c_char,
    out_len: *mut usize,
) -> FfiResult<()> {
    let out_str = out_ptr(out_str, "out_str")?;
    let allocator = Allocator::from_raw(allocator)?;
    let (ptr, len) = allocator.c_string(text)?.into_raw();
    out_str.as_ptr().write(ptr as *mut c_char);
    if let Some(out_len) = out_len.as_mut() {
        *out_len = len;
    }
    Ok(())
}

// =============================================================================
// Initialization
// =============================================================================

static INIT: Once = Once::new();

/// Initialize the library. Safe to call more than once; only the first call
/// has an effect.
///
/// Logging goes through `tracing`; install a subscriber in the host process
/// to see it.
#[no_mangle]
pub extern "C" fn simdex_init() {
    INIT.call_once(|| {
        tracing::debug!(version = env!("CARGO_PKG_VERSION"), "simdex initialized");
    });
}

// =============================================================================
// Parameters
// =============================================================================

/// Create an empty parameter list.
///
/// # Arguments
/// * `allocator` - Allocator that owns the list
/// * `out` - Receives the new list
///
/// # Safety
/// Free the list with `simdex_params_free()`.
///
/// # Example (C)
/// ```c
/// SimdexParams* params = NULL;
/// simdex_params_create(&allocator, &params);
/// int m = 32;
/// simdex_params_add(params, "M", SIMDEX_PARAM_INT, &m);
/// simdex_index_build(index, params, true);
/// simdex_params_free(params);
/// ```
#[no_mangle]
pub extern "C" fn simdex_params_create(
    allocator: *const RawAllocator,
    out: *mut *mut ParamsHandle,
) -> ErrorCode {
    ffi_call("simdex_params_create", || {
        let out = out_ptr(out, "out")?;
        let allocator = unsafe { Allocator::from_raw(allocator)? };
        let params = ParamsHandle::create(allocator)?;
        unsafe { out.as_ptr().write(params.into_raw()) };
        Ok(())
    })
}

/// Add or replace a parameter.
///
/// # Arguments
/// * `params` - Parameter list
/// * `name` - Parameter name (NUL-terminated)
/// * `param_type` - 0 = `int`, 1 = `double`, 2 = NUL-terminated string
/// * `value` - Pointer to the value of that type
#[no_mangle]
pub extern "C" fn simdex_params_add(
    params: *mut ParamsHandle,
    name: *const c_char,
    param_type: i32,
    value: *const c_void,
) -> ErrorCode {
    ffi_call("simdex_params_add", || {
        let params = unsafe { params.as_mut() }.ok_or_else(|| FfiError::null("Params"))?;
        let name = unsafe { c_str(name, "Parameter name")? };
        let param_type = ParamType::try_from(param_type)?;
        if value.is_null() {
            return Err(FfiError::null("Parameter value"));
        }

        let value = unsafe {
            match param_type {
                ParamType::Int => ParamValue::Int(ptr::read_unaligned(value as *const c_int)),
                ParamType::Double => ParamValue::Double(ptr::read_unaligned(value as *const f64)),
                ParamType::String => {
                    ParamValue::String(c_str(value as *const c_char, "Parameter value")?)
                }
            }
        };
        params.add(name, value)
    })
}

/// Free a parameter list. Passing NULL is a no-op.
#[no_mangle]
pub extern "C" fn simdex_params_free(params: *mut ParamsHandle) {
    let Some(params) = NonNull::new(params) else {
        return;
    };
    let _ = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        let allocator = params.as_ref().allocator();
        drop(AllocBox::from_raw(params, allocator));
    }));
}

// =============================================================================
// Creation and Destruction
// =============================================================================

/// Create an empty, unbuilt index.
///
/// # Arguments
/// * `space` - Space name, e.g. `"l2"`, `"cosinesimil_sparse"`, `"leven"`
/// * `space_params` - Space parameters, or NULL
/// * `method` - `"hnsw"` or `"brute_force"`
/// * `point_kind` - 0 dense, 1 sparse, 2 byte vector, 3 string
/// * `dist_kind` - 0 real (`float` distances), 1 integer (`int32_t`)
/// * `allocator` - Allocator for the handle and everything it hands out
/// * `out_handle` - Receives the handle; set to NULL on failure
///
/// # Returns
/// * `SIMDEX_OK` on success
/// * `SIMDEX_ERR_SPACE_INCOMPATIBLE` if the space is unknown or does not
///   match the kinds
///
/// # Safety
/// Destroy the handle with `simdex_index_destroy()`.
///
/// # Example (C)
/// ```c
/// SimdexIndex* index = NULL;
/// if (simdex_index_create("leven", NULL, "hnsw", SIMDEX_POINT_STRING,
///                         SIMDEX_DIST_INT, &allocator, &index) != SIMDEX_OK) {
///     fprintf(stderr, "Failed: %s\n", simdex_last_error());
/// }
/// ```
#[no_mangle]
pub extern "C" fn simdex_index_create(
    space: *const c_char,
    space_params: *const ParamsHandle,
    method: *const c_char,
    point_kind: i32,
    dist_kind: i32,
    allocator: *const RawAllocator,
    out_handle: *mut *mut IndexHandle,
) -> ErrorCode {
    ffi_call("simdex_index_create", || {
        let out = out_ptr(out_handle, "out_handle")?;
        unsafe { out.as_ptr().write(ptr::null_mut()) };

        let space = unsafe { c_str(space, "Space name")? };
        let method = unsafe { c_str(method, "Method name")? };
        let (point_kind, dist_kind) = kinds(point_kind, dist_kind)?;
        let allocator = unsafe { Allocator::from_raw(allocator)? };
        let space_params = unsafe { params_or_empty(space_params) };

        let handle =
            IndexHandle::create(space, &space_params, method, point_kind, dist_kind, allocator)?;
        unsafe { out.as_ptr().write(handle.into_raw()) };
        Ok(())
    })
}

/// Destroy an index and return its memory to the allocator it was created
/// with.
///
/// # Safety
/// After calling this function, the handle is invalid and must not be used.
/// Passing NULL is safe (no-op). Outstanding borrows stay valid and must
/// still be released.
#[no_mangle]
pub extern "C" fn simdex_index_destroy(handle: *mut IndexHandle) {
    let Some(handle) = NonNull::new(handle) else {
        return;
    };
    let _ = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        let allocator = handle.as_ref().allocator();
        drop(AllocBox::from_raw(handle, allocator));
        tracing::debug!("Destroyed index");
    }));
}

/// Read the kinds an index was created with.
///
/// The header is also the first member of the handle, so C code may read it
/// directly through `((SimdexIndexHeader*)index)`.
#[no_mangle]
pub extern "C" fn simdex_index_header(
    handle: *const IndexHandle,
    out: *mut IndexHeader,
) -> ErrorCode {
    ffi_call("simdex_index_header", || {
        let out = out_ptr(out, "out")?;
        let handle = unsafe { handle_ref(handle)? };
        unsafe { out.as_ptr().write(handle.header()) };
        Ok(())
    })
}

// =============================================================================
// Build and Reset
// =============================================================================

/// Build the search structure over all points currently held.
///
/// Building again without a reset rebuilds from scratch; the old structure
/// is released first. Query-time parameters set earlier are re-applied.
///
/// # Arguments
/// * `handle` - Index handle
/// * `params` - Build parameters (`M`, `efConstruction`, `seed` for hnsw),
///   or NULL
/// * `print_progress` - Log progress every 10% of points
#[no_mangle]
pub extern "C" fn simdex_index_build(
    handle: *mut IndexHandle,
    params: *const ParamsHandle,
    print_progress: bool,
) -> ErrorCode {
    ffi_call("simdex_index_build", || {
        let handle = unsafe { handle_mut(handle)? };
        let params = unsafe { params_or_empty(params) };
        handle.build(&params, print_progress)
    })
}

/// Delete all points and the built structure; the index becomes unbuilt.
#[no_mangle]
pub extern "C" fn simdex_index_reset(handle: *mut IndexHandle) -> ErrorCode {
    ffi_call("simdex_index_reset", || {
        let handle = unsafe { handle_mut(handle)? };
        handle.reset();
        Ok(())
    })
}

// =============================================================================
// Names
// =============================================================================

/// Copy the space name into memory from `allocator`.
///
/// # Arguments
/// * `out_str` - Receives the NUL-terminated name
/// * `out_len` - Receives its length without the terminator, or NULL
///
/// # Safety
/// Free the string with `simdex_free_string()` and the same allocator.
#[no_mangle]
pub extern "C" fn simdex_get_space_type(
    handle: *const IndexHandle,
    allocator: *const RawAllocator,
    out_str: *mut *mut c_char,
    out_len: *mut usize,
) -> ErrorCode {
    ffi_call("simdex_get_space_type", || {
        let handle = unsafe { handle_ref(handle)? };
        unsafe { write_string(handle.space_name().as_bytes(), allocator, out_str, out_len) }
    })
}

/// Copy the method name into memory from `allocator`.
///
/// Same contract as `simdex_get_space_type()`.
#[no_mangle]
pub extern "C" fn simdex_get_method(
    handle: *const IndexHandle,
    allocator: *const RawAllocator,
    out_str: *mut *mut c_char,
    out_len: *mut usize,
) -> ErrorCode {
    ffi_call("simdex_get_method", || {
        let handle = unsafe { handle_ref(handle)? };
        unsafe { write_string(handle.method_name().as_bytes(), allocator, out_str, out_len) }
    })
}

/// Free a string returned by this library. Passing NULL is a no-op.
#[no_mangle]
pub extern "C" fn simdex_free_string(
    string: *mut c_char,
    allocator: *const RawAllocator,
) -> ErrorCode {
    ffi_call("simdex_free_string", || {
        let Some(string) = NonNull::new(string) else {
            return Ok(());
        };
        let allocator = unsafe { Allocator::from_raw(allocator)? };
        unsafe { allocator.release(string) };
        Ok(())
    })
}

// =============================================================================
// Insertion
// =============================================================================

/// Append one point.
///
/// # Arguments
/// * `handle` - Index handle
/// * `data` - Point contents in the index's encoding
/// * `count` - Dimension (dense, byte vector), pair count (sparse), or byte
///   length with 0 meaning NUL-terminated (string)
/// * `id` - Caller-assigned id returned by queries
///
/// # Example (C)
/// ```c
/// SimdexSparseElem pairs[] = {{1, 0.5f}, {7, 1.0f}};
/// simdex_add_data_point(index, pairs, 2, 42);
/// ```
#[no_mangle]
pub extern "C" fn simdex_add_data_point(
    handle: *mut IndexHandle,
    data: *const c_void,
    count: usize,
    id: i32,
) -> ErrorCode {
    ffi_call("simdex_add_data_point", || {
        let handle = unsafe { handle_mut(handle)? };
        let point = unsafe { view_point(handle.header(), data, count)? };
        handle.insert(point, Some(id))
    })
}

/// Append `n` points packed in one buffer.
///
/// Dense and byte-vector points are `count` elements each. Sparse and
/// string points need `counts[i]` per entry. `ids` may be NULL to use
/// insertion positions.
///
/// Points are inserted in order; on failure the points before the failing
/// entry stay inserted. Check `simdex_data_qty()` to see how many.
#[no_mangle]
pub extern "C" fn simdex_add_data_point_batch(
    handle: *mut IndexHandle,
    data: *const c_void,
    n: usize,
    count: usize,
    counts: *const usize,
    ids: *const i32,
) -> ErrorCode {
    ffi_call("simdex_add_data_point_batch", || {
        let handle = unsafe { handle_mut(handle)? };
        let header = handle.header();
        let counts = unsafe { optional_slice(counts, n) };
        let ids = unsafe { optional_slice(ids, n) };

        let mut offset = 0usize;
        let items = (0..n).map(|i| {
            unsafe { view_flat_entry(header, data, &mut offset, count, counts, i) }
                .map(|point| (point, ids.map(|ids| ids[i])))
        });
        handle.insert_batch(items).map(|_| ())
    })
}

/// Append `n` points given as an array of pointers.
///
/// Entry `i` has `counts[i]` elements, or `count` when `counts` is NULL.
/// Same partial-commit behavior as `simdex_add_data_point_batch()`.
#[no_mangle]
pub extern "C" fn simdex_add_data_point_batch_pointers(
    handle: *mut IndexHandle,
    data: *const *const c_void,
    n: usize,
    count: usize,
    counts: *const usize,
    ids: *const i32,
) -> ErrorCode {
    ffi_call("simdex_add_data_point_batch_pointers", || {
        let handle = unsafe { handle_mut(handle)? };
        let header = handle.header();
        let pointers = unsafe { optional_slice(data, n) }
            .ok_or_else(|| FfiError::null("Batch data"))?;
        let counts = unsafe { optional_slice(counts, n) };
        let ids = unsafe { optional_slice(ids, n) };

        let items = pointers.iter().enumerate().map(|(i, &entry)| {
            let len = counts.map_or(count, |counts| counts[i]);
            unsafe { view_point(header, entry, len) }.map(|point| (point, ids.map(|ids| ids[i])))
        });
        handle.insert_batch(items).map(|_| ())
    })
}

// =============================================================================
// Queries
// =============================================================================

/// Number of results a knn query returns. Runs the search.
#[no_mangle]
pub extern "C" fn simdex_knn_query_get_size(
    handle: *const IndexHandle,
    query: *const c_void,
    count: usize,
    k: usize,
    out_size: *mut usize,
) -> ErrorCode {
    ffi_call("simdex_knn_query_get_size", || {
        let out = out_ptr(out_size, "out_size")?;
        let handle = unsafe { handle_ref(handle)? };
        let query = unsafe { view_point(handle.header(), query, count)? };
        let size = handle.knn_size(query, k)?;
        unsafe { out.as_ptr().write(size) };
        Ok(())
    })
}

/// Find the `k` nearest neighbors of `query`.
///
/// # Arguments
/// * `result` - Caller arrays of `capacity` entries; receives ids and
///   distances in ascending distance order, and the count in `size`
///
/// # Returns
/// * `SIMDEX_OK` on success
/// * `SIMDEX_ERR_BUFFER_TOO_SMALL` if more than `capacity` results were
///   found; nothing is written and `size` is 0
/// * `SIMDEX_ERR_INDEX_NOT_BUILT` before `simdex_index_build()`
///
/// # Example (C)
/// ```c
/// int32_t ids[10];
/// float distances[10];
/// SimdexResultBuffer result = { ids, distances, 0, 10 };
/// if (simdex_knn_query_fill(index, query, dim, 10, &result) == SIMDEX_OK) {
///     for (size_t i = 0; i < result.size; i++) { ... }
/// }
/// ```
#[no_mangle]
pub extern "C" fn simdex_knn_query_fill(
    handle: *const IndexHandle,
    query: *const c_void,
    count: usize,
    k: usize,
    result: *mut ResultBuffer,
) -> ErrorCode {
    ffi_call("simdex_knn_query_fill", || {
        let mut sink = unsafe { ResultSink::from_raw(result)? };
        let handle = unsafe { handle_ref(handle)? };
        let query = unsafe { view_point(handle.header(), query, count)? };
        handle.knn_fill(query, k, &mut sink).map(|_| ())
    })
}

/// Run `n` knn queries, optionally in parallel.
///
/// # Arguments
/// * `queries` - `n` query pointers
/// * `count` / `counts` - Element count per query, as for batch insertion
/// * `results` - `n` result buffers; `results[i]` receives query `i`
/// * `parallelism` - Worker threads: 0 = the handle's pool size, 1 = the
///   calling thread only
///
/// All queries are validated before any search starts.
#[no_mangle]
pub extern "C" fn simdex_knn_query_batch(
    handle: *const IndexHandle,
    queries: *const *const c_void,
    n: usize,
    count: usize,
    counts: *const usize,
    k: usize,
    results: *mut ResultBuffer,
    parallelism: usize,
) -> ErrorCode {
    ffi_call("simdex_knn_query_batch", || {
        let handle = unsafe { handle_ref(handle)? };
        if n == 0 {
            return Ok(());
        }
        if results.is_null() {
            return Err(FfiError::null("Result buffers"));
        }

        let mut sinks = (0..n)
            .map(|i| unsafe { ResultSink::from_raw(results.add(i)) })
            .collect::<FfiResult<Vec<_>>>()?;

        let header = handle.header();
        let pointers = unsafe { optional_slice(queries, n) }
            .ok_or_else(|| FfiError::null("Queries"))?;
        let counts = unsafe { optional_slice(counts, n) };
        let views = pointers
            .iter()
            .enumerate()
            .map(|(i, &query)| {
                let len = counts.map_or(count, |counts| counts[i]);
                unsafe { view_point(header, query, len) }
                    .map_err(|e| FfiError::new(e.code(), format!("Query {}: {}", i, e.message())))
            })
            .collect::<FfiResult<Vec<_>>>()?;

        handle.knn_batch(&views, k, &mut sinks, parallelism)
    })
}

/// Number of points within `radius` of `query`. Runs the search.
#[no_mangle]
pub extern "C" fn simdex_range_query_get_size(
    handle: *const IndexHandle,
    query: *const c_void,
    count: usize,
    radius: f32,
    out_size: *mut usize,
) -> ErrorCode {
    ffi_call("simdex_range_query_get_size", || {
        let out = out_ptr(out_size, "out_size")?;
        let handle = unsafe { handle_ref(handle)? };
        let query = unsafe { view_point(handle.header(), query, count)? };
        let size = handle.range_size(query, radius)?;
        unsafe { out.as_ptr().write(size) };
        Ok(())
    })
}

/// Find all points within `radius` of `query` (distance <= radius).
///
/// Same buffer contract as `simdex_knn_query_fill()`. For integer spaces the
/// radius is rounded down.
#[no_mangle]
pub extern "C" fn simdex_range_query_fill(
    handle: *const IndexHandle,
    query: *const c_void,
    count: usize,
    radius: f32,
    result: *mut ResultBuffer,
) -> ErrorCode {
    ffi_call("simdex_range_query_fill", || {
        let mut sink = unsafe { ResultSink::from_raw(result)? };
        let handle = unsafe { handle_ref(handle)? };
        let query = unsafe { view_point(handle.header(), query, count)? };
        handle.range_fill(query, radius, &mut sink).map(|_| ())
    })
}

// =============================================================================
// Introspection
// =============================================================================

/// Number of points held by the index.
///
/// # Returns
/// The count, or 0 if `handle` is NULL (check `simdex_last_error()`).
#[no_mangle]
pub extern "C" fn simdex_data_qty(handle: *const IndexHandle) -> usize {
    let mut count = 0;
    ffi_call("simdex_data_qty", || {
        count = unsafe { handle_ref(handle)? }.data_count();
        Ok(())
    });
    count
}

/// Distance between the points at insertion positions `i` and `j`.
///
/// Integer distances are widened to `float`.
#[no_mangle]
pub extern "C" fn simdex_get_distance(
    handle: *const IndexHandle,
    i: usize,
    j: usize,
    out: *mut f32,
) -> ErrorCode {
    ffi_call("simdex_get_distance", || {
        let out = out_ptr(out, "out")?;
        let handle = unsafe { handle_ref(handle)? };
        let distance = handle.distance(i, j)?;
        unsafe { out.as_ptr().write(distance) };
        Ok(())
    })
}

/// Element count of the point at position `i`: dimension, pair count, or
/// byte length.
#[no_mangle]
pub extern "C" fn simdex_get_data_point_size(
    handle: *const IndexHandle,
    i: usize,
    out: *mut usize,
) -> ErrorCode {
    ffi_call("simdex_get_data_point_size", || {
        let out = out_ptr(out, "out")?;
        let handle = unsafe { handle_ref(handle)? };
        let size = handle.point_size(i)?;
        unsafe { out.as_ptr().write(size) };
        Ok(())
    })
}

/// Copy the point at position `i` into `dest`, which holds `capacity`
/// elements.
///
/// # Returns
/// `SIMDEX_ERR_BUFFER_TOO_SMALL` without writing anything if the point has
/// more than `capacity` elements.
#[no_mangle]
pub extern "C" fn simdex_get_data_point_fill(
    handle: *const IndexHandle,
    i: usize,
    dest: *mut c_void,
    capacity: usize,
) -> ErrorCode {
    ffi_call("simdex_get_data_point_fill", || {
        let handle = unsafe { handle_ref(handle)? };
        let point = handle.point(i)?;
        if point.len() > capacity {
            return Err(FfiError::new(
                ErrorCode::BufferTooSmall,
                format!(
                    "Point {} has {} elements but the buffer holds {}",
                    i,
                    point.len(),
                    capacity
                ),
            ));
        }
        let dest = out_ptr(dest, "Destination buffer")?;
        let bytes = point_bytes(point);
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), dest.as_ptr() as *mut u8, bytes.len()) };
        Ok(())
    })
}

/// Copy a string point into memory from `allocator`, NUL-terminated.
///
/// Free it with `simdex_free_string()`.
#[no_mangle]
pub extern "C" fn simdex_get_data_point_string(
    handle: *const IndexHandle,
    i: usize,
    allocator: *const RawAllocator,
    out_str: *mut *mut c_char,
    out_len: *mut usize,
) -> ErrorCode {
    ffi_call("simdex_get_data_point_string", || {
        let out = out_ptr(out_str, "out_str")?;
        let handle = unsafe { handle_ref(handle)? };
        let allocator = unsafe { Allocator::from_raw(allocator)? };
        let (ptr, len) = handle.point_string(i, &allocator)?.into_raw();
        unsafe {
            out.as_ptr().write(ptr as *mut c_char);
            if let Some(out_len) = out_len.as_mut() {
                *out_len = len;
            }
        }
        Ok(())
    })
}

/// Approximate bytes used by a built index.
///
/// # Returns
/// 0 for NULL or an unbuilt index.
#[no_mangle]
pub extern "C" fn simdex_index_memory_usage(handle: *const IndexHandle) -> usize {
    let mut usage = 0;
    ffi_call("simdex_index_memory_usage", || {
        usage = unsafe { handle_ref(handle)? }.memory_usage();
        Ok(())
    });
    usage
}

// =============================================================================
// Borrowing
// =============================================================================

unsafe fn hand_out_borrow(
    borrowed: BorrowedBuffer,
    out_data: NonNull<*mut c_void>,
    out_len: NonNull<usize>,
    out_token: NonNull<*mut BorrowToken>,
) -> FfiResult<()> {
    let (data, len, token) = borrowed.into_token()?;
    out_data.as_ptr().write(data);
    out_len.as_ptr().write(len);
    out_token.as_ptr().write(token);
    Ok(())
}

/// Borrow a copy of a dense point.
///
/// # Arguments
/// * `out_data` - Receives `float*` or `int32_t*` following the distance
///   kind
/// * `out_len` - Receives the dimension
/// * `out_token` - Receives the token for `simdex_borrow_release()`
///
/// # Safety
/// The copy stays valid until released, even after the handle is
/// destroyed.
#[no_mangle]
pub extern "C" fn simdex_borrow_data_dense(
    handle: *const IndexHandle,
    i: usize,
    out_data: *mut *mut c_void,
    out_len: *mut usize,
    out_token: *mut *mut BorrowToken,
) -> ErrorCode {
    ffi_call("simdex_borrow_data_dense", || {
        let out_data = out_ptr(out_data, "out_data")?;
        let out_len = out_ptr(out_len, "out_len")?;
        let out_token = out_ptr(out_token, "out_token")?;
        let handle = unsafe { handle_ref(handle)? };
        let borrowed = handle.borrow_dense(i)?;
        unsafe { hand_out_borrow(borrowed, out_data, out_len, out_token) }
    })
}

/// Borrow a copy of a sparse point. Same contract as
/// `simdex_borrow_data_dense()`; `out_data` receives `SimdexSparseElem*`.
#[no_mangle]
pub extern "C" fn simdex_borrow_data_sparse(
    handle: *const IndexHandle,
    i: usize,
    out_data: *mut *mut SparseElem,
    out_len: *mut usize,
    out_token: *mut *mut BorrowToken,
) -> ErrorCode {
    ffi_call("simdex_borrow_data_sparse", || {
        let out_data = out_ptr(out_data as *mut *mut c_void, "out_data")?;
        let out_len = out_ptr(out_len, "out_len")?;
        let out_token = out_ptr(out_token, "out_token")?;
        let handle = unsafe { handle_ref(handle)? };
        let borrowed = handle.borrow_sparse(i)?;
        unsafe { hand_out_borrow(borrowed, out_data, out_len, out_token) }
    })
}

/// Release a borrow. Passing NULL is a no-op.
///
/// # Safety
/// Each token may be released once; releasing it again is undefined.
#[no_mangle]
pub extern "C" fn simdex_borrow_release(token: *mut BorrowToken) -> ErrorCode {
    ffi_call("simdex_borrow_release", || match NonNull::new(token) {
        Some(token) => unsafe { borrow::release_token(token) },
        None => Ok(()),
    })
}

// =============================================================================
// Tuning
// =============================================================================

/// Set query-time parameters (`ef` for hnsw).
///
/// The parameters are kept and re-applied after every later build or load.
/// NULL restores the defaults.
#[no_mangle]
pub extern "C" fn simdex_set_query_time_params(
    handle: *mut IndexHandle,
    params: *const ParamsHandle,
) -> ErrorCode {
    ffi_call("simdex_set_query_time_params", || {
        let handle = unsafe { handle_mut(handle)? };
        let params = unsafe { params_or_empty(params) };
        handle.set_query_params(&params)
    })
}

/// Set the default number of worker threads for batch queries (1 to 1024).
#[no_mangle]
pub extern "C" fn simdex_set_thread_pool_size(handle: *mut IndexHandle, size: usize) -> ErrorCode {
    ffi_call("simdex_set_thread_pool_size", || {
        let handle = unsafe { handle_mut(handle)? };
        handle.set_thread_pool_size(size)
    })
}

/// Read the default number of worker threads for batch queries.
#[no_mangle]
pub extern "C" fn simdex_get_thread_pool_size(
    handle: *const IndexHandle,
    out: *mut usize,
) -> ErrorCode {
    ffi_call("simdex_get_thread_pool_size", || {
        let out = out_ptr(out, "out")?;
        let handle = unsafe { handle_ref(handle)? };
        unsafe { out.as_ptr().write(handle.thread_pool_size()) };
        Ok(())
    })
}

// =============================================================================
// Persistence
// =============================================================================

/// Save a built index to `path`.
///
/// With `include_data`, the points are also written to `path` + `.dat`.
/// Files are written atomically.
///
/// # Returns
/// * `SIMDEX_OK` on success
/// * `SIMDEX_ERR_INDEX_NOT_BUILT` if the index was never built
/// * `SIMDEX_ERR_DATA_IO` on file errors
///
/// # Example (C)
/// ```c
/// if (simdex_save_index(index, "/data/words.idx", true) != SIMDEX_OK) {
///     fprintf(stderr, "Save failed: %s\n", simdex_last_error());
/// }
/// ```
#[no_mangle]
pub extern "C" fn simdex_save_index(
    handle: *const IndexHandle,
    path: *const c_char,
    include_data: bool,
) -> ErrorCode {
    ffi_call("simdex_save_index", || {
        let handle = unsafe { handle_ref(handle)? };
        let path = unsafe { c_str(path, "Path")? };
        handle.save(Path::new(path), include_data)
    })
}

/// Load an index saved with `simdex_save_index()`.
///
/// The kinds must match the saved ones (`SIMDEX_ERR_SPACE_INCOMPATIBLE`
/// otherwise). With `include_data`, points are read from `path` + `.dat`.
/// Without it the index is built but holds no points, and queries fail with
/// `SIMDEX_ERR_QUERY` until the points are inserted again.
#[no_mangle]
pub extern "C" fn simdex_load_index(
    path: *const c_char,
    point_kind: i32,
    dist_kind: i32,
    allocator: *const RawAllocator,
    include_data: bool,
    out_handle: *mut *mut IndexHandle,
) -> ErrorCode {
    ffi_call("simdex_load_index", || {
        let out = out_ptr(out_handle, "out_handle")?;
        unsafe { out.as_ptr().write(ptr::null_mut()) };

        let path = unsafe { c_str(path, "Path")? };
        let (point_kind, dist_kind) = kinds(point_kind, dist_kind)?;
        let allocator = unsafe { Allocator::from_raw(allocator)? };

        let handle =
            IndexHandle::load(Path::new(path), point_kind, dist_kind, allocator, include_data)?;
        unsafe { out.as_ptr().write(handle.into_raw()) };
        Ok(())
    })
}

// =============================================================================
// Error Handling
// =============================================================================

/// Details of the last failure on the calling thread
#[repr(C)]
#[derive(Debug)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    /// NUL-terminated message, or NULL after a successful call
    pub message: *mut c_char,
    /// Source file that raised the error, or NULL
    pub file: *mut c_char,
    pub line: u32,
}

/// Fetch the code, message and source location of the last failure on the
/// calling thread.
///
/// Reading the details does not reset them. `message` and `file` are copied
/// into memory from `allocator`; free each with `simdex_free_string()`.
///
/// # Example (C)
/// ```c
/// if (simdex_index_build(index, NULL, false) != SIMDEX_OK) {
///     SimdexErrorDetail detail;
///     if (simdex_last_error_detail(&detail, &allocator) == SIMDEX_OK) {
///         fprintf(stderr, "%s (%s:%u)\n", detail.message, detail.file, detail.line);
///         simdex_free_string(detail.message, &allocator);
///         simdex_free_string(detail.file, &allocator);
///     }
/// }
/// ```
#[no_mangle]
pub extern "C" fn simdex_last_error_detail(
    detail: *mut ErrorDetail,
    allocator: *const RawAllocator,
) -> ErrorCode {
    let result = panic::catch_unwind(AssertUnwindSafe(|| -> FfiResult<()> {
        let detail = out_ptr(detail, "detail")?;
        let allocator = unsafe { Allocator::from_raw(allocator)? };

        let (code, message, file, line) =
            with_last_error(|last| (last.code, last.message.clone(), last.file, last.line));

        let (message, file) = if code == ErrorCode::Success {
            (ptr::null_mut(), ptr::null_mut())
        } else {
            let message = allocator.c_string(message.as_bytes())?;
            let file = allocator.c_string(file.as_bytes())?;
            (
                message.into_raw().0 as *mut c_char,
                file.into_raw().0 as *mut c_char,
            )
        };

        unsafe {
            detail.as_ptr().write(ErrorDetail {
                code,
                message,
                file,
                line,
            })
        };
        Ok(())
    }));

    match result {
        Ok(Ok(())) => ErrorCode::Success,
        Ok(Err(err)) => err.code(),
        Err(_) => ErrorCode::Runtime,
    }
}

/// Message of the last failure on the calling thread.
///
/// # Returns
/// A borrowed NUL-terminated string valid until the next call on this
/// thread, or NULL if the last call succeeded. Do not free it.
#[no_mangle]
pub extern "C" fn simdex_last_error() -> *const c_char {
    with_last_error(|last| {
        if last.code == ErrorCode::Success {
            ptr::null()
        } else {
            last.message.as_ptr()
        }
    })
}

/// Status code of the last call on the calling thread.
#[no_mangle]
pub extern "C" fn simdex_last_error_code() -> ErrorCode {
    last_error_code()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::testing::Counter;
    use std::ffi::CString;

    const DENSE: i32 = PointKind::Dense as i32;
    const SPARSE: i32 = PointKind::Sparse as i32;
    const STRING: i32 = PointKind::String as i32;
    const REAL: i32 = DistanceKind::Real as i32;
    const INT: i32 = DistanceKind::Integer as i32;

    fn create(raw: &RawAllocator, space: &str, method: &str, kind: i32, dist: i32) -> *mut IndexHandle {
        let space = CString::new(space).unwrap();
        let method = CString::new(method).unwrap();
        let mut handle = ptr::null_mut();
        let code = simdex_index_create(
            space.as_ptr(),
            ptr::null(),
            method.as_ptr(),
            kind,
            dist,
            raw,
            &mut handle,
        );
        assert_eq!(code, ErrorCode::Success, "{}", last_error_message());
        assert!(!handle.is_null());
        handle
    }

    /// Ten 2-d points on a line: (i, 0) with id 100 + i.
    fn line_index(raw: &RawAllocator) -> *mut IndexHandle {
        let handle = create(raw, "l2", "brute_force", DENSE, REAL);
        let flat: Vec<f32> = (0..10).flat_map(|i| [i as f32, 0.0]).collect();
        let ids: Vec<i32> = (100..110).collect();
        let code = simdex_add_data_point_batch(
            handle,
            flat.as_ptr().cast(),
            10,
            2,
            ptr::null(),
            ids.as_ptr(),
        );
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(simdex_index_build(handle, ptr::null(), false), ErrorCode::Success);
        handle
    }

    #[test]
    fn test_create_destroy_returns_memory() {
        simdex_init();
        simdex_init();

        let counter = Counter::new();
        let raw = counter.raw();
        let handle = create(&raw, "cosinesimil_sparse", "hnsw", SPARSE, REAL);
        assert!(counter.live() > 0);

        // The header sits at the start of the handle
        let header = unsafe { *(handle as *const IndexHeader) };
        assert_eq!(header.point_kind, PointKind::Sparse);
        assert_eq!(header.distance_kind, DistanceKind::Real);

        let mut read = IndexHeader {
            point_kind: PointKind::Dense,
            distance_kind: DistanceKind::Integer,
        };
        assert_eq!(simdex_index_header(handle, &mut read), ErrorCode::Success);
        assert_eq!(read, header);

        simdex_index_destroy(handle);
        simdex_index_destroy(ptr::null_mut());
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_create_rejects_bad_arguments() {
        let counter = Counter::new();
        let raw = counter.raw();
        let l2 = CString::new("l2").unwrap();
        let hnsw = CString::new("hnsw").unwrap();
        let mut handle = ptr::null_mut();

        let code = simdex_index_create(l2.as_ptr(), ptr::null(), hnsw.as_ptr(), 9, REAL, &raw, &mut handle);
        assert_eq!(code, ErrorCode::InvalidArgument);
        assert!(handle.is_null());

        let code = simdex_index_create(l2.as_ptr(), ptr::null(), hnsw.as_ptr(), DENSE, INT, &raw, &mut handle);
        assert_eq!(code, ErrorCode::SpaceIncompatible);

        let code = simdex_index_create(ptr::null(), ptr::null(), hnsw.as_ptr(), DENSE, REAL, &raw, &mut handle);
        assert_eq!(code, ErrorCode::NullPointer);

        let code = simdex_index_create(l2.as_ptr(), ptr::null(), hnsw.as_ptr(), DENSE, REAL, ptr::null(), &mut handle);
        assert_eq!(code, ErrorCode::NullPointer);

        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_error_detail_reports_location() {
        let counter = Counter::new();
        let raw = counter.raw();

        let code = simdex_index_build(ptr::null_mut(), ptr::null(), false);
        assert_eq!(code, ErrorCode::NullPointer);
        assert!(!simdex_last_error().is_null());

        let mut detail = ErrorDetail {
            code: ErrorCode::Success,
            message: ptr::null_mut(),
            file: ptr::null_mut(),
            line: 0,
        };
        assert_eq!(simdex_last_error_detail(&mut detail, &raw), ErrorCode::Success);
        assert_eq!(detail.code, ErrorCode::NullPointer);
        assert!(detail.line > 0);

        let message = unsafe { CStr::from_ptr(detail.message) }.to_str().unwrap();
        let file = unsafe { CStr::from_ptr(detail.file) }.to_str().unwrap();
        assert!(message.contains("Index handle"));
        assert!(file.ends_with(".rs"));

        // Reading the details leaves the slot alone
        assert_eq!(simdex_last_error_code(), ErrorCode::NullPointer);

        assert_eq!(simdex_free_string(detail.message, &raw), ErrorCode::Success);
        assert_eq!(simdex_free_string(detail.file, &raw), ErrorCode::Success);
        assert_eq!(counter.live(), 0);

        // The next call resets it
        assert_eq!(simdex_free_string(ptr::null_mut(), &raw), ErrorCode::Success);
        assert!(simdex_last_error().is_null());
    }

    #[test]
    fn test_query_before_build_fails() {
        let counter = Counter::new();
        let raw = counter.raw();
        let handle = create(&raw, "l2", "hnsw", DENSE, REAL);
        let point = [1.0f32, 2.0];
        assert_eq!(
            simdex_add_data_point(handle, point.as_ptr().cast(), 2, 1),
            ErrorCode::Success
        );

        let mut size = 0;
        let code = simdex_knn_query_get_size(handle, point.as_ptr().cast(), 2, 1, &mut size);
        assert_eq!(code, ErrorCode::IndexNotBuilt);
        assert_eq!(simdex_index_memory_usage(handle), 0);

        assert_eq!(simdex_index_build(handle, ptr::null(), false), ErrorCode::Success);
        let code = simdex_knn_query_get_size(handle, point.as_ptr().cast(), 2, 1, &mut size);
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(size, 1);
        assert!(simdex_index_memory_usage(handle) > 0);

        assert_eq!(simdex_index_reset(handle), ErrorCode::Success);
        assert_eq!(simdex_data_qty(handle), 0);
        let code = simdex_knn_query_get_size(handle, point.as_ptr().cast(), 2, 1, &mut size);
        assert_eq!(code, ErrorCode::IndexNotBuilt);

        simdex_index_destroy(handle);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_knn_fill_all_or_nothing() {
        let counter = Counter::new();
        let raw = counter.raw();
        let handle = line_index(&raw);
        let query = [3.2f32, 0.0];

        let mut ids = [0i32; 10];
        let mut distances = [0f32; 10];
        let mut small = ResultBuffer {
            ids: ids.as_mut_ptr(),
            distances: distances.as_mut_ptr(),
            size: 42,
            capacity: 3,
        };
        let code = simdex_knn_query_fill(handle, query.as_ptr().cast(), 2, 10, &mut small);
        assert_eq!(code, ErrorCode::BufferTooSmall);
        assert_eq!(small.size, 0);
        assert_eq!(ids, [0; 10]);

        let mut full = ResultBuffer {
            ids: ids.as_mut_ptr(),
            distances: distances.as_mut_ptr(),
            size: 0,
            capacity: 10,
        };
        let code = simdex_knn_query_fill(handle, query.as_ptr().cast(), 2, 10, &mut full);
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(full.size, 10);
        assert_eq!(&ids[..4], &[103, 104, 102, 105]);
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));

        simdex_index_destroy(handle);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_range_query() {
        let counter = Counter::new();
        let raw = counter.raw();
        let handle = line_index(&raw);
        let query = [5.0f32, 0.0];

        let mut size = 0;
        let code = simdex_range_query_get_size(handle, query.as_ptr().cast(), 2, 1.0, &mut size);
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(size, 3);

        let mut ids = [0i32; 3];
        let mut distances = [0f32; 3];
        let mut result = ResultBuffer {
            ids: ids.as_mut_ptr(),
            distances: distances.as_mut_ptr(),
            size: 0,
            capacity: 3,
        };
        let code = simdex_range_query_fill(handle, query.as_ptr().cast(), 2, 1.0, &mut result);
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(ids, [105, 104, 106]);
        assert_eq!(distances, [0.0, 1.0, 1.0]);

        simdex_index_destroy(handle);
    }

    #[test]
    fn test_sparse_batch_partial_commit() {
        let counter = Counter::new();
        let raw = counter.raw();
        let handle = create(&raw, "negdotprod_sparse", "brute_force", SPARSE, REAL);

        let flat = [
            SparseElem::new(1, 1.0),
            SparseElem::new(5, 2.0),
            SparseElem::new(2, 1.0),
            SparseElem::new(9, 1.0),
            SparseElem::new(2, 1.0),
            SparseElem::new(2, 3.0),
            SparseElem::new(4, 1.0),
        ];
        let counts = [2usize, 2, 2, 1];
        let code = simdex_add_data_point_batch(
            handle,
            flat.as_ptr().cast(),
            4,
            0,
            counts.as_ptr(),
            ptr::null(),
        );
        assert_eq!(code, ErrorCode::InvalidSparseElement);
        assert_eq!(simdex_data_qty(handle), 2);

        let mut len = 0;
        assert_eq!(simdex_get_data_point_size(handle, 1, &mut len), ErrorCode::Success);
        assert_eq!(len, 2);

        let mut data: *mut SparseElem = ptr::null_mut();
        let mut token: *mut BorrowToken = ptr::null_mut();
        let code = simdex_borrow_data_sparse(handle, 1, &mut data, &mut len, &mut token);
        assert_eq!(code, ErrorCode::Success);
        let pairs = unsafe { std::slice::from_raw_parts(data, len) };
        assert_eq!(pairs, &flat[2..4]);

        // The borrow outlives the handle
        simdex_index_destroy(handle);
        assert_eq!(counter.live(), 2);
        assert_eq!(simdex_borrow_release(token), ErrorCode::Success);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_string_points() {
        let counter = Counter::new();
        let raw = counter.raw();
        let handle = create(&raw, "leven", "brute_force", STRING, INT);

        let words = [
            CString::new("kitten").unwrap(),
            CString::new("sitting").unwrap(),
            CString::new("mitten").unwrap(),
        ];
        let pointers: Vec<*const c_void> = words.iter().map(|w| w.as_ptr().cast()).collect();
        let code = simdex_add_data_point_batch_pointers(
            handle,
            pointers.as_ptr(),
            3,
            0,
            ptr::null(),
            ptr::null(),
        );
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(simdex_index_build(handle, ptr::null(), false), ErrorCode::Success);

        let mut distance = 0.0;
        assert_eq!(simdex_get_distance(handle, 0, 1, &mut distance), ErrorCode::Success);
        assert_eq!(distance, 3.0);

        let mut text: *mut c_char = ptr::null_mut();
        let mut len = 0;
        let code = simdex_get_data_point_string(handle, 2, &raw, &mut text, &mut len);
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(len, 6);
        assert_eq!(unsafe { CStr::from_ptr(text) }.to_str().unwrap(), "mitten");
        simdex_free_string(text, &raw);

        let mut dest = [0u8; 4];
        let code = simdex_get_data_point_fill(handle, 1, dest.as_mut_ptr().cast(), dest.len());
        assert_eq!(code, ErrorCode::BufferTooSmall);
        assert_eq!(dest, [0; 4]);

        let mut name: *mut c_char = ptr::null_mut();
        let code = simdex_get_space_type(handle, &raw, &mut name, ptr::null_mut());
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(unsafe { CStr::from_ptr(name) }.to_str().unwrap(), "leven");
        simdex_free_string(name, &raw);

        let query = b"bitten";
        let mut ids = [0i32; 2];
        let mut distances = [0f32; 2];
        let mut result = ResultBuffer {
            ids: ids.as_mut_ptr(),
            distances: distances.as_mut_ptr(),
            size: 0,
            capacity: 2,
        };
        let code = simdex_knn_query_fill(handle, query.as_ptr().cast(), query.len(), 2, &mut result);
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(ids, [0, 2]);
        assert_eq!(distances, [1.0, 1.0]);

        simdex_index_destroy(handle);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_batch_query_preserves_order() {
        let counter = Counter::new();
        let raw = counter.raw();
        let handle = line_index(&raw);
        assert_eq!(simdex_set_thread_pool_size(handle, 3), ErrorCode::Success);
        let mut pool = 0;
        assert_eq!(simdex_get_thread_pool_size(handle, &mut pool), ErrorCode::Success);
        assert_eq!(pool, 3);

        let queries: Vec<[f32; 2]> = (0..10).rev().map(|i| [i as f32 + 0.1, 0.0]).collect();
        let pointers: Vec<*const c_void> = queries.iter().map(|q| q.as_ptr().cast()).collect();
        let mut ids = vec![0i32; 10];
        let mut distances = vec![0f32; 10];
        let mut results: Vec<ResultBuffer> = (0..10)
            .map(|i| ResultBuffer {
                ids: unsafe { ids.as_mut_ptr().add(i) },
                distances: unsafe { distances.as_mut_ptr().add(i) },
                size: 0,
                capacity: 1,
            })
            .collect();

        for parallelism in [0, 1, 4] {
            let code = simdex_knn_query_batch(
                handle,
                pointers.as_ptr(),
                10,
                2,
                ptr::null(),
                1,
                results.as_mut_ptr(),
                parallelism,
            );
            assert_eq!(code, ErrorCode::Success);
            let expected: Vec<i32> = (100..110).rev().collect();
            assert_eq!(ids, expected, "parallelism {}", parallelism);
            assert!(results.iter().all(|r| r.size == 1));
        }

        let code = simdex_knn_query_batch(
            handle,
            pointers.as_ptr(),
            10,
            2,
            ptr::null(),
            1,
            results.as_mut_ptr(),
            5000,
        );
        assert_eq!(code, ErrorCode::InvalidArgument);

        simdex_index_destroy(handle);
    }

    #[test]
    fn test_params_and_query_time_tuning() {
        let counter = Counter::new();
        let raw = counter.raw();
        let mut params: *mut ParamsHandle = ptr::null_mut();
        assert_eq!(simdex_params_create(&raw, &mut params), ErrorCode::Success);

        let name = CString::new("ef").unwrap();
        let zero: c_int = 0;
        assert_eq!(
            simdex_params_add(params, name.as_ptr(), ParamType::Int as i32, (&zero as *const c_int).cast()),
            ErrorCode::Success
        );

        let handle = create(&raw, "l2", "hnsw", DENSE, REAL);
        assert_eq!(simdex_set_query_time_params(handle, params), ErrorCode::InvalidArgument);

        let ef: c_int = 64;
        simdex_params_add(params, name.as_ptr(), ParamType::Int as i32, (&ef as *const c_int).cast());
        assert_eq!(simdex_set_query_time_params(handle, params), ErrorCode::Success);

        let bad_type = simdex_params_add(params, name.as_ptr(), 7, (&ef as *const c_int).cast());
        assert_eq!(bad_type, ErrorCode::InvalidArgument);

        simdex_params_free(params);
        simdex_index_destroy(handle);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("line.idx").to_str().unwrap()).unwrap();
        let counter = Counter::new();
        let raw = counter.raw();
        let handle = line_index(&raw);
        let query = [6.7f32, 0.4];

        let knn = |h: *mut IndexHandle| {
            let mut ids = [0i32; 4];
            let mut distances = [0f32; 4];
            let mut result = ResultBuffer {
                ids: ids.as_mut_ptr(),
                distances: distances.as_mut_ptr(),
                size: 0,
                capacity: 4,
            };
            let code = simdex_knn_query_fill(h, query.as_ptr().cast(), 2, 4, &mut result);
            (code, ids, distances)
        };

        let before = knn(handle);
        assert_eq!(before.0, ErrorCode::Success);
        assert_eq!(simdex_save_index(handle, path.as_ptr(), true), ErrorCode::Success);

        let mut loaded = ptr::null_mut();
        let code = simdex_load_index(path.as_ptr(), DENSE, REAL, &raw, true, &mut loaded);
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(simdex_data_qty(loaded), 10);
        assert_eq!(knn(loaded), before);

        let mut mismatched = ptr::null_mut();
        let code = simdex_load_index(path.as_ptr(), SPARSE, REAL, &raw, true, &mut mismatched);
        assert_eq!(code, ErrorCode::SpaceIncompatible);
        assert!(mismatched.is_null());

        let mut bare = ptr::null_mut();
        let code = simdex_load_index(path.as_ptr(), DENSE, REAL, &raw, false, &mut bare);
        assert_eq!(code, ErrorCode::Success);
        assert_eq!(knn(bare).0, ErrorCode::QueryExecutionFailed);

        simdex_index_destroy(bare);
        simdex_index_destroy(loaded);
        simdex_index_destroy(handle);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_save_unbuilt_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("x.idx").to_str().unwrap()).unwrap();
        let counter = Counter::new();
        let raw = counter.raw();
        let handle = create(&raw, "l2", "brute_force", DENSE, REAL);

        assert_eq!(simdex_save_index(handle, path.as_ptr(), true), ErrorCode::IndexNotBuilt);

        let mut loaded = ptr::null_mut();
        let code = simdex_load_index(path.as_ptr(), DENSE, REAL, &raw, true, &mut loaded);
        assert_eq!(code, ErrorCode::DataIoFailed);

        simdex_index_destroy(handle);
    }
}
