//! Point encoding at the C boundary
//!
//! Turns a raw `(pointer, count)` pair into a typed [`PointRef`] for the
//! point kind of an index. The meaning of `count` depends on the kind:
//!
//! | Kind         | Buffer                        | `count`                          |
//! |--------------|-------------------------------|----------------------------------|
//! | Dense        | `float[]` or `int32_t[]`      | dimension                        |
//! | Sparse       | `SimdexSparseElem[]`          | number of pairs                  |
//! | ByteVector   | `uint8_t[]`                   | byte length                      |
//! | String       | `char[]`                      | byte length, 0 = NUL-terminated  |
//!
//! Views borrow the caller's memory; nothing is copied until a point is
//! stored.

use crate::error::{FfiError, FfiResult};
use crate::handle::IndexHeader;
use simdex_core::config::MAX_DIMENSION;
use simdex_core::point::validate_sparse;
use simdex_core::{DistanceKind, PointKind, PointRef, SparseElem};
use std::ffi::{c_void, CStr};
use std::mem::{align_of, size_of};
use std::os::raw::c_char;

/// Size in bytes of one element of a point of this kind.
pub fn element_size(kind: PointKind) -> usize {
    match kind {
        PointKind::Dense => size_of::<f32>(),
        PointKind::Sparse => size_of::<SparseElem>(),
        PointKind::ByteVector | PointKind::String => 1,
    }
}

/// View a caller buffer as a point of the header's kind.
///
/// # Safety
///
/// `data` must be NULL or point to `count` readable elements (for strings
/// with `count == 0`, a NUL-terminated string) that stay valid for `'a`.
pub unsafe fn view_point<'a>(
    header: IndexHeader,
    data: *const c_void,
    count: usize,
) -> FfiResult<PointRef<'a>> {
    if data.is_null() {
        return Err(FfiError::null("Point data"));
    }

    match header.point_kind {
        PointKind::Dense => {
            check_count(count, "Dense point")?;
            Ok(match header.distance_kind {
                DistanceKind::Real => PointRef::Real(slice::<f32>(data, count)?),
                DistanceKind::Integer => PointRef::Integer(slice::<i32>(data, count)?),
            })
        }
        PointKind::Sparse => {
            let elems = slice::<SparseElem>(data, count)?;
            validate_sparse(elems)?;
            Ok(PointRef::Sparse(elems))
        }
        PointKind::ByteVector => {
            check_count(count, "Byte vector")?;
            Ok(PointRef::Bytes(slice::<u8>(data, count)?))
        }
        PointKind::String => {
            if count == 0 {
                Ok(PointRef::Text(CStr::from_ptr(data as *const c_char).to_bytes()))
            } else {
                Ok(PointRef::Text(slice::<u8>(data, count)?))
            }
        }
    }
}

/// View element `index` of a flat batch buffer.
///
/// Fixed-width kinds (dense, byte vector) are packed back to back with
/// `count` elements each. Variable-width kinds (sparse, string) use
/// `counts[i]` elements for entry `i`, starting where entry `i - 1` ended;
/// `offset` carries that running position in bytes.
///
/// # Safety
///
/// `data` must cover every entry described by `count` or `counts`.
pub unsafe fn view_flat_entry<'a>(
    header: IndexHeader,
    data: *const c_void,
    offset: &mut usize,
    count: usize,
    counts: Option<&[usize]>,
    index: usize,
) -> FfiResult<PointRef<'a>> {
    if data.is_null() {
        return Err(FfiError::null("Batch data"));
    }

    let elems = match header.point_kind {
        PointKind::Dense | PointKind::ByteVector => count,
        PointKind::Sparse | PointKind::String => {
            let counts = counts.ok_or_else(|| FfiError::null("Batch counts"))?;
            counts[index]
        }
    };

    let bytes = elems
        .checked_mul(element_size(header.point_kind))
        .ok_or_else(|| FfiError::invalid("Batch entry size overflows"))?;
    let next = offset
        .checked_add(bytes)
        .filter(|&end| end <= isize::MAX as usize)
        .ok_or_else(|| FfiError::invalid("Batch buffer size overflows"))?;
    let entry = (data as *const u8).add(*offset) as *const c_void;
    *offset = next;

    match header.point_kind {
        // An empty string is legal in a flat buffer; there is no terminator
        // to scan for.
        PointKind::String => Ok(PointRef::Text(std::slice::from_raw_parts(
            entry as *const u8,
            elems,
        ))),
        _ => view_point(header, entry, elems),
    }
}

/// Raw bytes of a point in the layout C callers use.
pub fn point_bytes(point: PointRef<'_>) -> &[u8] {
    fn raw<T>(values: &[T]) -> &[u8] {
        // f32, i32 and SparseElem are plain data without padding
        unsafe {
            std::slice::from_raw_parts(values.as_ptr() as *const u8, std::mem::size_of_val(values))
        }
    }

    match point {
        PointRef::Real(v) => raw(v),
        PointRef::Integer(v) => raw(v),
        PointRef::Sparse(v) => raw(v),
        PointRef::Bytes(v) | PointRef::Text(v) => v,
    }
}

fn check_count(count: usize, what: &str) -> FfiResult<()> {
    if count == 0 {
        return Err(FfiError::invalid(format!("{} must have at least one element", what)));
    }
    if count > MAX_DIMENSION {
        return Err(FfiError::invalid(format!(
            "{} too large: {} elements (max {})",
            what, count, MAX_DIMENSION
        )));
    }
    Ok(())
}

unsafe fn slice<'a, T>(data: *const c_void, count: usize) -> FfiResult<&'a [T]> {
    if (data as usize) % align_of::<T>() != 0 {
        return Err(FfiError::invalid(format!(
            "Point data must be aligned to {} bytes",
            align_of::<T>()
        )));
    }
    if count.checked_mul(size_of::<T>()).map_or(true, |b| b > isize::MAX as usize) {
        return Err(FfiError::invalid("Point data too large"));
    }
    Ok(std::slice::from_raw_parts(data as *const T, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use simdex_core::ErrorCode;
    use std::ptr;

    fn header(point_kind: PointKind, distance_kind: DistanceKind) -> IndexHeader {
        IndexHeader {
            point_kind,
            distance_kind,
        }
    }

    #[test]
    fn test_dense_follows_distance_kind() {
        let reals = [1.0f32, 2.0];
        let view = unsafe {
            view_point(header(PointKind::Dense, DistanceKind::Real), reals.as_ptr().cast(), 2)
        }
        .unwrap();
        assert_eq!(view, PointRef::Real(&reals));

        let ints = [1i32, 2, 3];
        let view = unsafe {
            view_point(header(PointKind::Dense, DistanceKind::Integer), ints.as_ptr().cast(), 3)
        }
        .unwrap();
        assert_eq!(view, PointRef::Integer(&ints));
    }

    #[test]
    fn test_null_and_empty_rejected() {
        let h = header(PointKind::Dense, DistanceKind::Real);
        let err = unsafe { view_point(h, ptr::null(), 3) }.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NullPointer);

        let reals = [1.0f32];
        let err = unsafe { view_point(h, reals.as_ptr().cast(), 0) }.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_sparse_order_is_validated() {
        let h = header(PointKind::Sparse, DistanceKind::Real);
        let good = [SparseElem::new(1, 0.5), SparseElem::new(4, 1.0)];
        assert!(unsafe { view_point(h, good.as_ptr().cast(), 2) }.is_ok());

        let bad = [SparseElem::new(3, 0.5), SparseElem::new(3, 1.0)];
        let err = unsafe { view_point(h, bad.as_ptr().cast(), 2) }.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSparseElement);
    }

    #[test]
    fn test_string_lengths() {
        let h = header(PointKind::String, DistanceKind::Integer);
        let text = b"kitten\0";
        let view = unsafe { view_point(h, text.as_ptr().cast(), 0) }.unwrap();
        assert_eq!(view, PointRef::Text(b"kitten"));

        let view = unsafe { view_point(h, text.as_ptr().cast(), 3) }.unwrap();
        assert_eq!(view, PointRef::Text(b"kit"));
    }

    #[test]
    fn test_flat_entries() {
        let h = header(PointKind::Dense, DistanceKind::Real);
        let flat = [1.0f32, 2.0, 3.0, 4.0];
        let mut offset = 0;
        let first = unsafe { view_flat_entry(h, flat.as_ptr().cast(), &mut offset, 2, None, 0) };
        let second = unsafe { view_flat_entry(h, flat.as_ptr().cast(), &mut offset, 2, None, 1) };
        assert_eq!(first.unwrap(), PointRef::Real(&[1.0, 2.0]));
        assert_eq!(second.unwrap(), PointRef::Real(&[3.0, 4.0]));

        let h = header(PointKind::String, DistanceKind::Integer);
        let flat = b"abcde";
        let counts = [2usize, 0, 3];
        let mut offset = 0;
        let views: Vec<_> = (0..3)
            .map(|i| unsafe {
                view_flat_entry(h, flat.as_ptr().cast(), &mut offset, 0, Some(&counts), i).unwrap()
            })
            .collect();
        assert_eq!(
            views,
            vec![PointRef::Text(b"ab"), PointRef::Text(b""), PointRef::Text(b"cde")]
        );
    }

    #[test]
    fn test_misaligned_dense_rejected() {
        let floats = [0.0f32; 4];
        let misaligned = unsafe { (floats.as_ptr() as *const u8).add(1) };
        let h = header(PointKind::Dense, DistanceKind::Real);
        let err = unsafe { view_point(h, misaligned.cast(), 2) }.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_flat_offset_overflow_rejected() {
        let h = header(PointKind::String, DistanceKind::Integer);
        let flat = b"abc";
        let counts = [2usize, usize::MAX - 1];
        let mut offset = 0;
        let first = unsafe { view_flat_entry(h, flat.as_ptr().cast(), &mut offset, 0, Some(&counts), 0) };
        assert_eq!(first.unwrap(), PointRef::Text(b"ab"));

        let err = unsafe { view_flat_entry(h, flat.as_ptr().cast(), &mut offset, 0, Some(&counts), 1) }
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(offset, 2);
    }
}
