//! Writing query results into caller buffers
//!
//! A fill is all or nothing: if the hits do not fit, nothing is written,
//! `size` is set to 0 and the call fails with `BufferTooSmall`. On success
//! the hits are written in ascending distance order and `size` holds their
//! count.

use crate::error::{FfiError, FfiResult};
use simdex_core::query::sort_neighbors;
use simdex_core::{DistValue, ErrorCode, KnnQueue, Neighbor};

/// Caller-owned result arrays as laid out in C
#[repr(C)]
#[derive(Debug)]
pub struct ResultBuffer {
    pub ids: *mut i32,
    pub distances: *mut f32,
    /// Number of valid entries after the call
    pub size: usize,
    /// Length of `ids` and `distances`
    pub capacity: usize,
}

/// Safe view over a [`ResultBuffer`]
#[derive(Debug)]
pub struct ResultSink<'a> {
    ids: &'a mut [i32],
    distances: &'a mut [f32],
    size: &'a mut usize,
}

impl<'a> ResultSink<'a> {
    /// Capacity is the shorter of the two arrays.
    pub fn new(ids: &'a mut [i32], distances: &'a mut [f32], size: &'a mut usize) -> Self {
        let capacity = ids.len().min(distances.len());
        *size = 0;
        Self {
            ids: &mut ids[..capacity],
            distances: &mut distances[..capacity],
            size,
        }
    }

    /// Borrow a C result buffer. Resets its `size` to 0.
    ///
    /// # Safety
    ///
    /// `buffer` must be NULL or point to a valid `ResultBuffer` whose arrays
    /// hold `capacity` writable entries each and outlive `'a`.
    pub unsafe fn from_raw(buffer: *mut ResultBuffer) -> FfiResult<Self> {
        let buffer = buffer.as_mut().ok_or_else(|| FfiError::null("Result buffer"))?;
        buffer.size = 0;

        if buffer.capacity == 0 {
            return Ok(Self {
                ids: &mut [],
                distances: &mut [],
                size: &mut buffer.size,
            });
        }
        if buffer.ids.is_null() {
            return Err(FfiError::null("Result ids"));
        }
        if buffer.distances.is_null() {
            return Err(FfiError::null("Result distances"));
        }

        Ok(Self {
            ids: std::slice::from_raw_parts_mut(buffer.ids, buffer.capacity),
            distances: std::slice::from_raw_parts_mut(buffer.distances, buffer.capacity),
            size: &mut buffer.size,
        })
    }

    pub fn capacity(&self) -> usize {
        self.ids.len()
    }

    /// Number of entries written by the last successful fill.
    pub fn size(&self) -> usize {
        *self.size
    }

    /// Write k-nearest results. The queue pops farthest first, so entries are
    /// written from the back.
    pub fn fill_knn<D: DistValue>(&mut self, mut queue: KnnQueue<D>) -> FfiResult<usize> {
        let found = queue.len();
        self.ensure_fits(found)?;

        for slot in (0..found).rev() {
            if let Some(hit) = queue.pop() {
                self.ids[slot] = hit.id;
                self.distances[slot] = hit.distance.to_f32();
            }
        }
        *self.size = found;
        Ok(found)
    }

    /// Write range results in ascending distance order.
    pub fn fill_range<D: DistValue>(&mut self, mut hits: Vec<Neighbor<D>>) -> FfiResult<usize> {
        let found = hits.len();
        self.ensure_fits(found)?;

        sort_neighbors(&mut hits);
        for (slot, hit) in hits.iter().enumerate() {
            self.ids[slot] = hit.id;
            self.distances[slot] = hit.distance.to_f32();
        }
        *self.size = found;
        Ok(found)
    }

    fn ensure_fits(&mut self, found: usize) -> FfiResult<()> {
        if found > self.capacity() {
            *self.size = 0;
            return Err(FfiError::new(
                ErrorCode::BufferTooSmall,
                format!(
                    "Result buffer holds {} entries but {} results were found",
                    self.capacity(),
                    found
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(distances: &[f32]) -> KnnQueue<f32> {
        let mut queue = KnnQueue::new(distances.len());
        for (pos, &d) in distances.iter().enumerate() {
            queue.push(d, pos, pos as i32 + 100);
        }
        queue
    }

    #[test]
    fn test_knn_written_ascending() {
        let mut ids = [0i32; 4];
        let mut distances = [0f32; 4];
        let mut size = 99;
        let mut sink = ResultSink::new(&mut ids, &mut distances, &mut size);

        assert_eq!(sink.fill_knn(queue(&[0.3, 0.1, 0.2])).unwrap(), 3);
        assert_eq!(size, 3);
        assert_eq!(&ids[..3], &[101, 102, 100]);
        assert_eq!(&distances[..3], &[0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_too_small_writes_nothing() {
        let mut ids = [-1i32; 2];
        let mut distances = [-1f32; 2];
        let mut size = 7;
        let mut sink = ResultSink::new(&mut ids, &mut distances, &mut size);

        let err = sink.fill_knn(queue(&[0.3, 0.1, 0.2])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BufferTooSmall);
        assert_eq!(size, 0);
        assert_eq!(ids, [-1, -1]);
        assert_eq!(distances, [-1.0, -1.0]);
    }

    #[test]
    fn test_range_sorted() {
        let mut ids = [0i32; 3];
        let mut distances = [0f32; 3];
        let mut size = 0;
        let mut sink = ResultSink::new(&mut ids, &mut distances, &mut size);

        let hits = vec![
            Neighbor { id: 7, position: 2, distance: 5i32 },
            Neighbor { id: 8, position: 0, distance: 1i32 },
        ];
        assert_eq!(sink.fill_range(hits).unwrap(), 2);
        assert_eq!(&ids[..2], &[8, 7]);
        assert_eq!(&distances[..2], &[1.0, 5.0]);
    }

    #[test]
    fn test_from_raw_checks_pointers() {
        let mut buffer = ResultBuffer {
            ids: std::ptr::null_mut(),
            distances: std::ptr::null_mut(),
            size: 5,
            capacity: 0,
        };
        let mut sink = unsafe { ResultSink::from_raw(&mut buffer) }.unwrap();
        assert_eq!(sink.capacity(), 0);
        assert_eq!(sink.fill_knn(KnnQueue::<f32>::new(3)).unwrap(), 0);
        assert_eq!(buffer.size, 0);

        buffer.capacity = 4;
        let err = unsafe { ResultSink::from_raw(&mut buffer) }.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NullPointer);

        let err = unsafe { ResultSink::from_raw(std::ptr::null_mut()) }.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NullPointer);
    }
}
