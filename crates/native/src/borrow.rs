//! Borrowed copies of stored points
//!
//! A borrow hands the caller a copy of a stored point in memory from its own
//! allocator, together with a release token. The token carries everything
//! needed to free the copy, so the index handle may be destroyed before the
//! borrow is released. Each token may be released exactly once; releasing it
//! again is undefined behavior.

use crate::alloc::{AllocBuf, Allocator};
use crate::error::{FfiError, FfiResult};
use simdex_core::ErrorCode;
use std::ffi::c_void;
use std::ptr::{self, NonNull};

const TOKEN_LIVE: u32 = 0x5344_4254;

/// Release token returned to C alongside a borrowed buffer
#[repr(C)]
pub struct BorrowToken {
    magic: u32,
    data: *mut c_void,
    allocator: Allocator,
}

/// A point copy owned by the caller until released
pub struct BorrowedBuffer {
    bytes: AllocBuf<u8>,
    len: usize,
}

impl BorrowedBuffer {
    pub(crate) fn copy_of<T: Copy>(allocator: &Allocator, values: &[T]) -> FfiResult<Self> {
        let bytes = allocator.copy_slice(values)?.into_bytes();
        Ok(Self {
            bytes,
            len: values.len(),
        })
    }

    /// Number of elements in the copy.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const c_void {
        self.bytes.as_ptr() as *const c_void
    }

    /// Free the copy.
    pub fn release(self) {
        drop(self);
    }

    /// Hand the copy to C: returns the data pointer, element count and a
    /// token for `simdex_borrow_release`.
    pub(crate) fn into_token(self) -> FfiResult<(*mut c_void, usize, *mut BorrowToken)> {
        let allocator = self.bytes.allocator();
        let token = allocator.allocate::<BorrowToken>(1)?;
        let len = self.len;
        let (data, _) = self.bytes.into_raw();
        let data = data as *mut c_void;

        unsafe {
            ptr::write(
                token.as_ptr(),
                BorrowToken {
                    magic: TOKEN_LIVE,
                    data,
                    allocator,
                },
            );
        }
        Ok((data, len, token.as_ptr()))
    }
}

/// Free a borrow through the token issued with it.
///
/// # Safety
///
/// `token` must come from [`BorrowedBuffer::into_token`] and must not have
/// been released before. The magic word only catches pointers that were
/// never borrow tokens.
pub(crate) unsafe fn release_token(token: NonNull<BorrowToken>) -> FfiResult<()> {
    let entry = token.as_ptr();
    if (*entry).magic != TOKEN_LIVE {
        return Err(FfiError::new(
            ErrorCode::InvalidArgument,
            "Pointer is not a borrow token",
        ));
    }

    let allocator = (*entry).allocator;
    if let Some(data) = NonNull::new((*entry).data) {
        allocator.release(data);
    }
    allocator.release(token);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::testing::Counter;

    #[test]
    fn test_borrow_copy_and_release() {
        let counter = Counter::new();
        let allocator = counter.allocator();
        let values = [1.5f32, 2.5, 3.5];

        let borrowed = BorrowedBuffer::copy_of(&allocator, &values).unwrap();
        assert_eq!(borrowed.len(), 3);
        let copy = unsafe { std::slice::from_raw_parts(borrowed.as_ptr() as *const f32, 3) };
        assert_eq!(copy, &values);
        assert_eq!(counter.live(), 1);

        borrowed.release();
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_token_frees_data_and_itself() {
        let counter = Counter::new();
        let allocator = counter.allocator();
        let borrowed = BorrowedBuffer::copy_of(&allocator, &[1i32, 2, 3, 4]).unwrap();

        let (data, len, token) = borrowed.into_token().unwrap();
        assert_eq!(len, 4);
        assert_eq!(unsafe { *(data as *const i32).add(3) }, 4);
        assert_eq!(counter.live(), 2);

        unsafe { release_token(NonNull::new(token).unwrap()) }.unwrap();
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_foreign_pointer_rejected() {
        let counter = Counter::new();
        let mut foreign = BorrowToken {
            magic: 0,
            data: ptr::null_mut(),
            allocator: counter.allocator(),
        };

        let err = unsafe { release_token(NonNull::from(&mut foreign)) }.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(counter.live(), 0);
    }
}
