//! Caller-supplied allocator
//!
//! Every buffer that crosses the C boundary is obtained from the allocator
//! the caller registered, and released through the same allocator. Owned
//! wrappers ([`AllocBuf`], [`AllocBox`]) remember the allocator they came
//! from and give the memory back on drop, so error paths never leak.

use crate::error::{FfiError, FfiResult};
use simdex_core::ErrorCode;
use std::ffi::c_void;
use std::fmt;
use std::mem::{align_of, size_of};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

/// `void* alloc(size_t size, void* ctx)`
pub type AllocFn = unsafe extern "C" fn(size: usize, ctx: *mut c_void) -> *mut c_void;

/// `void free(void* ptr, void* ctx)`
pub type FreeFn = unsafe extern "C" fn(ptr: *mut c_void, ctx: *mut c_void);

/// Allocator as laid out by C callers
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawAllocator {
    pub alloc: Option<AllocFn>,
    pub free: Option<FreeFn>,
    pub ctx: *mut c_void,
}

/// A validated allocator: both functions are present
#[derive(Clone, Copy)]
pub struct Allocator {
    alloc: AllocFn,
    free: FreeFn,
    ctx: *mut c_void,
}

// The allocator contract requires the functions to be callable from any
// thread; `ctx` is only ever passed back to them.
unsafe impl Send for Allocator {}
unsafe impl Sync for Allocator {}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator").field("ctx", &self.ctx).finish()
    }
}

impl Allocator {
    pub fn new(alloc: AllocFn, free: FreeFn, ctx: *mut c_void) -> Self {
        Self { alloc, free, ctx }
    }

    /// Validate a C allocator description.
    ///
    /// # Safety
    ///
    /// `raw` must be NULL or point to a readable `RawAllocator`.
    pub unsafe fn from_raw(raw: *const RawAllocator) -> FfiResult<Self> {
        if raw.is_null() {
            return Err(FfiError::null("Allocator"));
        }
        let raw = *raw;
        match (raw.alloc, raw.free) {
            (Some(alloc), Some(free)) => Ok(Self::new(alloc, free, raw.ctx)),
            _ => Err(FfiError::invalid(
                "Allocator must provide both alloc and free functions",
            )),
        }
    }

    /// Allocate room for `count` values of `T`.
    ///
    /// A zero-sized request still allocates one byte so the result is a
    /// real, releasable pointer.
    pub fn allocate<T>(&self, count: usize) -> FfiResult<NonNull<T>> {
        let size = count.checked_mul(size_of::<T>()).ok_or_else(|| {
            FfiError::new(
                ErrorCode::OutOfMemory,
                format!("Allocation of {} elements overflows", count),
            )
        })?;

        let raw = unsafe { (self.alloc)(size.max(1), self.ctx) };
        let ptr = NonNull::new(raw as *mut T).ok_or_else(|| {
            FfiError::new(
                ErrorCode::OutOfMemory,
                format!("Allocator returned NULL for {} bytes", size),
            )
        })?;

        if (raw as usize) % align_of::<T>() != 0 {
            unsafe { (self.free)(raw, self.ctx) };
            return Err(FfiError::new(
                ErrorCode::OutOfMemory,
                format!("Allocator returned memory not aligned to {} bytes", align_of::<T>()),
            ));
        }

        Ok(ptr)
    }

    /// Give memory back to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`Allocator::allocate`] on an allocator with the
    /// same functions and context, and must not be used afterwards.
    pub unsafe fn release<T>(&self, ptr: NonNull<T>) {
        (self.free)(ptr.as_ptr() as *mut c_void, self.ctx);
    }

    /// Copy `src` into a fresh allocation.
    pub fn copy_slice<T: Copy>(&self, src: &[T]) -> FfiResult<AllocBuf<T>> {
        let ptr = self.allocate::<T>(src.len())?;
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len()) };
        Ok(AllocBuf {
            ptr,
            len: src.len(),
            allocator: *self,
        })
    }

    /// Copy `bytes` into a fresh NUL-terminated allocation.
    ///
    /// The returned length excludes the terminator.
    pub fn c_string(&self, bytes: &[u8]) -> FfiResult<AllocBuf<u8>> {
        let ptr = self.allocate::<u8>(bytes.len() + 1)?;
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
            *ptr.as_ptr().add(bytes.len()) = 0;
        }
        Ok(AllocBuf {
            ptr,
            len: bytes.len(),
            allocator: *self,
        })
    }

    /// Move `value` into caller-allocated memory.
    pub fn boxed<T>(&self, value: T) -> FfiResult<AllocBox<T>> {
        let ptr = self.allocate::<T>(1)?;
        unsafe { ptr::write(ptr.as_ptr(), value) };
        Ok(AllocBox {
            ptr,
            allocator: *self,
        })
    }
}

/// A slice of plain values in caller-allocated memory
pub struct AllocBuf<T: Copy> {
    ptr: NonNull<T>,
    len: usize,
    allocator: Allocator,
}

unsafe impl<T: Copy + Send> Send for AllocBuf<T> {}

impl<T: Copy> AllocBuf<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn allocator(&self) -> Allocator {
        self.allocator
    }

    /// Reinterpret the buffer as its raw bytes.
    pub fn into_bytes(self) -> AllocBuf<u8> {
        let bytes = AllocBuf {
            ptr: self.ptr.cast::<u8>(),
            len: self.len * size_of::<T>(),
            allocator: self.allocator,
        };
        std::mem::forget(self);
        bytes
    }

    /// Hand ownership to the caller. The memory must later be released
    /// through the same allocator.
    pub fn into_raw(self) -> (*mut T, usize) {
        let parts = (self.ptr.as_ptr(), self.len);
        std::mem::forget(self);
        parts
    }
}

impl<T: Copy> Drop for AllocBuf<T> {
    fn drop(&mut self) {
        unsafe { self.allocator.release(self.ptr) };
    }
}

/// A single value in caller-allocated memory
pub struct AllocBox<T> {
    ptr: NonNull<T>,
    allocator: Allocator,
}

unsafe impl<T: Send> Send for AllocBox<T> {}
unsafe impl<T: Sync> Sync for AllocBox<T> {}

impl<T> AllocBox<T> {
    /// Retake ownership of a value handed out by [`AllocBox::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` on a box created by `allocator`, and
    /// must not be owned by anything else.
    pub unsafe fn from_raw(ptr: NonNull<T>, allocator: Allocator) -> Self {
        Self { ptr, allocator }
    }

    pub fn into_raw(self) -> *mut T {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        ptr
    }
}

impl<T> Deref for AllocBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for AllocBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for AllocBox<T> {
    fn drop(&mut self) {
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            self.allocator.release(self.ptr);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A libc-backed allocator that counts live allocations

    use super::*;
    use std::sync::atomic::{AtomicIsize, Ordering};

    pub struct Counter {
        pub live: AtomicIsize,
    }

    impl Counter {
        pub fn new() -> Box<Self> {
            Box::new(Self {
                live: AtomicIsize::new(0),
            })
        }

        pub fn live(&self) -> isize {
            self.live.load(Ordering::SeqCst)
        }

        pub fn raw(&self) -> RawAllocator {
            RawAllocator {
                alloc: Some(counting_alloc),
                free: Some(counting_free),
                ctx: self as *const Counter as *mut c_void,
            }
        }

        pub fn allocator(&self) -> Allocator {
            Allocator::new(counting_alloc, counting_free, self as *const Counter as *mut c_void)
        }
    }

    unsafe extern "C" fn counting_alloc(size: usize, ctx: *mut c_void) -> *mut c_void {
        let counter = &*(ctx as *const Counter);
        let ptr = libc::malloc(size);
        if !ptr.is_null() {
            counter.live.fetch_add(1, Ordering::SeqCst);
        }
        ptr
    }

    unsafe extern "C" fn counting_free(ptr: *mut c_void, ctx: *mut c_void) {
        let counter = &*(ctx as *const Counter);
        if !ptr.is_null() {
            counter.live.fetch_sub(1, Ordering::SeqCst);
        }
        libc::free(ptr);
    }

    pub unsafe extern "C" fn failing_alloc(_size: usize, _ctx: *mut c_void) -> *mut c_void {
        ptr::null_mut()
    }
}
