//! Error values and the thread-local last-error slot
//!
//! Every fallible operation returns [`FfiResult`]. At the C boundary the
//! error is also recorded in a per-thread slot so callers can fetch the
//! message and source location with `simdex_last_error_detail` right after
//! the failing call. Worker threads used by batch queries return errors as
//! values; only the calling thread's slot is written.

use simdex_core::{ErrorCode, SimdexError};
use std::cell::RefCell;
use std::ffi::CString;
use std::fmt;
use std::panic::Location;

pub type FfiResult<T> = std::result::Result<T, FfiError>;

/// A failure with its status code and the source location that raised it
#[derive(Debug, Clone)]
pub struct FfiError {
    code: ErrorCode,
    message: String,
    location: &'static Location<'static>,
}

impl FfiError {
    #[track_caller]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn null(what: &str) -> Self {
        Self::new(ErrorCode::NullPointer, format!("{} is NULL", what))
    }

    #[track_caller]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl fmt::Display for FfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.name(), self.message)
    }
}

impl std::error::Error for FfiError {}

impl From<SimdexError> for FfiError {
    #[track_caller]
    fn from(err: SimdexError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Contents of the last-error slot
#[derive(Debug, Clone)]
pub(crate) struct LastError {
    pub code: ErrorCode,
    pub message: CString,
    pub file: &'static str,
    pub line: u32,
}

impl LastError {
    fn success() -> Self {
        Self {
            code: ErrorCode::Success,
            message: CString::default(),
            file: "",
            line: 0,
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<LastError> = RefCell::new(LastError::success());
}

/// Record `err` as this thread's last error
pub(crate) fn set_last_error(err: &FfiError) {
    // Interior NULs would truncate the message in C; replace them
    let message = CString::new(err.message.replace('\0', "\u{fffd}")).unwrap_or_default();
    LAST_ERROR.with(|slot| {
        *slot.borrow_mut() = LastError {
            code: err.code,
            message,
            file: err.location.file(),
            line: err.location.line(),
        };
    });
}

/// Reset this thread's slot to Success
pub(crate) fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = LastError::success());
}

pub(crate) fn with_last_error<R>(f: impl FnOnce(&LastError) -> R) -> R {
    LAST_ERROR.with(|slot| f(&slot.borrow()))
}

/// Status code of this thread's most recent C API call
pub fn last_error_code() -> ErrorCode {
    with_last_error(|last| last.code)
}

/// Message of this thread's most recent failed C API call, empty on success
pub fn last_error_message() -> String {
    with_last_error(|last| last.message.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_points_at_caller() {
        let err = FfiError::invalid("bad");
        assert_eq!(err.location().file(), file!());
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(err.to_string(), "InvalidArgument: bad");
    }

    #[test]
    fn test_core_error_conversion() {
        let err: FfiError = SimdexError::NotBuilt.into();
        assert_eq!(err.code(), ErrorCode::IndexNotBuilt);

        let err: FfiError = SimdexError::InvalidSparseElement("x".into()).into();
        assert_eq!(err.code(), ErrorCode::InvalidSparseElement);
    }

    #[test]
    fn test_slot_is_thread_local() {
        set_last_error(&FfiError::null("Handle"));
        assert_eq!(last_error_code(), ErrorCode::NullPointer);

        let other = std::thread::spawn(last_error_code).join().unwrap();
        assert_eq!(other, ErrorCode::Success);

        clear_last_error();
        assert_eq!(last_error_code(), ErrorCode::Success);
        assert!(last_error_message().is_empty());
    }

    #[test]
    fn test_interior_nul_is_replaced() {
        set_last_error(&FfiError::invalid("a\0b"));
        assert_eq!(last_error_message(), "a\u{fffd}b");
        clear_last_error();
    }
}
