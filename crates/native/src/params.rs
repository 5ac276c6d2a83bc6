//! Parameter lists built from C
//!
//! C callers assemble `name=value` parameters one typed value at a time.
//! Values are stored in their textual form; the engine parses them back
//! when a space or method reads them.

use crate::alloc::{AllocBox, Allocator};
use crate::error::{FfiError, FfiResult};
use simdex_core::Params;

/// Type tag of a value passed to `simdex_params_add`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int = 0,
    Double = 1,
    String = 2,
}

impl TryFrom<i32> for ParamType {
    type Error = FfiError;

    #[track_caller]
    fn try_from(value: i32) -> FfiResult<Self> {
        match value {
            0 => Ok(ParamType::Int),
            1 => Ok(ParamType::Double),
            2 => Ok(ParamType::String),
            other => Err(FfiError::invalid(format!("Unknown parameter type: {}", other))),
        }
    }
}

/// A typed parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue<'a> {
    Int(i32),
    Double(f64),
    String(&'a str),
}

/// Parameter list in caller-allocated memory
#[derive(Debug)]
pub struct ParamsHandle {
    params: Params,
    allocator: Allocator,
}

impl ParamsHandle {
    pub fn create(allocator: Allocator) -> FfiResult<AllocBox<ParamsHandle>> {
        allocator.boxed(ParamsHandle {
            params: Params::new(),
            allocator,
        })
    }

    pub fn add(&mut self, name: &str, value: ParamValue<'_>) -> FfiResult<()> {
        match value {
            ParamValue::Int(v) => self.params.add(name, v)?,
            ParamValue::Double(v) => {
                if !v.is_finite() {
                    return Err(FfiError::invalid(format!(
                        "Parameter '{}' must be finite, got {}",
                        name, v
                    )));
                }
                self.params.add(name, v)?
            }
            ParamValue::String(v) => self.params.add(name, v)?,
        }
        Ok(())
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Allocator that owns this list
    pub fn allocator(&self) -> Allocator {
        self.allocator
    }
}

/// Parameters behind an optional C pointer; NULL means none.
///
/// # Safety
///
/// `handle` must be NULL or point to a live `ParamsHandle`.
pub(crate) unsafe fn params_or_empty(handle: *const ParamsHandle) -> Params {
    handle
        .as_ref()
        .map(|h| h.params.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::testing::Counter;
    use simdex_core::ErrorCode;

    #[test]
    fn test_typed_values_become_text() {
        let counter = Counter::new();
        let mut handle = ParamsHandle::create(counter.allocator()).unwrap();
        handle.add("M", ParamValue::Int(12)).unwrap();
        handle.add("ratio", ParamValue::Double(0.25)).unwrap();
        handle.add("delaunay_type", ParamValue::String("2")).unwrap();

        assert_eq!(handle.params().to_string(), "M=12,ratio=0.25,delaunay_type=2");
        assert_eq!(handle.params().reader().get_or::<usize>("M", 16).unwrap(), 12);

        drop(handle);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_rejects_bad_input() {
        let counter = Counter::new();
        let mut handle = ParamsHandle::create(counter.allocator()).unwrap();
        let err = handle.add("x", ParamValue::Double(f64::NAN)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        let err = handle.add("", ParamValue::Int(1)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        assert!(ParamType::try_from(3).is_err());
        assert_eq!(ParamType::try_from(1).unwrap(), ParamType::Double);
    }

    #[test]
    fn test_null_means_empty() {
        assert!(unsafe { params_or_empty(std::ptr::null()) }.is_empty());
    }
}
