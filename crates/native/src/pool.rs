//! Worker pool for batch queries

use crate::error::{FfiError, FfiResult};
use rayon::{ThreadPool, ThreadPoolBuilder};
use simdex_core::config::{MAX_THREAD_POOL_SIZE, MIN_THREAD_POOL_SIZE};
use simdex_core::ErrorCode;
use std::sync::{Arc, Mutex};

/// Lazily built rayon pool, rebuilt when a different width is requested
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    cached: Mutex<Option<(usize, Arc<ThreadPool>)>>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            size: size.clamp(MIN_THREAD_POOL_SIZE, MAX_THREAD_POOL_SIZE),
            cached: Mutex::new(None),
        }
    }

    /// Default width of batch queries on this handle
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn set_size(&mut self, size: usize) -> FfiResult<()> {
        check_width(size)?;
        self.size = size;
        Ok(())
    }

    /// Width to use for a request: 0 selects the default.
    pub fn resolve(&self, requested: usize) -> FfiResult<usize> {
        if requested == 0 {
            return Ok(self.size);
        }
        check_width(requested)?;
        Ok(requested)
    }

    /// A pool with exactly `width` threads.
    pub fn get(&self, width: usize) -> FfiResult<Arc<ThreadPool>> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| FfiError::new(ErrorCode::Runtime, "Worker pool lock poisoned"))?;

        if let Some((threads, pool)) = cached.as_ref() {
            if *threads == width {
                return Ok(Arc::clone(pool));
            }
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(|i| format!("simdex-query-{}", i))
            .build()
            .map_err(|e| {
                FfiError::new(ErrorCode::Runtime, format!("Failed to start worker pool: {}", e))
            })?;
        tracing::debug!(threads = width, "Started query worker pool");

        let pool = Arc::new(pool);
        *cached = Some((width, Arc::clone(&pool)));
        Ok(pool)
    }
}

fn check_width(width: usize) -> FfiResult<()> {
    if !(MIN_THREAD_POOL_SIZE..=MAX_THREAD_POOL_SIZE).contains(&width) {
        return Err(FfiError::invalid(format!(
            "Thread pool size must be between {} and {}, got {}",
            MIN_THREAD_POOL_SIZE, MAX_THREAD_POOL_SIZE, width
        )));
    }
    Ok(())
}
