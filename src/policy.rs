//! Execution policy: an allocator capability bound to a stream
//!
//! Generic parallel algorithms take one of these instead of a manager plus
//! a pile of indices. The policy is a small borrowed value: a stream to
//! launch on and that stream's cache for temporaries.

use std::ffi::c_void;

use crate::driver::StreamHandle;
use crate::error::GpuResult;
use crate::manager::GpuManager;

#[derive(Debug, Clone, Copy)]
pub struct ExecutionPolicy<'a> {
    manager: &'a GpuManager,
    stream_index: usize,
}

impl<'a> ExecutionPolicy<'a> {
    pub(crate) fn new(manager: &'a GpuManager, stream_index: usize) -> Self {
        ExecutionPolicy {
            manager,
            stream_index,
        }
    }

    /// Stream to launch kernels on
    pub fn stream(&self) -> StreamHandle {
        self.manager.stream(self.stream_index)
    }

    /// Index of the bound stream
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Device temporary from the bound stream's cache
    pub fn allocate_temp(&self, bytes: usize) -> GpuResult<*mut c_void> {
        self.manager.cache_allocate(self.stream_index, bytes)
    }

    /// Park a temporary for reuse by a later same-sized request
    pub fn release_temp(&self, ptr: *mut c_void) -> GpuResult<()> {
        self.manager.cache_release(self.stream_index, ptr)
    }

    /// Block the host until the bound stream has drained
    pub fn synchronize(&self) -> GpuResult<()> {
        self.manager.synchronize(self.stream_index)
    }
}
