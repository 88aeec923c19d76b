//! Platform driver boundary
//!
//! Every raw platform operation the manager needs goes through [`GpuDriver`],
//! so the one place that touches the HIP runtime is swappable: the real
//! driver ([`hip::HipDriver`], feature `rocm`) links against `amdhip64`,
//! while [`host::HostDriver`] emulates the same contract on the heap for
//! GPU-less machines and for the test suite.

use std::ffi::c_void;
use std::fmt;

use crate::error::GpuResult;

#[cfg(feature = "rocm")]
pub mod ffi;
#[cfg(feature = "rocm")]
pub mod hip;
pub mod host;

/// Kind of memory a tracked block lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemKind {
    /// Pinned (page-locked) host memory, eligible for async transfers
    Host,
    /// Device-resident memory
    Device,
}

/// Direction of an asynchronous copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

/// Opaque handle to an asynchronous command stream.
///
/// Wraps the platform's stream pointer; `as_ptr` exposes it for kernel
/// launches and library calls that take the raw stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle(pub(crate) usize);

impl StreamHandle {
    pub fn as_ptr(&self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

/// Opaque handle to a timing/synchronization event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHandle(pub(crate) usize);

impl EventHandle {
    pub fn as_ptr(&self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

/// Raw platform operations.
///
/// Implementations check every platform call and surface failures through
/// the typed error channel; none of them terminate the process. Destroy and
/// free operations are infallible by contract (failures there are logged,
/// since they only occur on teardown paths that cannot recover anyway).
pub trait GpuDriver: Send + Sync + fmt::Debug {
    /// Allocate device memory. Never returns a null pointer on `Ok`.
    fn alloc_device(&self, bytes: usize) -> GpuResult<*mut c_void>;
    /// Allocate pinned host memory. Never returns a null pointer on `Ok`.
    fn alloc_host(&self, bytes: usize) -> GpuResult<*mut c_void>;
    fn free_device(&self, ptr: *mut c_void);
    fn free_host(&self, ptr: *mut c_void);

    /// Enqueue a copy on `stream` and return immediately
    fn memcpy_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
        kind: CopyKind,
        stream: StreamHandle,
    ) -> GpuResult<()>;
    /// Enqueue a byte fill on `stream` and return immediately
    fn memset_async(
        &self,
        dst: *mut c_void,
        value: i32,
        bytes: usize,
        stream: StreamHandle,
    ) -> GpuResult<()>;

    /// Create an independent, non-blocking stream
    fn stream_create(&self) -> GpuResult<StreamHandle>;
    fn stream_destroy(&self, stream: StreamHandle);
    /// Block the host until all work queued on `stream` has completed
    fn stream_synchronize(&self, stream: StreamHandle) -> GpuResult<()>;
    /// Make `stream` wait (device-side, host stays free) for `event`
    fn stream_wait_event(&self, stream: StreamHandle, event: EventHandle) -> GpuResult<()>;

    /// Create an event with timing enabled
    fn event_create(&self) -> GpuResult<EventHandle>;
    fn event_destroy(&self, event: EventHandle);
    /// Record `event` at the current tail of `stream`
    fn event_record(&self, event: EventHandle, stream: StreamHandle) -> GpuResult<()>;
    /// Block the host until `event` has fired
    fn event_synchronize(&self, event: EventHandle) -> GpuResult<()>;
    /// Milliseconds between two fired events
    fn event_elapsed(&self, start: EventHandle, stop: EventHandle) -> GpuResult<f32>;

    /// Block the host until every stream on the device has drained
    fn device_synchronize(&self) -> GpuResult<()>;
}
