//! Real HIP driver (feature `rocm`)
//!
//! Thin checked wrappers over the runtime. Every call is verified and
//! reported through the shared diagnostic path before its typed error is
//! returned; nothing here terminates the process.

use std::ffi::{c_void, CStr};
use std::panic::Location;
use std::ptr;

use crate::driver::{ffi, CopyKind, EventHandle, GpuDriver, StreamHandle};
use crate::error::{report_failure, GpuError, GpuResult};

/// Human-readable form of a HIP status code
fn error_string(code: i32) -> String {
    unsafe {
        let msg = ffi::hipGetErrorString(code);
        if msg.is_null() {
            format!("hip error {}", code)
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

/// Check a HIP status code, reporting the call site on failure
#[track_caller]
fn check(code: i32, call: &'static str) -> GpuResult<()> {
    if code == ffi::HIP_SUCCESS {
        return Ok(());
    }
    report_failure(call, Location::caller());
    Err(GpuError::DeviceError(format!(
        "{} failed with code {} ({})",
        call,
        code,
        error_string(code)
    )))
}

/// Driver backed by the HIP runtime on an already-selected device
#[derive(Debug, Default)]
pub struct HipDriver;

impl HipDriver {
    /// Initialize the runtime and bind this process to `device_id`.
    ///
    /// Device enumeration happens outside this crate; the id passed here
    /// comes from whatever selected the device.
    pub fn new(device_id: i32) -> GpuResult<Self> {
        let rc = unsafe { ffi::hipInit(0) };
        if rc != ffi::HIP_SUCCESS {
            report_failure("hipInit", Location::caller());
            return Err(GpuError::InitializationFailed(format!(
                "hipInit failed with code {} ({})",
                rc,
                error_string(rc)
            )));
        }
        check(unsafe { ffi::hipSetDevice(device_id) }, "hipSetDevice")?;
        Ok(HipDriver)
    }
}

impl GpuDriver for HipDriver {
    fn alloc_device(&self, bytes: usize) -> GpuResult<*mut c_void> {
        let mut ptr: *mut c_void = ptr::null_mut();
        let rc = unsafe { ffi::hipMalloc(&mut ptr, bytes) };
        if rc != ffi::HIP_SUCCESS {
            report_failure("hipMalloc", Location::caller());
            return Err(GpuError::AllocationFailed(format!(
                "hipMalloc failed with code {} for {} bytes",
                rc, bytes
            )));
        }
        if ptr.is_null() {
            return Err(GpuError::AllocationFailed(format!(
                "hipMalloc returned null pointer for {} bytes",
                bytes
            )));
        }
        Ok(ptr)
    }

    fn alloc_host(&self, bytes: usize) -> GpuResult<*mut c_void> {
        let mut ptr: *mut c_void = ptr::null_mut();
        let rc = unsafe { ffi::hipHostMalloc(&mut ptr, bytes, ffi::HIP_HOST_MALLOC_DEFAULT) };
        if rc != ffi::HIP_SUCCESS {
            report_failure("hipHostMalloc", Location::caller());
            return Err(GpuError::AllocationFailed(format!(
                "hipHostMalloc failed with code {} for {} bytes",
                rc, bytes
            )));
        }
        if ptr.is_null() {
            return Err(GpuError::AllocationFailed(format!(
                "hipHostMalloc returned null pointer for {} bytes",
                bytes
            )));
        }
        Ok(ptr)
    }

    fn free_device(&self, ptr: *mut c_void) {
        if ptr.is_null() {
            return;
        }
        let rc = unsafe { ffi::hipFree(ptr) };
        if rc != ffi::HIP_SUCCESS {
            tracing::error!("hipFree failed with code {} ({})", rc, error_string(rc));
        }
    }

    fn free_host(&self, ptr: *mut c_void) {
        if ptr.is_null() {
            return;
        }
        let rc = unsafe { ffi::hipHostFree(ptr) };
        if rc != ffi::HIP_SUCCESS {
            tracing::error!("hipHostFree failed with code {} ({})", rc, error_string(rc));
        }
    }

    fn memcpy_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
        kind: CopyKind,
        stream: StreamHandle,
    ) -> GpuResult<()> {
        let kind = match kind {
            CopyKind::HostToDevice => ffi::HIP_MEMCPY_HOST_TO_DEVICE,
            CopyKind::DeviceToHost => ffi::HIP_MEMCPY_DEVICE_TO_HOST,
            CopyKind::DeviceToDevice => ffi::HIP_MEMCPY_DEVICE_TO_DEVICE,
        };
        let rc = unsafe { ffi::hipMemcpyAsync(dst, src, bytes, kind, stream.as_ptr()) };
        if rc != ffi::HIP_SUCCESS {
            report_failure("hipMemcpyAsync", Location::caller());
            return Err(GpuError::CopyFailed(format!(
                "hipMemcpyAsync failed with code {} ({} bytes)",
                rc, bytes
            )));
        }
        Ok(())
    }

    fn memset_async(
        &self,
        dst: *mut c_void,
        value: i32,
        bytes: usize,
        stream: StreamHandle,
    ) -> GpuResult<()> {
        check(
            unsafe { ffi::hipMemsetAsync(dst, value, bytes, stream.as_ptr()) },
            "hipMemsetAsync",
        )
    }

    fn stream_create(&self) -> GpuResult<StreamHandle> {
        let mut stream: *mut c_void = ptr::null_mut();
        check(
            unsafe { ffi::hipStreamCreateWithFlags(&mut stream, ffi::HIP_STREAM_NON_BLOCKING) },
            "hipStreamCreateWithFlags",
        )?;
        if stream.is_null() {
            return Err(GpuError::StreamError(
                "hipStreamCreateWithFlags returned null pointer".to_string(),
            ));
        }
        Ok(StreamHandle(stream as usize))
    }

    fn stream_destroy(&self, stream: StreamHandle) {
        let rc = unsafe { ffi::hipStreamDestroy(stream.as_ptr()) };
        if rc != ffi::HIP_SUCCESS {
            tracing::error!(
                "hipStreamDestroy failed with code {} ({})",
                rc,
                error_string(rc)
            );
        }
    }

    fn stream_synchronize(&self, stream: StreamHandle) -> GpuResult<()> {
        check(
            unsafe { ffi::hipStreamSynchronize(stream.as_ptr()) },
            "hipStreamSynchronize",
        )
    }

    fn stream_wait_event(&self, stream: StreamHandle, event: EventHandle) -> GpuResult<()> {
        check(
            unsafe { ffi::hipStreamWaitEvent(stream.as_ptr(), event.as_ptr(), 0) },
            "hipStreamWaitEvent",
        )
    }

    fn event_create(&self) -> GpuResult<EventHandle> {
        let mut event: *mut c_void = ptr::null_mut();
        check(unsafe { ffi::hipEventCreate(&mut event) }, "hipEventCreate")?;
        if event.is_null() {
            return Err(GpuError::EventError(
                "hipEventCreate returned null pointer".to_string(),
            ));
        }
        Ok(EventHandle(event as usize))
    }

    fn event_destroy(&self, event: EventHandle) {
        let rc = unsafe { ffi::hipEventDestroy(event.as_ptr()) };
        if rc != ffi::HIP_SUCCESS {
            tracing::error!(
                "hipEventDestroy failed with code {} ({})",
                rc,
                error_string(rc)
            );
        }
    }

    fn event_record(&self, event: EventHandle, stream: StreamHandle) -> GpuResult<()> {
        check(
            unsafe { ffi::hipEventRecord(event.as_ptr(), stream.as_ptr()) },
            "hipEventRecord",
        )
    }

    fn event_synchronize(&self, event: EventHandle) -> GpuResult<()> {
        check(
            unsafe { ffi::hipEventSynchronize(event.as_ptr()) },
            "hipEventSynchronize",
        )
    }

    fn event_elapsed(&self, start: EventHandle, stop: EventHandle) -> GpuResult<f32> {
        let mut ms: f32 = 0.0;
        check(
            unsafe { ffi::hipEventElapsedTime(&mut ms, start.as_ptr(), stop.as_ptr()) },
            "hipEventElapsedTime",
        )?;
        Ok(ms)
    }

    fn device_synchronize(&self) -> GpuResult<()> {
        check(unsafe { ffi::hipDeviceSynchronize() }, "hipDeviceSynchronize")
    }
}
