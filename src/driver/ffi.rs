//! HIP FFI bindings
//!
//! Only the runtime entry points the driver actually wraps. The dead_code
//! allowance is needed because FFI symbols appear unused to the compiler
//! (they are only called through unsafe blocks).

use std::ffi::c_void;

#[allow(dead_code)]
extern "C" {
    pub fn hipInit(flags: u32) -> i32;
    pub fn hipGetDeviceCount(count: *mut i32) -> i32;
    pub fn hipSetDevice(device_id: i32) -> i32;
    pub fn hipMalloc(ptr: *mut *mut c_void, size: usize) -> i32;
    pub fn hipFree(ptr: *mut c_void) -> i32;
    pub fn hipHostMalloc(ptr: *mut *mut c_void, size: usize, flags: u32) -> i32;
    pub fn hipHostFree(ptr: *mut c_void) -> i32;
    pub fn hipMemcpyAsync(
        dst: *mut c_void,
        src: *const c_void,
        count: usize,
        kind: i32,
        stream: *mut c_void,
    ) -> i32;
    pub fn hipMemsetAsync(dst: *mut c_void, value: i32, count: usize, stream: *mut c_void) -> i32;
    pub fn hipStreamCreateWithFlags(stream: *mut *mut c_void, flags: u32) -> i32;
    pub fn hipStreamDestroy(stream: *mut c_void) -> i32;
    pub fn hipStreamSynchronize(stream: *mut c_void) -> i32;
    pub fn hipStreamWaitEvent(stream: *mut c_void, event: *mut c_void, flags: u32) -> i32;
    pub fn hipEventCreate(event: *mut *mut c_void) -> i32;
    pub fn hipEventDestroy(event: *mut c_void) -> i32;
    pub fn hipEventRecord(event: *mut c_void, stream: *mut c_void) -> i32;
    pub fn hipEventSynchronize(event: *mut c_void) -> i32;
    pub fn hipEventElapsedTime(ms: *mut f32, start: *mut c_void, end: *mut c_void) -> i32;
    pub fn hipDeviceSynchronize() -> i32;
    pub fn hipGetErrorString(error: i32) -> *const i8;
}

/// HIP memory copy kinds
pub const HIP_MEMCPY_HOST_TO_DEVICE: i32 = 1;
pub const HIP_MEMCPY_DEVICE_TO_HOST: i32 = 2;
pub const HIP_MEMCPY_DEVICE_TO_DEVICE: i32 = 3;

/// HIP success code
pub const HIP_SUCCESS: i32 = 0;

/// Stream creation flag: does not synchronize with the null stream
pub const HIP_STREAM_NON_BLOCKING: u32 = 0x1;

/// Default pinned allocation flags
pub const HIP_HOST_MALLOC_DEFAULT: u32 = 0x0;
