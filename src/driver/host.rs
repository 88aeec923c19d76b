//! Heap-backed driver emulation for machines without a GPU
//!
//! Implements the full [`GpuDriver`] contract with ordinary aligned heap
//! allocations and immediate (synchronous) copies. Streams are ids with no
//! queued work, so every synchronize is a no-op that still validates its
//! handle; events capture wall-clock timestamps at record time so elapsed
//! queries stay meaningful.
//!
//! The allocation-call counters exist for accounting tests: the caching
//! sub-allocator's reuse guarantees are asserted against them.

use std::alloc::{alloc, dealloc, Layout};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::driver::{CopyKind, EventHandle, GpuDriver, StreamHandle};
use crate::error::{GpuError, GpuResult};

/// Alignment matching typical device allocation granularity
const HOST_ALIGN: usize = 256;

#[derive(Debug, Default)]
pub struct HostDriver {
    next_handle: AtomicUsize,
    streams: Mutex<HashSet<usize>>,
    /// Event handle -> timestamp of the most recent record, if any
    events: Mutex<HashMap<usize, Option<Instant>>>,
    device_layouts: Mutex<HashMap<usize, Layout>>,
    host_layouts: Mutex<HashMap<usize, Layout>>,
    device_alloc_calls: AtomicUsize,
    host_alloc_calls: AtomicUsize,
}

impl HostDriver {
    pub fn new() -> Self {
        HostDriver::default()
    }

    /// Total number of device allocation calls made so far
    pub fn device_alloc_calls(&self) -> usize {
        self.device_alloc_calls.load(Ordering::Relaxed)
    }

    /// Total number of pinned host allocation calls made so far
    pub fn host_alloc_calls(&self) -> usize {
        self.host_alloc_calls.load(Ordering::Relaxed)
    }

    /// Device blocks currently allocated and not yet freed
    pub fn live_device_blocks(&self) -> usize {
        self.device_layouts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Host blocks currently allocated and not yet freed
    pub fn live_host_blocks(&self) -> usize {
        self.host_layouts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn fresh_handle(&self) -> usize {
        // Start at 1 so no handle ever looks like a null pointer.
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn alloc_block(&self, bytes: usize) -> GpuResult<(usize, Layout)> {
        // Zero-byte requests still get a distinct, freeable address.
        let layout = Layout::from_size_align(bytes.max(1), HOST_ALIGN)
            .map_err(|e| GpuError::AllocationFailed(format!("bad layout for {} bytes: {}", bytes, e)))?;
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return Err(GpuError::AllocationFailed(format!(
                "host allocator returned null for {} bytes",
                bytes
            )));
        }
        Ok((ptr as usize, layout))
    }

    fn free_block(&self, table: &Mutex<HashMap<usize, Layout>>, ptr: *mut c_void, what: &str) {
        if ptr.is_null() {
            return;
        }
        let layout = table.lock().unwrap_or_else(|e| e.into_inner()).remove(&(ptr as usize));
        match layout {
            Some(layout) => unsafe { dealloc(ptr as *mut u8, layout) },
            None => tracing::warn!("HostDriver: freeing unknown {} pointer {:?}", what, ptr),
        }
    }
}

impl GpuDriver for HostDriver {
    fn alloc_device(&self, bytes: usize) -> GpuResult<*mut c_void> {
        let (addr, layout) = self.alloc_block(bytes)?;
        self.device_layouts.lock().unwrap_or_else(|e| e.into_inner()).insert(addr, layout);
        self.device_alloc_calls.fetch_add(1, Ordering::Relaxed);
        Ok(addr as *mut c_void)
    }

    fn alloc_host(&self, bytes: usize) -> GpuResult<*mut c_void> {
        let (addr, layout) = self.alloc_block(bytes)?;
        self.host_layouts.lock().unwrap_or_else(|e| e.into_inner()).insert(addr, layout);
        self.host_alloc_calls.fetch_add(1, Ordering::Relaxed);
        Ok(addr as *mut c_void)
    }

    fn free_device(&self, ptr: *mut c_void) {
        self.free_block(&self.device_layouts, ptr, "device");
    }

    fn free_host(&self, ptr: *mut c_void) {
        self.free_block(&self.host_layouts, ptr, "host");
    }

    fn memcpy_async(
        &self,
        dst: *mut c_void,
        src: *const c_void,
        bytes: usize,
        _kind: CopyKind,
        stream: StreamHandle,
    ) -> GpuResult<()> {
        if !self.streams.lock().unwrap_or_else(|e| e.into_inner()).contains(&stream.0) {
            return Err(GpuError::CopyFailed(format!(
                "copy enqueued on unknown stream {:?}",
                stream
            )));
        }
        if bytes == 0 {
            return Ok(());
        }
        if dst.is_null() || src.is_null() {
            return Err(GpuError::CopyFailed("null pointer in copy".to_string()));
        }
        // All host memory here; the copy completes before we return, which
        // trivially satisfies the stream-ordered contract.
        unsafe { std::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, bytes) };
        Ok(())
    }

    fn memset_async(
        &self,
        dst: *mut c_void,
        value: i32,
        bytes: usize,
        stream: StreamHandle,
    ) -> GpuResult<()> {
        if !self.streams.lock().unwrap_or_else(|e| e.into_inner()).contains(&stream.0) {
            return Err(GpuError::StreamError(format!(
                "memset enqueued on unknown stream {:?}",
                stream
            )));
        }
        if bytes == 0 {
            return Ok(());
        }
        if dst.is_null() {
            return Err(GpuError::StreamError("null pointer in memset".to_string()));
        }
        unsafe { std::ptr::write_bytes(dst as *mut u8, value as u8, bytes) };
        Ok(())
    }

    fn stream_create(&self) -> GpuResult<StreamHandle> {
        let id = self.fresh_handle();
        self.streams.lock().unwrap_or_else(|e| e.into_inner()).insert(id);
        Ok(StreamHandle(id))
    }

    fn stream_destroy(&self, stream: StreamHandle) {
        if !self.streams.lock().unwrap_or_else(|e| e.into_inner()).remove(&stream.0) {
            tracing::warn!("HostDriver: destroying unknown stream {:?}", stream);
        }
    }

    fn stream_synchronize(&self, stream: StreamHandle) -> GpuResult<()> {
        if self.streams.lock().unwrap_or_else(|e| e.into_inner()).contains(&stream.0) {
            Ok(())
        } else {
            Err(GpuError::StreamError(format!(
                "synchronize on unknown stream {:?}",
                stream
            )))
        }
    }

    fn stream_wait_event(&self, stream: StreamHandle, event: EventHandle) -> GpuResult<()> {
        if !self.streams.lock().unwrap_or_else(|e| e.into_inner()).contains(&stream.0) {
            return Err(GpuError::StreamError(format!(
                "wait on unknown stream {:?}",
                stream
            )));
        }
        if !self.events.lock().unwrap_or_else(|e| e.into_inner()).contains_key(&event.0) {
            return Err(GpuError::EventError(format!(
                "wait on unknown event {:?}",
                event
            )));
        }
        Ok(())
    }

    fn event_create(&self) -> GpuResult<EventHandle> {
        let id = self.fresh_handle();
        self.events.lock().unwrap_or_else(|e| e.into_inner()).insert(id, None);
        Ok(EventHandle(id))
    }

    fn event_destroy(&self, event: EventHandle) {
        if self.events.lock().unwrap_or_else(|e| e.into_inner()).remove(&event.0).is_none() {
            tracing::warn!("HostDriver: destroying unknown event {:?}", event);
        }
    }

    fn event_record(&self, event: EventHandle, _stream: StreamHandle) -> GpuResult<()> {
        match self.events.lock().unwrap_or_else(|e| e.into_inner()).get_mut(&event.0) {
            Some(slot) => {
                *slot = Some(Instant::now());
                Ok(())
            }
            None => Err(GpuError::EventError(format!(
                "record on unknown event {:?}",
                event
            ))),
        }
    }

    fn event_synchronize(&self, event: EventHandle) -> GpuResult<()> {
        if self.events.lock().unwrap_or_else(|e| e.into_inner()).contains_key(&event.0) {
            Ok(())
        } else {
            Err(GpuError::EventError(format!(
                "synchronize on unknown event {:?}",
                event
            )))
        }
    }

    fn event_elapsed(&self, start: EventHandle, stop: EventHandle) -> GpuResult<f32> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let begin = events
            .get(&start.0)
            .copied()
            .flatten()
            .ok_or_else(|| GpuError::EventError("elapsed query before start was recorded".to_string()))?;
        let end = events
            .get(&stop.0)
            .copied()
            .flatten()
            .ok_or_else(|| GpuError::EventError("elapsed query before stop was recorded".to_string()))?;
        Ok(end.saturating_duration_since(begin).as_secs_f64() as f32 * 1000.0)
    }

    fn device_synchronize(&self) -> GpuResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_tracks_live_blocks() {
        let driver = HostDriver::new();
        let a = driver.alloc_device(128).unwrap();
        let b = driver.alloc_host(64).unwrap();
        assert_eq!(driver.live_device_blocks(), 1);
        assert_eq!(driver.live_host_blocks(), 1);
        driver.free_device(a);
        driver.free_host(b);
        assert_eq!(driver.live_device_blocks(), 0);
        assert_eq!(driver.live_host_blocks(), 0);
        assert_eq!(driver.device_alloc_calls(), 1);
        assert_eq!(driver.host_alloc_calls(), 1);
    }

    #[test]
    fn zero_byte_allocations_are_distinct() {
        let driver = HostDriver::new();
        let a = driver.alloc_device(0).unwrap();
        let b = driver.alloc_device(0).unwrap();
        assert_ne!(a, b);
        driver.free_device(a);
        driver.free_device(b);
    }

    #[test]
    fn copy_and_memset_run_immediately() {
        let driver = HostDriver::new();
        let stream = driver.stream_create().unwrap();
        let dst = driver.alloc_device(16).unwrap();
        driver.memset_async(dst, 0x5a, 16, stream).unwrap();
        let mut out = [0u8; 16];
        driver
            .memcpy_async(
                out.as_mut_ptr() as *mut c_void,
                dst as *const c_void,
                16,
                CopyKind::DeviceToHost,
                stream,
            )
            .unwrap();
        assert!(out.iter().all(|&b| b == 0x5a));
        driver.free_device(dst);
        driver.stream_destroy(stream);
    }

    #[test]
    fn elapsed_requires_recorded_events() {
        let driver = HostDriver::new();
        let stream = driver.stream_create().unwrap();
        let start = driver.event_create().unwrap();
        let stop = driver.event_create().unwrap();
        assert!(driver.event_elapsed(start, stop).is_err());

        driver.event_record(start, stream).unwrap();
        driver.event_record(stop, stream).unwrap();
        let ms = driver.event_elapsed(start, stop).unwrap();
        assert!(ms >= 0.0);
    }

    #[test]
    fn operations_on_unknown_handles_fail() {
        let driver = HostDriver::new();
        let bogus = StreamHandle(9999);
        assert!(driver.stream_synchronize(bogus).is_err());
        assert!(driver
            .memset_async(std::ptr::null_mut(), 0, 4, bogus)
            .is_err());
    }
}
