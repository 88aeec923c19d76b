//! Resource manager façade
//!
//! Owns the stream/event pool, the memory registry and one block cache per
//! stream. A single host thread drives the manager; the bookkeeping is
//! interior-mutable but unsynchronized (`RefCell`), so the type is `!Sync`
//! and concurrent access must be serialized by the caller.

use std::cell::RefCell;
use std::ffi::c_void;
use std::mem;
use std::sync::Arc;

use crate::cache::BlockCache;
use crate::device::GpuDevice;
use crate::driver::{CopyKind, GpuDriver, MemKind, StreamHandle};
use crate::error::GpuResult;
use crate::policy::ExecutionPolicy;
use crate::pool::{StreamPool, EVENT_STREAM, NUM_STREAMS};
use crate::registry::MemoryRegistry;
use crate::trace::{NoopTracer, ScopeTracer};

pub struct GpuManager {
    device: GpuDevice,
    driver: Arc<dyn GpuDriver>,
    pool: StreamPool,
    registry: RefCell<MemoryRegistry>,
    caches: Vec<RefCell<BlockCache>>,
    tracer: Arc<dyn ScopeTracer>,
}

impl GpuManager {
    /// Build a manager over an already-selected device.
    ///
    /// Creates the full stream/event pool up front; any platform failure
    /// surfaces here and nothing is left behind.
    pub fn new(device: GpuDevice, driver: Arc<dyn GpuDriver>) -> GpuResult<Self> {
        let pool = StreamPool::new(Arc::clone(&driver))?;
        let registry = RefCell::new(MemoryRegistry::new(Arc::clone(&driver)));
        let caches = (0..NUM_STREAMS)
            .map(|_| RefCell::new(BlockCache::new()))
            .collect();
        tracing::debug!("GPU manager ready on device {} ({})", device.id, device.name);
        Ok(GpuManager {
            device,
            driver,
            pool,
            registry,
            caches,
            tracer: Arc::new(NoopTracer),
        })
    }

    /// Replace the profiling shim. The default is a no-op tracer; pass a
    /// real one to get named ranges around instrumented sections.
    pub fn with_tracer(mut self, tracer: Arc<dyn ScopeTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// The device this manager was constructed for
    pub fn device(&self) -> &GpuDevice {
        &self.device
    }

    /// The active profiling shim
    pub fn tracer(&self) -> &Arc<dyn ScopeTracer> {
        &self.tracer
    }

    /// Typed allocation convenience: `count` elements of `T`
    pub fn alloc<T>(&self, count: usize, kind: MemKind) -> GpuResult<*mut T> {
        Ok(self.allocate(count * mem::size_of::<T>(), kind)? as *mut T)
    }

    /// Allocate raw bytes, tracked by the registry until freed
    pub fn allocate(&self, bytes: usize, kind: MemKind) -> GpuResult<*mut c_void> {
        self.registry.borrow_mut().allocate(bytes, kind)
    }

    /// Release memory previously returned by [`alloc`](Self::alloc) or
    /// [`allocate`](Self::allocate). Unknown pointers warn and no-op.
    pub fn free<T>(&self, ptr: *const T) {
        self.registry.borrow_mut().release(ptr as *const c_void);
    }

    /// Enqueue an async copy of `count` elements of `T` on the indexed
    /// stream. Returns as soon as the copy is queued; synchronize the
    /// stream before reading the destination on the host.
    pub fn copy<T>(
        &self,
        to: *mut T,
        from: *const T,
        count: usize,
        kind: CopyKind,
        stream_index: usize,
    ) -> GpuResult<()> {
        self.driver.memcpy_async(
            to as *mut c_void,
            from as *const c_void,
            count * mem::size_of::<T>(),
            kind,
            self.pool.stream(stream_index),
        )
    }

    /// Enqueue an async byte fill over `count` elements of `T`
    pub fn set<T>(&self, to: *mut T, value: i32, count: usize, stream_index: usize) -> GpuResult<()> {
        self.driver.memset_async(
            to as *mut c_void,
            value,
            count * mem::size_of::<T>(),
            self.pool.stream(stream_index),
        )
    }

    /// Stream handle for kernel launches; out-of-range indices clamp to
    /// the shared `EVENT_STREAM`
    pub fn stream(&self, index: usize) -> StreamHandle {
        self.pool.stream(index)
    }

    /// Device-side ordering edge: see [`StreamPool::stream_wait`]
    pub fn stream_wait(&self, stream_index: usize, event_index: usize) -> GpuResult<()> {
        self.pool.stream_wait(stream_index, event_index)
    }

    /// Record a timing start marker; see [`StreamPool::timer_start`]
    pub fn timer_start(&self, event_index: usize, stream_index: Option<usize>) -> GpuResult<()> {
        self.pool.timer_start(event_index, stream_index)
    }

    /// Record a timing stop marker; see [`StreamPool::timer_stop`]
    pub fn timer_stop(&self, event_index: usize, stream_index: Option<usize>) -> GpuResult<()> {
        self.pool.timer_stop(event_index, stream_index)
    }

    /// Milliseconds between a marker pair; forces stop completion for
    /// stream-aligned events. Host suspension point.
    pub fn timer_elapsed(&self, event_index: usize) -> GpuResult<f32> {
        self.pool.timer_elapsed(event_index)
    }

    /// Block until the indexed stream has drained
    pub fn synchronize(&self, stream_index: usize) -> GpuResult<()> {
        self.pool.flush(stream_index)
    }

    /// Block until every stream on the device has drained
    pub fn synchronize_device(&self) -> GpuResult<()> {
        self.pool.flush_device()
    }

    fn cache_index(&self, stream_index: usize) -> usize {
        if stream_index >= self.caches.len() {
            EVENT_STREAM
        } else {
            stream_index
        }
    }

    /// Allocate a device temporary through the stream's cache: an
    /// exact-size parked block if available, a fresh registry allocation
    /// otherwise.
    pub fn cache_allocate(&self, stream_index: usize, bytes: usize) -> GpuResult<*mut c_void> {
        let mut cache = self.caches[self.cache_index(stream_index)].borrow_mut();
        if let Some(addr) = cache.reuse(bytes) {
            return Ok(addr as *mut c_void);
        }
        let ptr = self.registry.borrow_mut().allocate(bytes, MemKind::Device)?;
        cache.insert_fresh(ptr as usize, bytes);
        Ok(ptr)
    }

    /// Park a cached temporary for reuse. The memory stays tracked by the
    /// registry; releasing a pointer the cache never handed out is a
    /// caller logic error, reported through the typed channel.
    pub fn cache_release(&self, stream_index: usize, ptr: *mut c_void) -> GpuResult<()> {
        self.caches[self.cache_index(stream_index)]
            .borrow_mut()
            .release(ptr as usize)
    }

    /// Policy object binding a stream to its cache, for generic parallel
    /// algorithms that need both a launch stream and temporary storage.
    pub fn execution_policy(&self, stream_index: usize) -> ExecutionPolicy<'_> {
        ExecutionPolicy::new(self, self.cache_index(stream_index))
    }
}

impl std::fmt::Debug for GpuManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuManager")
            .field("device", &self.device)
            .field("streams", &NUM_STREAMS)
            .finish_non_exhaustive()
    }
}

impl Drop for GpuManager {
    fn drop(&mut self) {
        // Cached temporaries go back to the registry first, while their
        // owning streams still exist.
        for (index, cache) in self.caches.iter().enumerate() {
            let addrs = cache.borrow_mut().drain();
            if !addrs.is_empty() {
                tracing::debug!(
                    "releasing {} cached blocks for stream {}",
                    addrs.len(),
                    index
                );
            }
            let mut registry = self.registry.borrow_mut();
            for addr in addrs {
                registry.release(addr as *const c_void);
            }
        }

        // Flush remaining work before any memory is freed.
        self.pool.flush_all();
        self.registry.borrow_mut().clear();
        tracing::debug!("GPU manager on device {} shut down", self.device.id);
        // StreamPool's drop runs after this body and destroys the
        // streams and events, flushing once more beforehand.
    }
}
