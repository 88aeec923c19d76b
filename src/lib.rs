//! hipmux - GPU execution-resource manager for a single ROCm/HIP device
//!
//! Multiplexes a fixed set of asynchronous streams and timing-event pairs
//! over one accelerator, tracks ownership of host-pinned and device memory,
//! and layers an exact-size caching sub-allocator on top so algorithms that
//! repeatedly request same-sized temporaries never hit the device allocator
//! twice for the same size.
//!
//! The platform boundary is the [`GpuDriver`] trait. The real HIP driver is
//! compiled behind the `rocm` feature; [`HostDriver`] is a heap-backed
//! emulation that lets the whole crate run on machines without a GPU.

pub mod cache;
pub mod device;
pub mod driver;
pub mod error;
pub mod logging;
pub mod manager;
pub mod policy;
pub mod pool;
pub mod registry;
pub mod trace;

pub use cache::BlockCache;
pub use device::GpuDevice;
#[cfg(feature = "rocm")]
pub use driver::hip::HipDriver;
pub use driver::{host::HostDriver, CopyKind, EventHandle, GpuDriver, MemKind, StreamHandle};
pub use error::{GpuError, GpuResult};
pub use manager::GpuManager;
pub use policy::ExecutionPolicy;
pub use pool::{StreamPool, EVENT_STREAM, NUM_EVENTS, NUM_STREAMS};
pub use registry::MemoryRegistry;
pub use trace::{LogTracer, NoopTracer, ScopeTracer, TraceScope};
