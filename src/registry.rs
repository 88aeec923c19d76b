//! Memory block registry
//!
//! Tracks every outstanding host and device allocation made through the
//! manager, keyed by address. Removal is the only release path, so a
//! double-free is impossible by construction: the second release finds no
//! entry and degrades to a logged warning.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

use crate::driver::{GpuDriver, MemKind};
use crate::error::GpuResult;

#[derive(Debug)]
pub struct MemoryRegistry {
    driver: Arc<dyn GpuDriver>,
    /// Device blocks: address -> byte size
    device: HashMap<usize, usize>,
    /// Pinned host blocks: address -> byte size
    host: HashMap<usize, usize>,
}

impl MemoryRegistry {
    pub fn new(driver: Arc<dyn GpuDriver>) -> Self {
        MemoryRegistry {
            driver,
            device: HashMap::new(),
            host: HashMap::new(),
        }
    }

    /// Allocate `bytes` of the given kind and take ownership of the block.
    ///
    /// The address lives in exactly one of the two tables until released.
    pub fn allocate(&mut self, bytes: usize, kind: MemKind) -> GpuResult<*mut c_void> {
        if bytes == 0 {
            tracing::warn!("zero-byte allocation requested");
        }
        let ptr = match kind {
            MemKind::Device => self.driver.alloc_device(bytes)?,
            MemKind::Host => self.driver.alloc_host(bytes)?,
        };
        let table = match kind {
            MemKind::Device => &mut self.device,
            MemKind::Host => &mut self.host,
        };
        table.insert(ptr as usize, bytes);
        tracing::trace!("tracked {} bytes of {:?} memory at {:?}", bytes, kind, ptr);
        Ok(ptr)
    }

    /// Release a tracked block, device table first, then host.
    ///
    /// An address the registry never tracked is a benign anomaly: logged as
    /// a warning, otherwise ignored.
    pub fn release(&mut self, ptr: *const c_void) {
        let addr = ptr as usize;
        if self.device.remove(&addr).is_some() {
            self.driver.free_device(addr as *mut c_void);
            return;
        }
        if self.host.remove(&addr).is_some() {
            self.driver.free_host(addr as *mut c_void);
            return;
        }
        tracing::warn!("attempt to free unknown data: {:?}", ptr);
    }

    /// Free every remaining tracked block. Runs at teardown, after the
    /// final flush of all streams.
    pub fn clear(&mut self) {
        let released = self.device.len() + self.host.len();
        for (&addr, _) in self.device.iter() {
            self.driver.free_device(addr as *mut c_void);
        }
        for (&addr, _) in self.host.iter() {
            self.driver.free_host(addr as *mut c_void);
        }
        self.device.clear();
        self.host.clear();
        if released > 0 {
            tracing::debug!("registry cleared, {} blocks released", released);
        }
    }

    /// Device blocks currently tracked
    pub fn device_blocks(&self) -> usize {
        self.device.len()
    }

    /// Host blocks currently tracked
    pub fn host_blocks(&self) -> usize {
        self.host.len()
    }
}
