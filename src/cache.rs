//! Exact-size caching sub-allocator
//!
//! Per-stream free list keyed by precise byte size. Released blocks are
//! parked here instead of going back to the registry, so algorithms that
//! repeatedly request same-sized temporaries pay for one real allocation.
//! A request never reuses a block of a different size, even a larger one:
//! zero fragmentation bookkeeping in exchange for some memory slack.
//!
//! The cache never owns memory. Every address in either map was obtained
//! from the resource manager and is handed back to it on [`drain`].
//!
//! [`drain`]: BlockCache::drain

use std::collections::{BTreeMap, HashMap};

use crate::error::{GpuError, GpuResult};

#[derive(Debug, Default)]
pub struct BlockCache {
    /// Size -> addresses of released blocks available for reuse
    free: BTreeMap<usize, Vec<usize>>,
    /// Address -> original size, for blocks currently checked out
    allocated: HashMap<usize, usize>,
}

impl BlockCache {
    pub fn new() -> Self {
        BlockCache::default()
    }

    /// Take an exact-size free block if one is parked, moving it to the
    /// allocated map. `None` means the caller must allocate fresh and then
    /// register the new block with [`insert_fresh`](Self::insert_fresh).
    pub fn reuse(&mut self, bytes: usize) -> Option<usize> {
        let blocks = self.free.get_mut(&bytes)?;
        let addr = blocks.pop()?;
        if blocks.is_empty() {
            self.free.remove(&bytes);
        }
        self.allocated.insert(addr, bytes);
        tracing::trace!("reused {}-byte cached block at {:#x}", bytes, addr);
        Some(addr)
    }

    /// Record a freshly-allocated block as checked out
    pub fn insert_fresh(&mut self, addr: usize, bytes: usize) {
        self.allocated.insert(addr, bytes);
    }

    /// Park a checked-out block on the free list, keyed by its original
    /// size. The underlying memory is not released.
    ///
    /// An address this cache never allocated indicates a logic bug in the
    /// calling algorithm: logged as an error and reported through the
    /// typed channel, state untouched.
    pub fn release(&mut self, addr: usize) -> GpuResult<()> {
        match self.allocated.remove(&addr) {
            Some(bytes) => {
                self.free.entry(bytes).or_default().push(addr);
                Ok(())
            }
            None => {
                tracing::error!("attempt to remove unknown memory at {:#x}", addr);
                Err(GpuError::UnknownCacheBlock { addr })
            }
        }
    }

    /// Empty both maps and return every cached address, free and still
    /// checked out alike, for release back to the registry. Must run
    /// before the owning streams are destroyed.
    pub fn drain(&mut self) -> Vec<usize> {
        if !self.allocated.is_empty() {
            tracing::warn!(
                "{} cached blocks still checked out at teardown",
                self.allocated.len()
            );
        }
        let mut addrs: Vec<usize> = self.free.values().flatten().copied().collect();
        addrs.extend(self.allocated.keys().copied());
        self.free.clear();
        self.allocated.clear();
        addrs
    }

    /// Number of blocks parked for reuse
    pub fn free_blocks(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Number of blocks currently checked out
    pub fn allocated_blocks(&self) -> usize {
        self.allocated.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_block_is_reused_for_same_size() {
        let mut cache = BlockCache::new();
        cache.insert_fresh(0x1000, 1024);
        cache.release(0x1000).unwrap();
        assert_eq!(cache.free_blocks(), 1);

        assert_eq!(cache.reuse(1024), Some(0x1000));
        assert_eq!(cache.free_blocks(), 0);
        assert_eq!(cache.allocated_blocks(), 1);
    }

    #[test]
    fn different_size_never_matches() {
        let mut cache = BlockCache::new();
        cache.insert_fresh(0x2000, 2048);
        cache.release(0x2000).unwrap();

        // Smaller request must not be satisfied by the larger parked block.
        assert_eq!(cache.reuse(1024), None);
        assert_eq!(cache.reuse(2048), Some(0x2000));
    }

    #[test]
    fn unknown_release_is_reported() {
        let mut cache = BlockCache::new();
        cache.insert_fresh(0x3000, 64);
        match cache.release(0x4000) {
            Err(GpuError::UnknownCacheBlock { addr }) => assert_eq!(addr, 0x4000),
            other => panic!("expected UnknownCacheBlock, got {:?}", other),
        }
        // State untouched by the bad release.
        assert_eq!(cache.allocated_blocks(), 1);
        assert_eq!(cache.free_blocks(), 0);
    }

    #[test]
    fn drain_returns_free_and_checked_out_blocks() {
        let mut cache = BlockCache::new();
        cache.insert_fresh(0x100, 16);
        cache.insert_fresh(0x200, 16);
        cache.insert_fresh(0x300, 32);
        cache.release(0x100).unwrap();

        let mut addrs = cache.drain();
        addrs.sort_unstable();
        assert_eq!(addrs, vec![0x100, 0x200, 0x300]);
        assert_eq!(cache.free_blocks(), 0);
        assert_eq!(cache.allocated_blocks(), 0);
    }

    #[test]
    fn same_size_blocks_stack_on_the_free_list() {
        let mut cache = BlockCache::new();
        cache.insert_fresh(0xa00, 512);
        cache.insert_fresh(0xb00, 512);
        cache.release(0xa00).unwrap();
        cache.release(0xb00).unwrap();
        assert_eq!(cache.free_blocks(), 2);

        let first = cache.reuse(512).unwrap();
        let second = cache.reuse(512).unwrap();
        assert_ne!(first, second);
        assert_eq!(cache.reuse(512), None);
    }
}
