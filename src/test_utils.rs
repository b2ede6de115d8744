//! Utilities for testing credmeta components
//!
//! [`InstrumentedAllocator`] wraps plain heap allocation with bookkeeping so
//! tests can check that every payload was wiped before it was reclaimed, and
//! can force allocation or reclaim failures at a chosen point.

use crate::allocator::{Allocator, SharedAllocator};
use crate::error::{MetadataError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// What an [`InstrumentedAllocator`] saw when a block was offered back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimRecord {
    /// Size of the block in bytes.
    pub size: usize,
    /// Whether every byte of the block was zero when it arrived.
    pub zeroed: bool,
}

#[derive(Debug, Default)]
struct State {
    allocations: usize,
    reclaims: usize,
    live: usize,
    offered: Vec<ReclaimRecord>,
    allocations_before_failure: Option<usize>,
    reclaims_before_failure: Option<usize>,
}

/// Allocator that records every allocate/reclaim and inspects reclaimed memory.
///
/// Clones share the same bookkeeping, so a test keeps one handle for
/// assertions and passes [`shared`](InstrumentedAllocator::shared) to the code
/// under test.
#[derive(Debug, Clone, Default)]
pub struct InstrumentedAllocator {
    state: Arc<Mutex<State>>,
}

impl InstrumentedAllocator {
    /// Creates an allocator with no failures armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a shared handle backed by the same bookkeeping.
    pub fn shared(&self) -> SharedAllocator {
        Arc::new(self.clone())
    }

    /// Lets `n` more allocations succeed, then fails every later one.
    pub fn fail_allocation_after(&self, n: usize) {
        self.state.lock().allocations_before_failure = Some(n);
    }

    /// Lets `n` more reclaims succeed, then fails every later one.
    pub fn fail_reclaim_after(&self, n: usize) {
        self.state.lock().reclaims_before_failure = Some(n);
    }

    /// Disarms any pending allocation or reclaim failure.
    pub fn reset_failures(&self) {
        let mut state = self.state.lock();
        state.allocations_before_failure = None;
        state.reclaims_before_failure = None;
    }

    /// Number of successful allocations.
    pub fn allocations(&self) -> usize {
        self.state.lock().allocations
    }

    /// Number of successful reclaims.
    pub fn reclaims(&self) -> usize {
        self.state.lock().reclaims
    }

    /// Blocks allocated and not yet successfully reclaimed.
    pub fn live_blocks(&self) -> usize {
        self.state.lock().live
    }

    /// Every block offered back, including ones whose reclaim was failed on purpose.
    pub fn reclaim_records(&self) -> Vec<ReclaimRecord> {
        self.state.lock().offered.clone()
    }

    /// Sizes of every block offered back, in order.
    pub fn reclaimed_sizes(&self) -> Vec<usize> {
        self.state.lock().offered.iter().map(|r| r.size).collect()
    }

    /// True if every block offered back so far was all-zero.
    pub fn all_reclaimed_zeroed(&self) -> bool {
        self.state.lock().offered.iter().all(|r| r.zeroed)
    }
}

impl Allocator for InstrumentedAllocator {
    fn allocate(&self, size: usize) -> Result<Box<[u8]>> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.allocations_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(MetadataError::OutOfMemory(format!(
                    "instrumented failure allocating {} bytes",
                    size
                )));
            }
            *remaining -= 1;
        }

        state.allocations += 1;
        state.live += 1;
        Ok(vec![0u8; size].into_boxed_slice())
    }

    fn reclaim(&self, block: Box<[u8]>) -> Result<()> {
        let mut state = self.state.lock();
        state.offered.push(ReclaimRecord {
            size: block.len(),
            zeroed: block.iter().all(|&b| b == 0),
        });

        if let Some(remaining) = state.reclaims_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(MetadataError::ReclaimFailed(format!(
                    "instrumented failure reclaiming {} bytes",
                    block.len()
                )));
            }
            *remaining -= 1;
        }

        state.reclaims += 1;
        state.live = state.live.saturating_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_inspects_blocks() {
        let alloc = InstrumentedAllocator::new();
        let block = alloc.allocate(4).unwrap();
        assert_eq!(alloc.allocations(), 1);
        assert_eq!(alloc.live_blocks(), 1);

        alloc.reclaim(block).unwrap();
        assert_eq!(alloc.reclaims(), 1);
        assert_eq!(alloc.live_blocks(), 0);
        assert_eq!(
            alloc.reclaim_records(),
            vec![ReclaimRecord {
                size: 4,
                zeroed: true
            }]
        );
    }

    #[test]
    fn test_detects_dirty_block() {
        let alloc = InstrumentedAllocator::new();
        let mut block = alloc.allocate(4).unwrap();
        block[2] = 7;
        alloc.reclaim(block).unwrap();
        assert!(!alloc.all_reclaimed_zeroed());
    }

    #[test]
    fn test_armed_failures() {
        let alloc = InstrumentedAllocator::new();
        alloc.fail_allocation_after(1);
        let first = alloc.allocate(1).unwrap();
        assert!(alloc.allocate(1).is_err());
        assert!(alloc.allocate(1).is_err());

        alloc.fail_reclaim_after(0);
        assert!(alloc.reclaim(first).is_err());
        assert_eq!(alloc.live_blocks(), 1);

        alloc.reset_failures();
        let second = alloc.allocate(1).unwrap();
        alloc.reclaim(second).unwrap();
    }
}
