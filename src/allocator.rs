//! Allocation seam for secure buffers.
//!
//! Every [`SecureBuffer`](crate::SecureBuffer) payload is obtained from and
//! handed back to an [`Allocator`]. The allocator never sees a block that
//! still holds data: buffers zero their payload before calling
//! [`Allocator::reclaim`].

use crate::error::{MetadataError, Result};
use log::trace;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Source of payload memory for secure buffers.
pub trait Allocator: Send + Sync {
    /// Allocates a zero-filled block of exactly `size` bytes.
    ///
    /// # Errors
    ///
    /// * `MetadataError::OutOfMemory` - If the block cannot be provided
    fn allocate(&self, size: usize) -> Result<Box<[u8]>>;

    /// Takes back a block previously returned by `allocate`.
    ///
    /// Callers zero the block before handing it back.
    ///
    /// # Errors
    ///
    /// * `MetadataError::ReclaimFailed` - If the allocator refuses the block
    fn reclaim(&self, block: Box<[u8]>) -> Result<()>;
}

/// Shared handle to an allocator, cloned into every buffer and record.
pub type SharedAllocator = Arc<dyn Allocator>;

/// Heap allocator that reports allocation failure instead of aborting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// Creates a new SystemAllocator.
    pub fn new() -> Self {
        Self
    }

    /// Creates a shared handle to a new SystemAllocator.
    pub fn shared() -> SharedAllocator {
        Arc::new(Self)
    }
}

impl Allocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Result<Box<[u8]>> {
        let mut block: Vec<u8> = Vec::new();
        block
            .try_reserve_exact(size)
            .map_err(|e| MetadataError::OutOfMemory(format!("{} bytes: {}", size, e)))?;
        block.resize(size, 0);

        trace!("SystemAllocator: allocated {} bytes", size);
        Ok(block.into_boxed_slice())
    }

    fn reclaim(&self, block: Box<[u8]>) -> Result<()> {
        trace!("SystemAllocator: reclaimed {} bytes", block.len());
        drop(block);
        Ok(())
    }
}

static DEFAULT_ALLOCATOR: Lazy<SharedAllocator> = Lazy::new(SystemAllocator::shared);

/// Returns the process-wide [`SystemAllocator`] handle.
pub fn default_allocator() -> SharedAllocator {
    Arc::clone(&DEFAULT_ALLOCATOR)
}
