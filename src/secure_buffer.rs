use crate::allocator::SharedAllocator;
use crate::error::{MetadataError, Result};
use log::{error, trace};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// A fixed-size byte buffer that is wiped before its memory goes back to the allocator.
///
/// The size is chosen at construction and never changes. The payload is
/// zero-filled when created and zero-filled again right before it is handed
/// to [`Allocator::reclaim`](crate::Allocator::reclaim), whether the buffer is
/// released explicitly or simply dropped.
///
/// [`release`](SecureBuffer::release) consumes the buffer, so a buffer can
/// only ever be released once.
///
/// # Examples
///
/// ```rust
/// use credmeta::{default_allocator, SecureBuffer};
///
/// let alloc = default_allocator();
/// let mut buffer = SecureBuffer::new(&alloc, 16).unwrap();
/// buffer.data_mut()[0] = 0x42;
/// assert_eq!(buffer.data()[0], 0x42);
///
/// // Zeroed and handed back to the allocator
/// buffer.release().unwrap();
/// ```
pub struct SecureBuffer {
    alloc: SharedAllocator,
    // Empty only once the payload has been reclaimed.
    data: Box<[u8]>,
}

impl SecureBuffer {
    /// Creates a zero-filled buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// * `MetadataError::ZeroLengthBuffer` - If `size` is zero
    /// * `MetadataError::OutOfMemory` - If the allocator cannot provide the payload
    pub fn new(alloc: &SharedAllocator, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(MetadataError::ZeroLengthBuffer);
        }

        let mut data = alloc.allocate(size)?;
        if data.len() != size {
            let got = data.len();
            data.zeroize();
            if let Err(e) = alloc.reclaim(data) {
                error!("Failed to reclaim mis-sized SecureBuffer payload: {}", e);
            }
            return Err(MetadataError::OutOfMemory(format!(
                "allocator returned {} bytes, {} requested",
                got, size
            )));
        }
        data.zeroize();

        trace!("Created SecureBuffer with {} bytes", size);

        Ok(Self {
            alloc: Arc::clone(alloc),
            data,
        })
    }

    /// Creates a buffer holding a copy of `bytes`.
    ///
    /// # Errors
    ///
    /// Same as [`SecureBuffer::new`] with `bytes.len()` as the size.
    pub fn from_slice(alloc: &SharedAllocator, bytes: &[u8]) -> Result<Self> {
        let mut buffer = Self::new(alloc, bytes.len())?;
        buffer.data.copy_from_slice(bytes);
        Ok(buffer)
    }

    /// Creates an independent copy of this buffer from the same allocator.
    pub fn try_clone(&self) -> Result<Self> {
        Self::from_slice(&self.alloc, &self.data)
    }

    /// Returns the full contents of the buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the full contents of the buffer for writing.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Returns the size of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a live buffer: zero-sized buffers cannot be created.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Zeroes the payload and hands it back to the allocator.
    ///
    /// # Errors
    ///
    /// * `MetadataError::ReclaimFailed` - If the allocator refuses the block.
    ///   The payload has been zeroed regardless.
    pub fn release(mut self) -> Result<()> {
        self.release_payload()
    }

    fn release_payload(&mut self) -> Result<()> {
        let mut data = std::mem::take(&mut self.data);
        if data.is_empty() {
            return Ok(());
        }

        let size = data.len();
        data.zeroize();
        trace!("Releasing SecureBuffer with {} bytes", size);
        self.alloc.reclaim(data)
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.release_payload() {
            error!("Failed to reclaim SecureBuffer payload on drop: {}", e);
        }
    }
}

impl AsRef<[u8]> for SecureBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl PartialEq for SecureBuffer {
    fn eq(&self, other: &Self) -> bool {
        if self.data.len() != other.data.len() {
            return false;
        }
        self.data[..].ct_eq(&other.data[..]).into()
    }
}

impl Eq for SecureBuffer {}

impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBuffer(len={}, [REDACTED])", self.data.len())
    }
}
