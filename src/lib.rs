//! # credmeta
//!
//! Credential metadata records whose sensitive fields live in wiped buffers,
//! plus a versioned big-endian binary codec for persisting them.
//!
//! ## Features
//!
//! - **Secure Buffers**: Fixed-size byte buffers that are zeroed before their memory is handed back
//! - **Pluggable Allocation**: Every buffer is drawn from an [`Allocator`] chosen by the caller
//! - **Metadata Records**: Ten tracked fields, each either set or unset
//! - **Encoding Validation**: Accepts symbolic encodings and alphabets of the usual sizes
//! - **Binary Codec**: A 54-byte header followed by the variable-length fields
//!
//! ## Basic Usage
//!
//! ```rust
//! use credmeta::{default_allocator, Codec, Metadata};
//!
//! let alloc = default_allocator();
//! let mut meta = Metadata::new(&alloc);
//! meta.set_hash_id(&[0xA5; 16]).unwrap();
//! meta.set_kdf_name("argon2id").unwrap();
//! meta.set_encoding("SYMBOLIC-diceware").unwrap();
//! meta.set_version(1);
//! meta.set_creation_date(1_700_000_000);
//! meta.set_revocation_date(0);
//! meta.set_expiration_date(0);
//! meta.set_password_length(6);
//! meta.set_generation(3);
//! meta.set_legacy_flag(false);
//!
//! let codec = Codec::default();
//! let buffer = codec.serialize(&meta, &alloc).unwrap();
//! let decoded = codec.deserialize(&alloc, &buffer).unwrap();
//! assert!(decoded.symbolic_encoding().unwrap());
//!
//! // Buffers are wiped when released or dropped.
//! buffer.release().unwrap();
//! ```
//!
//! ## Custom Allocators
//!
//! ```rust
//! use credmeta::test_utils::InstrumentedAllocator;
//! use credmeta::SecureBuffer;
//!
//! let instrumented = InstrumentedAllocator::new();
//! let alloc = instrumented.shared();
//!
//! let buffer = SecureBuffer::from_slice(&alloc, b"secret").unwrap();
//! buffer.release().unwrap();
//!
//! assert_eq!(instrumented.live_blocks(), 0);
//! assert!(instrumented.all_reclaimed_zeroed());
//! ```
//!
//! ## Error Handling
//!
//! All operations that can fail return a `Result<T, MetadataError>`.
//!
//! ```rust
//! use credmeta::{default_allocator, Codec, MetadataError};
//!
//! let err = Codec::default()
//!     .deserialize_slice(&default_allocator(), &[0, 0, 0, 2])
//!     .unwrap_err();
//! assert_eq!(err, MetadataError::UnknownSerialVersion(2));
//! ```

/// Allocator abstraction used by every secure buffer
pub mod allocator;

/// Binary codec for metadata records
pub mod codec;

/// Encoding name classification
pub mod encoding;

/// Error types
pub mod error;

/// The metadata record
pub mod metadata;

/// Wiped, allocator-backed byte buffers
pub mod secure_buffer;

/// Utilities for testing
pub mod test_utils;

// Re-export key types
pub use crate::allocator::{default_allocator, Allocator, SharedAllocator, SystemAllocator};
pub use crate::codec::{Codec, CodecConfig};
pub use crate::encoding::{classify_encoding, EncodingKind};
pub use crate::error::{Field, MetadataError, Result};
pub use crate::metadata::Metadata;
pub use crate::secure_buffer::SecureBuffer;
