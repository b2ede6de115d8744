use std::fmt;
use thiserror::Error;

/// Names the ten logical fields of a [`Metadata`](crate::Metadata) record.
///
/// Used in error values and by [`Metadata::missing_fields`](crate::Metadata::missing_fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Content-identifying hash.
    HashId,
    /// Key-derivation function name.
    KdfName,
    /// Output encoding name.
    Encoding,
    /// Record version.
    Version,
    /// Creation timestamp.
    CreationDate,
    /// Revocation timestamp.
    RevocationDate,
    /// Expiration timestamp.
    ExpirationDate,
    /// Length of the derived password.
    PasswordLength,
    /// Generation counter.
    Generation,
    /// Legacy flag.
    LegacyFlag,
}

impl Field {
    /// All fields, in wire header order.
    pub const ALL: [Field; 10] = [
        Field::Version,
        Field::CreationDate,
        Field::RevocationDate,
        Field::ExpirationDate,
        Field::PasswordLength,
        Field::Generation,
        Field::LegacyFlag,
        Field::HashId,
        Field::KdfName,
        Field::Encoding,
    ];

    /// Returns the snake_case name of the field.
    pub fn name(self) -> &'static str {
        match self {
            Field::HashId => "hash_id",
            Field::KdfName => "kdf_name",
            Field::Encoding => "encoding",
            Field::Version => "version",
            Field::CreationDate => "creation_date",
            Field::RevocationDate => "revocation_date",
            Field::ExpirationDate => "expiration_date",
            Field::PasswordLength => "password_length",
            Field::Generation => "generation",
            Field::LegacyFlag => "legacy_flag",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors that can occur in the credmeta library.
///
/// Variants fall into two classes. Resource exhaustion (`OutOfMemory`,
/// `ReclaimFailed`) comes from the [`Allocator`](crate::Allocator). Every
/// other variant is a validation error: the caller can recover from it and
/// the rejected input never alters an existing record.
///
/// # Examples
///
/// ```rust
/// use credmeta::{default_allocator, Field, Metadata, MetadataError};
///
/// let meta = Metadata::new(&default_allocator());
/// match meta.version() {
///     Err(MetadataError::FieldNotSet(Field::Version)) => {}
///     other => panic!("unexpected result: {:?}", other),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// A getter was called on an unset field, or a record that is not
    /// complete was handed to the codec.
    #[error("Metadata field not set: {0}")]
    FieldNotSet(Field),

    /// An encoding name is neither symbolic nor of an accepted length.
    #[error("Bad encoding length: {0}")]
    BadEncodingLength(usize),

    /// A serialized buffer is truncated, carries trailing bytes, or declares
    /// a field size outside the configured bounds.
    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(String),

    /// A serialized buffer carries a serial version this library cannot read.
    #[error("Unknown serial version: {0}")]
    UnknownSerialVersion(u32),

    /// A secure buffer of zero bytes was requested.
    #[error("Secure buffers must have a non-zero size")]
    ZeroLengthBuffer,

    /// A serialized string field is not valid UTF-8.
    #[error("Field {0} is not valid UTF-8")]
    InvalidUtf8(Field),

    /// A variable-length field does not fit the 32-bit size slot of the wire format.
    #[error("Field {field} is too large to serialize: {size} bytes")]
    FieldTooLarge {
        /// The offending field.
        field: Field,
        /// Its size in bytes.
        size: usize,
    },

    /// The allocator could not satisfy a request.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// The allocator refused to take a block back.
    #[error("Failed to reclaim memory: {0}")]
    ReclaimFailed(String),
}

impl MetadataError {
    /// Returns true for errors caused by the allocator.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            MetadataError::OutOfMemory(_) | MetadataError::ReclaimFailed(_)
        )
    }

    /// Returns true for errors caused by invalid input or an incomplete record.
    pub fn is_validation(&self) -> bool {
        !self.is_resource_exhaustion()
    }

    /// Stable numeric status code for callers that report errors across an
    /// FFI or process boundary.
    pub fn status_code(&self) -> u32 {
        match self {
            MetadataError::FieldNotSet(_) => 0x3401,
            MetadataError::BadEncodingLength(_) => 0x3402,
            MetadataError::InvalidBufferSize(_) => 0x3403,
            MetadataError::UnknownSerialVersion(_) => 0x3404,
            MetadataError::ZeroLengthBuffer => 0x3405,
            MetadataError::InvalidUtf8(_) => 0x3406,
            MetadataError::FieldTooLarge { .. } => 0x3407,
            MetadataError::OutOfMemory(_) => 0x3480,
            MetadataError::ReclaimFailed(_) => 0x3481,
        }
    }
}

/// Result type for credmeta operations.
pub type Result<T> = std::result::Result<T, MetadataError>;
