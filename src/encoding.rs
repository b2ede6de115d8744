//! Classification of output encoding names.
//!
//! An encoding name is either symbolic (`SYMBOLIC-` prefix) or names an
//! alphabet by its size. Only the length of a non-symbolic name is checked:
//! any 16-character string passes as a base-16 alphabet whatever its
//! characters are. The serialized format depends on this exact accept/reject
//! boundary, so it must not be tightened here.

use crate::error::{MetadataError, Result};

/// Prefix marking a symbolic encoding name.
pub const SYMBOLIC_PREFIX: &str = "SYMBOLIC-";

/// Alphabet sizes accepted for non-symbolic encodings: binary, base-4,
/// octal, hex, base-32, base-64 and base-128.
pub const ACCEPTED_ENCODING_LENGTHS: [usize; 7] = [2, 4, 8, 16, 32, 64, 128];

/// Result of classifying an encoding name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingKind {
    /// The name starts with [`SYMBOLIC_PREFIX`].
    Symbolic,
    /// The name's length is one of [`ACCEPTED_ENCODING_LENGTHS`].
    Alphabet(usize),
}

impl EncodingKind {
    /// Returns true for symbolic encodings.
    pub fn is_symbolic(self) -> bool {
        matches!(self, EncodingKind::Symbolic)
    }
}

/// Classifies an encoding name.
///
/// # Errors
///
/// * `MetadataError::BadEncodingLength` - If the name is not symbolic and its
///   byte length is not an accepted alphabet size
///
/// # Examples
///
/// ```rust
/// use credmeta::encoding::{classify_encoding, EncodingKind};
///
/// assert_eq!(classify_encoding("64").unwrap(), EncodingKind::Alphabet(2));
/// assert_eq!(classify_encoding("SYMBOLIC-words").unwrap(), EncodingKind::Symbolic);
/// assert!(classify_encoding("abc").is_err());
/// ```
pub fn classify_encoding(encoding: &str) -> Result<EncodingKind> {
    if encoding.starts_with(SYMBOLIC_PREFIX) {
        return Ok(EncodingKind::Symbolic);
    }

    let len = encoding.len();
    if ACCEPTED_ENCODING_LENGTHS.contains(&len) {
        Ok(EncodingKind::Alphabet(len))
    } else {
        Err(MetadataError::BadEncodingLength(len))
    }
}
