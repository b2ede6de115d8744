//! Versioned binary encoding of [`Metadata`] records.
//!
//! Serial version 1 layout, all integers big-endian:
//!
//! | Offset | Field | Size |
//! |---|---|---|
//! | 0 | serial version (1) | 4 |
//! | 4 | symbolic encoding flag | 1 |
//! | 5 | version | 4 |
//! | 9 | creation date | 8 |
//! | 17 | revocation date | 8 |
//! | 25 | expiration date | 8 |
//! | 33 | password length | 4 |
//! | 37 | generation | 4 |
//! | 41 | legacy flag | 1 |
//! | 42 | hash id size | 4 |
//! | 46 | kdf name size | 4 |
//! | 50 | encoding size | 4 |
//! | 54 | hash id, kdf name, encoding | sizes above |
//!
//! String fields are stored as their UTF-8 bytes with no terminator, so a
//! string's stored size is its byte length; an empty `kdf_name` is stored as
//! a zero size and no bytes. A buffer must be exactly
//! `HEADER_SIZE` plus the three declared sizes long.

use crate::allocator::SharedAllocator;
use crate::error::{Field, MetadataError, Result};
use crate::metadata::Metadata;
use crate::secure_buffer::SecureBuffer;
use log::{debug, trace};

/// The only serial version this codec reads and writes.
pub const SERIAL_VERSION_1: u32 = 0x0000_0001;

/// Size of the fixed part of a version 1 record, serial version included.
pub const HEADER_SIZE: usize = 4 + 1 + 4 + 8 + 8 + 8 + 4 + 4 + 1 + 4 + 4 + 4;

/// Default exclusive upper bound on the stored size of `kdf_name` and `encoding`.
pub const DEFAULT_MAX_NAME_SIZE: usize = 1024;

/// Default inclusive upper bound on the stored size of `hash_id`.
pub const DEFAULT_MAX_HASH_ID_SIZE: usize = u32::MAX as usize;

/// Limits applied to variable-length fields, on both encode and decode.
///
/// # Example
/// ```
/// use credmeta::codec::{Codec, CodecConfig, DEFAULT_MAX_NAME_SIZE};
///
/// let codec = Codec::new(CodecConfig::new().with_max_hash_id_size(64));
/// assert_eq!(codec.config().max_hash_id_size, 64);
/// assert_eq!(codec.config().max_name_size, DEFAULT_MAX_NAME_SIZE);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Names (`kdf_name`, `encoding`) must be strictly shorter than this many bytes.
    pub max_name_size: usize,

    /// `hash_id` may be at most this many bytes.
    pub max_hash_id_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_name_size: DEFAULT_MAX_NAME_SIZE,
            max_hash_id_size: DEFAULT_MAX_HASH_ID_SIZE,
        }
    }
}

impl CodecConfig {
    /// Creates a config with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the exclusive bound on name sizes.
    ///
    /// # Example
    /// ```
    /// use credmeta::codec::CodecConfig;
    ///
    /// let config = CodecConfig::new().with_max_name_size(256);
    /// assert_eq!(config.max_name_size, 256);
    /// ```
    pub fn with_max_name_size(mut self, max_name_size: usize) -> Self {
        self.max_name_size = max_name_size;
        self
    }

    /// Sets the inclusive bound on the hash id size.
    pub fn with_max_hash_id_size(mut self, max_hash_id_size: usize) -> Self {
        self.max_hash_id_size = max_hash_id_size;
        self
    }
}

/// Encoder/decoder for serial version 1.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    /// Creates a codec with the given limits.
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Returns the limits this codec enforces.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Computes the exact serialized size of `meta`.
    ///
    /// # Errors
    ///
    /// * `MetadataError::FieldNotSet` - If `meta` is empty
    /// * `MetadataError::FieldTooLarge` - If a variable-length field exceeds
    ///   the configured limits or the 32-bit size slot
    pub fn serialized_size(&self, meta: &Metadata) -> Result<usize> {
        let fields = self.variable_fields(meta)?;
        Ok(HEADER_SIZE + fields.total())
    }

    /// Serializes a complete record into a new secure buffer from `alloc`.
    ///
    /// # Errors
    ///
    /// * `MetadataError::FieldNotSet` - If `meta` is empty
    /// * `MetadataError::FieldTooLarge` - If a variable-length field exceeds
    ///   the configured limits or the 32-bit size slot
    /// * `MetadataError::OutOfMemory` - If the output buffer cannot be allocated
    pub fn serialize(&self, meta: &Metadata, alloc: &SharedAllocator) -> Result<SecureBuffer> {
        let fields = self.variable_fields(meta)?;
        let total = HEADER_SIZE + fields.total();

        let mut buffer = SecureBuffer::new(alloc, total)?;
        let mut writer = Writer::new(buffer.data_mut());

        writer.put_u32(SERIAL_VERSION_1);
        writer.put_u8(u8::from(meta.symbolic_encoding()?));
        writer.put_u32(meta.version()?);
        writer.put_u64(meta.creation_date()?);
        writer.put_u64(meta.revocation_date()?);
        writer.put_u64(meta.expiration_date()?);
        writer.put_u32(meta.password_length()?);
        writer.put_u32(meta.generation()?);
        writer.put_u8(u8::from(meta.legacy_flag()?));
        writer.put_u32(fields.hash_id_size);
        writer.put_u32(fields.kdf_name_size);
        writer.put_u32(fields.encoding_size);
        writer.put_bytes(fields.hash_id);
        writer.put_bytes(fields.kdf_name);
        writer.put_bytes(fields.encoding);
        debug_assert_eq!(writer.position(), total);

        trace!("Serialized metadata record into {} bytes", total);
        Ok(buffer)
    }

    /// Parses a record from an untrusted secure buffer.
    ///
    /// See [`Codec::deserialize_slice`].
    pub fn deserialize(&self, alloc: &SharedAllocator, buffer: &SecureBuffer) -> Result<Metadata> {
        self.deserialize_slice(alloc, buffer.data())
    }

    /// Parses a record from untrusted bytes.
    ///
    /// Every check is a hard gate: on the first failure the partially built
    /// record is dropped, which wipes and reclaims its buffers, and the error
    /// is returned.
    ///
    /// # Errors
    ///
    /// * `MetadataError::InvalidBufferSize` - If the input is shorter than a
    ///   header, its length differs from what the header declares, the hash
    ///   id size is zero, or a field size is over the configured limit
    /// * `MetadataError::UnknownSerialVersion` - If the serial version is not 1
    /// * `MetadataError::InvalidUtf8` - If a name is not valid UTF-8
    /// * `MetadataError::BadEncodingLength` - If the encoding name is rejected
    /// * `MetadataError::OutOfMemory` - If a field buffer cannot be allocated
    pub fn deserialize_slice(&self, alloc: &SharedAllocator, bytes: &[u8]) -> Result<Metadata> {
        trace!("Deserializing metadata record from {} bytes", bytes.len());

        if bytes.len() < 4 {
            return Err(invalid_size(format!(
                "{} bytes cannot hold a serial version",
                bytes.len()
            )));
        }

        let mut reader = Reader::new(bytes);
        let serial_version = reader.read_u32()?;
        if serial_version != SERIAL_VERSION_1 {
            debug!("Rejecting metadata with serial version {}", serial_version);
            return Err(MetadataError::UnknownSerialVersion(serial_version));
        }

        if bytes.len() < HEADER_SIZE {
            return Err(invalid_size(format!(
                "{} bytes is shorter than the {} byte header",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let mut meta = Metadata::new(alloc);

        let symbolic_flag = reader.read_u8()? != 0;
        meta.set_version(reader.read_u32()?);
        meta.set_creation_date(reader.read_u64()?);
        meta.set_revocation_date(reader.read_u64()?);
        meta.set_expiration_date(reader.read_u64()?);
        meta.set_password_length(reader.read_u32()?);
        meta.set_generation(reader.read_u32()?);
        meta.set_legacy_flag(reader.read_u8()? != 0);

        let hash_id_size = reader.read_u32()?;
        let kdf_name_size = reader.read_u32()?;
        let encoding_size = reader.read_u32()?;

        let declared = u64::from(hash_id_size) + u64::from(kdf_name_size) + u64::from(encoding_size);
        let remaining = reader.remaining() as u64;
        if declared != remaining {
            return Err(invalid_size(format!(
                "header declares {} bytes of fields, {} bytes remain",
                declared, remaining
            )));
        }

        let hash_id_size = hash_id_size as usize;
        if hash_id_size == 0 || hash_id_size > self.config.max_hash_id_size {
            return Err(invalid_size(format!(
                "hash_id size {} outside 1..={}",
                hash_id_size, self.config.max_hash_id_size
            )));
        }
        meta.set_hash_id(reader.take(hash_id_size)?)?;

        let kdf_name = self.read_name(&mut reader, Field::KdfName, kdf_name_size as usize)?;
        meta.set_kdf_name(kdf_name)?;

        let encoding = self.read_name(&mut reader, Field::Encoding, encoding_size as usize)?;
        meta.set_encoding(encoding)?;

        if meta.symbolic_encoding()? != symbolic_flag {
            debug!(
                "Serialized symbolic flag {} disagrees with the encoding name; using the name",
                symbolic_flag
            );
        }

        if let Some(&field) = meta.missing_fields().first() {
            return Err(MetadataError::FieldNotSet(field));
        }

        Ok(meta)
    }

    fn read_name<'a>(&self, reader: &mut Reader<'a>, field: Field, size: usize) -> Result<&'a str> {
        if size >= self.config.max_name_size {
            return Err(invalid_size(format!(
                "{} size {} outside 0..{}",
                field, size, self.config.max_name_size
            )));
        }

        let bytes = reader.take(size)?;
        std::str::from_utf8(bytes).map_err(|_| MetadataError::InvalidUtf8(field))
    }

    fn variable_fields<'m>(&self, meta: &'m Metadata) -> Result<VariableFields<'m>> {
        if let Some(&field) = meta.missing_fields().first() {
            return Err(MetadataError::FieldNotSet(field));
        }

        let hash_id = meta.hash_id()?;
        let kdf_name = meta.kdf_name()?.as_bytes();
        let encoding = meta.encoding()?.as_bytes();

        if hash_id.len() > self.config.max_hash_id_size {
            return Err(too_large(Field::HashId, hash_id.len()));
        }
        if kdf_name.len() >= self.config.max_name_size {
            return Err(too_large(Field::KdfName, kdf_name.len()));
        }
        if encoding.len() >= self.config.max_name_size {
            return Err(too_large(Field::Encoding, encoding.len()));
        }

        Ok(VariableFields {
            hash_id_size: size_slot(Field::HashId, hash_id.len())?,
            kdf_name_size: size_slot(Field::KdfName, kdf_name.len())?,
            encoding_size: size_slot(Field::Encoding, encoding.len())?,
            hash_id,
            kdf_name,
            encoding,
        })
    }
}

struct VariableFields<'m> {
    hash_id: &'m [u8],
    kdf_name: &'m [u8],
    encoding: &'m [u8],
    hash_id_size: u32,
    kdf_name_size: u32,
    encoding_size: u32,
}

impl VariableFields<'_> {
    fn total(&self) -> usize {
        self.hash_id.len() + self.kdf_name.len() + self.encoding.len()
    }
}

fn size_slot(field: Field, size: usize) -> Result<u32> {
    u32::try_from(size).map_err(|_| too_large(field, size))
}

fn too_large(field: Field, size: usize) -> MetadataError {
    MetadataError::FieldTooLarge { field, size }
}

fn invalid_size(reason: String) -> MetadataError {
    debug!("Rejecting metadata buffer: {}", reason);
    MetadataError::InvalidBufferSize(reason)
}

struct Writer<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(out: &'a mut [u8]) -> Self {
        Self { out, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        self.out[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    fn put_u8(&mut self, value: u8) {
        self.put_bytes(&[value]);
    }

    fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_be_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.put_bytes(&value.to_be_bytes());
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.bytes.len() {
            return Err(invalid_size(format!(
                "needed {} bytes, {} remain",
                n,
                self.bytes.len()
            )));
        }
        let (head, tail) = self.bytes.split_at(n);
        self.bytes = tail;
        Ok(head)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }
}
