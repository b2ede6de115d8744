//! The credential metadata record.

use crate::allocator::SharedAllocator;
use crate::codec::Codec;
use crate::encoding::classify_encoding;
use crate::error::{Field, MetadataError, Result};
use crate::secure_buffer::SecureBuffer;
use log::{error, trace};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroize;

/// Metadata describing a stored credential.
///
/// Each of the ten fields starts out unset and is filled in through its
/// setter. Getters fail with `MetadataError::FieldNotSet` until then. The
/// three variable-length fields (`hash_id`, `kdf_name`, `encoding`) live in
/// [`SecureBuffer`]s owned by the record; getters hand out borrows of them.
/// An empty `kdf_name` is a set value that owns no buffer.
///
/// A record is *empty* while at least one field is unset. Only non-empty
/// records can be serialized.
///
/// # Examples
///
/// ```rust
/// use credmeta::{default_allocator, Metadata};
///
/// let alloc = default_allocator();
/// let mut meta = Metadata::new(&alloc);
/// assert!(meta.is_empty());
///
/// meta.set_hash_id(&[0x5e; 32]).unwrap();
/// meta.set_kdf_name("argon2id").unwrap();
/// meta.set_encoding("64").unwrap();
/// meta.set_version(1);
/// meta.set_creation_date(1_700_000_000);
/// meta.set_revocation_date(0);
/// meta.set_expiration_date(1_800_000_000);
/// meta.set_password_length(32);
/// meta.set_generation(1);
/// meta.set_legacy_flag(false);
/// assert!(!meta.is_empty());
///
/// let buffer = meta.to_buffer(&alloc).unwrap();
/// let decoded = Metadata::from_buffer(&alloc, &buffer).unwrap();
/// assert_eq!(decoded.kdf_name().unwrap(), "argon2id");
/// ```
pub struct Metadata {
    alloc: SharedAllocator,
    hash_id: Option<SecureBuffer>,
    // Some(None) is a set, empty name; it owns no buffer.
    kdf_name: Option<Option<SecureBuffer>>,
    encoding: Option<SecureBuffer>,
    symbolic_encoding: bool,
    version: Option<u32>,
    creation_date: Option<u64>,
    revocation_date: Option<u64>,
    expiration_date: Option<u64>,
    password_length: Option<u32>,
    generation: Option<u32>,
    legacy_flag: Option<bool>,
}

impl Metadata {
    /// Creates an empty record whose buffers come from `alloc`.
    pub fn new(alloc: &SharedAllocator) -> Self {
        Self {
            alloc: Arc::clone(alloc),
            hash_id: None,
            kdf_name: None,
            encoding: None,
            symbolic_encoding: false,
            version: None,
            creation_date: None,
            revocation_date: None,
            expiration_date: None,
            password_length: None,
            generation: None,
            legacy_flag: None,
        }
    }

    /// Decodes a record with the default [`Codec`].
    pub fn from_buffer(alloc: &SharedAllocator, buffer: &SecureBuffer) -> Result<Self> {
        Codec::default().deserialize(alloc, buffer)
    }

    /// Encodes this record with the default [`Codec`].
    pub fn to_buffer(&self, alloc: &SharedAllocator) -> Result<SecureBuffer> {
        Codec::default().serialize(self, alloc)
    }

    /// Sets the hash id to a copy of `hash_id`.
    ///
    /// # Errors
    ///
    /// * `MetadataError::ZeroLengthBuffer` - If `hash_id` is empty
    /// * `MetadataError::OutOfMemory` - If the copy cannot be allocated; the
    ///   record is left unchanged
    /// * `MetadataError::ReclaimFailed` - If the previous value could not be
    ///   reclaimed; the new value is installed regardless
    pub fn set_hash_id(&mut self, hash_id: &[u8]) -> Result<()> {
        let buffer = SecureBuffer::from_slice(&self.alloc, hash_id)?;
        trace!("Setting hash_id ({} bytes)", hash_id.len());
        install(&mut self.hash_id, buffer)
    }

    /// Sets the hash id to a copy of the contents of `buffer`.
    ///
    /// The caller keeps ownership of `buffer`.
    pub fn set_hash_id_from_secure_buffer(&mut self, buffer: &SecureBuffer) -> Result<()> {
        self.set_hash_id(buffer.data())
    }

    /// Returns the hash id.
    pub fn hash_id(&self) -> Result<&[u8]> {
        self.hash_id
            .as_ref()
            .map(SecureBuffer::data)
            .ok_or(MetadataError::FieldNotSet(Field::HashId))
    }

    /// Sets the key-derivation function name.
    ///
    /// An empty name is accepted and allocates nothing.
    ///
    /// # Errors
    ///
    /// * `MetadataError::OutOfMemory` - If the copy cannot be allocated; the
    ///   record is left unchanged
    /// * `MetadataError::ReclaimFailed` - If the previous value could not be
    ///   reclaimed; the new value is installed regardless
    pub fn set_kdf_name(&mut self, kdf_name: &str) -> Result<()> {
        let buffer = if kdf_name.is_empty() {
            None
        } else {
            Some(SecureBuffer::from_slice(&self.alloc, kdf_name.as_bytes())?)
        };
        trace!("Setting kdf_name ({} bytes)", kdf_name.len());
        release_slot(&mut self.kdf_name.replace(buffer).flatten())
    }

    /// Returns the key-derivation function name.
    pub fn kdf_name(&self) -> Result<&str> {
        match &self.kdf_name {
            Some(None) => Ok(""),
            Some(stored) => buffer_str(stored, Field::KdfName),
            None => Err(MetadataError::FieldNotSet(Field::KdfName)),
        }
    }

    /// Sets the output encoding name.
    ///
    /// The name is classified first; a rejected name allocates nothing and
    /// leaves the record unchanged.
    ///
    /// # Errors
    ///
    /// * `MetadataError::BadEncodingLength` - If the name is neither symbolic
    ///   nor of an accepted length
    /// * Otherwise the same as [`Metadata::set_hash_id`]
    pub fn set_encoding(&mut self, encoding: &str) -> Result<()> {
        let kind = classify_encoding(encoding)?;
        let buffer = SecureBuffer::from_slice(&self.alloc, encoding.as_bytes())?;
        trace!("Setting encoding ({:?})", kind);
        self.symbolic_encoding = kind.is_symbolic();
        install(&mut self.encoding, buffer)
    }

    /// Returns the output encoding name.
    pub fn encoding(&self) -> Result<&str> {
        buffer_str(&self.encoding, Field::Encoding)
    }

    /// Returns whether the encoding is symbolic. Requires the encoding to be set.
    pub fn symbolic_encoding(&self) -> Result<bool> {
        match self.encoding {
            Some(_) => Ok(self.symbolic_encoding),
            None => Err(MetadataError::FieldNotSet(Field::Encoding)),
        }
    }

    /// Sets the record version.
    pub fn set_version(&mut self, version: u32) {
        self.version = Some(version);
    }

    /// Returns the record version.
    pub fn version(&self) -> Result<u32> {
        self.version.ok_or(MetadataError::FieldNotSet(Field::Version))
    }

    /// Sets the creation timestamp.
    pub fn set_creation_date(&mut self, creation_date: u64) {
        self.creation_date = Some(creation_date);
    }

    /// Returns the creation timestamp.
    pub fn creation_date(&self) -> Result<u64> {
        self.creation_date
            .ok_or(MetadataError::FieldNotSet(Field::CreationDate))
    }

    /// Sets the revocation timestamp.
    pub fn set_revocation_date(&mut self, revocation_date: u64) {
        self.revocation_date = Some(revocation_date);
    }

    /// Returns the revocation timestamp.
    pub fn revocation_date(&self) -> Result<u64> {
        self.revocation_date
            .ok_or(MetadataError::FieldNotSet(Field::RevocationDate))
    }

    /// Sets the expiration timestamp.
    pub fn set_expiration_date(&mut self, expiration_date: u64) {
        self.expiration_date = Some(expiration_date);
    }

    /// Returns the expiration timestamp.
    pub fn expiration_date(&self) -> Result<u64> {
        self.expiration_date
            .ok_or(MetadataError::FieldNotSet(Field::ExpirationDate))
    }

    /// Sets the password length.
    pub fn set_password_length(&mut self, password_length: u32) {
        self.password_length = Some(password_length);
    }

    /// Returns the password length.
    pub fn password_length(&self) -> Result<u32> {
        self.password_length
            .ok_or(MetadataError::FieldNotSet(Field::PasswordLength))
    }

    /// Sets the generation counter.
    pub fn set_generation(&mut self, generation: u32) {
        self.generation = Some(generation);
    }

    /// Returns the generation counter.
    pub fn generation(&self) -> Result<u32> {
        self.generation
            .ok_or(MetadataError::FieldNotSet(Field::Generation))
    }

    /// Sets the legacy flag.
    pub fn set_legacy_flag(&mut self, legacy_flag: bool) {
        self.legacy_flag = Some(legacy_flag);
    }

    /// Returns the legacy flag.
    pub fn legacy_flag(&self) -> Result<bool> {
        self.legacy_flag
            .ok_or(MetadataError::FieldNotSet(Field::LegacyFlag))
    }

    /// Returns true if `field` has been set.
    pub fn is_set(&self, field: Field) -> bool {
        match field {
            Field::HashId => self.hash_id.is_some(),
            Field::KdfName => self.kdf_name.is_some(),
            Field::Encoding => self.encoding.is_some(),
            Field::Version => self.version.is_some(),
            Field::CreationDate => self.creation_date.is_some(),
            Field::RevocationDate => self.revocation_date.is_some(),
            Field::ExpirationDate => self.expiration_date.is_some(),
            Field::PasswordLength => self.password_length.is_some(),
            Field::Generation => self.generation.is_some(),
            Field::LegacyFlag => self.legacy_flag.is_some(),
        }
    }

    /// Returns true while at least one field is unset.
    pub fn is_empty(&self) -> bool {
        Field::ALL.iter().any(|&field| !self.is_set(field))
    }

    /// Lists the unset fields in wire header order.
    pub fn missing_fields(&self) -> Vec<Field> {
        Field::ALL
            .iter()
            .copied()
            .filter(|&field| !self.is_set(field))
            .collect()
    }

    /// Creates an independent copy of this record, duplicating its buffers.
    pub fn try_clone(&self) -> Result<Self> {
        let mut copy = Self::new(&self.alloc);
        copy.hash_id = self.hash_id.as_ref().map(SecureBuffer::try_clone).transpose()?;
        copy.kdf_name = self
            .kdf_name
            .as_ref()
            .map(|stored| stored.as_ref().map(SecureBuffer::try_clone).transpose())
            .transpose()?;
        copy.encoding = self.encoding.as_ref().map(SecureBuffer::try_clone).transpose()?;
        copy.symbolic_encoding = self.symbolic_encoding;
        copy.version = self.version;
        copy.creation_date = self.creation_date;
        copy.revocation_date = self.revocation_date;
        copy.expiration_date = self.expiration_date;
        copy.password_length = self.password_length;
        copy.generation = self.generation;
        copy.legacy_flag = self.legacy_flag;
        Ok(copy)
    }

    /// Releases the three owned buffers and wipes the scalar fields.
    ///
    /// All three buffers are released even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// The first failure among the `hash_id`, `kdf_name` and `encoding`
    /// releases, in that order.
    pub fn release(mut self) -> Result<()> {
        self.release_fields()
    }

    fn release_fields(&mut self) -> Result<()> {
        let hash_id = release_slot(&mut self.hash_id);
        let kdf_name = release_slot(&mut self.kdf_name.take().flatten());
        let encoding = release_slot(&mut self.encoding);

        self.symbolic_encoding.zeroize();
        self.version.zeroize();
        self.creation_date.zeroize();
        self.revocation_date.zeroize();
        self.expiration_date.zeroize();
        self.password_length.zeroize();
        self.generation.zeroize();
        self.legacy_flag.zeroize();

        hash_id.and(kdf_name).and(encoding)
    }
}

// Installs `buffer`, then releases whatever it replaced.
fn install(slot: &mut Option<SecureBuffer>, buffer: SecureBuffer) -> Result<()> {
    match slot.replace(buffer) {
        Some(previous) => previous.release(),
        None => Ok(()),
    }
}

fn release_slot(slot: &mut Option<SecureBuffer>) -> Result<()> {
    match slot.take() {
        Some(buffer) => buffer.release(),
        None => Ok(()),
    }
}

fn buffer_str(slot: &Option<SecureBuffer>, field: Field) -> Result<&str> {
    let buffer = slot.as_ref().ok_or(MetadataError::FieldNotSet(field))?;
    std::str::from_utf8(buffer.data()).map_err(|_| MetadataError::InvalidUtf8(field))
}

impl Drop for Metadata {
    fn drop(&mut self) {
        if let Err(e) = self.release_fields() {
            error!("Failed to release Metadata buffers on drop: {}", e);
        }
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("hash_id", &self.hash_id)
            .field("kdf_name", &self.kdf_name().ok())
            .field("encoding", &self.encoding().ok())
            .field("symbolic_encoding", &self.symbolic_encoding().ok())
            .field("version", &self.version)
            .field("creation_date", &self.creation_date)
            .field("revocation_date", &self.revocation_date)
            .field("expiration_date", &self.expiration_date)
            .field("password_length", &self.password_length)
            .field("generation", &self.generation)
            .field("legacy_flag", &self.legacy_flag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SystemAllocator;
    use crate::test_utils::InstrumentedAllocator;

    fn populate(meta: &mut Metadata) {
        meta.set_hash_id(&[0x11; 32]).unwrap();
        meta.set_kdf_name("argon2id").unwrap();
        meta.set_encoding("64").unwrap();
        meta.set_version(1);
        meta.set_creation_date(1_700_000_000);
        meta.set_revocation_date(0);
        meta.set_expiration_date(1_800_000_000);
        meta.set_password_length(32);
        meta.set_generation(1);
        meta.set_legacy_flag(false);
    }

    #[test]
    fn test_new_record_is_empty() {
        let meta = Metadata::new(&SystemAllocator::shared());
        assert!(meta.is_empty());
        assert_eq!(meta.missing_fields(), Field::ALL.to_vec());
    }

    #[test]
    fn test_unset_getters_fail() {
        let meta = Metadata::new(&SystemAllocator::shared());
        assert_eq!(meta.hash_id(), Err(MetadataError::FieldNotSet(Field::HashId)));
        assert_eq!(meta.kdf_name(), Err(MetadataError::FieldNotSet(Field::KdfName)));
        assert_eq!(meta.encoding(), Err(MetadataError::FieldNotSet(Field::Encoding)));
        assert_eq!(
            meta.symbolic_encoding(),
            Err(MetadataError::FieldNotSet(Field::Encoding))
        );
        assert_eq!(meta.version(), Err(MetadataError::FieldNotSet(Field::Version)));
        assert_eq!(
            meta.creation_date(),
            Err(MetadataError::FieldNotSet(Field::CreationDate))
        );
        assert_eq!(
            meta.revocation_date(),
            Err(MetadataError::FieldNotSet(Field::RevocationDate))
        );
        assert_eq!(
            meta.expiration_date(),
            Err(MetadataError::FieldNotSet(Field::ExpirationDate))
        );
        assert_eq!(
            meta.password_length(),
            Err(MetadataError::FieldNotSet(Field::PasswordLength))
        );
        assert_eq!(
            meta.generation(),
            Err(MetadataError::FieldNotSet(Field::Generation))
        );
        assert_eq!(
            meta.legacy_flag(),
            Err(MetadataError::FieldNotSet(Field::LegacyFlag))
        );
    }

    #[test]
    fn test_fully_populated_record_is_not_empty() {
        let mut meta = Metadata::new(&SystemAllocator::shared());
        populate(&mut meta);
        assert!(!meta.is_empty());
        assert!(meta.missing_fields().is_empty());
        assert_eq!(meta.hash_id().unwrap(), &[0x11; 32]);
        assert_eq!(meta.kdf_name().unwrap(), "argon2id");
        assert_eq!(meta.encoding().unwrap(), "64");
        assert!(!meta.symbolic_encoding().unwrap());
        assert_eq!(meta.expiration_date().unwrap(), 1_800_000_000);
    }

    #[test]
    fn test_emptiness_tracks_each_field() {
        let alloc = SystemAllocator::shared();
        let mut meta = Metadata::new(&alloc);
        let steps: Vec<Box<dyn Fn(&mut Metadata)>> = vec![
            Box::new(|m: &mut Metadata| m.set_legacy_flag(true)),
            Box::new(|m: &mut Metadata| m.set_encoding("SYMBOLIC-words").unwrap()),
            Box::new(|m: &mut Metadata| m.set_generation(7)),
            Box::new(|m: &mut Metadata| m.set_hash_id(b"id").unwrap()),
            Box::new(|m: &mut Metadata| m.set_expiration_date(3)),
            Box::new(|m: &mut Metadata| m.set_kdf_name("scrypt").unwrap()),
            Box::new(|m: &mut Metadata| m.set_revocation_date(2)),
            Box::new(|m: &mut Metadata| m.set_password_length(20)),
            Box::new(|m: &mut Metadata| m.set_creation_date(1)),
            Box::new(|m: &mut Metadata| m.set_version(9)),
        ];

        for (i, step) in steps.iter().enumerate() {
            assert!(meta.is_empty());
            step(&mut meta);
            assert_eq!(meta.missing_fields().len(), steps.len() - i - 1);
        }
        assert!(!meta.is_empty());
    }

    #[test]
    fn test_replacing_buffer_field_releases_previous() {
        let instrumented = InstrumentedAllocator::new();
        let alloc = instrumented.shared();
        let mut meta = Metadata::new(&alloc);

        meta.set_kdf_name("pbkdf2").unwrap();
        meta.set_kdf_name("argon2id").unwrap();
        assert_eq!(meta.kdf_name().unwrap(), "argon2id");
        assert_eq!(instrumented.live_blocks(), 1);
        assert_eq!(instrumented.reclaimed_sizes(), vec![6]);
        assert!(instrumented.all_reclaimed_zeroed());

        meta.set_encoding("16").unwrap();
        meta.set_encoding("SYMBOLIC-emoji").unwrap();
        assert!(meta.symbolic_encoding().unwrap());
        assert_eq!(instrumented.live_blocks(), 2);
    }

    #[test]
    fn test_bad_encoding_leaves_record_unchanged() {
        let instrumented = InstrumentedAllocator::new();
        let alloc = instrumented.shared();
        let mut meta = Metadata::new(&alloc);

        meta.set_encoding("SYMBOLIC-words").unwrap();
        let allocations = instrumented.allocations();

        assert_eq!(
            meta.set_encoding("base64"),
            Err(MetadataError::BadEncodingLength(6))
        );
        assert_eq!(instrumented.allocations(), allocations);
        assert_eq!(meta.encoding().unwrap(), "SYMBOLIC-words");
        assert!(meta.symbolic_encoding().unwrap());
    }

    #[test]
    fn test_out_of_memory_leaves_record_unchanged() {
        let instrumented = InstrumentedAllocator::new();
        let alloc = instrumented.shared();
        let mut meta = Metadata::new(&alloc);

        meta.set_hash_id(b"first").unwrap();
        meta.set_encoding("16").unwrap();
        instrumented.fail_allocation_after(0);

        assert!(matches!(
            meta.set_hash_id(b"second"),
            Err(MetadataError::OutOfMemory(_))
        ));
        assert!(matches!(
            meta.set_encoding("SYMBOLIC-x"),
            Err(MetadataError::OutOfMemory(_))
        ));
        assert!(matches!(
            meta.set_kdf_name("scrypt"),
            Err(MetadataError::OutOfMemory(_))
        ));

        assert_eq!(meta.hash_id().unwrap(), b"first");
        assert_eq!(meta.encoding().unwrap(), "16");
        assert!(!meta.symbolic_encoding().unwrap());
        assert!(!meta.is_set(Field::KdfName));
    }

    #[test]
    fn test_hash_id_from_secure_buffer_copies() {
        let alloc = SystemAllocator::shared();
        let mut source = SecureBuffer::from_slice(&alloc, &[1, 2, 3, 4]).unwrap();
        let mut meta = Metadata::new(&alloc);

        meta.set_hash_id_from_secure_buffer(&source).unwrap();
        source.data_mut()[0] = 9;

        assert_eq!(meta.hash_id().unwrap(), &[1, 2, 3, 4]);
        source.release().unwrap();
        assert_eq!(meta.hash_id().unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_kdf_name_is_set_without_allocation() {
        let instrumented = InstrumentedAllocator::new();
        let alloc = instrumented.shared();
        let mut meta = Metadata::new(&alloc);

        meta.set_kdf_name("").unwrap();
        assert!(meta.is_set(Field::KdfName));
        assert_eq!(meta.kdf_name().unwrap(), "");
        assert_eq!(instrumented.allocations(), 0);

        meta.set_kdf_name("scrypt").unwrap();
        assert_eq!(meta.kdf_name().unwrap(), "scrypt");
        meta.set_kdf_name("").unwrap();
        assert_eq!(meta.kdf_name().unwrap(), "");
        assert_eq!(instrumented.live_blocks(), 0);
        assert!(instrumented.all_reclaimed_zeroed());

        let copy = meta.try_clone().unwrap();
        assert_eq!(copy.kdf_name().unwrap(), "");
        copy.release().unwrap();
        meta.release().unwrap();
    }

    #[test]
    fn test_empty_hash_id_is_rejected() {
        let mut meta = Metadata::new(&SystemAllocator::shared());
        assert_eq!(meta.set_hash_id(&[]), Err(MetadataError::ZeroLengthBuffer));
        assert!(!meta.is_set(Field::HashId));
    }

    #[test]
    fn test_release_wipes_all_buffers() {
        let instrumented = InstrumentedAllocator::new();
        let alloc = instrumented.shared();
        let mut meta = Metadata::new(&alloc);
        populate(&mut meta);
        assert_eq!(instrumented.live_blocks(), 3);

        meta.release().unwrap();
        assert_eq!(instrumented.live_blocks(), 0);
        assert_eq!(instrumented.reclaimed_sizes(), vec![32, 8, 2]);
        assert!(instrumented.all_reclaimed_zeroed());
    }

    #[test]
    fn test_release_continues_after_failure() {
        let instrumented = InstrumentedAllocator::new();
        let alloc = instrumented.shared();
        let mut meta = Metadata::new(&alloc);
        populate(&mut meta);

        instrumented.fail_reclaim_after(0);
        let result = meta.release();

        assert!(matches!(result, Err(MetadataError::ReclaimFailed(_))));
        // All three buffers were still offered back, wiped.
        assert_eq!(instrumented.reclaim_records().len(), 3);
        assert!(instrumented.all_reclaimed_zeroed());
    }

    #[test]
    fn test_drop_releases_buffers() {
        let instrumented = InstrumentedAllocator::new();
        let alloc = instrumented.shared();
        {
            let mut meta = Metadata::new(&alloc);
            populate(&mut meta);
        }
        assert_eq!(instrumented.live_blocks(), 0);
        assert!(instrumented.all_reclaimed_zeroed());
    }

    #[test]
    fn test_try_clone_is_independent() {
        let alloc = SystemAllocator::shared();
        let mut meta = Metadata::new(&alloc);
        populate(&mut meta);

        let mut copy = meta.try_clone().unwrap();
        copy.set_kdf_name("scrypt").unwrap();
        copy.set_generation(2);

        assert_eq!(meta.kdf_name().unwrap(), "argon2id");
        assert_eq!(meta.generation().unwrap(), 1);
        assert_eq!(copy.hash_id().unwrap(), meta.hash_id().unwrap());
    }

    #[test]
    fn test_debug_redacts_hash_id() {
        let mut meta = Metadata::new(&SystemAllocator::shared());
        meta.set_hash_id(b"very-secret-hash").unwrap();
        let printed = format!("{:?}", meta);
        assert!(printed.contains("SecureBuffer(len=16, [REDACTED])"));
        assert!(!printed.contains("very-secret-hash"));
    }
}
