//! Key marshalling strategies, chosen once per open database.
//!
//! Record-number organizations keep their keys as the raw native-endian
//! bytes of a `u32` and never pass them through the structured encoder.
//! Every other organization stores the structured encoding of the key.

use crate::config::DatabaseType;
use crate::error::Result;
use crate::record::RecordKey;
use recdb_engine::{Errno, GetFlags, PutFlags, Thang, RECNO_SIZE};

const KEY_TYPE_MISMATCH: &str = "key size does not match record number data type";

/// A marshalled key, ready to hand to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyBuffer {
    /// Structured encoding of a key.
    Encoded(Vec<u8>),
    /// Native-endian record number.
    Number([u8; RECNO_SIZE]),
}

impl KeyBuffer {
    /// A read-only view for lookups and plain writes.
    #[must_use]
    pub fn as_input(&self) -> Thang<'_> {
        match self {
            Self::Encoded(bytes) => Thang::Borrowed(bytes),
            Self::Number(bytes) => Thang::Borrowed(bytes),
        }
    }

    /// A buffer the engine may overwrite, seeded with this key.
    #[must_use]
    pub fn into_output(self) -> Thang<'static> {
        match self {
            Self::Encoded(bytes) => Thang::Owned(bytes),
            Self::Number(bytes) => Thang::Fixed(bytes),
        }
    }
}

/// How keys of one organization cross the engine boundary.
pub trait KeyCodec {
    /// Marshals the key in `key`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the key cannot be encoded.
    fn encode_key<K: RecordKey>(&self, key: &mut K) -> Result<KeyBuffer>;

    /// Writes a key returned by the engine back into `key`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the bytes do not decode.
    fn decode_key<K: RecordKey>(&self, bytes: &[u8], key: &mut K) -> Result<()>;

    /// An empty buffer for the engine to return a key in.
    fn output_key(&self) -> Thang<'static>;

    /// True if `append` makes the engine assign the key.
    fn assigns_keys(&self) -> bool;

    /// Engine flags for a put.
    fn put_flags(&self, append: bool) -> PutFlags;

    /// Engine flags for a get.
    fn get_flags(&self, consume: bool) -> GetFlags {
        if consume {
            GetFlags::CONSUME_WAIT
        } else {
            GetFlags::empty()
        }
    }
}

/// Keys in the structured encoding, for ordered and hashed databases.
///
/// An appending put inserts without overwriting.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredKeyCodec;

impl KeyCodec for StructuredKeyCodec {
    fn encode_key<K: RecordKey>(&self, key: &mut K) -> Result<KeyBuffer> {
        Ok(KeyBuffer::Encoded(recdb_codec::encode(key)?))
    }

    fn decode_key<K: RecordKey>(&self, bytes: &[u8], key: &mut K) -> Result<()> {
        *key = recdb_codec::decode(bytes)?;
        Ok(())
    }

    fn output_key(&self) -> Thang<'static> {
        Thang::owned()
    }

    fn assigns_keys(&self) -> bool {
        false
    }

    fn put_flags(&self, append: bool) -> PutFlags {
        if append {
            PutFlags::NOOVERWRITE
        } else {
            PutFlags::empty()
        }
    }
}

/// Raw 32-bit record numbers, for record-number and queue databases.
///
/// # Panics
///
/// Every method that touches a key panics if the key type has no record
/// number slot; storing such a record here is a programming error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRecordNumberCodec;

impl FixedRecordNumberCodec {
    fn slot<K: RecordKey>(key: &mut K) -> &mut u32 {
        match key.record_number() {
            Some(slot) => slot,
            None => panic!("{KEY_TYPE_MISMATCH}"),
        }
    }
}

impl KeyCodec for FixedRecordNumberCodec {
    fn encode_key<K: RecordKey>(&self, key: &mut K) -> Result<KeyBuffer> {
        Ok(KeyBuffer::Number(Self::slot(key).to_ne_bytes()))
    }

    fn decode_key<K: RecordKey>(&self, bytes: &[u8], key: &mut K) -> Result<()> {
        let slot = Self::slot(key);
        let raw: [u8; RECNO_SIZE] = bytes.try_into().map_err(|_| Errno::INVALID)?;
        *slot = u32::from_ne_bytes(raw);
        Ok(())
    }

    fn output_key(&self) -> Thang<'static> {
        Thang::fixed()
    }

    fn assigns_keys(&self) -> bool {
        true
    }

    fn put_flags(&self, append: bool) -> PutFlags {
        if append {
            PutFlags::APPEND
        } else {
            PutFlags::empty()
        }
    }
}

/// The codec an open database uses.
#[derive(Debug, Clone, Copy)]
pub enum Keying {
    /// Ordered and hashed databases.
    Structured(StructuredKeyCodec),
    /// Record-number and queue databases.
    FixedRecordNumber(FixedRecordNumberCodec),
}

impl Keying {
    /// Picks the codec for an organization.
    #[must_use]
    pub const fn for_type(kind: DatabaseType) -> Self {
        if kind.is_record_number() {
            Self::FixedRecordNumber(FixedRecordNumberCodec)
        } else {
            Self::Structured(StructuredKeyCodec)
        }
    }
}

impl KeyCodec for Keying {
    fn encode_key<K: RecordKey>(&self, key: &mut K) -> Result<KeyBuffer> {
        match self {
            Self::Structured(codec) => codec.encode_key(key),
            Self::FixedRecordNumber(codec) => codec.encode_key(key),
        }
    }

    fn decode_key<K: RecordKey>(&self, bytes: &[u8], key: &mut K) -> Result<()> {
        match self {
            Self::Structured(codec) => codec.decode_key(bytes, key),
            Self::FixedRecordNumber(codec) => codec.decode_key(bytes, key),
        }
    }

    fn output_key(&self) -> Thang<'static> {
        match self {
            Self::Structured(codec) => codec.output_key(),
            Self::FixedRecordNumber(codec) => codec.output_key(),
        }
    }

    fn assigns_keys(&self) -> bool {
        match self {
            Self::Structured(codec) => codec.assigns_keys(),
            Self::FixedRecordNumber(codec) => codec.assigns_keys(),
        }
    }

    fn put_flags(&self, append: bool) -> PutFlags {
        match self {
            Self::Structured(codec) => codec.put_flags(append),
            Self::FixedRecordNumber(codec) => codec.put_flags(append),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;

    #[test]
    fn structured_keys_use_the_record_encoding() {
        let mut key = String::from("car");
        let buffer = StructuredKeyCodec.encode_key(&mut key).unwrap();
        assert_eq!(buffer, KeyBuffer::Encoded(recdb_codec::encode("car").unwrap()));

        let mut back = String::new();
        StructuredKeyCodec
            .decode_key(buffer.as_input().as_bytes(), &mut back)
            .unwrap();
        assert_eq!(back, "car");
    }

    #[test]
    fn empty_key_still_has_bytes() {
        let buffer = StructuredKeyCodec.encode_key(&mut String::new()).unwrap();
        assert!(!buffer.as_input().is_empty());
    }

    #[test]
    fn record_numbers_are_raw_native_bytes() {
        let mut key = RecordId(0x0102_0304);
        let buffer = FixedRecordNumberCodec.encode_key(&mut key).unwrap();
        assert_eq!(buffer, KeyBuffer::Number(0x0102_0304u32.to_ne_bytes()));

        let mut output = buffer.into_output();
        assert!(output.is_writable());
        assert_eq!(output.len(), RECNO_SIZE);
        output = Thang::Fixed(9u32.to_ne_bytes());
        FixedRecordNumberCodec
            .decode_key(output.as_bytes(), &mut key)
            .unwrap();
        assert_eq!(key, RecordId(9));
    }

    #[test]
    fn wrong_length_record_number_is_invalid() {
        let err = FixedRecordNumberCodec
            .decode_key(&[1, 2], &mut 0u32)
            .unwrap_err();
        assert_eq!(err.status(), Some(Errno::INVALID));
    }

    #[test]
    #[should_panic(expected = "key size does not match record number data type")]
    fn structured_key_in_record_number_database_panics() {
        let _ = FixedRecordNumberCodec.encode_key(&mut String::from("nope"));
    }

    #[test]
    fn flags_follow_the_organization() {
        let ordered = Keying::for_type(DatabaseType::OrderedKey);
        assert_eq!(ordered.put_flags(true), PutFlags::NOOVERWRITE);
        assert!(!ordered.assigns_keys());

        let queue = Keying::for_type(DatabaseType::Queue);
        assert_eq!(queue.put_flags(true), PutFlags::APPEND);
        assert_eq!(queue.put_flags(false), PutFlags::empty());
        assert_eq!(queue.get_flags(true), GetFlags::CONSUME_WAIT);
        assert!(queue.output_key().is_writable());
    }
}
