//! The contract every storable record fulfils.
//!
//! A record is split in two before it reaches the engine: its key, taken
//! from the key slot, and a value-only copy of the record with the key
//! cleared. Reading reverses the split: the value is decoded into a fresh
//! record and the caller's key is moved back into it.
//!
//! ```
//! use recdb_core::{Record, RecordKey};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Default, Clone)]
//! struct Sku(String);
//!
//! impl RecordKey for Sku {}
//!
//! #[derive(Serialize, Deserialize, Default, Clone)]
//! struct Item {
//!     #[serde(default, skip_serializing_if = "Option::is_none")]
//!     sku: Option<Sku>,
//!     stock: u32,
//! }
//!
//! impl Record for Item {
//!     type Key = Sku;
//!
//!     fn record_key(&mut self) -> &mut Sku {
//!         self.sku.get_or_insert_with(Sku::default)
//!     }
//!
//!     fn record_without_key(&self) -> Self {
//!         Self { sku: None, ..self.clone() }
//!     }
//! }
//! ```

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A key that can sit in a record's key slot.
///
/// Ordered and hashed databases store any key in its structured encoding.
/// Record-number databases need a key that exposes a 32-bit slot.
pub trait RecordKey: Serialize + DeserializeOwned + Default {
    /// The 32-bit record number behind this key, if it is one.
    fn record_number(&mut self) -> Option<&mut u32> {
        None
    }
}

impl RecordKey for u32 {
    fn record_number(&mut self) -> Option<&mut u32> {
        Some(self)
    }
}

impl RecordKey for String {}

impl RecordKey for Vec<u8> {}

/// A 32-bit record number.
///
/// As a key of a record-number database it is stored as four native-endian
/// bytes. Anywhere else, including inside a record value or as a key of an
/// ordered or hashed database, it goes through the structured encoding as a
/// plain unsigned integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u32);

impl RecordId {
    /// Returns the raw record number.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for RecordId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl RecordKey for RecordId {
    fn record_number(&mut self) -> Option<&mut u32> {
        Some(&mut self.0)
    }
}

/// A value that can be stored in a database.
pub trait Record: Serialize + DeserializeOwned {
    /// The key type of the record.
    type Key: RecordKey;

    /// Returns the key slot, filling it with a default key if empty.
    fn record_key(&mut self) -> &mut Self::Key;

    /// Returns a copy of the record with the key cleared.
    fn record_without_key(&self) -> Self;
}

/// Encodes the value-only part of a record.
pub(crate) fn marshal_value<R: Record>(record: &R) -> Result<Vec<u8>> {
    Ok(recdb_codec::encode(&record.record_without_key())?)
}

/// Replaces `record` with the value decoded from `bytes`, keeping its key.
pub(crate) fn unmarshal_value<R: Record>(record: &mut R, bytes: &[u8]) -> Result<()> {
    let mut fresh: R = recdb_codec::decode(bytes)?;
    std::mem::swap(fresh.record_key(), record.record_key());
    *record = fresh;
    Ok(())
}
