//! # recdb Codec
//!
//! The structured encoding used for every record value and every key of an
//! ordered or hashed database.
//!
//! Any `serde` type can be stored. Values are written as CBOR through
//! `ciborium`; the same value always encodes to the same bytes, which is what
//! gives ordered databases a stable key order.
//!
//! ## Usage
//!
//! ```
//! use recdb_codec::{decode, encode};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Point { x: i32, y: i32 }
//!
//! let bytes = encode(&Point { x: 1, y: 2 }).unwrap();
//! let back: Point = decode(&bytes).unwrap();
//! assert_eq!(back, Point { x: 1, y: 2 });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;

pub use error::{CodecError, CodecResult};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value into a fresh byte buffer.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if the value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a value from `bytes`, which must hold exactly one encoded value.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] for malformed input or a shape
/// mismatch, and [`CodecError::TrailingBytes`] if input is left over.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    let mut reader = bytes;
    let value = ciborium::de::from_reader(&mut reader)
        .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes {
            remaining: reader.len(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq, Default)]
    struct Entry {
        key: Option<String>,
        val: String,
    }

    #[test]
    fn struct_roundtrip() {
        let entry = Entry {
            key: Some("foo".into()),
            val: "bar".into(),
        };
        let bytes = encode(&entry).unwrap();
        assert_eq!(decode::<Entry>(&bytes).unwrap(), entry);
    }

    #[test]
    fn empty_string_encodes_to_nonempty_buffer() {
        let bytes = encode("").unwrap();
        assert_eq!(bytes, vec![0x60]);
        assert_eq!(decode::<String>(&bytes).unwrap(), "");
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = Entry {
            key: None,
            val: "same".into(),
        };
        let b = Entry {
            key: None,
            val: "same".into(),
        };
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
    }

    #[test]
    fn truncated_input_fails() {
        let bytes = encode(&"hello".to_string()).unwrap();
        let err = decode::<String>(&bytes[..3]).unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(&7u32).unwrap();
        bytes.push(0x00);
        assert_eq!(
            decode::<u32>(&bytes).unwrap_err(),
            CodecError::TrailingBytes { remaining: 1 }
        );
    }

    #[test]
    fn shape_mismatch_fails() {
        let bytes = encode(&"text").unwrap();
        assert!(decode::<u64>(&bytes).is_err());
    }

    proptest! {
        #[test]
        fn equal_strings_encode_equal(s in ".*") {
            prop_assert_eq!(encode(&s).unwrap(), encode(&s.clone()).unwrap());
            prop_assert_eq!(decode::<String>(&encode(&s).unwrap()).unwrap(), s);
        }
    }
}
