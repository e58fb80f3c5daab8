//! # RecDB Core
//!
//! Typed record storage over the RecDB engine.
//!
//! This crate provides:
//! - The [`Record`] contract: a key slot plus a value-only snapshot
//! - [`Database`] with whole-record put, get and delete
//! - [`Cursor`] with exact and range positioning
//! - [`Environment::with_transaction`] for nested, isolated units of work
//! - Per-organization key marshalling through [`KeyCodec`]
//!
//! ## Usage
//!
//! ```no_run
//! use recdb_core::{Database, DatabaseConfig, DatabaseType, Record};
//! use serde::{Deserialize, Serialize};
//! use std::path::Path;
//!
//! #[derive(Serialize, Deserialize, Default, Clone)]
//! struct Person {
//!     #[serde(default, skip_serializing_if = "Option::is_none")]
//!     name: Option<String>,
//!     born: u16,
//! }
//!
//! impl Record for Person {
//!     type Key = String;
//!
//!     fn record_key(&mut self) -> &mut String {
//!         self.name.get_or_insert_with(String::new)
//!     }
//!
//!     fn record_without_key(&self) -> Self {
//!         Self { name: None, ..self.clone() }
//!     }
//! }
//!
//! let db = Database::open(
//!     None,
//!     None,
//!     Some(Path::new("people.db")),
//!     None,
//!     DatabaseType::OrderedKey,
//!     &DatabaseConfig::new().create(true),
//! )?;
//!
//! let mut ada = Person { name: Some("ada".into()), born: 1815 };
//! db.put(None, false, [&mut ada])?;
//!
//! let mut lookup = Person { name: Some("ada".into()), born: 0 };
//! db.get(None, false, [&mut lookup])?;
//! assert_eq!(lookup.born, 1815);
//! # Ok::<(), recdb_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod cursor;
mod database;
mod environment;
mod error;
mod flags;
mod record;
mod transaction;

pub use codec::{FixedRecordNumberCodec, KeyBuffer, KeyCodec, Keying, StructuredKeyCodec};
pub use config::{
    DatabaseConfig, DatabaseType, EnvironmentConfig, Isolation, TransactionConfig, DEFAULT_MODE,
};
pub use cursor::{Cursor, CursorState};
pub use database::Database;
pub use environment::Environment;
pub use error::{check, Error, Result};
pub use record::{Record, RecordId, RecordKey};
pub use transaction::Transaction;

pub use recdb_engine::{strerror, Errno, StatusKind};
