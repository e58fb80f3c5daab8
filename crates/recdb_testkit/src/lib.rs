//! # RecDB Testkit
//!
//! Test utilities for RecDB.
//!
//! This crate provides:
//! - Sample records for every key shape
//! - Temporary environments and database helpers
//! - Property-based test generators using proptest
//! - Tracing setup for test output
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recdb_testkit::prelude::*;
//!
//! #[test]
//! fn stores_a_person() {
//!     with_db(DatabaseType::OrderedKey, |db| {
//!         let mut ada = Person::new("ada", 1815);
//!         db.put(None, false, [&mut ada]).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod records;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::records::*;
    pub use recdb_core::DatabaseType;
}

pub use fixtures::*;
pub use generators::*;
pub use records::*;

/// Installs a test-friendly tracing subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
