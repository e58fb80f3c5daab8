//! # recdb Storage
//!
//! Byte-store backends underneath recdb database files.
//!
//! Backends are **opaque byte stores**: the engine frames, checksums and
//! optionally encrypts everything it writes, and a backend only has to read,
//! append, flush, sync and truncate bytes.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - Backing store for databases opened without a file
//! - [`FileBackend`] - Persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use recdb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, FileOptions};
pub use memory::InMemoryBackend;
