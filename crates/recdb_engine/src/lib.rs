//! # RecDB Engine
//!
//! Embedded key/value engine behind RecDB.
//!
//! This crate provides:
//! - Environments with a shared lock manager and file registry
//! - Databases in B-tree, hash, record-number and queue organizations
//! - Nested transactions with per-key write locks and snapshot reads
//! - Cursors with exact and range positioning
//! - Frame-log persistence with CRC-32 checks and optional AES-GCM
//!   encryption at rest
//!
//! The API is handle based. Every call returns an [`Errno`] status, and key
//! and data buffers are passed as [`Thang`] values that state who owns the
//! memory.
//!
//! ```no_run
//! use recdb_engine::{DbHandle, DbType, GetFlags, OpenFlags, PutFlags, Thang};
//!
//! let mut db = DbHandle::create(None)?;
//! db.open(None, None, None, DbType::BTree, OpenFlags::CREATE, 0)?;
//! db.put(None, &mut Thang::Borrowed(b"key"), &Thang::Borrowed(b"value"), PutFlags::empty())?;
//!
//! let mut data = Thang::owned();
//! db.get(None, &mut Thang::Borrowed(b"key"), &mut data, GetFlags::empty())?;
//! assert_eq!(data.as_bytes(), b"value");
//! # Ok::<(), recdb_engine::Errno>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crypto;
mod cursor;
mod db;
mod env;
mod errno;
mod file;
mod flags;
mod lock;
mod log;
mod store;
mod thang;
mod txn;

pub use cursor::CursorHandle;
pub use db::DbHandle;
pub use env::{EnvHandle, REGION_FILE};
pub use errno::{check, strerror, Errno, Result, StatusKind};
pub use flags::{
    CloseFlags, CommitFlags, CursorOp, DbType, EnvFlags, GetFlags, OpenFlags, PutFlags, TxnFlags,
};
pub use thang::{Thang, RECNO_SIZE};
pub use txn::TxnHandle;
