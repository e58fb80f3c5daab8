//! Flag sets accepted by engine calls.

use bitflags::bitflags;

bitflags! {
    /// Flags for [`EnvHandle::open`](crate::EnvHandle::open).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EnvFlags: u32 {
        /// Create the environment region if it does not exist.
        const CREATE = 0x0000_0001;
        /// Handles may be shared between threads.
        const THREAD = 0x0000_0010;
        /// Initialize the locking subsystem.
        const INIT_LOCK = 0x0000_0100;
        /// Initialize the logging subsystem.
        const INIT_LOG = 0x0000_0200;
        /// Initialize the shared memory pool.
        const INIT_MPOOL = 0x0000_0400;
        /// Initialize the transaction subsystem.
        const INIT_TXN = 0x0000_0800;
        /// Run recovery before the environment is used.
        const RECOVER = 0x0000_1000;
        /// Register the process for failure detection.
        const REGISTER = 0x0000_2000;
        /// Check for failed processes on open.
        const FAILCHK = 0x0000_4000;
        /// Do not flush on commit.
        const TXN_NOSYNC = 0x0001_0000;
        /// Flush but do not sync on commit.
        const TXN_WRITE_NOSYNC = 0x0002_0000;
    }
}

bitflags! {
    /// Flags for [`DbHandle::open`](crate::DbHandle::open).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        /// Create the database if it does not exist.
        const CREATE = 0x0000_0001;
        /// Fail if the database exists (with `CREATE`).
        const EXCL = 0x0000_0004;
        /// Handles may be shared between threads.
        const THREAD = 0x0000_0010;
        /// Open without write access.
        const RDONLY = 0x0000_0400;
        /// Empty the file on open.
        const TRUNCATE = 0x0004_0000;
        /// Wrap non-transactional calls in their own transaction.
        const AUTO_COMMIT = 0x0000_0100;
        /// Allow reads of uncommitted data.
        const READ_UNCOMMITTED = 0x0000_0200;
        /// Keep versions for snapshot transactions.
        const MULTIVERSION = 0x0000_0008;
    }
}

bitflags! {
    /// Flags for [`EnvHandle::txn_begin`](crate::EnvHandle::txn_begin).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TxnFlags: u32 {
        /// Bulk-load hint.
        const BULK = 0x0000_0010;
        /// Fail instead of waiting for a lock.
        const NOWAIT = 0x0000_0020;
        /// Do not flush on commit.
        const NOSYNC = 0x0000_0040;
        /// Flush but do not sync on commit.
        const WRITE_NOSYNC = 0x0000_0080;
        /// Sync on commit regardless of environment flags.
        const SYNC = 0x0000_0100;
        /// Read-committed isolation.
        const READ_COMMITTED = 0x0000_0400;
        /// Read-uncommitted isolation.
        const READ_UNCOMMITTED = 0x0000_0200;
        /// Snapshot isolation.
        const SNAPSHOT = 0x0000_0800;
    }
}

bitflags! {
    /// Flags for [`TxnHandle::commit`](crate::TxnHandle::commit).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommitFlags: u32 {
        /// Do not flush.
        const NOSYNC = 0x0000_0040;
        /// Flush but do not sync.
        const WRITE_NOSYNC = 0x0000_0080;
        /// Sync.
        const SYNC = 0x0000_0100;
    }
}

bitflags! {
    /// Flags for [`DbHandle::put`](crate::DbHandle::put).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PutFlags: u32 {
        /// Assign the next record number and return it in the key.
        const APPEND = 0x0000_0002;
        /// Fail with `KEY_EXISTS` if the key is present.
        const NOOVERWRITE = 0x0000_0014;
    }
}

bitflags! {
    /// Flags for [`DbHandle::get`](crate::DbHandle::get).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GetFlags: u32 {
        /// Remove and return the head of a queue.
        const CONSUME = 0x0000_0004;
        /// As `CONSUME`, waiting until a record is available.
        const CONSUME_WAIT = 0x0000_0005;
    }
}

bitflags! {
    /// Flags for closing environments and databases.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CloseFlags: u32 {
        /// Skip flushing dirty state.
        const NOSYNC = 0x0000_0001;
        /// Sync every open file before closing.
        const FORCESYNC = 0x0000_0002;
    }
}

/// A database organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DbType {
    /// Keys in byte-lexicographic order.
    BTree = 1,
    /// Keys in hash-bucket order.
    Hash = 2,
    /// Keys are 32-bit record numbers.
    Recno = 3,
    /// Record-number keys with consume support.
    Queue = 4,
    /// Take the organization of the existing database.
    Unknown = 5,
}

impl DbType {
    /// Converts a raw organization value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::BTree),
            2 => Some(Self::Hash),
            3 => Some(Self::Recno),
            4 => Some(Self::Queue),
            5 => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Returns the raw organization value.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Returns true for organizations keyed by record number.
    #[must_use]
    pub const fn is_record_number(self) -> bool {
        matches!(self, Self::Recno | Self::Queue)
    }
}

/// A cursor positioning operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorOp {
    /// Return the record under the cursor.
    Current,
    /// Move to the first record.
    First,
    /// Move to the last record.
    Last,
    /// Move to the next record.
    Next,
    /// Move to the previous record.
    Prev,
    /// Move to the record with exactly the given key.
    Set,
    /// Move to the smallest key greater than or equal to the given key.
    SetRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_wait_implies_consume() {
        assert!(GetFlags::CONSUME_WAIT.contains(GetFlags::CONSUME));
        assert!(!GetFlags::CONSUME.contains(GetFlags::CONSUME_WAIT));
    }

    #[test]
    fn db_type_raw_roundtrip() {
        for ty in [DbType::BTree, DbType::Hash, DbType::Recno, DbType::Queue, DbType::Unknown] {
            assert_eq!(DbType::from_raw(ty.as_raw()), Some(ty));
        }
        assert_eq!(DbType::from_raw(0), None);
        assert!(DbType::Queue.is_record_number());
        assert!(!DbType::Hash.is_record_number());
    }
}
