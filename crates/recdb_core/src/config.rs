//! Environment, database and transaction configuration.

use crate::transaction::Transaction;
use recdb_engine::DbType;

/// Default permission bits for files created by the engine.
pub const DEFAULT_MODE: u32 = 0o660;

/// Configuration for opening an environment.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// Create the environment's region file if it does not exist.
    pub create: bool,

    /// Run recovery before use; torn file tails are truncated.
    pub recover: bool,

    /// Enable the transaction subsystem and the memory pool.
    pub transactional: bool,

    /// Do not sync or flush on commit.
    pub no_sync: bool,

    /// Flush but do not sync on commit.
    pub write_no_sync: bool,

    /// Encrypt every file opened in the environment.
    pub password: Option<String>,

    /// Permission bits for created files.
    pub mode: u32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            create: false,
            recover: false,
            transactional: false,
            no_sync: false,
            write_no_sync: false,
            password: None,
            mode: DEFAULT_MODE,
        }
    }
}

impl EnvironmentConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether a missing environment is created.
    #[must_use]
    pub const fn create(mut self, value: bool) -> Self {
        self.create = value;
        self
    }

    /// Sets whether recovery runs at open.
    #[must_use]
    pub const fn recover(mut self, value: bool) -> Self {
        self.recover = value;
        self
    }

    /// Sets whether transactions are available.
    #[must_use]
    pub const fn transactional(mut self, value: bool) -> Self {
        self.transactional = value;
        self
    }

    /// Sets whether commits skip syncing.
    #[must_use]
    pub const fn no_sync(mut self, value: bool) -> Self {
        self.no_sync = value;
        self
    }

    /// Sets whether commits flush without syncing.
    #[must_use]
    pub const fn write_no_sync(mut self, value: bool) -> Self {
        self.write_no_sync = value;
        self
    }

    /// Sets the encryption password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the creation mode.
    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Create the file and database if missing.
    pub create: bool,

    /// Permission bits for a created file.
    pub mode: u32,

    /// Allow reads of uncommitted data.
    ///
    /// Accepted for compatibility only: readers never see another
    /// transaction's uncommitted writes.
    pub read_uncommitted: bool,

    /// Keep versions for snapshot transactions.
    pub snapshot: bool,

    /// Encrypt the file; overrides the environment password.
    pub password: Option<String>,

    /// Open without write access.
    pub read_only: bool,

    /// Empty the file at open.
    pub truncate: bool,

    /// Fail if the database already exists.
    pub exclusive: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            create: false,
            mode: DEFAULT_MODE,
            read_uncommitted: false,
            snapshot: false,
            password: None,
            read_only: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl DatabaseConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether a missing database is created.
    #[must_use]
    pub const fn create(mut self, value: bool) -> Self {
        self.create = value;
        self
    }

    /// Sets the creation mode.
    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Sets whether uncommitted reads are allowed.
    ///
    /// The flag is recorded but reads stay read-committed.
    #[must_use]
    pub const fn read_uncommitted(mut self, value: bool) -> Self {
        self.read_uncommitted = value;
        self
    }

    /// Sets whether snapshot transactions may read this database.
    #[must_use]
    pub const fn snapshot(mut self, value: bool) -> Self {
        self.snapshot = value;
        self
    }

    /// Sets the encryption password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets read-only access.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets whether the file is emptied at open.
    #[must_use]
    pub const fn truncate(mut self, value: bool) -> Self {
        self.truncate = value;
        self
    }

    /// Sets whether an existing database is an error.
    #[must_use]
    pub const fn exclusive(mut self, value: bool) -> Self {
        self.exclusive = value;
        self
    }
}

/// Configuration for beginning a transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionConfig<'a> {
    /// Nest the new transaction under this one.
    pub parent: Option<&'a Transaction>,

    /// Optimize for bulk insertion.
    pub bulk: bool,

    /// Fail instead of waiting for a lock.
    pub no_wait: bool,

    /// Do not sync or flush on commit.
    pub no_sync: bool,

    /// Flush but do not sync on commit.
    pub write_no_sync: bool,
}

impl<'a> TransactionConfig<'a> {
    /// Creates a configuration for a top-level transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Nests the transaction under `parent`.
    #[must_use]
    pub const fn parent(mut self, parent: &'a Transaction) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets bulk mode.
    #[must_use]
    pub const fn bulk(mut self, value: bool) -> Self {
        self.bulk = value;
        self
    }

    /// Sets whether lock conflicts fail immediately.
    #[must_use]
    pub const fn no_wait(mut self, value: bool) -> Self {
        self.no_wait = value;
        self
    }

    /// Sets whether commit skips syncing.
    #[must_use]
    pub const fn no_sync(mut self, value: bool) -> Self {
        self.no_sync = value;
        self
    }

    /// Sets whether commit flushes without syncing.
    #[must_use]
    pub const fn write_no_sync(mut self, value: bool) -> Self {
        self.write_no_sync = value;
        self
    }
}

/// Concurrency-visibility guarantee of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// Read only committed data.
    #[default]
    ReadCommitted,
    /// Accept reads of uncommitted data.
    ///
    /// Behaves as [`ReadCommitted`](Self::ReadCommitted): readers take no
    /// locks and see only committed data plus their own writes.
    ReadUncommitted,
    /// Read a frozen snapshot; databases must enable
    /// [`DatabaseConfig::snapshot`].
    Snapshot,
}

/// Physical organization of a database, fixed once opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    /// Keys in structured-encoding byte order (B-tree).
    OrderedKey,
    /// Keys in an implementation-defined hash order.
    HashedKey,
    /// Keys are 32-bit record numbers in ascending order.
    FixedRecordNumber,
    /// Record-number keys with destructive consume reads.
    Queue,
    /// Accept whatever organization an existing database has.
    Unknown,
}

impl DatabaseType {
    /// Returns true if keys are 32-bit record numbers.
    #[must_use]
    pub const fn is_record_number(self) -> bool {
        matches!(self, Self::FixedRecordNumber | Self::Queue)
    }
}

impl From<DatabaseType> for DbType {
    fn from(kind: DatabaseType) -> Self {
        match kind {
            DatabaseType::OrderedKey => Self::BTree,
            DatabaseType::HashedKey => Self::Hash,
            DatabaseType::FixedRecordNumber => Self::Recno,
            DatabaseType::Queue => Self::Queue,
            DatabaseType::Unknown => Self::Unknown,
        }
    }
}

impl From<DbType> for DatabaseType {
    fn from(kind: DbType) -> Self {
        match kind {
            DbType::BTree => Self::OrderedKey,
            DbType::Hash => Self::HashedKey,
            DbType::Recno => Self::FixedRecordNumber,
            DbType::Queue => Self::Queue,
            DbType::Unknown => Self::Unknown,
        }
    }
}
