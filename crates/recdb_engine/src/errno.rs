//! Status codes returned by every engine call.
//!
//! Positive values are operating-system `errno` codes, negative values are
//! engine conditions. The numbering follows Berkeley DB so codes read the
//! same in logs from either side.

use recdb_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Errno>;

/// A non-zero engine or OS status code.
///
/// OS conditions are stored under the fixed codes below rather than the
/// host's raw `errno`, so classification does not depend on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("{}", self.message())]
pub struct Errno(i32);

impl Errno {
    /// Operation not permitted.
    pub const PERMISSION: Self = Self(1);
    /// No such file or directory.
    pub const NO_ENTRY: Self = Self(2);
    /// Input/output error.
    pub const IO: Self = Self(5);
    /// Resource temporarily unavailable.
    pub const AGAIN: Self = Self(11);
    /// Permission denied.
    pub const ACCESS: Self = Self(13);
    /// File exists.
    pub const EXISTS: Self = Self(17);
    /// Invalid argument.
    pub const INVALID: Self = Self(22);
    /// No space left on device.
    pub const NO_SPACE: Self = Self(28);

    /// User memory too small for return value.
    pub const BUFFER_TOO_SMALL: Self = Self(-30999);
    /// A foreign database constraint was violated.
    pub const FOREIGN_CONFLICT: Self = Self(-30997);
    /// Key/data pair was deleted or never created.
    pub const KEY_EMPTY: Self = Self(-30995);
    /// The key/data pair already exists.
    pub const KEY_EXISTS: Self = Self(-30994);
    /// Locker killed to resolve a deadlock.
    pub const LOCK_DEADLOCK: Self = Self(-30993);
    /// Lock unavailable.
    pub const LOCK_NOT_GRANTED: Self = Self(-30992);
    /// No matching key/data pair found.
    pub const NOT_FOUND: Self = Self(-30988);
    /// Database handle is from an older version.
    pub const OLD_VERSION: Self = Self(-30987);
    /// Database handle invalidated by replication.
    pub const REP_HANDLE_DEAD: Self = Self(-30984);
    /// Replication master lease expired.
    pub const REP_LEASE_EXPIRED: Self = Self(-30979);
    /// Replication lockout in progress.
    pub const REP_LOCKOUT: Self = Self(-30978);
    /// Fatal error, run database recovery.
    pub const RUN_RECOVERY: Self = Self(-30973);
    /// Secondary index inconsistent with primary.
    pub const SECONDARY_BAD: Self = Self(-30972);
    /// File format version mismatch.
    pub const VERSION_MISMATCH: Self = Self(-30969);

    /// Wraps a raw status code.
    ///
    /// Returns `None` for the success code `0`.
    #[must_use]
    pub const fn from_raw(code: i32) -> Option<Self> {
        if code == 0 {
            None
        } else {
            Some(Self(code))
        }
    }

    /// Returns the raw status code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self.0
    }

    /// Renders the code as a human-readable message.
    #[must_use]
    pub fn message(self) -> String {
        strerror(self.0)
    }

    /// Classifies the code.
    #[must_use]
    pub const fn kind(self) -> StatusKind {
        match self {
            Self::AGAIN => StatusKind::WouldBlock,
            Self::INVALID => StatusKind::InvalidArgument,
            Self::NOT_FOUND | Self::NO_ENTRY | Self::KEY_EMPTY => StatusKind::NotFound,
            Self::EXISTS => StatusKind::AlreadyExists,
            Self::ACCESS | Self::PERMISSION => StatusKind::PermissionDenied,
            Self::NO_SPACE => StatusKind::OutOfSpace,
            Self::RUN_RECOVERY | Self::IO => StatusKind::NeedsRecovery,
            Self::VERSION_MISMATCH | Self::OLD_VERSION => StatusKind::VersionMismatch,
            Self::LOCK_DEADLOCK => StatusKind::Deadlock,
            Self::LOCK_NOT_GRANTED => StatusKind::LockNotGranted,
            Self::BUFFER_TOO_SMALL => StatusKind::BufferTooSmall,
            Self::KEY_EXISTS => StatusKind::KeyExists,
            _ => StatusKind::Other,
        }
    }
}

/// The reportable condition behind a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// The call would have blocked; retry later.
    WouldBlock,
    /// An argument or handle state was not acceptable.
    InvalidArgument,
    /// The key, file or record is absent.
    NotFound,
    /// The file or database already exists.
    AlreadyExists,
    /// Access was refused.
    PermissionDenied,
    /// The device is full or a counter is exhausted.
    OutOfSpace,
    /// Stored state is damaged and recovery must run.
    NeedsRecovery,
    /// Stored state was written by an incompatible version.
    VersionMismatch,
    /// The transaction was chosen to break a deadlock.
    Deadlock,
    /// A lock was refused under a no-wait policy.
    LockNotGranted,
    /// A caller buffer was too small for the result.
    BufferTooSmall,
    /// The key is already present.
    KeyExists,
    /// Any other code.
    Other,
}

impl StatusKind {
    /// Returns true if retrying the whole transaction may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::WouldBlock | Self::Deadlock | Self::LockNotGranted)
    }

    /// Returns true if the handle that produced it should be abandoned.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::OutOfSpace | Self::PermissionDenied | Self::NeedsRecovery | Self::VersionMismatch
        )
    }
}

/// Renders a raw status code as text.
#[must_use]
pub fn strerror(code: i32) -> String {
    let text = match code {
        0 => "Successful return: 0",
        1 => "Operation not permitted",
        2 => "No such file or directory",
        5 => "Input/output error",
        11 => "Resource temporarily unavailable",
        13 => "Permission denied",
        17 => "File exists",
        22 => "Invalid argument",
        28 => "No space left on device",
        -30999 => "DB_BUFFER_SMALL: User memory too small for return value",
        -30997 => "DB_FOREIGN_CONFLICT: A foreign database constraint triggered",
        -30995 => "DB_KEYEMPTY: Non-existent key/data pair",
        -30994 => "DB_KEYEXIST: Key/data pair already exists",
        -30993 => "DB_LOCK_DEADLOCK: Locker killed to resolve a deadlock",
        -30992 => "DB_LOCK_NOTGRANTED: Lock not granted",
        -30988 => "DB_NOTFOUND: No matching key/data pair found",
        -30987 => "DB_OLD_VERSION: Database requires a version upgrade",
        -30984 => "DB_REP_HANDLE_DEAD: Handle is no longer valid",
        -30979 => "DB_REP_LEASE_EXPIRED: Master leases have expired",
        -30978 => "DB_REP_LOCKOUT: Waiting for replication recovery to complete",
        -30973 => "DB_RUNRECOVERY: Fatal error, run database recovery",
        -30972 => "DB_SECONDARY_BAD: Secondary index inconsistent with primary",
        -30969 => "DB_VERSION_MISMATCH: Database environment version mismatch",
        c if c > 0 => return io::Error::from_raw_os_error(c).to_string(),
        c => return format!("Unknown error: {c}"),
    };
    text.to_string()
}

/// Converts a raw status code into a result.
///
/// # Errors
///
/// Returns the wrapped code if it is not `0`.
pub fn check(code: i32) -> Result<()> {
    match Errno::from_raw(code) {
        None => Ok(()),
        Some(errno) => Err(errno),
    }
}

impl From<io::Error> for Errno {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NO_ENTRY,
            io::ErrorKind::AlreadyExists => Self::EXISTS,
            io::ErrorKind::PermissionDenied => Self::ACCESS,
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut => {
                Self::AGAIN
            }
            io::ErrorKind::InvalidInput => Self::INVALID,
            io::ErrorKind::WriteZero => Self::NO_SPACE,
            _ => Self::IO,
        }
    }
}

impl From<StorageError> for Errno {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => e.into(),
            StorageError::ReadPastEnd { .. } => Self::RUN_RECOVERY,
            StorageError::TruncateBeyondEnd { .. } => Self::INVALID,
            StorageError::ReadOnly => Self::ACCESS,
        }
    }
}
