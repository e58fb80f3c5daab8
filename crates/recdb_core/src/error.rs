//! Error types for RecDB core.

use recdb_codec::CodecError;
use recdb_engine::{Errno, StatusKind};
use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by databases, cursors and transactions.
#[derive(Debug, Error)]
pub enum Error {
    /// Status reported by the storage engine.
    #[error("{0}")]
    Status(#[from] Errno),

    /// A key or value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl Error {
    /// Returns the engine status, if this is one.
    #[must_use]
    pub const fn status(&self) -> Option<Errno> {
        match self {
            Self::Status(errno) => Some(*errno),
            Self::Codec(_) => None,
        }
    }

    /// Classifies an engine status.
    #[must_use]
    pub fn kind(&self) -> Option<StatusKind> {
        self.status().map(Errno::kind)
    }

    /// True when a key was absent; an expected outcome for gets and deletes.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(StatusKind::NotFound)
    }

    /// True when a key or database already exists.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self.kind(),
            Some(StatusKind::AlreadyExists | StatusKind::KeyExists)
        )
    }

    /// True when retrying the whole transaction may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_some_and(StatusKind::is_retryable)
    }

    /// True when the handle should not be used further.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind().is_some_and(StatusKind::is_fatal)
    }
}

/// Converts a raw engine status code, `0` being success.
///
/// # Errors
///
/// Returns [`Error::Status`] for every non-zero code.
pub fn check(code: i32) -> Result<()> {
    recdb_engine::check(code).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_wraps_nonzero_codes() {
        assert!(check(0).is_ok());
        let err = check(Errno::NOT_FOUND.code()).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(Errno::NOT_FOUND));
    }

    #[test]
    fn classification() {
        assert!(Error::from(Errno::KEY_EXISTS).is_already_exists());
        assert!(Error::from(Errno::EXISTS).is_already_exists());
        assert!(Error::from(Errno::LOCK_DEADLOCK).is_retryable());
        assert!(Error::from(Errno::RUN_RECOVERY).is_fatal());
        assert!(!Error::from(Errno::NOT_FOUND).is_fatal());

        let codec = Error::from(CodecError::decoding_failed("bad"));
        assert_eq!(codec.kind(), None);
        assert!(!codec.is_retryable());
    }

    #[test]
    fn status_message_comes_from_engine() {
        let err = Error::from(Errno::NOT_FOUND);
        assert_eq!(err.to_string(), recdb_engine::strerror(Errno::NOT_FOUND.code()));
    }
}
