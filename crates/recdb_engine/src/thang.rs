//! Key and data buffers exchanged with the engine.
//!
//! Every buffer names its ownership. The engine reads any kind, but only
//! writes into [`Thang::Owned`] (which it may grow) and [`Thang::Fixed`]
//! (which must already be the right size). A call that would write into a
//! [`Thang::Borrowed`] view fails with [`Errno::INVALID`] instead of touching
//! caller memory.

use crate::errno::{Errno, Result};

/// Size of a record-number key.
pub const RECNO_SIZE: usize = 4;

/// A key or data buffer with an explicit ownership mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thang<'a> {
    /// A read-only view into caller memory.
    Borrowed(&'a [u8]),
    /// A buffer the engine fills and the caller takes afterwards.
    Owned(Vec<u8>),
    /// Caller storage sized for a record number.
    Fixed([u8; RECNO_SIZE]),
}

impl<'a> Thang<'a> {
    /// An empty output buffer.
    #[must_use]
    pub const fn owned() -> Self {
        Self::Owned(Vec::new())
    }

    /// A zeroed record-number buffer.
    #[must_use]
    pub const fn fixed() -> Self {
        Self::Fixed([0; RECNO_SIZE])
    }

    /// Returns the current contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Borrowed(bytes) => bytes,
            Self::Owned(bytes) => bytes,
            Self::Fixed(bytes) => bytes,
        }
    }

    /// Returns the length of the current contents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Returns true if the engine may write into this buffer.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        !matches!(self, Self::Borrowed(_))
    }

    /// Takes the contents as an owned vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Self::Borrowed(bytes) => bytes.to_vec(),
            Self::Owned(bytes) => bytes,
            Self::Fixed(bytes) => bytes.to_vec(),
        }
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(Errno::INVALID)
        }
    }

    /// Replaces the contents with `src`.
    pub(crate) fn fill(&mut self, src: &[u8]) -> Result<()> {
        match self {
            Self::Borrowed(_) => Err(Errno::INVALID),
            Self::Owned(buf) => {
                buf.clear();
                buf.extend_from_slice(src);
                Ok(())
            }
            Self::Fixed(buf) => {
                if src.len() > RECNO_SIZE {
                    return Err(Errno::BUFFER_TOO_SMALL);
                }
                if src.len() < RECNO_SIZE {
                    return Err(Errno::INVALID);
                }
                buf.copy_from_slice(src);
                Ok(())
            }
        }
    }
}
