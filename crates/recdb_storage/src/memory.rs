//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};

/// The image of a database file that lives only in memory.
///
/// Databases opened without a file keep their frame log here. The image
/// is read once when the log is replayed, then only grows by appended
/// frames or shrinks when a tail is cut. `sync` records how much of the
/// image a real file would have made durable, which lets tests tell
/// committed-and-synced bytes from lazily written ones.
///
/// ```rust
/// use recdb_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// backend.append(b"header").unwrap();
/// backend.sync().unwrap();
/// backend.append(b"batch").unwrap();
/// assert_eq!(backend.synced_len(), 6);
/// assert_eq!(backend.image(), b"headerbatch");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    image: Vec<u8>,
    synced: usize,
}

impl InMemoryBackend {
    /// Creates an empty image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps bytes taken from an existing log, all of them counted as synced.
    #[must_use]
    pub fn from_image(image: Vec<u8>) -> Self {
        let synced = image.len();
        Self { image, synced }
    }

    /// Returns the current image.
    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Returns the length of the image as of the last `sync`.
    #[must_use]
    pub const fn synced_len(&self) -> usize {
        self.synced
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = self.image.len() as u64;
        usize::try_from(offset)
            .ok()
            .and_then(|start| self.image.get(start..start.checked_add(len)?))
            .map(<[u8]>::to_vec)
            .ok_or(StorageError::ReadPastEnd { offset, len, size })
    }

    fn append(&mut self, frame: &[u8]) -> StorageResult<u64> {
        let offset = self.image.len() as u64;
        self.image.extend_from_slice(frame);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.image.len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.synced = self.image.len();
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let size = self.image.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        // Bounded by the current length above.
        let keep = new_size as usize;
        self.image.truncate(keep);
        self.synced = self.synced.min(keep);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replayed_image_counts_as_synced() {
        let backend = InMemoryBackend::from_image(b"RCDB".to_vec());
        assert_eq!(backend.synced_len(), 4);
        assert_eq!(backend.read_at(0, 4).unwrap(), b"RCDB");
    }

    #[test]
    fn only_sync_moves_the_durable_mark() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"header").unwrap();
        backend.flush().unwrap();
        assert_eq!(backend.synced_len(), 0);

        backend.sync().unwrap();
        backend.append(b"lazy").unwrap();
        assert_eq!(backend.synced_len(), 6);
        assert_eq!(backend.size().unwrap(), 10);
    }

    #[test]
    fn cutting_a_tail_lowers_the_durable_mark() {
        let mut backend = InMemoryBackend::from_image(b"header torn".to_vec());
        backend.truncate(6).unwrap();
        assert_eq!(backend.synced_len(), 6);
        assert_eq!(backend.append(b"!").unwrap(), 6);
        assert_eq!(backend.image(), b"header!");
        assert!(backend.truncate(100).is_err());
    }

    #[test]
    fn reset_empties_the_image() {
        let mut backend = InMemoryBackend::from_image(b"old frames".to_vec());
        backend.truncate(0).unwrap();
        assert!(backend.image().is_empty());
        assert_eq!(backend.synced_len(), 0);
    }

    #[test]
    fn read_past_end_fails() {
        let backend = InMemoryBackend::from_image(b"hello".to_vec());
        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { offset: 3, len: 10, size: 5 })
        ));
        assert!(backend.read_at(5, 0).unwrap().is_empty());
        assert!(backend.read_at(u64::MAX, 1).is_err());
    }
}
