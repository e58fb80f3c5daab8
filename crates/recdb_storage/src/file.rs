//! File-based storage backend for persistent databases.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Default permission bits for newly created files.
const DEFAULT_MODE: u32 = 0o660;

/// How a [`FileBackend`] opens its file.
///
/// The default opens an existing file for reading and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOptions {
    /// Create the file if it does not exist.
    pub create: bool,
    /// Fail if the file already exists (only meaningful with `create`).
    pub exclusive: bool,
    /// Discard any existing contents.
    pub truncate: bool,
    /// Open without write access.
    pub read_only: bool,
    /// Unix permission bits for a newly created file; `0` picks the default.
    pub mode: u32,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            create: false,
            exclusive: false,
            truncate: false,
            read_only: false,
            mode: 0,
        }
    }
}

impl FileOptions {
    /// Sets whether a missing file is created.
    #[must_use]
    pub const fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Sets whether an existing file is an error.
    #[must_use]
    pub const fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Sets whether existing contents are discarded.
    #[must_use]
    pub const fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Sets read-only access.
    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Sets the creation mode.
    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    fn to_open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(true);
        if !self.read_only {
            options.write(true);
            if self.create && self.exclusive {
                options.create_new(true);
            } else {
                options.create(self.create);
            }
            options.truncate(self.truncate);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(if self.mode == 0 { DEFAULT_MODE } else { self.mode });
        }
        options
    }
}

/// A file-based storage backend.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Example
///
/// ```no_run
/// use recdb_storage::{FileBackend, FileOptions, StorageBackend};
/// use std::path::Path;
///
/// let options = FileOptions::default().create(true);
/// let mut backend = FileBackend::open(Path::new("data.db"), &options).unwrap();
/// backend.append(b"persistent data").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    read_only: bool,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FileBackend {
    /// Opens a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created with the
    /// requested options. A missing file without `create` surfaces as
    /// [`std::io::ErrorKind::NotFound`], an existing one under `exclusive`
    /// as [`std::io::ErrorKind::AlreadyExists`].
    pub fn open(path: &Path, options: &FileOptions) -> StorageResult<Self> {
        let file = options.to_open_options().open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            read_only: options.read_only,
            file: RwLock::new(file),
            size: RwLock::new(size),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the file was opened without write access.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        if data.is_empty() {
            return Ok(*self.size.read());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        let offset = *size;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        *size += data.len() as u64;

        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.write().flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.read_only {
            return Ok(());
        }
        self.file.write().sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        let file = self.file.write();
        let mut size = self.size.write();

        if new_size > *size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: *size,
            });
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;
    use tempfile::tempdir;

    fn create() -> FileOptions {
        FileOptions::default().create(true)
    }

    #[test]
    fn missing_file_without_create_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.db");

        let err = FileBackend::open(&path, &FileOptions::default()).unwrap_err();
        assert!(matches!(err, StorageError::Io(e) if e.kind() == ErrorKind::NotFound));
        assert!(!path.exists());
    }

    #[test]
    fn exclusive_create_rejects_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        FileBackend::open(&path, &create()).unwrap();

        let err = FileBackend::open(&path, &create().exclusive(true)).unwrap_err();
        assert!(matches!(err, StorageError::Io(e) if e.kind() == ErrorKind::AlreadyExists));
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut backend = FileBackend::open(&path, &create()).unwrap();

        assert_eq!(backend.append(b"hello").unwrap(), 0);
        assert_eq!(backend.append(b" world").unwrap(), 5);
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(6, 5).unwrap(), b"world");

        let result = backend.read_at(10, 5);
        assert!(matches!(result, Err(StorageError::ReadPastEnd { .. })));
    }

    #[test]
    fn contents_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut backend = FileBackend::open(&path, &create()).unwrap();
            backend.append(b"persistent data").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path, &FileOptions::default()).unwrap();
        assert_eq!(backend.size().unwrap(), 15);
        assert_eq!(backend.read_at(0, 15).unwrap(), b"persistent data");
    }

    #[test]
    fn truncate_option_discards_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let mut backend = FileBackend::open(&path, &create()).unwrap();
            backend.append(b"old").unwrap();
        }

        let backend = FileBackend::open(&path, &create().truncate(true)).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn read_only_refuses_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let mut backend = FileBackend::open(&path, &create()).unwrap();
            backend.append(b"data").unwrap();
        }

        let mut backend = FileBackend::open(&path, &FileOptions::default().read_only(true)).unwrap();
        assert!(backend.is_read_only());
        assert_eq!(backend.read_at(0, 4).unwrap(), b"data");
        assert!(matches!(backend.append(b"x"), Err(StorageError::ReadOnly)));
        assert!(matches!(backend.truncate(0), Err(StorageError::ReadOnly)));
    }

    #[test]
    fn truncate_cuts_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut backend = FileBackend::open(&path, &create()).unwrap();
        backend.append(b"hello world").unwrap();

        backend.truncate(5).unwrap();
        assert_eq!(backend.size().unwrap(), 5);
        assert_eq!(backend.append(b"!").unwrap(), 5);
        assert_eq!(backend.read_at(0, 6).unwrap(), b"hello!");

        assert!(matches!(
            backend.truncate(100),
            Err(StorageError::TruncateBeyondEnd { requested: 100, size: 6 })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn create_applies_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        FileBackend::open(&path, &create().mode(0o600)).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
