//! Environment handles: the shared home, lock manager and file registry.
//!
//! ```text
//! <home>/
//! ├─ __db.001      # region file: advisory lock plus password verifier
//! └─ *.db          # database files opened under this environment
//! ```
//!
//! The region file is locked shared by every process using the
//! environment, and exclusively while one of them opens it with
//! [`EnvFlags::RECOVER`].

use crate::errno::{Errno, Result};
use crate::file::FileShared;
use crate::flags::{CloseFlags, EnvFlags, OpenFlags, TxnFlags};
use crate::lock::LockTable;
use crate::log::{Durability, FrameLog};
use crate::txn::{TxnHandle, TxnShared};
use fs2::FileExt;
use parking_lot::Mutex;
use recdb_storage::{FileBackend, FileOptions};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the region file inside the environment home.
pub const REGION_FILE: &str = "__db.001";

/// State shared by every handle derived from one environment.
#[derive(Debug)]
pub(crate) struct EnvShared {
    home: PathBuf,
    flags: EnvFlags,
    password: Option<String>,
    private: bool,
    region: Mutex<Option<File>>,
    files: Mutex<HashMap<PathBuf, Arc<FileShared>>>,
    memory: Mutex<HashMap<String, Arc<FileShared>>>,
    pub(crate) locks: LockTable,
    next_id: AtomicU64,
    next_txn: AtomicU32,
    open: AtomicBool,
}

impl EnvShared {
    fn new(home: PathBuf, flags: EnvFlags, password: Option<String>, region: Option<File>) -> Self {
        Self {
            home,
            flags,
            password,
            private: region.is_none(),
            region: Mutex::new(region),
            files: Mutex::new(HashMap::new()),
            memory: Mutex::new(HashMap::new()),
            locks: LockTable::default(),
            next_id: AtomicU64::new(1),
            next_txn: AtomicU32::new(0x8000_0001),
            open: AtomicBool::new(true),
        }
    }

    /// The environment a standalone database runs in.
    pub(crate) fn private() -> Arc<Self> {
        Arc::new(Self::new(PathBuf::new(), EnvFlags::CREATE, None, None))
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_txn_id(&self) -> u32 {
        self.next_txn.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Errno::INVALID)
        }
    }

    pub(crate) fn is_transactional(&self) -> bool {
        self.flags.contains(EnvFlags::INIT_TXN)
    }

    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Torn tails may be cut when recovery was requested, and always for
    /// standalone databases.
    fn may_recover(&self) -> bool {
        self.private || self.flags.contains(EnvFlags::RECOVER)
    }

    /// Commit durability when neither the commit nor the transaction says.
    /// Without a transaction subsystem data reaches disk at sync or close.
    pub(crate) fn durability(&self) -> Durability {
        if !self.is_transactional() || self.flags.contains(EnvFlags::TXN_NOSYNC) {
            Durability::Lazy
        } else if self.flags.contains(EnvFlags::TXN_WRITE_NOSYNC) {
            Durability::Flush
        } else {
            Durability::Sync
        }
    }

    /// Opens (or reuses) a database file, resolving relative paths
    /// against the home directory.
    pub(crate) fn open_file(
        &self,
        path: &Path,
        flags: OpenFlags,
        mode: u32,
        password: Option<&str>,
    ) -> Result<Arc<FileShared>> {
        let path = if path.is_relative() {
            self.home.join(path)
        } else {
            path.to_path_buf()
        };

        let mut files = self.files.lock();
        if let Some(file) = files.get(&path) {
            if flags.contains(OpenFlags::TRUNCATE) {
                file.truncate(password)?;
            }
            return Ok(Arc::clone(file));
        }

        let read_only = flags.contains(OpenFlags::RDONLY);
        let options = FileOptions::default()
            .create(flags.contains(OpenFlags::CREATE))
            .read_only(read_only)
            .mode(mode);
        let backend = FileBackend::open(&path, &options)?;
        let (log, ops) = FrameLog::open(Box::new(backend), password, self.may_recover())?;
        let file = FileShared::replay(self, Some(path.clone()), read_only, log, ops)?;
        if flags.contains(OpenFlags::TRUNCATE) {
            file.truncate(password)?;
        }

        files.insert(path, Arc::clone(&file));
        Ok(file)
    }

    /// Returns the in-memory file holding the named database `name`.
    pub(crate) fn memory_file(&self, name: &str, password: Option<&str>) -> Result<Arc<FileShared>> {
        let mut memory = self.memory.lock();
        if let Some(file) = memory.get(name) {
            return Ok(Arc::clone(file));
        }
        let file = FileShared::memory(self, password)?;
        memory.insert(name.to_owned(), Arc::clone(&file));
        Ok(file)
    }

    fn close(&self, flags: CloseFlags) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Err(Errno::INVALID);
        }
        let files: Vec<Arc<FileShared>> = self.files.lock().drain().map(|(_, f)| f).collect();
        self.memory.lock().clear();

        let mut result = Ok(());
        if flags.contains(CloseFlags::FORCESYNC) {
            for file in files.iter().filter(|f| !f.is_read_only()) {
                if let Err(err) = file.sync() {
                    warn!(path = ?file.path(), error = %err, "sync on environment close failed");
                    result = result.and(Err(err));
                }
            }
        }
        self.region.lock().take();
        debug!(home = %self.home.display(), "environment closed");
        result
    }
}

#[derive(Debug)]
enum EnvState {
    Created { password: Option<String> },
    Open(Arc<EnvShared>),
    Closed,
}

/// An environment handle.
///
/// Created unopened; configure it, call [`open`](Self::open) once, and
/// [`close`](Self::close) it once. Dropping an open handle closes it.
#[derive(Debug)]
pub struct EnvHandle {
    state: EnvState,
}

impl EnvHandle {
    /// Creates an unopened environment handle.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature matches the other constructors.
    pub fn create() -> Result<Self> {
        Ok(Self {
            state: EnvState::Created { password: None },
        })
    }

    /// Sets the password that encrypts every file in the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] once the handle is open or if the password
    /// is empty.
    pub fn set_encrypt(&mut self, password: &str) -> Result<()> {
        match &mut self.state {
            EnvState::Created { password: slot } if !password.is_empty() => {
                *slot = Some(password.to_owned());
                Ok(())
            }
            _ => Err(Errno::INVALID),
        }
    }

    /// Opens the environment rooted at `home`.
    ///
    /// # Errors
    ///
    /// - [`Errno::NO_ENTRY`] if `home` is not a directory, or the region
    ///   file is missing and [`EnvFlags::CREATE`] is not set
    /// - [`Errno::AGAIN`] if another process holds a conflicting region lock
    /// - [`Errno::ACCESS`] for a wrong password, [`Errno::INVALID`] for a
    ///   password on an unencrypted environment or the reverse
    /// - [`Errno::INVALID`] if the handle was already opened or closed
    pub fn open(&mut self, home: &Path, flags: EnvFlags, mode: u32) -> Result<()> {
        let password = match &self.state {
            EnvState::Created { password } => password.clone(),
            _ => return Err(Errno::INVALID),
        };

        if !home.is_dir() {
            return Err(Errno::NO_ENTRY);
        }
        let region_path = home.join(REGION_FILE);
        let create = flags.contains(EnvFlags::CREATE);
        if !region_path.exists() && !create {
            return Err(Errno::NO_ENTRY);
        }

        let region = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(&region_path)?;
        let recover = flags.contains(EnvFlags::RECOVER);
        let locked = if recover {
            FileExt::try_lock_exclusive(&region)
        } else {
            FileExt::try_lock_shared(&region)
        };
        if locked.is_err() {
            return Err(Errno::AGAIN);
        }

        let options = FileOptions::default().create(create).mode(mode);
        let backend = FileBackend::open(&region_path, &options)?;
        FrameLog::open(Box::new(backend), password.as_deref(), recover)?;

        if recover {
            FileExt::lock_shared(&region)?;
        }

        let shared = EnvShared::new(home.to_path_buf(), flags, password, Some(region));
        debug!(home = %home.display(), flags = ?flags, "environment opened");
        self.state = EnvState::Open(Arc::new(shared));
        Ok(())
    }

    /// Closes the environment.
    ///
    /// With [`CloseFlags::FORCESYNC`] every open file is synced first.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] if the handle is not open, or the first
    /// sync failure.
    pub fn close(&mut self, flags: CloseFlags) -> Result<()> {
        match std::mem::replace(&mut self.state, EnvState::Closed) {
            EnvState::Open(shared) => shared.close(flags),
            EnvState::Created { .. } => Ok(()),
            EnvState::Closed => Err(Errno::INVALID),
        }
    }

    /// Begins a transaction, nested under `parent` if given.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] if the environment is not open with
    /// [`EnvFlags::INIT_TXN`], or if `parent` belongs to another environment
    /// or has already terminated.
    pub fn txn_begin(&self, parent: Option<&TxnHandle>, flags: TxnFlags) -> Result<TxnHandle> {
        let shared = self.shared()?;
        if !shared.is_transactional() {
            return Err(Errno::INVALID);
        }
        let parent = match parent {
            Some(p) if !Arc::ptr_eq(&p.shared().env, shared) => return Err(Errno::INVALID),
            Some(p) => Some(p.shared()),
            None => None,
        };
        let txn = TxnShared::begin(shared, parent, flags)?;
        Ok(TxnHandle::new(txn))
    }

    /// Returns the home directory of an open environment.
    #[must_use]
    pub fn home(&self) -> Option<&Path> {
        match &self.state {
            EnvState::Open(shared) => Some(&shared.home),
            _ => None,
        }
    }

    /// Returns the flags the environment was opened with.
    #[must_use]
    pub fn flags(&self) -> Option<EnvFlags> {
        match &self.state {
            EnvState::Open(shared) => Some(shared.flags),
            _ => None,
        }
    }

    pub(crate) fn shared(&self) -> Result<&Arc<EnvShared>> {
        match &self.state {
            EnvState::Open(shared) => {
                shared.ensure_open()?;
                Ok(shared)
            }
            _ => Err(Errno::INVALID),
        }
    }
}

impl Drop for EnvHandle {
    fn drop(&mut self) {
        if let EnvState::Open(_) = self.state {
            if let Err(err) = self.close(CloseFlags::empty()) {
                warn!(error = %err, "closing environment on drop failed");
            }
        }
    }
}
