//! Database handles.

use crate::cursor::CursorHandle;
use crate::env::{EnvHandle, EnvShared};
use crate::errno::{Errno, Result};
use crate::file::{DbShared, FileShared};
use crate::flags::{CloseFlags, CommitFlags, DbType, GetFlags, OpenFlags, PutFlags};
use crate::store::{caller_key, record_number, stored_key, View};
use crate::thang::Thang;
use crate::txn::{TxnHandle, TxnShared};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// An opened database, shared by its handle and cursors.
#[derive(Debug)]
pub(crate) struct OpenDb {
    pub(crate) env: Arc<EnvShared>,
    pub(crate) file: Arc<FileShared>,
    pub(crate) db: Arc<DbShared>,
    flags: OpenFlags,
}

impl OpenDb {
    pub(crate) fn kind(&self) -> DbType {
        self.db.kind
    }

    fn multiversion(&self) -> bool {
        self.flags.contains(OpenFlags::MULTIVERSION)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.flags.contains(OpenFlags::RDONLY) || self.file.is_read_only() {
            Err(Errno::ACCESS)
        } else {
            Ok(())
        }
    }

    /// Rows as `txn` sees them; committed rows without a transaction.
    pub(crate) fn view(&self, txn: Option<&TxnShared>) -> Result<View> {
        match txn {
            Some(txn) => txn.view(&self.db, self.multiversion()),
            None => Ok(View::new(self.db.committed(), Vec::new())),
        }
    }

    /// Runs `f` in `txn`, or in a transaction of its own that commits
    /// when `f` succeeds.
    pub(crate) fn scoped<T>(
        &self,
        txn: Option<&Arc<TxnShared>>,
        f: impl FnOnce(&TxnShared) -> Result<T>,
    ) -> Result<T> {
        if let Some(txn) = txn {
            return f(txn);
        }
        let auto = TxnShared::autocommit(&self.env);
        match f(&auto) {
            Ok(value) => {
                auto.commit(CommitFlags::empty())?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = auto.abort() {
                    warn!(txn = auto.id, error = %abort_err, "autocommit abort failed");
                }
                Err(err)
            }
        }
    }

    /// Deletes a stored key that must be visible to `txn`.
    pub(crate) fn delete(&self, txn: &TxnShared, stored: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        txn.lock_for_write(&self.db, stored)?;
        if txn.view(&self.db, self.multiversion())?.get(stored).is_none() {
            return Err(Errno::NOT_FOUND);
        }
        txn.stage(&self.file, &self.db, stored.to_vec(), None);
        Ok(())
    }

    /// Removes the lowest record nobody else has claimed.
    fn consume(
        &self,
        txn: &TxnShared,
        key: &mut Thang<'_>,
        data: &mut Thang<'_>,
        wait: bool,
    ) -> Result<()> {
        let locks = &self.env.locks;
        let mut guard = locks.lock();
        loop {
            let view = txn.view(&self.db, self.multiversion())?;
            let claimable = view.iter().find(|(stored, _)| {
                guard
                    .owner(self.db.id, stored)
                    .map_or(true, |owner| owner == txn.family())
            });

            match claimable {
                Some((stored, value)) => {
                    guard.grant(self.db.id, &stored, txn.family());
                    drop(guard);
                    key.fill(&caller_key(self.kind(), &stored))?;
                    data.fill(&value)?;
                    txn.stage(&self.file, &self.db, stored, None);
                    return Ok(());
                }
                None if wait => locks.wait(&mut guard),
                None => return Err(Errno::NOT_FOUND),
            }
        }
    }
}

#[derive(Debug)]
enum DbState {
    Created,
    Open(Arc<OpenDb>),
    Closed,
}

/// A database handle.
///
/// Created unopened under an environment (or standalone), opened once and
/// closed once. Dropping an open handle closes it.
#[derive(Debug)]
pub struct DbHandle {
    env: Arc<EnvShared>,
    password: Option<String>,
    state: DbState,
}

impl DbHandle {
    /// Creates an unopened handle, standalone when `env` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] if `env` is not open.
    pub fn create(env: Option<&EnvHandle>) -> Result<Self> {
        let env = match env {
            Some(env) => Arc::clone(env.shared()?),
            None => EnvShared::private(),
        };
        Ok(Self {
            env,
            password: None,
            state: DbState::Created,
        })
    }

    /// Sets the password of the file this handle opens.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] once the handle is open or if the password
    /// is empty.
    pub fn set_encrypt(&mut self, password: &str) -> Result<()> {
        if !matches!(self.state, DbState::Created) || password.is_empty() {
            return Err(Errno::INVALID);
        }
        self.password = Some(password.to_owned());
        Ok(())
    }

    /// Opens database `name` of organization `kind` in `file`.
    ///
    /// Without a file the database lives in memory; a named in-memory
    /// database is shared by every handle of the environment.
    /// [`DbType::Unknown`] opens an existing database of any organization.
    ///
    /// # Errors
    ///
    /// - [`Errno::INVALID`] for a handle that is not fresh, a foreign or
    ///   finished transaction, `RDONLY` combined with `CREATE` or
    ///   `TRUNCATE`, or an organization that does not match the stored one
    /// - [`Errno::NO_ENTRY`] if the file or database is missing and
    ///   `CREATE` is not set
    /// - [`Errno::EXISTS`] under `CREATE | EXCL` if the database exists
    /// - [`Errno::ACCESS`] or [`Errno::INVALID`] for password problems, and
    ///   [`Errno::RUN_RECOVERY`] for a damaged file
    pub fn open(
        &mut self,
        txn: Option<&TxnHandle>,
        file: Option<&Path>,
        name: Option<&str>,
        kind: DbType,
        flags: OpenFlags,
        mode: u32,
    ) -> Result<()> {
        if !matches!(self.state, DbState::Created) {
            return Err(Errno::INVALID);
        }
        self.env.ensure_open()?;
        self.txn(txn)?;
        if flags.contains(OpenFlags::RDONLY)
            && flags.intersects(OpenFlags::CREATE | OpenFlags::TRUNCATE)
        {
            return Err(Errno::INVALID);
        }

        let password = self.password.as_deref().or_else(|| self.env.password());
        let file_shared = match (file, name) {
            (Some(path), _) => self.env.open_file(path, flags, mode, password)?,
            (None, Some(name)) => self.env.memory_file(name, password)?,
            (None, None) => FileShared::memory(&self.env, password)?,
        };
        let db = file_shared.database(&self.env, name, kind, flags)?;

        debug!(file = ?file, database = ?name, kind = ?db.kind, "database opened");
        self.state = DbState::Open(Arc::new(OpenDb {
            env: Arc::clone(&self.env),
            file: file_shared,
            db,
            flags,
        }));
        Ok(())
    }

    /// Closes the handle, syncing its file unless `NOSYNC` is given.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] on a closed handle, or the sync failure.
    pub fn close(&mut self, flags: CloseFlags) -> Result<()> {
        match std::mem::replace(&mut self.state, DbState::Closed) {
            DbState::Open(open) => {
                debug!(database = ?open.db.name, "database closed");
                if flags.contains(CloseFlags::NOSYNC) || open.file.is_read_only() {
                    Ok(())
                } else {
                    open.file.sync()
                }
            }
            DbState::Created => Ok(()),
            DbState::Closed => Err(Errno::INVALID),
        }
    }

    /// Returns the organization of the open database.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] if the handle is not open.
    pub fn get_type(&self) -> Result<DbType> {
        Ok(self.open_db()?.kind())
    }

    /// Writes `data` under `key`.
    ///
    /// With [`PutFlags::APPEND`] (record-number organizations only) the
    /// engine assigns the next record number and writes it into `key`.
    /// With [`PutFlags::NOOVERWRITE`] an existing key fails with
    /// [`Errno::KEY_EXISTS`].
    ///
    /// # Errors
    ///
    /// Returns [`Errno::ACCESS`] on a read-only database,
    /// [`Errno::INVALID`] for malformed keys or a misplaced `APPEND`, and
    /// lock errors from the transaction.
    pub fn put(
        &self,
        txn: Option<&TxnHandle>,
        key: &mut Thang<'_>,
        data: &Thang<'_>,
        flags: PutFlags,
    ) -> Result<()> {
        let open = self.open_db()?;
        let txn = self.txn(txn)?;
        open.ensure_writable()?;
        let kind = open.kind();
        let append = flags.contains(PutFlags::APPEND);
        if append {
            if !kind.is_record_number() {
                return Err(Errno::INVALID);
            }
            key.ensure_writable()?;
        }

        open.scoped(txn.as_ref(), |t| {
            let stored = if append {
                let recno = open.db.table.write().allocate_recno()?;
                key.fill(&recno.to_ne_bytes())?;
                recno.to_be_bytes().to_vec()
            } else {
                let stored = stored_key(kind, key.as_bytes())?;
                if kind.is_record_number() {
                    let recno = record_number(key.as_bytes())?;
                    open.db.table.write().observe_recno(recno);
                }
                stored
            };

            t.lock_for_write(&open.db, &stored)?;
            if flags.contains(PutFlags::NOOVERWRITE)
                && t.view(&open.db, open.multiversion())?.get(&stored).is_some()
            {
                return Err(Errno::KEY_EXISTS);
            }
            t.stage(&open.file, &open.db, stored, Some(data.as_bytes().to_vec()));
            Ok(())
        })
    }

    /// Reads the data stored under `key` into `data`.
    ///
    /// With [`GetFlags::CONSUME`] (queues only) the lowest record is
    /// removed and returned through both `key` and `data`;
    /// [`GetFlags::CONSUME_WAIT`] blocks until one is available.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::NOT_FOUND`] for a missing key (or an empty queue
    /// without waiting), [`Errno::INVALID`] for `CONSUME` on anything but a
    /// queue or inside a snapshot transaction, and buffer errors from
    /// filling `key` or `data`.
    pub fn get(
        &self,
        txn: Option<&TxnHandle>,
        key: &mut Thang<'_>,
        data: &mut Thang<'_>,
        flags: GetFlags,
    ) -> Result<()> {
        let open = self.open_db()?;
        let txn = self.txn(txn)?;

        if flags.contains(GetFlags::CONSUME) {
            if open.kind() != DbType::Queue || txn.as_ref().is_some_and(|t| t.is_snapshot()) {
                return Err(Errno::INVALID);
            }
            open.ensure_writable()?;
            key.ensure_writable()?;
            data.ensure_writable()?;
            let wait = flags.contains(GetFlags::CONSUME_WAIT);
            return open.scoped(txn.as_ref(), |t| open.consume(t, key, data, wait));
        }

        let stored = stored_key(open.kind(), key.as_bytes())?;
        let view = open.view(txn.as_deref())?;
        match view.get(&stored) {
            Some(value) => data.fill(value),
            None => Err(Errno::NOT_FOUND),
        }
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::NOT_FOUND`] if the key is absent, [`Errno::ACCESS`]
    /// on a read-only database, and lock errors from the transaction.
    pub fn del(&self, txn: Option<&TxnHandle>, key: &Thang<'_>) -> Result<()> {
        let open = self.open_db()?;
        let txn = self.txn(txn)?;
        let stored = stored_key(open.kind(), key.as_bytes())?;
        open.scoped(txn.as_ref(), |t| open.delete(t, &stored))
    }

    /// Opens a cursor, reading inside `txn` when given.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] if the handle is not open or `txn` is
    /// foreign or finished.
    pub fn cursor(&self, txn: Option<&TxnHandle>) -> Result<CursorHandle> {
        let open = self.open_db()?;
        let txn = self.txn(txn)?;
        Ok(CursorHandle::new(Arc::clone(open), txn))
    }

    fn open_db(&self) -> Result<&Arc<OpenDb>> {
        match &self.state {
            DbState::Open(open) => {
                open.env.ensure_open()?;
                Ok(open)
            }
            _ => Err(Errno::INVALID),
        }
    }

    fn txn(&self, txn: Option<&TxnHandle>) -> Result<Option<Arc<TxnShared>>> {
        let Some(handle) = txn else {
            return Ok(None);
        };
        let shared = handle.shared();
        if !Arc::ptr_eq(&shared.env, &self.env) {
            return Err(Errno::INVALID);
        }
        shared.ensure_active()?;
        Ok(Some(shared))
    }
}

impl Drop for DbHandle {
    fn drop(&mut self) {
        if let DbState::Open(_) = self.state {
            if let Err(err) = self.close(CloseFlags::empty()) {
                warn!(error = %err, "closing database on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn standalone(kind: DbType) -> DbHandle {
        let mut db = DbHandle::create(None).unwrap();
        db.open(None, None, None, kind, OpenFlags::CREATE, 0).unwrap();
        db
    }

    fn put(db: &DbHandle, key: &[u8], data: &[u8]) -> Result<()> {
        db.put(None, &mut Thang::Borrowed(key), &Thang::Borrowed(data), PutFlags::empty())
    }

    fn get(db: &DbHandle, key: &[u8]) -> Result<Vec<u8>> {
        let mut data = Thang::owned();
        db.get(None, &mut Thang::Borrowed(key), &mut data, GetFlags::empty())?;
        Ok(data.into_vec())
    }

    #[test]
    fn put_get_del_btree() {
        let db = standalone(DbType::BTree);
        put(&db, b"k", b"v1").unwrap();
        put(&db, b"k", b"v2").unwrap();
        assert_eq!(get(&db, b"k").unwrap(), b"v2");

        db.del(None, &Thang::Borrowed(b"k")).unwrap();
        assert_eq!(get(&db, b"k"), Err(Errno::NOT_FOUND));
        assert_eq!(db.del(None, &Thang::Borrowed(b"k")), Err(Errno::NOT_FOUND));
    }

    #[test]
    fn empty_value_is_distinct_from_missing() {
        let db = standalone(DbType::Hash);
        put(&db, b"", b"").unwrap();
        assert_eq!(get(&db, b"").unwrap(), b"");
        assert_eq!(get(&db, b"x"), Err(Errno::NOT_FOUND));
    }

    #[test]
    fn nooverwrite_reports_key_exists() {
        let db = standalone(DbType::BTree);
        put(&db, b"k", b"v").unwrap();
        let err = db
            .put(
                None,
                &mut Thang::Borrowed(b"k"),
                &Thang::Borrowed(b"w"),
                PutFlags::NOOVERWRITE,
            )
            .unwrap_err();
        assert_eq!(err, Errno::KEY_EXISTS);
        assert_eq!(get(&db, b"k").unwrap(), b"v");
    }

    #[test]
    fn append_assigns_increasing_record_numbers() {
        let db = standalone(DbType::Recno);
        let mut first = Thang::fixed();
        db.put(None, &mut first, &Thang::Borrowed(b"a"), PutFlags::APPEND)
            .unwrap();
        let mut second = Thang::fixed();
        db.put(None, &mut second, &Thang::Borrowed(b"b"), PutFlags::APPEND)
            .unwrap();

        assert_eq!(first.as_bytes(), &1u32.to_ne_bytes());
        assert_eq!(second.as_bytes(), &2u32.to_ne_bytes());
        assert_eq!(get(&db, &2u32.to_ne_bytes()).unwrap(), b"b");
    }

    #[test]
    fn append_needs_record_numbers_and_writable_key() {
        let btree = standalone(DbType::BTree);
        let mut key = Thang::owned();
        assert_eq!(
            btree.put(None, &mut key, &Thang::Borrowed(b"v"), PutFlags::APPEND),
            Err(Errno::INVALID)
        );

        let recno = standalone(DbType::Recno);
        let zero = 0u32.to_ne_bytes();
        assert_eq!(
            recno.put(None, &mut Thang::Borrowed(&zero), &Thang::Borrowed(b"v"), PutFlags::APPEND),
            Err(Errno::INVALID)
        );
        assert_eq!(put(&recno, &zero, b"v"), Err(Errno::INVALID));
        assert_eq!(put(&recno, b"short", b"v"), Err(Errno::INVALID));
    }

    #[test]
    fn consume_takes_lowest_record() {
        let db = standalone(DbType::Queue);
        for value in [b"a", b"b"] {
            let mut key = Thang::fixed();
            db.put(None, &mut key, &Thang::Borrowed(value), PutFlags::APPEND)
                .unwrap();
        }

        let mut key = Thang::fixed();
        let mut data = Thang::owned();
        db.get(None, &mut key, &mut data, GetFlags::CONSUME).unwrap();
        assert_eq!(key.as_bytes(), &1u32.to_ne_bytes());
        assert_eq!(data.as_bytes(), b"a");
        assert_eq!(get(&db, &1u32.to_ne_bytes()), Err(Errno::NOT_FOUND));

        let mut data = Thang::owned();
        db.get(None, &mut key, &mut data, GetFlags::CONSUME).unwrap();
        assert_eq!(data.as_bytes(), b"b");
        assert_eq!(
            db.get(None, &mut key, &mut Thang::owned(), GetFlags::CONSUME),
            Err(Errno::NOT_FOUND)
        );
    }

    #[test]
    fn consume_outside_queue_is_invalid() {
        let db = standalone(DbType::Recno);
        assert_eq!(
            db.get(None, &mut Thang::fixed(), &mut Thang::owned(), GetFlags::CONSUME),
            Err(Errno::INVALID)
        );
    }

    #[test]
    fn standalone_rejects_transactions() {
        let dir = tempdir().unwrap();
        let mut env = EnvHandle::create().unwrap();
        env.open(
            dir.path(),
            crate::flags::EnvFlags::CREATE | crate::flags::EnvFlags::INIT_TXN,
            0,
        )
        .unwrap();
        let txn = env.txn_begin(None, crate::flags::TxnFlags::empty()).unwrap();

        let db = standalone(DbType::BTree);
        assert_eq!(
            db.put(
                Some(&txn),
                &mut Thang::Borrowed(b"k"),
                &Thang::Borrowed(b"v"),
                PutFlags::empty()
            ),
            Err(Errno::INVALID)
        );
        txn.abort().unwrap();
    }

    #[test]
    fn file_persists_across_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        {
            let mut db = DbHandle::create(None).unwrap();
            db.open(None, Some(&path), Some("people"), DbType::BTree, OpenFlags::CREATE, 0)
                .unwrap();
            put(&db, b"ada", b"lovelace").unwrap();
            db.close(CloseFlags::empty()).unwrap();
            assert_eq!(db.close(CloseFlags::empty()), Err(Errno::INVALID));
        }

        let mut db = DbHandle::create(None).unwrap();
        db.open(None, Some(&path), Some("people"), DbType::Unknown, OpenFlags::empty(), 0)
            .unwrap();
        assert_eq!(db.get_type().unwrap(), DbType::BTree);
        assert_eq!(get(&db, b"ada").unwrap(), b"lovelace");

        let mut other = DbHandle::create(None).unwrap();
        assert_eq!(
            other.open(None, Some(&path), Some("pets"), DbType::BTree, OpenFlags::empty(), 0),
            Err(Errno::NO_ENTRY)
        );
    }

    #[test]
    fn read_only_handle_refuses_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.db");
        {
            let mut db = DbHandle::create(None).unwrap();
            db.open(None, Some(&path), None, DbType::BTree, OpenFlags::CREATE, 0)
                .unwrap();
            put(&db, b"k", b"v").unwrap();
        }

        let mut db = DbHandle::create(None).unwrap();
        assert_eq!(
            db.open(
                None,
                Some(&path),
                None,
                DbType::BTree,
                OpenFlags::RDONLY | OpenFlags::CREATE,
                0
            ),
            Err(Errno::INVALID)
        );
        db.open(None, Some(&path), None, DbType::BTree, OpenFlags::RDONLY, 0)
            .unwrap();
        assert_eq!(get(&db, b"k").unwrap(), b"v");
        assert_eq!(put(&db, b"k", b"w"), Err(Errno::ACCESS));
    }

    #[test]
    fn exclusive_create_fails_for_existing_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("excl.db");
        let mut first = DbHandle::create(None).unwrap();
        first
            .open(None, Some(&path), None, DbType::Hash, OpenFlags::CREATE | OpenFlags::EXCL, 0)
            .unwrap();
        first.close(CloseFlags::empty()).unwrap();

        let mut second = DbHandle::create(None).unwrap();
        assert_eq!(
            second.open(None, Some(&path), None, DbType::Hash, OpenFlags::CREATE | OpenFlags::EXCL, 0),
            Err(Errno::EXISTS)
        );
    }
}
