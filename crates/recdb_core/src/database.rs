//! Databases: whole-record put, get and delete.

use crate::codec::{KeyCodec, Keying};
use crate::config::{DatabaseConfig, DatabaseType};
use crate::cursor::Cursor;
use crate::environment::Environment;
use crate::error::Result;
use crate::flags;
use crate::record::{marshal_value, unmarshal_value, Record};
use crate::transaction::Transaction;
use recdb_engine::{DbHandle, DbType, Thang};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// An open database of one organization.
///
/// A database opened in an environment borrows it for `'env`, so the
/// environment cannot be closed while the database is open. Standalone
/// databases are `Database<'static>`.
///
/// Every operation takes an optional transaction; without one the engine
/// commits the single operation on its own. Dropping an unclosed database
/// closes it and logs any failure.
#[derive(Debug)]
pub struct Database<'env> {
    handle: DbHandle,
    kind: DatabaseType,
    keying: Keying,
    name: Option<String>,
    file: Option<PathBuf>,
    _env: PhantomData<&'env Environment>,
}

impl<'env> Database<'env> {
    /// Opens database `name` in `file`.
    ///
    /// Without an environment the database is standalone and takes no
    /// transactions. Without a file it lives in memory. Pass
    /// [`DatabaseType::Unknown`] to open an existing database of any
    /// organization.
    ///
    /// # Errors
    ///
    /// Returns the engine status if the database cannot be opened; the
    /// partially opened handle is released first.
    pub fn open(
        env: Option<&'env Environment>,
        txn: Option<&Transaction>,
        file: Option<&Path>,
        name: Option<&str>,
        kind: DatabaseType,
        config: &DatabaseConfig,
    ) -> Result<Self> {
        let transactional = env.is_some_and(Environment::is_transactional);
        let mut handle = DbHandle::create(env.map(Environment::handle))?;

        let opened = open_handle(&mut handle, txn, file, name, kind, config, transactional);
        let db_type = match opened {
            Ok(db_type) => db_type,
            Err(err) => {
                if let Err(close_err) = handle.close(flags::db_close()) {
                    warn!(error = %close_err, "closing a half-opened database failed");
                }
                return Err(err.into());
            }
        };

        let kind = DatabaseType::from(db_type);
        debug!(file = ?file, database = ?name, kind = ?kind, "database opened");
        Ok(Self {
            handle,
            kind,
            keying: Keying::for_type(kind),
            name: name.map(str::to_owned),
            file: file.map(Path::to_path_buf),
            _env: PhantomData,
        })
    }

    /// Closes the database, syncing its file.
    ///
    /// # Errors
    ///
    /// Returns the engine status if the sync fails.
    pub fn close(mut self) -> Result<()> {
        self.handle.close(flags::db_close())?;
        debug!(database = ?self.name, "database closed");
        Ok(())
    }

    /// Returns the organization, as reported by the engine at open.
    #[must_use]
    pub const fn db_type(&self) -> DatabaseType {
        self.kind
    }

    /// Returns the database name inside its file.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the file the database was opened from.
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Stores every record in `records`.
    ///
    /// A plain put (`append == false`) inserts or overwrites the record
    /// under its key. With `append` a record-number database assigns each
    /// record a fresh number and writes it into the record's key slot,
    /// while an ordered or hashed database inserts only new keys.
    ///
    /// # Errors
    ///
    /// Stops at the first failing record. An appending put on an existing
    /// key of an ordered or hashed database fails with `key-exists`.
    ///
    /// # Panics
    ///
    /// Panics if a record's key type does not match a record-number
    /// organization.
    pub fn put<'r, R, I>(&self, txn: Option<&Transaction>, append: bool, records: I) -> Result<()>
    where
        R: Record + 'r,
        I: IntoIterator<Item = &'r mut R>,
    {
        let txn = txn.map(Transaction::handle);
        let flags = self.keying.put_flags(append);

        for record in records {
            let key = self.keying.encode_key(record.record_key())?;
            let data = marshal_value(&*record)?;
            trace!(key_len = key.as_input().len(), data_len = data.len(), append, "put");

            if append && self.keying.assigns_keys() {
                let mut assigned = key.into_output();
                self.handle
                    .put(txn, &mut assigned, &Thang::Borrowed(&data), flags)?;
                self.keying
                    .decode_key(assigned.as_bytes(), record.record_key())?;
            } else {
                self.handle
                    .put(txn, &mut key.as_input(), &Thang::Borrowed(&data), flags)?;
            }
        }
        Ok(())
    }

    /// Reads every record in `records` by its key, replacing the rest of
    /// the record with the stored value.
    ///
    /// With `consume` (queues only) each record instead receives the oldest
    /// queued entry, key included, which is removed; the call blocks until
    /// an entry is available.
    ///
    /// # Errors
    ///
    /// A missing key fails with `not-found`. `consume` on any other
    /// organization fails with `invalid-argument`.
    ///
    /// # Panics
    ///
    /// Panics if a record's key type does not match a record-number
    /// organization.
    pub fn get<'r, R, I>(&self, txn: Option<&Transaction>, consume: bool, records: I) -> Result<()>
    where
        R: Record + 'r,
        I: IntoIterator<Item = &'r mut R>,
    {
        let txn = txn.map(Transaction::handle);
        let flags = self.keying.get_flags(consume);

        for record in records {
            let key = self.keying.encode_key(record.record_key())?;
            let mut data = Thang::owned();

            if consume {
                let mut taken = key.into_output();
                self.handle.get(txn, &mut taken, &mut data, flags)?;
                trace!(data_len = data.len(), "consumed");
                unmarshal_value(record, data.as_bytes())?;
                self.keying.decode_key(taken.as_bytes(), record.record_key())?;
            } else {
                self.handle.get(txn, &mut key.as_input(), &mut data, flags)?;
                trace!(key_len = key.as_input().len(), data_len = data.len(), "get");
                unmarshal_value(record, data.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Deletes the entry under each record's key.
    ///
    /// # Errors
    ///
    /// A missing key fails with `not-found`.
    ///
    /// # Panics
    ///
    /// Panics if a record's key type does not match a record-number
    /// organization.
    pub fn del<'r, R, I>(&self, txn: Option<&Transaction>, records: I) -> Result<()>
    where
        R: Record + 'r,
        I: IntoIterator<Item = &'r mut R>,
    {
        let txn = txn.map(Transaction::handle);
        for record in records {
            let key = self.keying.encode_key(record.record_key())?;
            trace!(key_len = key.as_input().len(), "del");
            self.handle.del(txn, &key.as_input())?;
        }
        Ok(())
    }

    /// Opens an unpositioned cursor, inside `txn` if given.
    ///
    /// # Errors
    ///
    /// Returns the engine status if the cursor cannot be created.
    pub fn cursor<'a>(&'a self, txn: Option<&'a Transaction>) -> Result<Cursor<'a>> {
        let handle = self.handle.cursor(txn.map(Transaction::handle))?;
        Ok(Cursor::new(self, handle))
    }

    pub(crate) const fn keying(&self) -> &Keying {
        &self.keying
    }

    /// Decodes a value and key returned by the engine into `record`.
    pub(crate) fn fill_record<R: Record>(&self, record: &mut R, key: &[u8], data: &[u8]) -> Result<()> {
        unmarshal_value(record, data)?;
        self.keying.decode_key(key, record.record_key())
    }
}

fn open_handle(
    handle: &mut DbHandle,
    txn: Option<&Transaction>,
    file: Option<&Path>,
    name: Option<&str>,
    kind: DatabaseType,
    config: &DatabaseConfig,
    transactional: bool,
) -> recdb_engine::Result<DbType> {
    if let Some(password) = &config.password {
        handle.set_encrypt(password)?;
    }
    handle.open(
        txn.map(Transaction::handle),
        file,
        name,
        kind.into(),
        flags::db_open(config, transactional),
        config.mode,
    )?;
    handle.get_type()
}
