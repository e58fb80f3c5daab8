//! Open database files and the tables they hold.

use crate::env::EnvShared;
use crate::errno::{Errno, Result};
use crate::flags::{DbType, OpenFlags};
use crate::log::{Durability, FrameLog, LogOp};
use crate::store::{Overlay, Rows, Table};
use parking_lot::{Mutex, RwLock};
use recdb_storage::InMemoryBackend;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// One database inside a file.
#[derive(Debug)]
pub(crate) struct DbShared {
    pub(crate) id: u64,
    pub(crate) name: Option<String>,
    pub(crate) kind: DbType,
    pub(crate) table: RwLock<Table>,
}

impl DbShared {
    fn new(id: u64, name: Option<String>, kind: DbType) -> Self {
        Self {
            id,
            name,
            kind,
            table: RwLock::new(Table::new(kind)),
        }
    }

    /// The rows visible to readers outside any transaction.
    pub(crate) fn committed(&self) -> Arc<Rows> {
        Arc::clone(&self.table.read().rows)
    }
}

/// A file (or anonymous memory region) and its databases.
#[derive(Debug)]
pub(crate) struct FileShared {
    pub(crate) path: Option<PathBuf>,
    read_only: bool,
    log: Mutex<FrameLog>,
    dbs: Mutex<HashMap<Option<String>, Arc<DbShared>>>,
}

impl FileShared {
    /// Builds the file state from a freshly opened log.
    pub(crate) fn replay(
        env: &EnvShared,
        path: Option<PathBuf>,
        read_only: bool,
        log: FrameLog,
        ops: Vec<LogOp>,
    ) -> Result<Arc<Self>> {
        let mut dbs: HashMap<Option<String>, Arc<DbShared>> = HashMap::new();
        let mut tables: HashMap<Option<String>, Table> = HashMap::new();
        let replayed = ops.len();

        for op in ops {
            match op {
                LogOp::Create { name, kind } => {
                    tables.entry(name).or_insert_with(|| Table::new(kind));
                }
                LogOp::Put { name, key, data } => {
                    tables
                        .get_mut(&name)
                        .ok_or(Errno::RUN_RECOVERY)?
                        .replay(key, Some(data));
                }
                LogOp::Del { name, key } => {
                    tables
                        .get_mut(&name)
                        .ok_or(Errno::RUN_RECOVERY)?
                        .replay(key, None);
                }
            }
        }

        for (name, table) in tables {
            let db = DbShared {
                id: env.next_id(),
                name: name.clone(),
                kind: table.kind,
                table: RwLock::new(table),
            };
            dbs.insert(name, Arc::new(db));
        }

        debug!(
            path = ?path,
            databases = dbs.len(),
            ops = replayed,
            encrypted = log.is_encrypted(),
            "file replayed"
        );
        Ok(Arc::new(Self {
            path,
            read_only,
            log: Mutex::new(log),
            dbs: Mutex::new(dbs),
        }))
    }

    /// An anonymous file that lives only in memory.
    pub(crate) fn memory(env: &EnvShared, password: Option<&str>) -> Result<Arc<Self>> {
        let (log, ops) = FrameLog::open(Box::new(InMemoryBackend::new()), password, true)?;
        Self::replay(env, None, false, log, ops)
    }

    /// Returns the path, if the file is on disk.
    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Opens or creates the database `name` in this file.
    pub(crate) fn database(
        &self,
        env: &EnvShared,
        name: Option<&str>,
        kind: DbType,
        flags: OpenFlags,
    ) -> Result<Arc<DbShared>> {
        let key = name.map(str::to_owned);
        let mut dbs = self.dbs.lock();

        if let Some(db) = dbs.get(&key) {
            if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) {
                return Err(Errno::EXISTS);
            }
            if kind != DbType::Unknown && kind != db.kind {
                return Err(Errno::INVALID);
            }
            return Ok(Arc::clone(db));
        }

        if !flags.contains(OpenFlags::CREATE) {
            return Err(Errno::NO_ENTRY);
        }
        if kind == DbType::Unknown {
            return Err(Errno::INVALID);
        }
        if self.read_only {
            return Err(Errno::ACCESS);
        }

        self.log.lock().append(
            &[LogOp::Create {
                name: key.clone(),
                kind,
            }],
            Durability::Sync,
        )?;
        let db = Arc::new(DbShared::new(env.next_id(), key.clone(), kind));
        dbs.insert(key, Arc::clone(&db));
        debug!(path = ?self.path, database = ?name, kind = ?kind, "database created");
        Ok(db)
    }

    /// Empties every database in the file.
    pub(crate) fn truncate(&self, password: Option<&str>) -> Result<()> {
        if self.read_only {
            return Err(Errno::ACCESS);
        }
        let dbs = self.dbs.lock();
        let mut log = self.log.lock();
        log.reset(password)?;

        let creates: Vec<LogOp> = dbs
            .values()
            .map(|db| LogOp::Create {
                name: db.name.clone(),
                kind: db.kind,
            })
            .collect();
        log.append(&creates, Durability::Sync)?;

        for db in dbs.values() {
            db.table.write().clear();
        }
        debug!(path = ?self.path, "file truncated");
        Ok(())
    }

    /// Writes one committed batch and makes it visible.
    pub(crate) fn commit(
        &self,
        writes: &[(Arc<DbShared>, Arc<Overlay>)],
        durability: Durability,
    ) -> Result<()> {
        if self.read_only {
            return Err(Errno::ACCESS);
        }
        let ops: Vec<LogOp> = writes
            .iter()
            .flat_map(|(db, overlay)| {
                overlay.iter().map(move |(key, value)| match value {
                    Some(data) => LogOp::Put {
                        name: db.name.clone(),
                        key: key.clone(),
                        data: data.clone(),
                    },
                    None => LogOp::Del {
                        name: db.name.clone(),
                        key: key.clone(),
                    },
                })
            })
            .collect();

        let mut log = self.log.lock();
        log.append(&ops, durability)?;
        for (db, overlay) in writes {
            db.table.write().apply(overlay);
        }
        Ok(())
    }

    /// Syncs the log.
    pub(crate) fn sync(&self) -> Result<()> {
        self.log.lock().sync()
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }
}
