//! Transactions: staged writes, nesting, snapshots and commit.
//!
//! A transaction stages its writes as one [`Overlay`] per database. Reads
//! see the committed rows (or the family's snapshot) with the overlays of
//! every ancestor layered on top, innermost last. A child commit merges its
//! overlays into the parent; only a top-level commit reaches the files.

use crate::env::EnvShared;
use crate::errno::{Errno, Result};
use crate::file::{DbShared, FileShared};
use crate::flags::{CommitFlags, TxnFlags};
use crate::log::Durability;
use crate::store::{Overlay, Rows, View};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Committed,
    Aborted,
}

#[derive(Debug)]
struct Staged {
    file: Arc<FileShared>,
    db: Arc<DbShared>,
    overlay: Arc<Overlay>,
}

#[derive(Debug)]
struct TxnState {
    status: Status,
    active_children: usize,
    writes: HashMap<u64, Staged>,
    snapshots: HashMap<u64, Arc<Rows>>,
}

/// Engine side of a transaction.
#[derive(Debug)]
pub(crate) struct TxnShared {
    pub(crate) id: u32,
    pub(crate) env: Arc<EnvShared>,
    parent: Option<Arc<TxnShared>>,
    family: u64,
    flags: TxnFlags,
    autocommit: bool,
    state: Mutex<TxnState>,
}

impl TxnShared {
    pub(crate) fn begin(
        env: &Arc<EnvShared>,
        parent: Option<Arc<TxnShared>>,
        flags: TxnFlags,
    ) -> Result<Arc<Self>> {
        let family = match &parent {
            Some(parent) => {
                parent.ensure_active()?;
                parent.state.lock().active_children += 1;
                parent.family
            }
            None => env.next_id(),
        };
        let txn = Self::new(env, parent, family, flags, false);
        debug!(txn = txn.id, parent = ?txn.parent.as_ref().map(|p| p.id), "transaction begun");
        Ok(Arc::new(txn))
    }

    /// A top-level transaction wrapping a single operation.
    pub(crate) fn autocommit(env: &Arc<EnvShared>) -> Arc<Self> {
        Arc::new(Self::new(env, None, env.next_id(), TxnFlags::empty(), true))
    }

    fn new(
        env: &Arc<EnvShared>,
        parent: Option<Arc<TxnShared>>,
        family: u64,
        flags: TxnFlags,
        autocommit: bool,
    ) -> Self {
        Self {
            id: env.next_txn_id(),
            env: Arc::clone(env),
            parent,
            family,
            flags,
            autocommit,
            state: Mutex::new(TxnState {
                status: Status::Active,
                active_children: 0,
                writes: HashMap::new(),
                snapshots: HashMap::new(),
            }),
        }
    }

    fn ancestors(&self) -> impl Iterator<Item = &TxnShared> {
        std::iter::successors(Some(self), |txn| txn.parent.as_deref())
    }

    fn root(&self) -> &TxnShared {
        self.ancestors().last().unwrap_or(self)
    }

    /// Fails unless this transaction and all of its ancestors are active.
    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self
            .ancestors()
            .all(|txn| txn.state.lock().status == Status::Active)
        {
            Ok(())
        } else {
            Err(Errno::INVALID)
        }
    }

    fn inherits(&self, flag: TxnFlags) -> bool {
        self.ancestors().any(|txn| txn.flags.contains(flag))
    }

    pub(crate) fn is_snapshot(&self) -> bool {
        self.inherits(TxnFlags::SNAPSHOT)
    }

    pub(crate) fn family(&self) -> u64 {
        self.family
    }

    /// Builds the view this transaction reads `db` through.
    pub(crate) fn view(&self, db: &DbShared, multiversion: bool) -> Result<View> {
        self.ensure_active()?;
        let base = if self.is_snapshot() {
            if !multiversion {
                return Err(Errno::INVALID);
            }
            self.snapshot(db)
        } else {
            db.committed()
        };

        let mut layers: Vec<Arc<Overlay>> = self
            .ancestors()
            .filter_map(|txn| {
                let state = txn.state.lock();
                state.writes.get(&db.id).map(|s| Arc::clone(&s.overlay))
            })
            .collect();
        layers.reverse();
        Ok(View::new(base, layers))
    }

    fn snapshot(&self, db: &DbShared) -> Arc<Rows> {
        let mut state = self.root().state.lock();
        Arc::clone(
            state
                .snapshots
                .entry(db.id)
                .or_insert_with(|| db.committed()),
        )
    }

    /// Takes the write lock on a stored key.
    ///
    /// A snapshot transaction that finds the key changed since its snapshot
    /// fails with [`Errno::LOCK_DEADLOCK`].
    pub(crate) fn lock_for_write(&self, db: &DbShared, key: &[u8]) -> Result<()> {
        self.ensure_active()?;
        let nowait = self.inherits(TxnFlags::NOWAIT);
        self.env.locks.acquire(db.id, key, self.family, nowait)?;

        if self.is_snapshot() {
            let snapshot = self.snapshot(db);
            if db.committed().get(key) != snapshot.get(key) {
                debug!(txn = self.id, "snapshot update conflict");
                return Err(Errno::LOCK_DEADLOCK);
            }
        }
        Ok(())
    }

    /// Stages a write; `None` deletes.
    pub(crate) fn stage(
        &self,
        file: &Arc<FileShared>,
        db: &Arc<DbShared>,
        key: Vec<u8>,
        value: Option<Vec<u8>>,
    ) {
        let mut state = self.state.lock();
        let staged = state.writes.entry(db.id).or_insert_with(|| Staged {
            file: Arc::clone(file),
            db: Arc::clone(db),
            overlay: Arc::new(Overlay::new()),
        });
        Arc::make_mut(&mut staged.overlay).insert(key, value);
    }

    fn durability(&self, flags: CommitFlags) -> Durability {
        if flags.contains(CommitFlags::SYNC) {
            return Durability::Sync;
        }
        if flags.contains(CommitFlags::NOSYNC) {
            return Durability::Lazy;
        }
        if flags.contains(CommitFlags::WRITE_NOSYNC) {
            return Durability::Flush;
        }
        for txn in self.ancestors() {
            if txn.flags.contains(TxnFlags::SYNC) {
                return Durability::Sync;
            }
            if txn.flags.contains(TxnFlags::NOSYNC) {
                return Durability::Lazy;
            }
            if txn.flags.contains(TxnFlags::WRITE_NOSYNC) {
                return Durability::Flush;
            }
        }
        self.env.durability()
    }

    pub(crate) fn commit(&self, flags: CommitFlags) -> Result<()> {
        let writes = {
            let mut state = self.state.lock();
            if state.status != Status::Active || state.active_children > 0 {
                return Err(Errno::INVALID);
            }
            state.status = Status::Committed;
            state.snapshots.clear();
            std::mem::take(&mut state.writes)
        };

        match &self.parent {
            Some(parent) => {
                let mut state = parent.state.lock();
                state.active_children -= 1;
                if state.status != Status::Active {
                    return Err(Errno::INVALID);
                }
                for (id, staged) in writes {
                    match state.writes.get_mut(&id) {
                        Some(existing) => Arc::make_mut(&mut existing.overlay)
                            .extend(staged.overlay.iter().map(|(k, v)| (k.clone(), v.clone()))),
                        None => {
                            state.writes.insert(id, staged);
                        }
                    }
                }
                debug!(txn = self.id, parent = parent.id, "transaction committed into parent");
                Ok(())
            }
            None => {
                let result = self.apply(writes, self.durability(flags));
                self.env.locks.release(self.family);
                if !self.autocommit {
                    debug!(txn = self.id, ok = result.is_ok(), "transaction committed");
                }
                result
            }
        }
    }

    fn apply(&self, writes: HashMap<u64, Staged>, durability: Durability) -> Result<()> {
        let mut by_file: Vec<(Arc<FileShared>, Vec<(Arc<DbShared>, Arc<Overlay>)>)> = Vec::new();
        for staged in writes.into_values().filter(|s| !s.overlay.is_empty()) {
            match by_file.iter_mut().find(|(f, _)| Arc::ptr_eq(f, &staged.file)) {
                Some((_, batch)) => batch.push((staged.db, staged.overlay)),
                None => by_file.push((staged.file, vec![(staged.db, staged.overlay)])),
            }
        }
        for (file, batch) in &by_file {
            file.commit(batch, durability)?;
        }
        Ok(())
    }

    pub(crate) fn abort(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.status != Status::Active {
                return Err(Errno::INVALID);
            }
            state.status = Status::Aborted;
            state.writes.clear();
            state.snapshots.clear();
        }
        match &self.parent {
            Some(parent) => {
                let mut state = parent.state.lock();
                state.active_children = state.active_children.saturating_sub(1);
            }
            None => self.env.locks.release(self.family),
        }
        if !self.autocommit {
            debug!(txn = self.id, "transaction aborted");
        }
        Ok(())
    }
}

/// A transaction handle.
///
/// Terminate it exactly once with [`commit`](Self::commit) or
/// [`abort`](Self::abort). A handle dropped while still active is aborted.
#[derive(Debug)]
pub struct TxnHandle {
    shared: Arc<TxnShared>,
    finished: bool,
}

impl TxnHandle {
    pub(crate) fn new(shared: Arc<TxnShared>) -> Self {
        Self {
            shared,
            finished: false,
        }
    }

    pub(crate) fn shared(&self) -> Arc<TxnShared> {
        Arc::clone(&self.shared)
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.shared.id
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] if a child transaction is still active or
    /// the parent has terminated, or the error from writing the batch. The
    /// transaction is finished either way.
    pub fn commit(mut self, flags: CommitFlags) -> Result<()> {
        self.finished = true;
        self.shared.commit(flags)
    }

    /// Aborts the transaction, discarding its writes.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] if the transaction already terminated.
    pub fn abort(mut self) -> Result<()> {
        self.finished = true;
        self.shared.abort()
    }
}

impl Drop for TxnHandle {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.shared.abort() {
                warn!(txn = self.shared.id, error = %err, "abort on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{DbType, OpenFlags};

    fn setup() -> (Arc<EnvShared>, Arc<FileShared>, Arc<DbShared>) {
        let env = EnvShared::private();
        let file = FileShared::memory(&env, None).unwrap();
        let db = file
            .database(&env, None, DbType::BTree, OpenFlags::CREATE)
            .unwrap();
        (env, file, db)
    }

    #[test]
    fn child_writes_merge_into_parent() {
        let (env, file, db) = setup();
        let root = TxnShared::begin(&env, None, TxnFlags::empty()).unwrap();
        let child = TxnShared::begin(&env, Some(Arc::clone(&root)), TxnFlags::empty()).unwrap();

        child.lock_for_write(&db, b"k").unwrap();
        child.stage(&file, &db, b"k".to_vec(), Some(b"v".to_vec()));
        assert_eq!(child.view(&db, false).unwrap().get(b"k"), Some(&b"v"[..]));
        assert_eq!(root.view(&db, false).unwrap().get(b"k"), None);

        child.commit(CommitFlags::empty()).unwrap();
        assert_eq!(root.view(&db, false).unwrap().get(b"k"), Some(&b"v"[..]));
        assert!(db.committed().is_empty());

        root.commit(CommitFlags::empty()).unwrap();
        assert_eq!(db.committed().get(&b"k"[..]), Some(&b"v".to_vec()));
        assert_eq!(env.locks.held_by(root.family()), 0);
    }

    #[test]
    fn parent_with_active_child_cannot_commit() {
        let (env, _, _) = setup();
        let root = TxnShared::begin(&env, None, TxnFlags::empty()).unwrap();
        let child = TxnShared::begin(&env, Some(Arc::clone(&root)), TxnFlags::empty()).unwrap();
        assert_eq!(root.commit(CommitFlags::empty()), Err(Errno::INVALID));
        child.abort().unwrap();
    }

    #[test]
    fn parent_abort_discards_child_work() {
        let (env, file, db) = setup();
        let root = TxnShared::begin(&env, None, TxnFlags::empty()).unwrap();
        let child = TxnShared::begin(&env, Some(Arc::clone(&root)), TxnFlags::empty()).unwrap();
        child.stage(&file, &db, b"k".to_vec(), Some(b"v".to_vec()));
        child.commit(CommitFlags::empty()).unwrap();
        root.abort().unwrap();

        assert!(db.committed().is_empty());
        assert_eq!(root.abort(), Err(Errno::INVALID));
        assert_eq!(child.view(&db, false).unwrap_err(), Errno::INVALID);
    }

    #[test]
    fn snapshot_requires_multiversion_and_detects_conflicts() {
        let (env, file, db) = setup();
        let snap = TxnShared::begin(&env, None, TxnFlags::SNAPSHOT).unwrap();
        assert_eq!(snap.view(&db, false).unwrap_err(), Errno::INVALID);
        assert!(snap.view(&db, true).unwrap().get(b"k").is_none());

        let writer = TxnShared::autocommit(&env);
        writer.lock_for_write(&db, b"k").unwrap();
        writer.stage(&file, &db, b"k".to_vec(), Some(b"new".to_vec()));
        writer.commit(CommitFlags::empty()).unwrap();

        assert!(snap.view(&db, true).unwrap().get(b"k").is_none());
        assert_eq!(snap.lock_for_write(&db, b"k"), Err(Errno::LOCK_DEADLOCK));
        snap.abort().unwrap();
    }

    #[test]
    fn commit_flag_overrides_transaction_flag() {
        let (env, _, _) = setup();
        let txn = TxnShared::begin(&env, None, TxnFlags::NOSYNC).unwrap();
        assert_eq!(txn.durability(CommitFlags::empty()), Durability::Lazy);
        assert_eq!(txn.durability(CommitFlags::SYNC), Durability::Sync);
        let child = TxnShared::begin(&env, Some(Arc::clone(&txn)), TxnFlags::empty()).unwrap();
        assert_eq!(child.durability(CommitFlags::empty()), Durability::Lazy);
        child.abort().unwrap();
        txn.abort().unwrap();
    }
}
