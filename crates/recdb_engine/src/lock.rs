//! Per-key write locks.
//!
//! Locks belong to a transaction *family*: a top-level transaction and all
//! of its descendants share one owner id, so a child never blocks on its
//! ancestors. Locks are released together when the top-level transaction
//! commits or aborts. Readers never take locks.

use crate::errno::{Errno, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use tracing::debug;

/// Lock ownership and the wait-for graph.
#[derive(Debug, Default)]
pub(crate) struct LockState {
    owners: HashMap<u64, HashMap<Vec<u8>, u64>>,
    waits_for: HashMap<u64, u64>,
}

impl LockState {
    /// Returns the family holding `key` of database `db`.
    pub(crate) fn owner(&self, db: u64, key: &[u8]) -> Option<u64> {
        self.owners.get(&db)?.get(key).copied()
    }

    /// Records `family` as owner of an unowned key.
    pub(crate) fn grant(&mut self, db: u64, key: &[u8], family: u64) {
        self.owners
            .entry(db)
            .or_default()
            .insert(key.to_vec(), family);
    }

    fn would_deadlock(&self, waiter: u64, holder: u64) -> bool {
        let mut current = holder;
        for _ in 0..=self.waits_for.len() {
            if current == waiter {
                return true;
            }
            match self.waits_for.get(&current) {
                Some(next) => current = *next,
                None => return false,
            }
        }
        false
    }

    fn held_by(&self, family: u64) -> usize {
        self.owners
            .values()
            .map(|keys| keys.values().filter(|f| **f == family).count())
            .sum()
    }
}

/// The lock manager of one environment.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    state: Mutex<LockState>,
    released: Condvar,
}

impl LockTable {
    /// Takes the write lock on `key` for `family`, waiting for the holder
    /// unless `nowait` is set.
    ///
    /// Fails with [`Errno::LOCK_NOT_GRANTED`] under `nowait` and with
    /// [`Errno::LOCK_DEADLOCK`] when waiting would close a cycle.
    pub(crate) fn acquire(&self, db: u64, key: &[u8], family: u64, nowait: bool) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            match state.owner(db, key) {
                None => {
                    state.grant(db, key, family);
                    return Ok(());
                }
                Some(owner) if owner == family => return Ok(()),
                Some(holder) => {
                    if nowait {
                        return Err(Errno::LOCK_NOT_GRANTED);
                    }
                    if state.would_deadlock(family, holder) {
                        debug!(family, holder, "deadlock detected");
                        return Err(Errno::LOCK_DEADLOCK);
                    }
                    state.waits_for.insert(family, holder);
                    self.released.wait(&mut state);
                    state.waits_for.remove(&family);
                }
            }
        }
    }

    /// Drops every lock of `family` and wakes all waiters.
    pub(crate) fn release(&self, family: u64) {
        let mut state = self.state.lock();
        for keys in state.owners.values_mut() {
            keys.retain(|_, owner| *owner != family);
        }
        state.owners.retain(|_, keys| !keys.is_empty());
        state.waits_for.remove(&family);
        drop(state);
        self.released.notify_all();
    }

    /// Locks the table for a scan that must not miss a release.
    pub(crate) fn lock(&self) -> MutexGuard<'_, LockState> {
        self.state.lock()
    }

    /// Sleeps until some family releases its locks.
    pub(crate) fn wait(&self, guard: &mut MutexGuard<'_, LockState>) {
        self.released.wait(guard);
    }

    /// Number of keys `family` holds.
    pub(crate) fn held_by(&self, family: u64) -> usize {
        self.state.lock().held_by(family)
    }
}
