//! Cursors over one database.
//!
//! A cursor remembers the stored key it sits on rather than a slot in a
//! page, and every move re-reads the rows through its transaction's view.
//! A deleted position therefore keeps its place: `Next` and `Prev` seek
//! from the deleted key and reach its neighbours.

use crate::db::OpenDb;
use crate::errno::{Errno, Result};
use crate::flags::{CursorOp, DbType};
use crate::store::{caller_key, stored_key, Direction};
use crate::thang::Thang;
use crate::txn::TxnShared;
use std::ops::Bound;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Position {
    key: Vec<u8>,
    deleted: bool,
}

/// A cursor handle, created by [`DbHandle::cursor`](crate::DbHandle::cursor).
#[derive(Debug)]
pub struct CursorHandle {
    open: Arc<OpenDb>,
    txn: Option<Arc<TxnShared>>,
    position: Option<Position>,
    closed: bool,
}

impl CursorHandle {
    pub(crate) fn new(open: Arc<OpenDb>, txn: Option<Arc<TxnShared>>) -> Self {
        Self {
            open,
            txn,
            position: None,
            closed: false,
        }
    }

    /// Moves the cursor and reads the record it lands on.
    ///
    /// `key` is an input for [`CursorOp::Set`] and [`CursorOp::SetRange`]
    /// and is filled with the found key for every operation except `Set`.
    /// `Next` and `Prev` on an unpositioned cursor behave like `First` and
    /// `Last`. A failed move leaves the position unchanged.
    ///
    /// # Errors
    ///
    /// - [`Errno::NOT_FOUND`] when no record qualifies
    /// - [`Errno::KEY_EMPTY`] for `Current` on a deleted record
    /// - [`Errno::INVALID`] for `Current` without a position, `SetRange`
    ///   outside a B-tree, a closed cursor, or a finished transaction
    /// - buffer errors from filling `key` or `data`
    pub fn get(&mut self, key: &mut Thang<'_>, data: &mut Thang<'_>, op: CursorOp) -> Result<()> {
        self.ensure_open()?;
        let kind = self.open.kind();
        let view = self.open.view(self.txn.as_deref())?;
        let after = |dir| match &self.position {
            Some(p) => view.seek(Bound::Excluded(p.key.as_slice()), dir),
            None => view.seek(Bound::Unbounded, dir),
        };

        let found = match op {
            CursorOp::Current => {
                let position = self.position.as_ref().ok_or(Errno::INVALID)?;
                match view.get(&position.key) {
                    Some(value) if !position.deleted => Some((position.key.clone(), value.to_vec())),
                    _ => return Err(Errno::KEY_EMPTY),
                }
            }
            CursorOp::First => view.seek(Bound::Unbounded, Direction::Forward),
            CursorOp::Last => view.seek(Bound::Unbounded, Direction::Backward),
            CursorOp::Next => after(Direction::Forward),
            CursorOp::Prev => after(Direction::Backward),
            CursorOp::Set => {
                let stored = stored_key(kind, key.as_bytes())?;
                view.get(&stored).map(|value| {
                    let value = value.to_vec();
                    (stored, value)
                })
            }
            CursorOp::SetRange => {
                if kind != DbType::BTree {
                    return Err(Errno::INVALID);
                }
                view.seek(Bound::Included(key.as_bytes()), Direction::Forward)
            }
        };

        let (stored, value) = found.ok_or(Errno::NOT_FOUND)?;
        if op != CursorOp::Set {
            key.fill(&caller_key(kind, &stored))?;
        }
        data.fill(&value)?;
        self.position = Some(Position {
            key: stored,
            deleted: false,
        });
        Ok(())
    }

    /// Deletes the record under the cursor without moving it.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] without a position, [`Errno::KEY_EMPTY`]
    /// if the record was already deleted through this cursor, and the
    /// errors of [`DbHandle::del`](crate::DbHandle::del).
    pub fn del(&mut self) -> Result<()> {
        self.ensure_open()?;
        let position = self.position.as_mut().ok_or(Errno::INVALID)?;
        if position.deleted {
            return Err(Errno::KEY_EMPTY);
        }
        let open = &self.open;
        open.scoped(self.txn.as_ref(), |txn| open.delete(txn, &position.key))?;
        position.deleted = true;
        Ok(())
    }

    /// Closes the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`Errno::INVALID`] if it is already closed.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.position = None;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Errno::INVALID)
        } else {
            Ok(())
        }
    }
}
