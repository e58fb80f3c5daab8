//! Positional access to a database.

use crate::codec::KeyCodec;
use crate::database::Database;
use crate::error::Result;
use crate::record::{unmarshal_value, Record};
use recdb_engine::{CursorHandle, CursorOp, Errno, Thang};
use tracing::trace;

/// Whether a cursor sits on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No successful positioning yet.
    Unpositioned,
    /// On a record, or on the slot of a record it deleted.
    Positioned,
}

/// A cursor over one database, optionally inside a transaction.
///
/// The cursor borrows both, so it is closed or dropped before the
/// transaction ends and before the database closes. [`close`](Self::close)
/// consumes it.
///
/// Records come in organization order: encoded-key byte order for ordered
/// databases, ascending record number for record-number databases and
/// queues, and an unspecified but stable order for hashed databases.
#[derive(Debug)]
pub struct Cursor<'a> {
    db: &'a Database<'a>,
    handle: CursorHandle,
    state: CursorState,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(db: &'a Database<'a>, handle: CursorHandle) -> Self {
        Self {
            db,
            handle,
            state: CursorState::Unpositioned,
        }
    }

    /// Returns the cursor state.
    #[must_use]
    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// Positions on the record with `record`'s key and reads it.
    ///
    /// With `exact` only an equal key matches and the record's key is kept.
    /// Otherwise (ordered databases only) the cursor lands on the first key
    /// not less than the given key, and that key is written into the record.
    ///
    /// # Errors
    ///
    /// Fails with `not-found` if nothing matches, leaving the cursor where
    /// it was. An inexact set outside an ordered database fails with
    /// `invalid-argument`.
    pub fn set<R: Record>(&mut self, exact: bool, record: &mut R) -> Result<()> {
        let keying = self.db.keying();
        let key = keying.encode_key(record.record_key())?;
        let mut data = Thang::owned();

        if exact {
            self.handle
                .get(&mut key.as_input(), &mut data, CursorOp::Set)?;
            unmarshal_value(record, data.as_bytes())?;
        } else {
            let mut found = key.into_output();
            self.handle.get(&mut found, &mut data, CursorOp::SetRange)?;
            self.db
                .fill_record(record, found.as_bytes(), data.as_bytes())?;
        }
        trace!(exact, "cursor set");
        self.state = CursorState::Positioned;
        Ok(())
    }

    /// Positions on the first record.
    ///
    /// # Errors
    ///
    /// Fails with `not-found` on an empty database.
    pub fn first<R: Record>(&mut self, record: &mut R) -> Result<()> {
        self.fetch(CursorOp::First, record)
    }

    /// Positions on the last record.
    ///
    /// # Errors
    ///
    /// Fails with `not-found` on an empty database.
    pub fn last<R: Record>(&mut self, record: &mut R) -> Result<()> {
        self.fetch(CursorOp::Last, record)
    }

    /// Steps to the next record.
    ///
    /// # Errors
    ///
    /// Fails with `invalid-argument` when unpositioned and with `not-found`
    /// past the last record, where the cursor stays.
    pub fn next<R: Record>(&mut self, record: &mut R) -> Result<()> {
        self.ensure_positioned()?;
        self.fetch(CursorOp::Next, record)
    }

    /// Steps to the previous record.
    ///
    /// # Errors
    ///
    /// Fails with `invalid-argument` when unpositioned and with `not-found`
    /// before the first record, where the cursor stays.
    pub fn prev<R: Record>(&mut self, record: &mut R) -> Result<()> {
        self.ensure_positioned()?;
        self.fetch(CursorOp::Prev, record)
    }

    /// Deletes the record under the cursor. The cursor keeps its slot, so
    /// `next` and `prev` still reach the neighbours.
    ///
    /// # Errors
    ///
    /// Fails with `invalid-argument` when unpositioned and with `key-empty`
    /// if the record was already deleted.
    pub fn del(&mut self) -> Result<()> {
        self.ensure_positioned()?;
        self.handle.del()?;
        trace!("cursor del");
        Ok(())
    }

    /// Closes the cursor.
    ///
    /// # Errors
    ///
    /// Returns the engine status if the handle cannot be released.
    pub fn close(mut self) -> Result<()> {
        self.handle.close()?;
        Ok(())
    }

    fn fetch<R: Record>(&mut self, op: CursorOp, record: &mut R) -> Result<()> {
        let mut key = self.db.keying().output_key();
        let mut data = Thang::owned();
        self.handle.get(&mut key, &mut data, op)?;
        self.db.fill_record(record, key.as_bytes(), data.as_bytes())?;
        trace!(op = ?op, "cursor moved");
        self.state = CursorState::Positioned;
        Ok(())
    }

    fn ensure_positioned(&self) -> Result<()> {
        match self.state {
            CursorState::Positioned => Ok(()),
            CursorState::Unpositioned => Err(Errno::INVALID.into()),
        }
    }
}
