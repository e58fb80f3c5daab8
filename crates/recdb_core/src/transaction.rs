//! Transaction handles.

use crate::error::Result;
use crate::flags;
use recdb_engine::TxnHandle;
use tracing::{debug, warn};

/// A unit of work, possibly nested under a parent.
///
/// Transactions are only handed out inside
/// [`Environment::with_transaction`](crate::Environment::with_transaction),
/// which ends each of them exactly once. A transaction that is dropped
/// without being ended, for example while unwinding, is aborted by the
/// engine handle it owns.
#[derive(Debug)]
pub struct Transaction {
    handle: TxnHandle,
}

impl Transaction {
    pub(crate) fn new(handle: TxnHandle) -> Self {
        Self { handle }
    }

    /// Returns the engine's id for this transaction.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.handle.id()
    }

    pub(crate) fn handle(&self) -> &TxnHandle {
        &self.handle
    }

    pub(crate) fn commit(self) -> Result<()> {
        let id = self.id();
        self.handle.commit(flags::txn_commit())?;
        debug!(txn = id, "transaction committed");
        Ok(())
    }

    /// Aborts, logging instead of returning a failure.
    pub(crate) fn abort(self) {
        let id = self.id();
        match self.handle.abort() {
            Ok(()) => debug!(txn = id, "transaction aborted"),
            Err(err) => warn!(txn = id, error = %err, "transaction abort failed"),
        }
    }
}
