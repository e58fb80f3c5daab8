//! Environments: the shared context databases and transactions live in.

use crate::config::{EnvironmentConfig, Isolation, TransactionConfig};
use crate::error::{Error, Result};
use crate::flags;
use crate::transaction::Transaction;
use recdb_engine::EnvHandle;
use std::path::Path;
use tracing::debug;

/// An open environment.
///
/// Every [`Database`](crate::Database) opened in the environment borrows
/// it, so the environment outlives them. Dropping an unclosed environment
/// closes it and logs any failure.
///
/// Closing the environment while one of its databases is still open does
/// not compile:
///
/// ```compile_fail
/// use recdb_core::*;
///
/// # fn demo() -> Result<()> {
/// let env = Environment::open("home", &EnvironmentConfig::new())?;
/// let db = Database::open(
///     Some(&env),
///     None,
///     None,
///     None,
///     DatabaseType::OrderedKey,
///     &DatabaseConfig::new().create(true),
/// )?;
/// env.close()?;
/// db.close()
/// # }
/// ```
#[derive(Debug)]
pub struct Environment {
    handle: EnvHandle,
    transactional: bool,
}

impl Environment {
    /// Opens the environment rooted at `home`.
    ///
    /// # Errors
    ///
    /// Returns the engine status if the home directory is missing, the
    /// environment does not exist and `create` is off, another process is
    /// recovering it, or the password does not match.
    pub fn open(home: impl AsRef<Path>, config: &EnvironmentConfig) -> Result<Self> {
        let home = home.as_ref();
        let mut handle = EnvHandle::create()?;
        if let Some(password) = &config.password {
            handle.set_encrypt(password)?;
        }
        handle.open(home, flags::env_open(config), config.mode)?;
        debug!(
            home = %home.display(),
            transactional = config.transactional,
            recover = config.recover,
            "environment opened"
        );

        Ok(Self {
            handle,
            transactional: config.transactional,
        })
    }

    /// Closes the environment, syncing every file it opened.
    ///
    /// Databases opened in the environment must be closed or dropped first.
    ///
    /// # Errors
    ///
    /// Returns the first failure to sync a file.
    pub fn close(mut self) -> Result<()> {
        self.handle.close(flags::env_close())?;
        debug!("environment closed");
        Ok(())
    }

    /// Runs `action` in a new transaction.
    ///
    /// The transaction commits if `action` succeeds and the commit error,
    /// if any, is returned. If `action` fails the transaction is aborted
    /// and the action's error is returned; a failing abort is only logged.
    /// A panic inside `action` aborts the transaction as well.
    ///
    /// With [`TransactionConfig::parent`] the transaction is nested: its
    /// writes become visible to the parent on commit and reach the files
    /// only when the top-level transaction commits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Status`] (converted into `E`) if the transaction
    /// cannot begin or commit, or whatever `action` returns.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use recdb_core::*;
    /// # fn demo(env: &Environment, db: &Database<'_>, rec: &mut impl Record) -> Result<()> {
    /// env.with_transaction(Isolation::ReadCommitted, &TransactionConfig::new(), |txn| {
    ///     db.put(Some(txn), false, [&mut *rec])
    /// })
    /// # }
    /// ```
    pub fn with_transaction<T, E, F>(
        &self,
        isolation: Isolation,
        config: &TransactionConfig<'_>,
        action: F,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&Transaction) -> std::result::Result<T, E>,
    {
        let txn = self.begin(isolation, config).map_err(E::from)?;
        match action(&txn) {
            Ok(value) => {
                txn.commit().map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                txn.abort();
                Err(err)
            }
        }
    }

    fn begin(&self, isolation: Isolation, config: &TransactionConfig<'_>) -> Result<Transaction> {
        let parent = config.parent.map(Transaction::handle);
        let handle = self
            .handle
            .txn_begin(parent, flags::txn_begin(isolation, config))?;
        debug!(
            txn = handle.id(),
            parent = ?config.parent.map(Transaction::id),
            isolation = ?isolation,
            "transaction begun"
        );
        Ok(Transaction::new(handle))
    }

    /// Returns the home directory.
    #[must_use]
    pub fn home(&self) -> Option<&Path> {
        self.handle.home()
    }

    /// Returns true if transactions are enabled.
    #[must_use]
    pub const fn is_transactional(&self) -> bool {
        self.transactional
    }

    pub(crate) fn handle(&self) -> &EnvHandle {
        &self.handle
    }
}
