//! Test fixtures and database helpers.
//!
//! Environments live in a temporary directory that is removed when the
//! fixture is dropped. Standalone databases live in memory.

use recdb_core::{Database, DatabaseConfig, DatabaseType, Environment, EnvironmentConfig};
use std::path::Path;
use tempfile::TempDir;

/// A transactional environment in a temporary directory.
pub struct TestEnv {
    /// The environment.
    pub env: Environment,
    // Dropped after `env`.
    dir: TempDir,
}

impl TestEnv {
    /// Creates a transactional environment.
    pub fn transactional() -> Self {
        Self::with_config(&EnvironmentConfig::new().create(true).transactional(true))
    }

    /// Creates an environment with `config`.
    pub fn with_config(config: &EnvironmentConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let env = Environment::open(dir.path(), config).expect("Failed to open environment");
        Self { env, dir }
    }

    /// Returns the environment home.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Opens or creates database file `file` in the environment.
    pub fn open_db(&self, file: &str, kind: DatabaseType) -> Database<'_> {
        self.open_db_with(file, kind, &DatabaseConfig::new().create(true))
    }

    /// Opens database file `file` with `config`.
    pub fn open_db_with(
        &self,
        file: &str,
        kind: DatabaseType,
        config: &DatabaseConfig,
    ) -> Database<'_> {
        Database::open(
            Some(&self.env),
            None,
            Some(Path::new(file)),
            None,
            kind,
            config,
        )
        .expect("Failed to open database")
    }
}

impl std::ops::Deref for TestEnv {
    type Target = Environment;

    fn deref(&self) -> &Self::Target {
        &self.env
    }
}

/// Opens a standalone in-memory database.
pub fn memory_db(kind: DatabaseType) -> Database<'static> {
    Database::open(
        None,
        None,
        None,
        None,
        kind,
        &DatabaseConfig::new().create(true),
    )
    .expect("Failed to open in-memory database")
}

/// Runs a test with a standalone in-memory database.
///
/// # Example
///
/// ```rust,ignore
/// use recdb_testkit::prelude::*;
///
/// with_db(DatabaseType::Queue, |db| {
///     let mut ticket = Ticket::new("hello");
///     db.put(None, true, [&mut ticket]).unwrap();
/// });
/// ```
pub fn with_db<F, R>(kind: DatabaseType, f: F) -> R
where
    F: FnOnce(&Database<'_>) -> R,
{
    let db = memory_db(kind);
    let result = f(&db);
    db.close().expect("Failed to close database");
    result
}

/// Runs a test with a database in a fresh transactional environment.
pub fn with_env_db<F, R>(kind: DatabaseType, f: F) -> R
where
    F: FnOnce(&Environment, &Database<'_>) -> R,
{
    let test_env = TestEnv::transactional();
    let db = test_env.open_db("test.db", kind);
    let result = f(&test_env.env, &db);
    db.close().expect("Failed to close database");
    result
}
