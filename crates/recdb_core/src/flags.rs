//! Translation of configuration structs into engine flag sets.
//!
//! This is the only module that names engine flag constants for
//! configuration; the key codecs own the put/get flags.

use crate::config::{DatabaseConfig, EnvironmentConfig, Isolation, TransactionConfig};
use recdb_engine::{CloseFlags, CommitFlags, EnvFlags, OpenFlags, TxnFlags};

pub(crate) fn env_open(config: &EnvironmentConfig) -> EnvFlags {
    let mut flags = EnvFlags::THREAD | EnvFlags::INIT_LOCK | EnvFlags::INIT_MPOOL;
    if config.create {
        flags |= EnvFlags::CREATE;
    }
    if config.recover {
        flags |= EnvFlags::RECOVER | EnvFlags::REGISTER | EnvFlags::FAILCHK;
    }
    if config.transactional {
        flags |= EnvFlags::INIT_TXN | EnvFlags::INIT_LOG;
    }
    if config.no_sync {
        flags |= EnvFlags::TXN_NOSYNC;
    }
    if config.write_no_sync {
        flags |= EnvFlags::TXN_WRITE_NOSYNC;
    }
    flags
}

pub(crate) fn env_close() -> CloseFlags {
    CloseFlags::FORCESYNC
}

pub(crate) fn db_open(config: &DatabaseConfig, transactional: bool) -> OpenFlags {
    let mut flags = OpenFlags::THREAD;
    if config.create {
        flags |= OpenFlags::CREATE;
    }
    if config.exclusive {
        flags |= OpenFlags::EXCL;
    }
    if config.read_only {
        flags |= OpenFlags::RDONLY;
    }
    if config.truncate {
        flags |= OpenFlags::TRUNCATE;
    }
    if config.read_uncommitted {
        flags |= OpenFlags::READ_UNCOMMITTED;
    }
    if config.snapshot {
        flags |= OpenFlags::MULTIVERSION;
    }
    if transactional {
        flags |= OpenFlags::AUTO_COMMIT;
    }
    flags
}

pub(crate) fn db_close() -> CloseFlags {
    CloseFlags::empty()
}

pub(crate) fn txn_begin(isolation: Isolation, config: &TransactionConfig<'_>) -> TxnFlags {
    let mut flags = match isolation {
        Isolation::ReadCommitted => TxnFlags::READ_COMMITTED,
        Isolation::ReadUncommitted => TxnFlags::READ_UNCOMMITTED,
        Isolation::Snapshot => TxnFlags::SNAPSHOT,
    };
    if config.bulk {
        flags |= TxnFlags::BULK;
    }
    if config.no_wait {
        flags |= TxnFlags::NOWAIT;
    }
    if config.no_sync {
        flags |= TxnFlags::NOSYNC;
    }
    if config.write_no_sync {
        flags |= TxnFlags::WRITE_NOSYNC;
    }
    flags
}

pub(crate) fn txn_commit() -> CommitFlags {
    CommitFlags::empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_flags() {
        let flags = env_open(&EnvironmentConfig::new().create(true).recover(true));
        assert!(flags.contains(EnvFlags::CREATE | EnvFlags::RECOVER | EnvFlags::THREAD));
        assert!(!flags.contains(EnvFlags::INIT_TXN));

        let flags = env_open(&EnvironmentConfig::new().transactional(true).no_sync(true));
        assert!(flags.contains(EnvFlags::INIT_TXN | EnvFlags::INIT_MPOOL | EnvFlags::TXN_NOSYNC));
        assert!(!flags.contains(EnvFlags::CREATE));
    }

    #[test]
    fn database_flags() {
        let config = DatabaseConfig::new().create(true).snapshot(true);
        let flags = db_open(&config, true);
        assert!(flags.contains(OpenFlags::CREATE | OpenFlags::MULTIVERSION | OpenFlags::AUTO_COMMIT));
        assert!(!db_open(&config, false).contains(OpenFlags::AUTO_COMMIT));
        assert!(db_open(&DatabaseConfig::new().read_only(true), false).contains(OpenFlags::RDONLY));
    }

    #[test]
    fn transaction_flags() {
        let config = TransactionConfig::new().no_wait(true).write_no_sync(true);
        let flags = txn_begin(Isolation::Snapshot, &config);
        assert!(flags.contains(TxnFlags::SNAPSHOT | TxnFlags::NOWAIT | TxnFlags::WRITE_NOSYNC));
        assert_eq!(
            txn_begin(Isolation::ReadUncommitted, &TransactionConfig::new()),
            TxnFlags::READ_UNCOMMITTED
        );
    }
}
