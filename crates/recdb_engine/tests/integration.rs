//! Integration tests for environments, transactions and persistence.

use recdb_engine::{
    CloseFlags, CommitFlags, CursorOp, DbHandle, DbType, EnvFlags, EnvHandle, Errno, GetFlags,
    OpenFlags, PutFlags, Thang, TxnFlags,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn env_flags() -> EnvFlags {
    EnvFlags::CREATE | EnvFlags::INIT_TXN | EnvFlags::INIT_MPOOL | EnvFlags::THREAD
}

fn open_env(home: &Path, extra: EnvFlags) -> EnvHandle {
    let mut env = EnvHandle::create().unwrap();
    env.open(home, env_flags() | extra, 0).unwrap();
    env
}

fn open_db(env: &EnvHandle, file: &str, kind: DbType) -> DbHandle {
    let mut db = DbHandle::create(Some(env)).unwrap();
    db.open(
        None,
        Some(Path::new(file)),
        None,
        kind,
        OpenFlags::CREATE | OpenFlags::AUTO_COMMIT | OpenFlags::THREAD,
        0,
    )
    .unwrap();
    db
}

fn put(db: &DbHandle, txn: Option<&recdb_engine::TxnHandle>, key: &[u8], data: &[u8]) -> Result<(), Errno> {
    db.put(txn, &mut Thang::Borrowed(key), &Thang::Borrowed(data), PutFlags::empty())
}

fn get(db: &DbHandle, txn: Option<&recdb_engine::TxnHandle>, key: &[u8]) -> Result<Vec<u8>, Errno> {
    let mut data = Thang::owned();
    db.get(txn, &mut Thang::Borrowed(key), &mut data, GetFlags::empty())?;
    Ok(data.into_vec())
}

#[test]
fn committed_writes_survive_reopen() {
    let dir = tempdir().unwrap();
    {
        let env = open_env(dir.path(), EnvFlags::empty());
        let db = open_db(&env, "people.db", DbType::BTree);
        let txn = env.txn_begin(None, TxnFlags::empty()).unwrap();
        put(&db, Some(&txn), b"ada", b"lovelace").unwrap();
        put(&db, Some(&txn), b"alan", b"turing").unwrap();
        txn.commit(CommitFlags::empty()).unwrap();

        let aborted = env.txn_begin(None, TxnFlags::empty()).unwrap();
        put(&db, Some(&aborted), b"grace", b"hopper").unwrap();
        aborted.abort().unwrap();
    }

    let env = open_env(dir.path(), EnvFlags::empty());
    let db = open_db(&env, "people.db", DbType::BTree);
    assert_eq!(get(&db, None, b"ada").unwrap(), b"lovelace");
    assert_eq!(get(&db, None, b"alan").unwrap(), b"turing");
    assert_eq!(get(&db, None, b"grace"), Err(Errno::NOT_FOUND));
}

#[test]
fn torn_tail_needs_recovery() {
    let dir = tempdir().unwrap();
    {
        let env = open_env(dir.path(), EnvFlags::empty());
        let db = open_db(&env, "torn.db", DbType::Hash);
        put(&db, None, b"kept", b"yes").unwrap();
    }
    let mut file = OpenOptions::new()
        .append(true)
        .open(dir.path().join("torn.db"))
        .unwrap();
    file.write_all(&[2, 40, 0, 0, 0, 1, 2, 3]).unwrap();
    drop(file);

    {
        let env = open_env(dir.path(), EnvFlags::empty());
        let mut db = DbHandle::create(Some(&env)).unwrap();
        let err = db
            .open(None, Some(Path::new("torn.db")), None, DbType::Hash, OpenFlags::empty(), 0)
            .unwrap_err();
        assert_eq!(err, Errno::RUN_RECOVERY);
        assert!(err.kind().is_fatal());
    }

    let env = open_env(dir.path(), EnvFlags::RECOVER);
    let db = open_db(&env, "torn.db", DbType::Hash);
    assert_eq!(get(&db, None, b"kept").unwrap(), b"yes");
    put(&db, None, b"after", b"recovery").unwrap();
}

#[test]
fn recovery_needs_exclusive_region() {
    let dir = tempdir().unwrap();
    let _shared = open_env(dir.path(), EnvFlags::empty());
    let mut recovering = EnvHandle::create().unwrap();
    assert_eq!(
        recovering.open(dir.path(), env_flags() | EnvFlags::RECOVER, 0),
        Err(Errno::AGAIN)
    );
}

#[test]
fn nowait_conflict_is_not_granted() {
    let dir = tempdir().unwrap();
    let env = open_env(dir.path(), EnvFlags::empty());
    let db = open_db(&env, "locks.db", DbType::BTree);

    let holder = env.txn_begin(None, TxnFlags::empty()).unwrap();
    put(&db, Some(&holder), b"k", b"1").unwrap();

    let impatient = env.txn_begin(None, TxnFlags::NOWAIT).unwrap();
    let err = put(&db, Some(&impatient), b"k", b"2").unwrap_err();
    assert_eq!(err, Errno::LOCK_NOT_GRANTED);
    assert!(err.kind().is_retryable());
    impatient.abort().unwrap();

    // Reads never block on the writer.
    assert_eq!(get(&db, None, b"k"), Err(Errno::NOT_FOUND));
    holder.commit(CommitFlags::empty()).unwrap();
    assert_eq!(get(&db, None, b"k").unwrap(), b"1");
}

#[test]
fn crossed_writers_deadlock() {
    let dir = tempdir().unwrap();
    let env = Arc::new(open_env(dir.path(), EnvFlags::empty()));
    let db = Arc::new(open_db(&env, "deadlock.db", DbType::BTree));

    let first = env.txn_begin(None, TxnFlags::empty()).unwrap();
    put(&db, Some(&first), b"a", b"1").unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let other = {
        let (env, db, barrier) = (Arc::clone(&env), Arc::clone(&db), Arc::clone(&barrier));
        thread::spawn(move || {
            let second = env.txn_begin(None, TxnFlags::empty()).unwrap();
            put(&db, Some(&second), b"b", b"2").unwrap();
            barrier.wait();
            let result = put(&db, Some(&second), b"a", b"2");
            match result {
                Ok(()) => second.commit(CommitFlags::empty()).map(|()| true),
                Err(err) => {
                    second.abort().unwrap();
                    Err(err)
                }
            }
        })
    };

    barrier.wait();
    thread::sleep(Duration::from_millis(50));
    let mine = put(&db, Some(&first), b"b", b"1");
    match mine {
        Ok(()) => {
            first.commit(CommitFlags::empty()).unwrap();
            assert_eq!(other.join().unwrap(), Err(Errno::LOCK_DEADLOCK));
        }
        Err(err) => {
            assert_eq!(err, Errno::LOCK_DEADLOCK);
            first.abort().unwrap();
            assert_eq!(other.join().unwrap(), Ok(true));
        }
    }
}

#[test]
fn consume_wait_blocks_until_produced() {
    let dir = tempdir().unwrap();
    let env = Arc::new(open_env(dir.path(), EnvFlags::empty()));
    let db = Arc::new(open_db(&env, "queue.db", DbType::Queue));

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let mut key = Thang::fixed();
                let mut data = Thang::owned();
                db.get(None, &mut key, &mut data, GetFlags::CONSUME_WAIT)
                    .unwrap();
                data.into_vec()
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    for value in [b"x", b"y", b"z"] {
        let mut key = Thang::fixed();
        db.put(None, &mut key, &Thang::Borrowed(value), PutFlags::APPEND)
            .unwrap();
    }

    let mut received: Vec<Vec<u8>> = consumers.into_iter().map(|c| c.join().unwrap()).collect();
    received.sort();
    assert_eq!(received, vec![b"x".to_vec(), b"y".to_vec(), b"z".to_vec()]);
}

#[test]
fn snapshot_reads_frozen_rows() {
    let dir = tempdir().unwrap();
    let env = open_env(dir.path(), EnvFlags::empty());
    let mut db = DbHandle::create(Some(&env)).unwrap();
    db.open(
        None,
        Some(Path::new("mvcc.db")),
        None,
        DbType::BTree,
        OpenFlags::CREATE | OpenFlags::MULTIVERSION,
        0,
    )
    .unwrap();
    put(&db, None, b"k", b"old").unwrap();

    let snapshot = env.txn_begin(None, TxnFlags::SNAPSHOT).unwrap();
    assert_eq!(get(&db, Some(&snapshot), b"k").unwrap(), b"old");
    put(&db, None, b"k", b"new").unwrap();
    assert_eq!(get(&db, Some(&snapshot), b"k").unwrap(), b"old");
    assert_eq!(put(&db, Some(&snapshot), b"k", b"mine"), Err(Errno::LOCK_DEADLOCK));
    snapshot.abort().unwrap();
}

#[test]
fn cursor_in_transaction_sees_own_writes() {
    let dir = tempdir().unwrap();
    let env = open_env(dir.path(), EnvFlags::empty());
    let db = open_db(&env, "cursor.db", DbType::BTree);
    put(&db, None, b"b", b"2").unwrap();

    let txn = env.txn_begin(None, TxnFlags::empty()).unwrap();
    put(&db, Some(&txn), b"a", b"1").unwrap();
    let mut cursor = db.cursor(Some(&txn)).unwrap();
    let mut key = Thang::owned();
    let mut data = Thang::owned();
    cursor.get(&mut key, &mut data, CursorOp::First).unwrap();
    assert_eq!(key.as_bytes(), b"a");
    cursor.close().unwrap();
    txn.abort().unwrap();

    let mut cursor = db.cursor(None).unwrap();
    let mut key = Thang::owned();
    cursor.get(&mut key, &mut Thang::owned(), CursorOp::First).unwrap();
    assert_eq!(key.as_bytes(), b"b");
}

#[test]
fn named_databases_share_a_file() {
    let dir = tempdir().unwrap();
    let env = open_env(dir.path(), EnvFlags::empty());
    let mut left = DbHandle::create(Some(&env)).unwrap();
    left.open(None, Some(Path::new("multi.db")), Some("left"), DbType::BTree, OpenFlags::CREATE, 0)
        .unwrap();
    let mut right = DbHandle::create(Some(&env)).unwrap();
    right
        .open(None, Some(Path::new("multi.db")), Some("right"), DbType::Recno, OpenFlags::CREATE, 0)
        .unwrap();

    put(&left, None, b"k", b"left").unwrap();
    assert_eq!(get(&left, None, b"k").unwrap(), b"left");
    assert_eq!(right.get_type().unwrap(), DbType::Recno);
    left.close(CloseFlags::empty()).unwrap();
    right.close(CloseFlags::NOSYNC).unwrap();
}

#[test]
fn named_memory_database_is_shared_in_environment() {
    let dir = tempdir().unwrap();
    let env = open_env(dir.path(), EnvFlags::empty());
    let mut writer = DbHandle::create(Some(&env)).unwrap();
    writer
        .open(None, None, Some("scratch"), DbType::BTree, OpenFlags::CREATE, 0)
        .unwrap();
    put(&writer, None, b"k", b"v").unwrap();

    let mut reader = DbHandle::create(Some(&env)).unwrap();
    reader
        .open(None, None, Some("scratch"), DbType::BTree, OpenFlags::empty(), 0)
        .unwrap();
    assert_eq!(get(&reader, None, b"k").unwrap(), b"v");
}

#[test]
fn truncate_empties_the_file() {
    let dir = tempdir().unwrap();
    let env = open_env(dir.path(), EnvFlags::empty());
    let db = open_db(&env, "trunc.db", DbType::BTree);
    put(&db, None, b"k", b"v").unwrap();

    let mut again = DbHandle::create(Some(&env)).unwrap();
    again
        .open(None, Some(Path::new("trunc.db")), None, DbType::BTree, OpenFlags::TRUNCATE, 0)
        .unwrap();
    assert_eq!(get(&again, None, b"k"), Err(Errno::NOT_FOUND));
}

#[cfg(feature = "encryption")]
#[test]
fn encrypted_database_needs_its_password() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("secret.db");
    {
        let mut db = DbHandle::create(None).unwrap();
        db.set_encrypt("hunter2").unwrap();
        db.open(None, Some(&path), None, DbType::BTree, OpenFlags::CREATE, 0)
            .unwrap();
        put(&db, None, b"plain-key", b"plain-value").unwrap();
    }

    let raw = std::fs::read(&path).unwrap();
    assert!(!raw.windows(11).any(|w| w == b"plain-value"));

    let mut wrong = DbHandle::create(None).unwrap();
    wrong.set_encrypt("hunter3").unwrap();
    assert_eq!(
        wrong.open(None, Some(&path), None, DbType::BTree, OpenFlags::empty(), 0),
        Err(Errno::ACCESS)
    );

    let mut missing = DbHandle::create(None).unwrap();
    assert_eq!(
        missing.open(None, Some(&path), None, DbType::BTree, OpenFlags::empty(), 0),
        Err(Errno::INVALID)
    );

    let mut right = DbHandle::create(None).unwrap();
    right.set_encrypt("hunter2").unwrap();
    right
        .open(None, Some(&path), None, DbType::BTree, OpenFlags::empty(), 0)
        .unwrap();
    assert_eq!(get(&right, None, b"plain-key").unwrap(), b"plain-value");
}
