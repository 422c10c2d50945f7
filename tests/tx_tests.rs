//! Transactions, savepoints, and rollback semantics.

use dotdb::{Database, DbError, Durability, LockMode, OpenOptions, Value};
use tempfile::tempdir;

fn json(text: &str) -> Value {
    Value::from_json(text).unwrap()
}

fn open(path: &std::path::Path) -> Database {
    Database::open(
        path,
        OpenOptions::new()
            .durability(Durability::Sync)
            .lock_mode(LockMode::None),
    )
    .unwrap()
}

#[test]
fn test_commit_publishes_all_writes() {
    let dir = tempdir().unwrap();
    let db = open(&dir.path().join("app.db"));

    let total = db
        .transaction(|tx| {
            tx.set("bank.alice", 50)?;
            tx.set("bank.bob", 30)?;
            tx.add("bank.total", 80.0)
        })
        .unwrap();
    assert_eq!(total, 80.0);
    assert_eq!(db.get("bank.alice"), Some(Value::from(50)));
    assert_eq!(db.get("bank.total"), Some(Value::from(80)));
    db.close().unwrap();
}

#[test]
fn test_error_rolls_back_to_pre_image() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.db");
    let db = open(&path);

    db.set("bank.alice", 10).unwrap();
    let before = db.get("bank").unwrap();

    let err = db
        .transaction(|tx| -> dotdb::Result<()> {
            tx.set("bank.alice", 999)?;
            tx.set("bank.mallory", 1)?;
            Err(DbError::Validation("insufficient funds".into()))
        })
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));
    assert_eq!(db.get("bank"), Some(before));

    // No record of the aborted span survives replay.
    std::mem::forget(db);
    let db = open(&path);
    assert_eq!(db.get("bank.alice"), Some(Value::from(10)));
    assert!(!db.has("bank.mallory"));
    db.close().unwrap();
}

#[test]
fn test_savepoint_rollback_to() {
    let dir = tempdir().unwrap();
    let db = open(&dir.path().join("app.db"));

    db.set("bank.bob", 12).unwrap();
    db.transaction(|tx| {
        tx.set("bank.alice", 50)?;
        tx.savepoint("sp1");
        tx.set("bank.bob", 80)?;
        tx.set("bank.charlie", 20)?;
        tx.rollback_to("sp1")
    })
    .unwrap();

    assert_eq!(
        db.get("bank"),
        Some(json(r#"{"bob":12.0,"alice":50.0}"#))
    );
    assert!(!db.has("bank.charlie"));
    db.close().unwrap();
}

#[test]
fn test_rollback_to_unknown_savepoint_is_conflict() {
    let dir = tempdir().unwrap();
    let db = open(&dir.path().join("app.db"));

    let err = db
        .transaction(|tx| {
            tx.set("a", 1)?;
            tx.rollback_to("nope")
        })
        .unwrap_err();
    assert!(matches!(err, DbError::TxConflict(name) if name == "nope"));
    // The conflict aborted the whole transaction.
    assert!(!db.has("a"));
    db.close().unwrap();
}

#[test]
fn test_savepoint_is_reusable_after_rollback() {
    let dir = tempdir().unwrap();
    let db = open(&dir.path().join("app.db"));

    db.transaction(|tx| {
        tx.set("n", 1)?;
        tx.savepoint("base");
        tx.set("n", 2)?;
        tx.rollback_to("base")?;
        tx.set("n", 3)?;
        tx.rollback_to("base")?;
        tx.set("n", 4)?;
        Ok(())
    })
    .unwrap();
    assert_eq!(db.get("n"), Some(Value::from(4)));
    db.close().unwrap();
}

#[test]
fn test_nested_transaction_rolls_back_as_savepoint() {
    let dir = tempdir().unwrap();
    let db = open(&dir.path().join("app.db"));

    db.transaction(|tx| {
        tx.set("outer", 1)?;
        let inner: dotdb::Result<()> = tx.transaction(|tx| {
            tx.set("inner", 2)?;
            Err(DbError::Validation("abort inner".into()))
        });
        assert!(inner.is_err());
        tx.set("after", 3)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(db.get("outer"), Some(Value::from(1)));
    assert_eq!(db.get("after"), Some(Value::from(3)));
    assert!(!db.has("inner"));
    db.close().unwrap();
}

#[test]
fn test_transaction_reads_its_own_writes() {
    let dir = tempdir().unwrap();
    let db = open(&dir.path().join("app.db"));

    db.transaction(|tx| {
        tx.set("x", 7)?;
        assert_eq!(tx.get("x"), Some(Value::from(7)));
        assert!(tx.has("x"));
        assert_eq!(tx.subtract("x", 2.0)?, 5.0);
        tx.set("x", 7)?;
        Ok(())
    })
    .unwrap();
    assert_eq!(db.get("x"), Some(Value::from(7)));
    db.close().unwrap();
}

#[test]
fn test_transaction_atomic_without_wal() {
    // Pre-image atomicity holds under Durability::None as well.
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path().join("app.db"), OpenOptions::new()).unwrap();

    db.set("k", 1).unwrap();
    let _ = db.transaction(|tx| -> dotdb::Result<()> {
        tx.set("k", 2)?;
        Err(DbError::Validation("no".into()))
    });
    assert_eq!(db.get("k"), Some(Value::from(1)));
    db.close().unwrap();
}
