use std::sync::Arc;

use chrono::{Duration, Utc};

use promise_ledger::commands::Commands;
use promise_ledger::config::{Backend, LedgerConfig};
use promise_ledger::models::{Decision, Difficulty, Outcome, Promise, User};
use promise_ledger::services::{
    AuditLog, Collection, FileStore, MemoryStore, RecordStore, Records, SqliteStore,
};
use promise_ledger::{LedgerError, StorageError};

fn deadline() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::days(1)
}

#[test]
fn missing_collections_read_as_empty() {
    let records = Records::new(Arc::new(MemoryStore::new()));
    let users: Vec<User> = records.read(Collection::Users).expect("read");
    assert!(users.is_empty());

    let l = Commands::with_store(Arc::new(MemoryStore::new()), AuditLog::disabled());
    let stats = l.stats().expect("stats");
    assert_eq!(stats.total_promises, 0);
    assert_eq!(stats.top_performer, None);
}

#[test]
fn corrupt_collections_surface_storage_errors() {
    let store = Arc::new(MemoryStore::new());
    store.plant(Collection::Promises, b"{ not json");
    let l = Commands::with_store(store.clone(), AuditLog::disabled());

    let err = l.get_promises().unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Storage(StorageError::Corrupt {
            collection: Collection::Promises,
            ..
        })
    ));

    let err = l
        .create_promise("0xabc", "x", deadline(), "c", Difficulty::Easy)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(StorageError::Corrupt { .. })));
    assert_eq!(
        store.raw(Collection::Promises).as_deref(),
        Some(&b"{ not json"[..]),
        "corrupt bytes must not be overwritten with an empty default"
    );
}

#[test]
fn failed_write_rolls_back_the_whole_unit() {
    let store = Arc::new(MemoryStore::new());
    let l = Commands::with_store(store.clone(), AuditLog::disabled());
    let id = l
        .create_promise("0xabc", "first", deadline(), "c", Difficulty::Easy)
        .expect("create")
        .id;

    let users_before = store.raw(Collection::Users);
    let promises_before = store.raw(Collection::Promises);
    let stats_before = store.raw(Collection::Stats);

    // users and promises are written before stats; failing stats forces a rollback
    store.fail_next_write(Collection::Stats);
    let err = l
        .update_promise_status(&id, Outcome::Completed, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(StorageError::Injected(_))));

    assert_eq!(store.raw(Collection::Users), users_before);
    assert_eq!(store.raw(Collection::Promises), promises_before);
    assert_eq!(store.raw(Collection::Stats), stats_before);
    assert_eq!(l.get_user("0xabc").expect("user").reputation, 0);

    // the promise is still active, so a retry succeeds exactly once
    l.update_promise_status(&id, Outcome::Completed, None)
        .expect("retry");
    assert_eq!(l.get_user("0xabc").expect("user").reputation, 10);
}

#[test]
fn failed_first_commit_leaves_collections_uninitialized() {
    let store = Arc::new(MemoryStore::new());
    let l = Commands::with_store(store.clone(), AuditLog::disabled());

    store.fail_next_write(Collection::Promises);
    let err = l
        .create_promise("0xabc", "x", deadline(), "c", Difficulty::Easy)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));
    assert_eq!(store.raw(Collection::Users), None);
    assert_eq!(store.raw(Collection::Promises), None);
    assert_eq!(store.raw(Collection::Stats), None);
}

#[test]
fn approval_rollback_keeps_promise_and_counter() {
    let store = Arc::new(MemoryStore::new());
    let l = Commands::with_store(store.clone(), AuditLog::disabled());
    let id = l
        .create_promise("0xabc", "x", deadline(), "c", Difficulty::Easy)
        .expect("create")
        .id;
    let req = l.request_deletion(&id, "0xabc").expect("request");

    store.fail_next_write(Collection::DeleteRequests);
    assert!(l.resolve(&req.id, Decision::Approved, "0xadmin").is_err());

    assert!(l.get_promise(&id).is_ok());
    assert_eq!(l.get_user("0xabc").expect("user").total_promises, 1);
    assert_eq!(l.stats().expect("stats").total_promises, 1);
    assert!(l.resolve(&req.id, Decision::Approved, "0xadmin").is_ok());
}

#[test]
fn undeclared_collections_are_refused() {
    let records = Records::new(Arc::new(MemoryStore::new()));
    let mut uow = records.begin(&[Collection::Promises]).expect("begin");
    assert!(uow.promises().is_ok());
    assert!(matches!(
        uow.users_mut().unwrap_err(),
        StorageError::Undeclared(Collection::Users)
    ));
}

#[test]
fn file_store_replaces_atomically_and_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStore::open(dir.path().join("data")).expect("open");
    assert_eq!(store.read(Collection::Users).expect("read"), None);

    store.write(Collection::Users, b"[]").expect("write");
    store.write(Collection::Users, b"[ ]").expect("overwrite");
    assert_eq!(store.read(Collection::Users).expect("read").as_deref(), Some(&b"[ ]"[..]));
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("data"))
        .expect("list")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".staged") || n.ends_with(".tmp") || n == "commit.journal")
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");

    let l = Commands::with_store(Arc::new(store.clone()), AuditLog::disabled());
    let id = l
        .create_promise("0xabc", "persist me", deadline(), "c", Difficulty::Easy)
        .expect("create")
        .id;
    drop(l);

    let reopened = Commands::with_store(
        Arc::new(FileStore::open(dir.path().join("data")).expect("reopen")),
        AuditLog::disabled(),
    );
    let p: Promise = reopened.get_promise(&id).expect("persisted");
    assert_eq!(p.message, "persist me");
}

#[test]
fn sqlite_store_round_trips_and_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("ledger.db");
    {
        let store = SqliteStore::open(&db).expect("open");
        assert_eq!(store.read(Collection::Stats).expect("read"), None);
        let l = Commands::with_store(Arc::new(store), AuditLog::disabled());
        let id = l
            .create_promise("0xabc", "sql", deadline(), "c", Difficulty::Hard)
            .expect("create")
            .id;
        l.update_promise_status(&id, Outcome::Completed, None)
            .expect("complete");
    }
    let l = Commands::with_store(
        Arc::new(SqliteStore::open(&db).expect("reopen")),
        AuditLog::disabled(),
    );
    assert_eq!(l.get_user("0xabc").expect("user").reputation, 10);
    assert_eq!(l.stats().expect("stats").completion_rate, 100.0);

    let mem = SqliteStore::open_in_memory().expect("memory db");
    assert_eq!(mem.read(Collection::Sessions).expect("read"), None);
    mem.write(Collection::Sessions, b"[]").expect("write");
    assert_eq!(mem.read(Collection::Sessions).expect("read").as_deref(), Some(&b"[]"[..]));
}

#[test]
fn sqlite_failed_unit_rolls_back_every_collection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("ledger.db");
    let store = Arc::new(SqliteStore::open(&db).expect("open"));
    let l = Commands::with_store(store.clone(), AuditLog::disabled());
    let id = l
        .create_promise("0xabc", "x", deadline(), "c", Difficulty::Easy)
        .expect("create")
        .id;
    let users_before = store.read(Collection::Users).expect("read");
    let promises_before = store.read(Collection::Promises).expect("read");

    // stats is the last row the unit writes; refusing it aborts the whole unit
    let side = rusqlite::Connection::open(&db).expect("side connection");
    side.execute_batch(
        r#"
        CREATE TRIGGER refuse_stats_insert BEFORE INSERT ON collections
          WHEN NEW.name = 'stats' BEGIN SELECT RAISE(ABORT, 'stats refused'); END;
        CREATE TRIGGER refuse_stats_update BEFORE UPDATE ON collections
          WHEN NEW.name = 'stats' BEGIN SELECT RAISE(ABORT, 'stats refused'); END;
        "#,
    )
    .expect("triggers");

    let err = l
        .update_promise_status(&id, Outcome::Completed, None)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(StorageError::Sqlite(_))));
    assert_eq!(store.read(Collection::Users).expect("read"), users_before);
    assert_eq!(store.read(Collection::Promises).expect("read"), promises_before);

    side.execute_batch("DROP TRIGGER refuse_stats_insert; DROP TRIGGER refuse_stats_update;")
        .expect("drop triggers");
    l.update_promise_status(&id, Outcome::Completed, None)
        .expect("retry");
    assert_eq!(l.get_user("0xabc").expect("user").reputation, 10);
}

#[test]
fn file_failed_unit_leaves_files_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(FileStore::open(dir.path()).expect("open"));
    let l = Commands::with_store(store.clone(), AuditLog::disabled());
    let id = l
        .create_promise("0xabc", "x", deadline(), "c", Difficulty::Easy)
        .expect("create")
        .id;
    let req = l.request_deletion(&id, "0xabc").expect("request");
    let users_before = std::fs::read(store.path_for(Collection::Users)).expect("users");
    let promises_before = std::fs::read(store.path_for(Collection::Promises)).expect("promises");

    // an unreadable stats snapshot fails the approval after users, promises
    // and delete requests were already edited in memory
    let stats = store.path_for(Collection::Stats);
    std::fs::remove_file(&stats).expect("remove stats");
    std::fs::create_dir(&stats).expect("squat stats");

    let err = l
        .resolve(&req.id, Decision::Approved, "0xadmin")
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Storage(StorageError::Io {
            collection: Collection::Stats,
            ..
        })
    ));
    assert_eq!(std::fs::read(store.path_for(Collection::Users)).expect("users"), users_before);
    assert_eq!(
        std::fs::read(store.path_for(Collection::Promises)).expect("promises"),
        promises_before
    );
    assert!(!dir.path().join("commit.journal").exists());

    std::fs::remove_dir(&stats).expect("unsquat");
    l.resolve(&req.id, Decision::Approved, "0xadmin")
        .expect("approve");
    assert!(l.get_promise(&id).is_err());
    assert_eq!(l.get_user("0xabc").expect("user").total_promises, 0);
    assert_eq!(l.stats().expect("stats").total_promises, 0);
}

#[test]
fn open_initializes_root_and_writes_audit_trail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("ledger");

    let l = Commands::open(&root).expect("open");
    assert!(root.join("config.toml").exists());
    assert!(root.join("data").is_dir());

    l.create_promise("0xabc", "audited", deadline(), "c", Difficulty::Easy)
        .expect("create");
    let log = std::fs::read_to_string(root.join("logbook/actions.jsonl")).expect("audit log");
    let line: serde_json::Value =
        serde_json::from_str(log.lines().last().expect("one line")).expect("json line");
    assert_eq!(line["action"], "promise_created");
    assert_eq!(line["details"]["address"], "0xabc");

    // idempotent; a second open sees the same data
    let again = Commands::open(&root).expect("reopen");
    assert_eq!(again.get_promises().expect("list").len(), 1);
}

#[test]
fn config_selects_sqlite_backend() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("config.toml"),
        "[storage]\nbackend = \"sqlite\"\npath = \"db/ledger.db\"\n\n[audit]\nenabled = false\n",
    )
    .expect("write config");

    let cfg = LedgerConfig::load(dir.path()).expect("load");
    assert_eq!(cfg.storage.backend, Backend::Sqlite);
    assert_eq!(cfg.storage.path, dir.path().join("db/ledger.db"));
    assert!(!cfg.audit.enabled);

    let l = Commands::open(dir.path()).expect("open");
    l.touch_session("s1", "1.2.3.4").expect("session");
    assert!(dir.path().join("db/ledger.db").exists());
    assert!(!dir.path().join("logbook/actions.jsonl").exists());
}

#[test]
fn missing_config_uses_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = LedgerConfig::load(dir.path()).expect("load");
    assert_eq!(cfg.storage.backend, Backend::Json);
    assert_eq!(cfg.storage.path, dir.path().join("data"));
    assert!(cfg.audit.enabled);
}
