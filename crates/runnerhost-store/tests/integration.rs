//! Integration tests for runnerhost-store against an on-disk database.

use runnerhost_store::{Database, RunnerRecord, RunnerRecordStore, RunnerStateStore};

fn record(id: &str) -> RunnerRecord {
    RunnerRecord {
        id: id.into(),
        name: "Example".into(),
        version: 0.8,
        environment: "source".into(),
        intents: vec!["chapters".into()],
        backend: "isolated".into(),
        info: serde_json::json!({ "id": id, "name": "Example", "version": 0.8 }),
        updated_at: 0,
    }
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runnerhost.db");

    {
        let db = Database::open_and_migrate(path.clone()).await.unwrap();
        let state = RunnerStateStore::new(db);
        state.set("com.example", "session", "{\"token\":\"abc\"}").await.unwrap();
    }

    let db = Database::open_and_migrate(path.clone()).await.unwrap();
    let state = RunnerStateStore::new(db);
    assert_eq!(
        state.get("com.example", "session").await.unwrap().as_deref(),
        Some("{\"token\":\"abc\"}")
    );
    assert!(path.exists());
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runnerhost.db");

    {
        let db = Database::open_and_migrate(path.clone()).await.unwrap();
        RunnerRecordStore::new(db).save(&record("com.example")).await.unwrap();
    }

    let db = Database::open_and_migrate(path).await.unwrap();
    let records = RunnerRecordStore::new(db);
    let loaded = records.get("com.example").await.unwrap().unwrap();
    assert_eq!(loaded, record("com.example"));
    assert_eq!(records.cache().stats().misses(), 1);

    records.get("com.example").await.unwrap();
    assert_eq!(records.cache().stats().hits(), 1);
}

#[tokio::test]
async fn state_and_records_share_one_database() {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().await.unwrap();

    let state = RunnerStateStore::new(db.clone());
    let records = RunnerRecordStore::new(db.clone());

    state.set("r", "k", "1").await.unwrap();
    records.save(&record("r")).await.unwrap();

    let (s, r): (i64, i64) = db
        .execute(|conn| {
            let s = conn.query_row("SELECT count(*) FROM runner_state", [], |row| row.get(0))?;
            let r = conn.query_row("SELECT count(*) FROM runners", [], |row| row.get(0))?;
            Ok((s, r))
        })
        .await
        .unwrap();
    assert_eq!((s, r), (1, 1));
}
