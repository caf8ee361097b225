use datafusion::prelude::{ParquetReadOptions, SessionContext};
use pg2parquet::db::PgConnector;
use pg2parquet::pipeline::Pipeline;

use crate::support::{env_for, write_query, FakeConnector, RecordingSinks};

// staging, 3 rows x 5 columns -> 200 and a real file on disk
#[tokio::test]
async fn test_staging_writes_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let env = env_for("staging", &out, &write_query(dir.path()));

    let res = Pipeline::new(FakeConnector::new(), RecordingSinks::default())
        .invoke(|k| env.get(k).cloned())
        .await;

    assert_eq!(res.status_code, 200);
    assert_eq!(res.body, "\"Success\"");

    let file = out.join("test.parquet");
    assert!(file.exists());

    let ctx = SessionContext::new();
    let df = ctx
        .read_parquet(file.to_str().unwrap(), ParquetReadOptions::default())
        .await
        .unwrap();
    assert_eq!(df.schema().fields().len(), 5);
    assert_eq!(df.count().await.unwrap(), 3);
}

// production, database unreachable -> 500 with connection text, nothing stored
#[tokio::test]
async fn test_unreachable_database() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = env_for("production", dir.path(), &write_query(dir.path()));
    env.insert("DB_HOST_PROD".into(), "127.0.0.1".into());
    env.insert("DB_PORT_PROD".into(), "1".into());
    let sinks = RecordingSinks::default();

    let res = Pipeline::new(PgConnector::new(), sinks.clone())
        .invoke(|k| env.get(k).cloned())
        .await;

    assert_eq!(res.status_code, 500);
    assert!(res.body.contains("connection"), "body: {}", res.body);
    assert!(sinks.requested().is_empty());
    assert!(sinks.uploads.lock().unwrap().is_empty());
}

// query fails -> 500 with query text, connection closed
#[tokio::test]
async fn test_query_failure() {
    let dir = tempfile::tempdir().unwrap();
    let env = env_for("staging", dir.path(), &write_query(dir.path()));
    let db = FakeConnector::new().failing_query("syntax error at or near \"SELEC\"");
    let counters = db.counters.clone();

    let res = Pipeline::new(db, RecordingSinks::default())
        .invoke(|k| env.get(k).cloned())
        .await;

    assert_eq!(res.status_code, 500);
    assert_eq!(
        res.body,
        "Error: Database query error: syntax error at or near \"SELEC\""
    );
    assert_eq!(counters.closes(), 1);
}

// write fails after a good query -> 500 with write text, connection closed
#[tokio::test]
async fn test_write_permission_failure() {
    let dir = tempfile::tempdir().unwrap();
    let env = env_for("production", dir.path(), &write_query(dir.path()));
    let db = FakeConnector::new();
    let counters = db.counters.clone();

    let res = Pipeline::new(db, RecordingSinks::failing("AccessDenied: Access Denied"))
        .invoke(|k| env.get(k).cloned())
        .await;

    assert_eq!(res.status_code, 500);
    assert_eq!(res.body, "Error: Error writing data: AccessDenied: Access Denied");
    assert_eq!(counters.queries(), 1);
    assert_eq!(counters.closes(), 1);
}

#[tokio::test]
async fn test_unwritable_local_path() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let env = env_for("staging", &blocker, &write_query(dir.path()));
    let db = FakeConnector::new();
    let counters = db.counters.clone();

    let res = Pipeline::new(db, RecordingSinks::default())
        .invoke(|k| env.get(k).cloned())
        .await;

    assert_eq!(res.status_code, 500);
    assert!(res.body.starts_with("Error: Error writing data: "));
    assert_eq!(counters.closes(), 1);
}
