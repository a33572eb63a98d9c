//! Query executor tests against SQLite.

use super::common::{no_autocommit, TestDb};
use pretty_assertions::assert_eq;
use serde_json::json;
use testbench_db::config::ClientOptions;
use testbench_db::db::{DatabaseClient, Value};
use testbench_db::error::TestbenchError;
use testbench_db::query::{OrEmpty, QueryExecutor, StatementOutcome};

async fn device_count(db: &TestDb) -> i64 {
    let client = db.open(ClientOptions::default()).await;
    let result = client
        .fetch_all("SELECT COUNT(*) AS N FROM DEVICE_INSTANCE", &[])
        .await
        .unwrap();
    client.close().await.unwrap();
    match result.rows[0][0] {
        Value::Int(n) => n,
        ref other => panic!("Expected integer count, got {other:?}"),
    }
}

#[tokio::test]
async fn test_read_returns_records_in_column_order() {
    let db = TestDb::seeded().await;
    let client = db.open(ClientOptions::default()).await;
    let executor = QueryExecutor::new(&client, &ClientOptions::default());

    let records = executor
        .execute_to_records(
            "select ID, NAME from DEVICE_INSTANCE where ID = $1",
            &[Value::Int(2)],
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].keys().collect::<Vec<_>>(), vec!["ID", "NAME"]);
    assert_eq!(records[0].to_json(), json!({"ID": 2, "NAME": "load"}));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_read_keeps_columns() {
    let db = TestDb::seeded().await;
    let client = db.open(ClientOptions::default()).await;
    let executor = QueryExecutor::new(&client, &ClientOptions::default());

    let outcome = executor
        .execute("SELECT * FROM DEVICE_INSTANCE WHERE ID = $1", &[Value::Int(-1)])
        .await
        .unwrap();

    match outcome {
        StatementOutcome::Rows(result) => {
            assert!(result.is_empty());
            assert_eq!(result.column_names(), vec!["ID", "NAME", "SERIAL"]);
        }
        other => panic!("Expected rows, got {other:?}"),
    }
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_committed_write_visible_to_next_session() {
    let db = TestDb::seeded().await;
    let client = db.open(ClientOptions::default()).await;
    let executor = QueryExecutor::new(&client, &ClientOptions::default());

    let affected = executor
        .execute_write(
            "INSERT INTO DEVICE_INSTANCE (ID, NAME, SERIAL) VALUES ($1, $2, $3)",
            &[Value::Int(3), Value::from("psu"), Value::from("SN-003")],
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);
    client.close().await.unwrap();

    assert_eq!(device_count(&db).await, 3);
}

#[tokio::test]
async fn test_uncommitted_write_discarded_on_close() {
    let db = TestDb::seeded().await;
    let options = no_autocommit();
    let client = db.open(options).await;
    let executor = QueryExecutor::new(&client, &options);

    let affected = executor
        .execute_write("DELETE FROM DEVICE_INSTANCE", &[])
        .await
        .unwrap();
    assert_eq!(affected, 2);
    client.close().await.unwrap();

    assert_eq!(device_count(&db).await, 2);
}

#[tokio::test]
async fn test_write_matching_nothing_returns_zero() {
    let db = TestDb::seeded().await;
    let client = db.open(ClientOptions::default()).await;
    let executor = QueryExecutor::new(&client, &ClientOptions::default());

    let outcome = executor
        .execute(
            "UPDATE DEVICE_INSTANCE SET NAME = $1 WHERE ID = $2",
            &[Value::from("x"), Value::Int(404)],
        )
        .await
        .unwrap();

    assert_eq!(outcome, StatementOutcome::Affected(0));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_failure_rolls_back_open_transaction() {
    let db = TestDb::seeded().await;
    let options = no_autocommit();
    let client = db.open(options).await;
    let executor = QueryExecutor::new(&client, &options);

    executor
        .execute_write("DELETE FROM DEVICE_INSTANCE WHERE ID = $1", &[Value::Int(1)])
        .await
        .unwrap();

    let err = executor
        .execute_write("INSERT INTO NO_SUCH_TABLE VALUES (1)", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, TestbenchError::Query(_)));

    // The delete went down with the failed statement.
    client.commit().await.unwrap();
    client.close().await.unwrap();
    assert_eq!(device_count(&db).await, 2);
}

#[tokio::test]
async fn test_or_empty_collapses_failure() {
    let db = TestDb::seeded().await;
    let client = db.open(ClientOptions::default()).await;
    let executor = QueryExecutor::new(&client, &ClientOptions::default());

    let records = executor
        .execute_to_records("SELEC nonsense", &[])
        .await
        .or_empty();
    assert!(records.is_empty());

    let affected = executor
        .execute_write("UPDATE NO_SUCH_TABLE SET A = 1", &[])
        .await
        .or_empty();
    assert_eq!(affected, 0);
    client.close().await.unwrap();
}
