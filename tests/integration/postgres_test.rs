//! PostgreSQL tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable to run them.

use pretty_assertions::assert_eq;
use serde_json::json;
use testbench_db::config::{ClientOptions, ConnectionConfig};
use testbench_db::db::{DatabaseClient, PostgresClient, Value};
use testbench_db::query::{QueryExecutor, StatementOutcome};
use testbench_db::records::RecordAssembler;

const SCHEMA: &[&str] = &[
    "CREATE TABLE TEST_TYPE (ID INTEGER PRIMARY KEY, TEST_PARAMETERS JSONB)",
    "CREATE TABLE TEST_INSTANCE (ID INTEGER PRIMARY KEY, TEST_TYPE_ID INTEGER, CONFIG JSONB)",
    "CREATE TABLE DATA_INSTANCE (ID INTEGER PRIMARY KEY, TEST_INSTANCE_ID INTEGER, TRIAL INTEGER, DATA JSONB)",
    "CREATE TABLE DEVICE_INSTANCE (ID INTEGER PRIMARY KEY, NAME VARCHAR(64), CREATED TIMESTAMPTZ, GAIN NUMERIC)",
    r#"INSERT INTO TEST_TYPE VALUES (100, '{"p": 1}')"#,
    r#"INSERT INTO TEST_INSTANCE VALUES (1, 100, '{"k": "v"}')"#,
    r#"INSERT INTO DATA_INSTANCE VALUES (10, 1, 1, '{"x": 1.5}')"#,
    r#"INSERT INTO DATA_INSTANCE VALUES (11, 1, 2, '{"x": 2.5}')"#,
    "INSERT INTO DEVICE_INSTANCE VALUES (1, 'scope', '2024-03-01 12:30:00+00', 1.25)",
];

/// Helper to create a test client.
async fn get_test_client(options: ClientOptions) -> Option<PostgresClient> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = ConnectionConfig::from_dsn(url);
    PostgresClient::connect(&config, options).await.ok()
}

#[tokio::test]
async fn test_bound_parameters_and_jsonb() {
    let Some(client) = get_test_client(ClientOptions::default()).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let executor = QueryExecutor::new(&client, &ClientOptions::default());

    let records = executor
        .execute_to_records(
            "SELECT $1::bigint AS id, '{\"k\": \"v\"}'::jsonb AS config",
            &[Value::Int(7)],
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].to_json(), json!({"id": 7, "config": {"k": "v"}}));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_temp_table_write_and_rollback() {
    let options = ClientOptions {
        autocommit_after_write: false,
        ..ClientOptions::default()
    };
    let Some(client) = get_test_client(options).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let executor = QueryExecutor::new(&client, &options);

    executor
        .execute_write("CREATE TEMP TABLE bench_probe (id BIGINT)", &[])
        .await
        .unwrap();
    let outcome = executor
        .execute("INSERT INTO bench_probe VALUES ($1), ($2)", &[Value::Int(1), Value::Int(2)])
        .await
        .unwrap();
    assert_eq!(outcome, StatementOutcome::Affected(2));

    client.rollback().await.unwrap();

    // The table itself was created inside the rolled-back transaction.
    let result = executor.execute("SELECT * FROM bench_probe", &[]).await;
    assert!(result.is_err());
    client.close().await.unwrap();
}

/// Seeds the test bench tables in a scratch schema and returns a config whose
/// search path points at it.
async fn seeded_schema(url: &str, schema: &str) -> ConnectionConfig {
    let admin = PostgresClient::connect(&ConnectionConfig::from_dsn(url), ClientOptions::default())
        .await
        .unwrap();
    admin
        .execute(&format!("DROP SCHEMA IF EXISTS {schema} CASCADE"), &[])
        .await
        .unwrap();
    admin
        .execute(&format!("CREATE SCHEMA {schema}"), &[])
        .await
        .unwrap();
    admin
        .execute(&format!("SET search_path TO {schema}"), &[])
        .await
        .unwrap();
    for sql in SCHEMA {
        admin.execute(sql, &[]).await.unwrap();
    }
    admin.commit().await.unwrap();
    admin.close().await.unwrap();

    let mut dsn = url::Url::parse(url).unwrap();
    dsn.query_pairs_mut()
        .append_pair("options", &format!("-c search_path={schema}"));
    ConnectionConfig::from_dsn(dsn.to_string())
}

async fn drop_schema(url: &str, schema: &str) {
    let admin = PostgresClient::connect(&ConnectionConfig::from_dsn(url), ClientOptions::default())
        .await
        .unwrap();
    admin
        .execute(&format!("DROP SCHEMA IF EXISTS {schema} CASCADE"), &[])
        .await
        .unwrap();
    admin.commit().await.unwrap();
    admin.close().await.unwrap();
}

#[tokio::test]
async fn test_record_assembler_on_integer_ids() {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let schema = format!("testbench_assembler_{}", std::process::id());
    let config = seeded_schema(&url, &schema).await;
    let assembler = RecordAssembler::new(config, ClientOptions::default());

    let record = assembler.test_instance_record(1).await.unwrap();
    let trial = assembler.data_for_trial(1, 2).await.unwrap();
    let devices = assembler.device_instances().await.unwrap();

    drop_schema(&url, &schema).await;

    // Unquoted identifiers come back folded to lower case
    assert_eq!(
        record.to_json(),
        json!({
            "config": {"k": "v"},
            "test_parameters": {"p": 1},
            "data": [
                {"id": 10, "test_instance_id": 1, "trial": 1, "data": {"x": 1.5}},
                {"id": 11, "test_instance_id": 1, "trial": 2, "data": {"x": 2.5}},
            ]
        })
    );

    assert_eq!(trial.len(), 1);
    assert_eq!(trial[0].to_json(), json!({"data": {"x": 2.5}}));

    assert_eq!(
        devices.rows(),
        [vec![
            Value::Int(1),
            Value::from("scope"),
            Value::from("2024-03-01T12:30:00+00:00"),
            Value::from("1.25"),
        ]]
    );
}
