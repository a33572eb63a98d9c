//! Record assembler tests against a seeded SQLite database.

use super::common::TestDb;
use pretty_assertions::assert_eq;
use serde_json::json;
use testbench_db::config::ClientOptions;
use testbench_db::db::{DatabaseClient, Value};
use testbench_db::error::TestbenchError;
use testbench_db::query::QueryExecutor;
use testbench_db::records::{assemble_test_instance, RecordAssembler};

fn assembler(db: &TestDb, options: ClientOptions) -> RecordAssembler {
    RecordAssembler::new(db.config.clone(), options)
}

#[tokio::test]
async fn test_instance_record_end_to_end() {
    let db = TestDb::seeded().await;

    let record = assembler(&db, ClientOptions::default())
        .test_instance_record(1)
        .await
        .unwrap();

    assert_eq!(
        record.to_json(),
        json!({
            "CONFIG": {"k": "v"},
            "TEST_PARAMETERS": {"p": 1},
            "data": [
                {"ID": 10, "TEST_INSTANCE_ID": 1, "TRIAL": 1, "DATA": {"x": 1.5}},
                {"ID": 11, "TEST_INSTANCE_ID": 1, "TRIAL": 2, "DATA": {"x": 2.5}},
            ]
        })
    );

    // Serialized output keeps the data rows last.
    let text = serde_json::to_string(&record).unwrap();
    assert!(text.ends_with("]}"));
    assert!(text.find("\"CONFIG\"").unwrap() < text.find("\"data\"").unwrap());
}

#[tokio::test]
async fn test_json_text_left_alone_when_decoding_disabled() {
    let db = TestDb::seeded().await;
    let options = ClientOptions {
        decode_json_text: false,
        ..ClientOptions::default()
    };

    let record = assembler(&db, options).test_instance_record(1).await.unwrap();

    assert_eq!(record.get("CONFIG"), Some(&Value::from(r#"{"k": "v"}"#)));
}

#[tokio::test]
async fn test_missing_parameters_fail_loudly() {
    let db = TestDb::seeded().await;

    let err = assembler(&db, ClientOptions::default())
        .test_instance_record(2)
        .await
        .unwrap_err();

    match err {
        TestbenchError::UnexpectedRowCount {
            expected, found, ..
        } => {
            assert_eq!(expected, 1);
            assert_eq!(found, 0);
        }
        other => panic!("Expected row count error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_instance_has_empty_config_but_no_parameters() {
    let db = TestDb::seeded().await;
    let client = db.open(ClientOptions::default()).await;

    let result = assemble_test_instance(&client, &ClientOptions::default(), 77).await;

    assert!(matches!(
        result,
        Err(TestbenchError::UnexpectedRowCount { found: 0, .. })
    ));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_data_for_trial() {
    let db = TestDb::seeded().await;

    let records = assembler(&db, ClientOptions::default())
        .data_for_trial(1, 2)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].to_json(), json!({"DATA": {"x": 2.5}}));

    let none = assembler(&db, ClientOptions::default())
        .data_for_trial(1, 42)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_injection_shaped_trial_is_just_a_value() {
    let db = TestDb::seeded().await;
    let client = db.open(ClientOptions::default()).await;

    // Text compared against an integer column matches nothing and drops nothing.
    let records = QueryExecutor::new(&client, &ClientOptions::default())
        .execute_to_records(
            "SELECT DATA FROM DATA_INSTANCE WHERE TEST_INSTANCE_ID = $1 AND TRIAL = $2",
            &[Value::Int(1), Value::from("1; DROP TABLE DATA_INSTANCE")],
        )
        .await
        .unwrap();
    assert!(records.is_empty());
    client.close().await.unwrap();

    let remaining = assembler(&db, ClientOptions::default())
        .data_for_trial(1, 1)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn test_device_instances_table() {
    let db = TestDb::seeded().await;

    let table = assembler(&db, ClientOptions::default())
        .device_instances()
        .await
        .unwrap();

    assert_eq!(table.columns(), ["ID", "NAME", "SERIAL"]);
    assert_eq!(table.len(), 2);
    assert_eq!(
        table.column("SERIAL").unwrap(),
        vec![&Value::from("SN-001"), &Value::from("SN-002")]
    );
}
