//! Shared fixtures: a temporary SQLite database seeded with test bench tables.

use tempfile::TempDir;
use testbench_db::config::{ClientOptions, ConnectionConfig};
use testbench_db::db::{DatabaseClient, SqliteClient};

const SCHEMA: &[&str] = &[
    "CREATE TABLE TEST_TYPE (ID INTEGER PRIMARY KEY, TEST_PARAMETERS TEXT)",
    "CREATE TABLE TEST_INSTANCE (ID INTEGER PRIMARY KEY, TEST_TYPE_ID INTEGER, CONFIG TEXT)",
    "CREATE TABLE DATA_INSTANCE (ID INTEGER PRIMARY KEY, TEST_INSTANCE_ID INTEGER, TRIAL INTEGER, DATA TEXT)",
    "CREATE TABLE DEVICE_INSTANCE (ID INTEGER PRIMARY KEY, NAME TEXT, SERIAL TEXT)",
];

const SEED: &[&str] = &[
    r#"INSERT INTO TEST_TYPE VALUES (100, '{"p": 1}')"#,
    r#"INSERT INTO TEST_INSTANCE VALUES (1, 100, '{"k": "v"}')"#,
    r#"INSERT INTO DATA_INSTANCE VALUES (10, 1, 1, '{"x": 1.5}')"#,
    r#"INSERT INTO DATA_INSTANCE VALUES (11, 1, 2, '{"x": 2.5}')"#,
    r#"INSERT INTO DATA_INSTANCE VALUES (12, 2, 1, '{"x": 9.0}')"#,
    // Instance 2 points at a test type that does not exist.
    r#"INSERT INTO TEST_INSTANCE VALUES (2, 999, '{"k": "w"}')"#,
    "INSERT INTO DEVICE_INSTANCE VALUES (1, 'scope', 'SN-001')",
    "INSERT INTO DEVICE_INSTANCE VALUES (2, 'load', 'SN-002')",
];

/// A seeded database file that lives as long as this value.
pub struct TestDb {
    _dir: TempDir,
    pub config: ConnectionConfig,
}

impl TestDb {
    pub async fn seeded() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.db");
        let config = ConnectionConfig::from_dsn(format!("sqlite://{}", path.display()));

        let client = SqliteClient::connect(&config, ClientOptions::default())
            .await
            .unwrap();
        for sql in SCHEMA.iter().chain(SEED) {
            client.execute(sql, &[]).await.unwrap();
        }
        client.commit().await.unwrap();
        client.close().await.unwrap();

        Self { _dir: dir, config }
    }

    pub async fn open(&self, options: ClientOptions) -> SqliteClient {
        SqliteClient::connect(&self.config, options).await.unwrap()
    }
}

pub fn no_autocommit() -> ClientOptions {
    ClientOptions {
        autocommit_after_write: false,
        ..ClientOptions::default()
    }
}
