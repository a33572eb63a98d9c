//! Connection factory tests.

use testbench_db::config::{ClientOptions, ConnectionConfig};
use testbench_db::db::{self, DatabaseBackend};
use testbench_db::error::TestbenchError;

#[tokio::test]
async fn test_connect_creates_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.db");
    let config = ConnectionConfig::from_dsn(format!("sqlite://{}", path.display()));

    let session = db::connect(&config, &ClientOptions::default()).await.unwrap();
    assert_eq!(session.backend(), DatabaseBackend::Sqlite);
    session.close().await.unwrap();

    assert!(path.exists());
}

#[tokio::test]
async fn test_unsupported_scheme_is_config_error() {
    let config = ConnectionConfig::from_dsn("oracle://bench-host:1521/XE");

    let result = db::connect(&config, &ClientOptions::default()).await;

    assert!(matches!(result, Err(TestbenchError::Config(_))));
}

#[tokio::test]
async fn test_connect_or_none_signals_absent_session() {
    let config = ConnectionConfig::from_dsn("sqlite:///no/such/dir/bench.db");

    let session = db::connect_or_none(&config, &ClientOptions::default()).await;

    assert!(session.is_none());
}

#[tokio::test]
async fn test_missing_dsn_is_config_error() {
    let result = db::connect(&ConnectionConfig::default(), &ClientOptions::default()).await;

    assert!(matches!(result, Err(TestbenchError::Config(_))));
}
