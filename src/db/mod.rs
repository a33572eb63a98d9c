//! Database abstraction layer for testbench-db.
//!
//! Provides a trait-based interface for database sessions, allowing
//! different database backends to be used interchangeably.

mod mock;
mod postgres;
mod sqlite;
mod types;

pub use mock::{MockDatabaseClient, MockEvent};
pub use postgres::PostgresClient;
pub use sqlite::SqliteClient;
pub use types::{ColumnInfo, RawResult, Row, Value};

use crate::config::{ClientOptions, ConnectionConfig};
use crate::error::Result;
use async_trait::async_trait;
use tracing::error;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a DSN scheme.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Opens a database session for the given configuration.
///
/// This is the central factory function for connections. The returned
/// session belongs to the caller, who must `close` it when done.
pub async fn connect(
    config: &ConnectionConfig,
    options: &ClientOptions,
) -> Result<Box<dyn DatabaseClient>> {
    match config.backend()? {
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(config, *options).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Sqlite => {
            let client = SqliteClient::connect(config, *options).await?;
            Ok(Box::new(client))
        }
    }
}

/// Opens a session, logging the failure and returning `None` instead of an error.
///
/// Callers must check for `None` before use.
pub async fn connect_or_none(
    config: &ConnectionConfig,
    options: &ClientOptions,
) -> Option<Box<dyn DatabaseClient>> {
    match connect(config, options).await {
        Ok(client) => Some(client),
        Err(e) => {
            error!("Connection to {} failed: {e}", config.display_string());
            None
        }
    }
}

/// Trait defining the interface for a database session.
///
/// A session holds at most one open transaction. The first statement begins it;
/// `commit`, `rollback` and `close` end it. Per-statement resources are
/// released before each method returns, whether it succeeds or fails.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Backend this session talks to.
    fn backend(&self) -> DatabaseBackend;

    /// Runs a statement with positional parameters (`$1`, `$2`, ...) and
    /// fetches every row together with the column metadata.
    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<RawResult>;

    /// Runs a statement with positional parameters and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Commits the open transaction, if any.
    async fn commit(&self) -> Result<()>;

    /// Rolls back the open transaction, if any.
    async fn rollback(&self) -> Result<()>;

    /// Closes the session. Uncommitted work is rolled back.
    async fn close(&self) -> Result<()>;
}
