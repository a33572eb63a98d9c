//! SQLite database client implementation.
//!
//! Provides the `SqliteClient` struct that implements the `DatabaseClient` trait
//! for SQLite files (and in-memory databases) using sqlx.

use crate::config::{ClientOptions, ConnectionConfig};
use crate::db::{ColumnInfo, DatabaseBackend, DatabaseClient, RawResult, Row, Value};
use crate::error::{Result, TestbenchError};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Sqlite, Statement, Transaction};
use sqlx::{TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type SqliteTransaction = Transaction<'static, Sqlite>;

/// SQLite database session.
pub struct SqliteClient {
    pool: SqlitePool,
    tx: Mutex<Option<SqliteTransaction>>,
    options: ClientOptions,
}

impl SqliteClient {
    /// Opens the database named by the DSN, creating the file if it is missing.
    ///
    /// The single pooled connection is never reaped, so `sqlite::memory:`
    /// databases live as long as the session.
    pub async fn connect(config: &ConnectionConfig, options: ClientOptions) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let connect_options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| TestbenchError::config(format!("Invalid SQLite DSN: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                TestbenchError::connection(format!(
                    "Cannot open {}: {e}",
                    config.display_string()
                ))
            })?;

        debug!("Opened {}", config.display_string());

        Ok(Self {
            pool,
            tx: Mutex::new(None),
            options,
        })
    }
}

/// Returns the open transaction, beginning one if needed.
async fn transaction<'s>(
    pool: &SqlitePool,
    slot: &'s mut Option<SqliteTransaction>,
) -> Result<&'s mut SqliteTransaction> {
    if slot.is_none() {
        let tx = pool
            .begin()
            .await
            .map_err(|e| TestbenchError::connection(format!("Failed to begin transaction: {e}")))?;
        *slot = Some(tx);
    }
    slot.as_mut()
        .ok_or_else(|| TestbenchError::internal("transaction slot is empty"))
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<RawResult> {
        let start = Instant::now();
        let mut guard = self.tx.lock().await;
        let tx = transaction(&self.pool, &mut guard).await?;

        let statement = (&mut **tx)
            .prepare(sql)
            .await
            .map_err(|e| TestbenchError::query(e.to_string()))?;

        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
            .collect();

        let rows = bind_params(statement.query(), params)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| TestbenchError::query(e.to_string()))?;

        let rows: Vec<Row> = rows
            .iter()
            .map(|row| convert_row(row, &self.options))
            .collect();

        Ok(RawResult::with_data(columns, rows).with_execution_time(start.elapsed()))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut guard = self.tx.lock().await;
        let tx = transaction(&self.pool, &mut guard).await?;

        let done = bind_params(sqlx::query(sql), params)
            .execute(&mut **tx)
            .await
            .map_err(|e| TestbenchError::query(e.to_string()))?;

        Ok(done.rows_affected())
    }

    async fn commit(&self) -> Result<()> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.commit()
                .await
                .map_err(|e| TestbenchError::query(format!("Commit failed: {e}")))?;
            debug!("Transaction committed");
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.rollback()
                .await
                .map_err(|e| TestbenchError::query(format!("Rollback failed: {e}")))?;
            debug!("Transaction rolled back");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.rollback().await {
            warn!("Discarding pending transaction on close failed: {e}");
        }
        self.pool.close().await;
        Ok(())
    }
}

/// Binds positional parameters in order. JSON documents are stored as text.
fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::String(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
            Value::Json(j) => query.bind(j.to_string()),
        };
    }
    query
}

fn convert_row(row: &SqliteRow, options: &ClientOptions) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i, options))
        .collect()
}

/// Converts a cell by its storage class; SQLite declared types are only advisory.
fn convert_value(row: &SqliteRow, index: usize, options: &ClientOptions) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match storage.as_str() {
        "INTEGER" | "INT" | "INT4" | "INT8" | "BIGINT" | "BOOLEAN" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => {
            let value = row
                .try_get::<Option<String>, _>(index)
                .ok()
                .flatten()
                .map(Value::String)
                .unwrap_or(Value::Null);
            if options.decode_json_text {
                value.decode_json_text()
            } else {
                value
            }
        }
    }
}
