//! PostgreSQL database client implementation.
//!
//! Provides the `PostgresClient` struct that implements the `DatabaseClient` trait
//! for PostgreSQL databases using sqlx.

use crate::config::{ClientOptions, ConnectionConfig};
use crate::db::{ColumnInfo, DatabaseBackend, DatabaseClient, RawResult, Row, Value};
use crate::error::{Result, TestbenchError};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgColumn, PgPool, PgPoolOptions, PgRow, PgTypeInfo};
use sqlx::query::Query;
use sqlx::{Column as SqlxColumn, Executor, Postgres, Row as SqlxRow, Statement, Transaction};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, Uuid};
use sqlx::{Decode, Type, TypeInfo};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

type PgTransaction = Transaction<'static, Postgres>;

/// PostgreSQL database session.
///
/// Backed by a single-connection pool so the session keeps one server
/// connection for its whole life.
pub struct PostgresClient {
    pool: PgPool,
    tx: Mutex<Option<PgTransaction>>,
    options: ClientOptions,
}

impl PostgresClient {
    /// Creates a new PostgresClient from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(pool: PgPool, options: ClientOptions) -> Self {
        Self {
            pool,
            tx: Mutex::new(None),
            options,
        }
    }

    /// Connects with a small retry loop for transient failures.
    pub async fn connect(config: &ConnectionConfig, options: ClientOptions) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to {}", config.display_string());
                    return Ok(Self::from_pool(pool, options));
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        last_error = Some(e);
                    } else {
                        return Err(map_connection_error(e, config));
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => TestbenchError::connection("No connection attempt was made"),
        })
    }
}

/// Returns the open transaction, beginning one if needed.
async fn transaction<'s>(
    pool: &PgPool,
    slot: &'s mut Option<PgTransaction>,
) -> Result<&'s mut PgTransaction> {
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
impl DatabaseClient for PostgresClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<RawResult> {
        let start = Instant::now();
        let mut guard = self.tx.lock().await;
        let tx = transaction(&self.pool, &mut guard).await?;

        // Parameters are declared to the server with the types they are bound as
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| TestbenchError::query(format_query_error(e)))?;

        let columns: Vec<ColumnInfo> = match rows.first() {
            Some(row) => column_info(row.columns()),
            None => {
                // Empty results still report their columns
                let types: Vec<PgTypeInfo> = params.iter().map(param_type).collect();
                let statement = (&mut **tx)
                    .prepare_with(sql, &types)
                    .await
                    .map_err(|e| TestbenchError::query(format_query_error(e)))?;
                column_info(statement.columns())
            }
        };

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
            .map_err(|e| TestbenchError::query(format_query_error(e)))?;

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

/// Binds positional parameters in order.
fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::String(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
            Value::Json(j) => query.bind(j.clone()),
        };
    }
    query
}

/// The type each parameter is sent as by [`bind_params`].
fn param_type(value: &Value) -> PgTypeInfo {
    match value {
        Value::Null | Value::String(_) => <String as Type<Postgres>>::type_info(),
        Value::Bool(_) => <bool as Type<Postgres>>::type_info(),
        Value::Int(_) => <i64 as Type<Postgres>>::type_info(),
        Value::Float(_) => <f64 as Type<Postgres>>::type_info(),
        Value::Bytes(_) => <Vec<u8> as Type<Postgres>>::type_info(),
        Value::Json(_) => <serde_json::Value as Type<Postgres>>::type_info(),
    }
}

fn column_info(columns: &[PgColumn]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow, options: &ClientOptions) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col, options))
        .collect()
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> sqlx::Result<Option<T>>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index)
}

/// Converts a single column value from a PgRow to our Value type.
///
/// Date, time, UUID and NUMERIC values come back as their text form. A value
/// that cannot be decoded is logged and read as NULL.
fn convert_value(row: &PgRow, index: usize, column: &PgColumn, options: &ClientOptions) -> Value {
    let type_name = column.type_info().name();

    let decoded = match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => get::<bool>(row, index).map(|v| v.map(Value::Bool)),
        "INT2" | "SMALLINT" => get::<i16>(row, index).map(|v| v.map(|n| Value::Int(n.into()))),
        "INT4" | "INT" | "INTEGER" => {
            get::<i32>(row, index).map(|v| v.map(|n| Value::Int(n.into())))
        }
        "INT8" | "BIGINT" => get::<i64>(row, index).map(|v| v.map(Value::Int)),
        "FLOAT4" | "REAL" => get::<f32>(row, index).map(|v| v.map(|f| Value::Float(f.into()))),
        "FLOAT8" | "DOUBLE PRECISION" => get::<f64>(row, index).map(|v| v.map(Value::Float)),
        "NUMERIC" => get::<Decimal>(row, index).map(|v| v.map(|d| Value::String(d.to_string()))),
        "BYTEA" => get::<Vec<u8>>(row, index).map(|v| v.map(Value::Bytes)),
        "JSON" | "JSONB" => get::<serde_json::Value>(row, index).map(|v| v.map(Value::Json)),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, index)
            .map(|v| v.map(|t| Value::String(t.to_rfc3339()))),
        "TIMESTAMP" => {
            get::<NaiveDateTime>(row, index).map(|v| v.map(|t| Value::String(t.to_string())))
        }
        "DATE" => get::<NaiveDate>(row, index).map(|v| v.map(|d| Value::String(d.to_string()))),
        "TIME" => get::<NaiveTime>(row, index).map(|v| v.map(|t| Value::String(t.to_string()))),
        "UUID" => get::<Uuid>(row, index).map(|v| v.map(|u| Value::String(u.to_string()))),

        // For all other types, try to get as string
        _ => get::<String>(row, index).map(|v| {
            v.map(|text| {
                let value = Value::String(text);
                if options.decode_json_text {
                    value.decode_json_text()
                } else {
                    value
                }
            })
        }),
    };

    match decoded {
        Ok(value) => value.unwrap_or(Value::Null),
        Err(e) => {
            warn!(
                "Cannot decode column '{}' of type {type_name}, reading it as NULL: {e}",
                column.name()
            );
            Value::Null
        }
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to readable messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> TestbenchError {
    let target = config.display_string();
    let user = config.user.as_deref().unwrap_or("unknown");
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        TestbenchError::connection(format!(
            "Cannot connect to {target}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        TestbenchError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        TestbenchError::connection(format!("Database at {target} does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        TestbenchError::connection(format!(
            "Connection to {target} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        TestbenchError::connection(error.to_string())
    }
}

/// Formats a query error with server detail and hints if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
        if let Some(table) = pg_error.table() {
            result.push_str("\n  TABLE: ");
            result.push_str(table);
        }
        if let Some(constraint) = pg_error.constraint() {
            result.push_str("\n  CONSTRAINT: ");
            result.push_str(constraint);
        }
    }

    result
}
