//! Statement execution with read/write classification.
//!
//! Reads come back as rows plus column names; writes come back as a row count
//! and are committed according to the client's commit policy. Any failure
//! rolls the session's transaction back before the error is returned.

use crate::config::ClientOptions;
use crate::db::{DatabaseClient, RawResult, Value};
use crate::error::{Result, TestbenchError};
use crate::query::shape::{to_records, to_table, Record, Table};
use tracing::{debug, warn};

/// Column name used when a write is shaped as a record or table.
pub const ROWS_AFFECTED: &str = "rows_affected";

/// Whether a statement fetches rows or changes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    /// A statement whose first keyword is `SELECT` (any case) is a read; everything else is a write.
    pub fn classify(sql: &str) -> Self {
        if sql.trim().to_uppercase().starts_with("SELECT") {
            Self::Read
        } else {
            Self::Write
        }
    }
}

/// What a single statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// Rows and column metadata from a read.
    Rows(RawResult),
    /// Number of rows changed by a write.
    Affected(u64),
}

impl StatementOutcome {
    /// Shapes the outcome as records. A write becomes `[{"rows_affected": n}]`.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Rows(result) => to_records(&result.rows, &result.column_names()),
            Self::Affected(count) => vec![affected_record(count)],
        }
    }

    /// Shapes the outcome as a table. A write becomes a one-cell `rows_affected` table.
    pub fn into_table(self) -> Table {
        match self {
            Self::Rows(result) => to_table(&result.rows, &result.column_names()),
            Self::Affected(count) => to_table(&[vec![affected_value(count)]], &[ROWS_AFFECTED]),
        }
    }
}

fn affected_value(count: u64) -> Value {
    Value::Int(i64::try_from(count).unwrap_or(i64::MAX))
}

fn affected_record(count: u64) -> Record {
    let mut record = Record::new();
    record.insert(ROWS_AFFECTED, affected_value(count));
    record
}

/// Runs statements against one session.
pub struct QueryExecutor<'a> {
    db: &'a dyn DatabaseClient,
    autocommit_after_write: bool,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor that follows the commit policy in `options`.
    pub fn new(db: &'a dyn DatabaseClient, options: &ClientOptions) -> Self {
        Self {
            db,
            autocommit_after_write: options.autocommit_after_write,
        }
    }

    /// Classifies and runs one statement with positional parameters.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementOutcome> {
        match StatementKind::classify(sql) {
            StatementKind::Read => {
                debug!(sql, params = params.len(), "Executing read");
                let result = self.run(self.db.fetch_all(sql, params)).await?;
                debug!(
                    rows = result.row_count(),
                    elapsed = ?result.execution_time,
                    "Read statement finished"
                );
                Ok(StatementOutcome::Rows(result))
            }
            StatementKind::Write => self
                .execute_write(sql, params)
                .await
                .map(StatementOutcome::Affected),
        }
    }

    /// Runs a statement as a write, whatever its leading keyword, and returns the row count.
    pub async fn execute_write(&self, sql: &str, params: &[Value]) -> Result<u64> {
        debug!(sql, params = params.len(), "Executing write");
        let count = self.run(self.db.execute(sql, params)).await?;
        debug!(rows_affected = count, "Write statement finished");

        if self.autocommit_after_write {
            self.run(self.db.commit()).await?;
        }

        Ok(count)
    }

    /// Runs a statement and shapes the outcome as records.
    pub async fn execute_to_records(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        Ok(self.execute(sql, params).await?.into_records())
    }

    /// Runs a statement and shapes the outcome as a table.
    pub async fn execute_to_table(&self, sql: &str, params: &[Value]) -> Result<Table> {
        Ok(self.execute(sql, params).await?.into_table())
    }

    /// Awaits one client call; on failure rolls back, logs, and returns the error.
    async fn run<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match call.await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("Query execution error: {e}");
                if let Err(rollback_error) = self.db.rollback().await {
                    warn!("Rollback after failed statement also failed: {rollback_error}");
                }
                Err(e)
            }
        }
    }
}

/// Collapses failures into empty results.
///
/// Reproduces the "empty result on failure" contract for callers that cannot
/// handle errors: the error is logged and the type's empty value is returned,
/// so "no rows" and "query failed" become indistinguishable.
pub trait OrEmpty<T> {
    fn or_empty(self) -> T;
}

impl<T: Default> OrEmpty<T> for std::result::Result<T, TestbenchError> {
    fn or_empty(self) -> T {
        self.unwrap_or_else(|e| {
            warn!("{}: {e}; returning an empty result", e.category());
            T::default()
        })
    }
}
