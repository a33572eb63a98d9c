//! Mock database client for testing.
//!
//! Returns scripted results keyed by SQL fragments and records every call,
//! so executor and assembler behaviour can be checked without a server.

use super::{ColumnInfo, DatabaseBackend, DatabaseClient, RawResult, Row, Value};
use crate::error::{Result, TestbenchError};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

/// A call observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Fetch { sql: String, params: Vec<Value> },
    Execute { sql: String, params: Vec<Value> },
    Commit,
    Rollback,
    Close,
}

/// A mock database client that returns predefined results.
///
/// Scripts are matched in registration order against the statement text; the
/// first fragment contained in the SQL wins. Unmatched reads return an empty
/// result and unmatched writes affect zero rows.
#[derive(Default)]
pub struct MockDatabaseClient {
    results: Vec<(String, RawResult)>,
    affected: Vec<(String, u64)>,
    failures: Vec<(String, String)>,
    events: Mutex<Vec<MockEvent>>,
}

impl MockDatabaseClient {
    /// Creates a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `result` for reads whose SQL contains `fragment`.
    pub fn with_result(mut self, fragment: impl Into<String>, result: RawResult) -> Self {
        self.results.push((fragment.into(), result));
        self
    }

    /// Shorthand for [`with_result`](Self::with_result) with untyped columns.
    pub fn with_rows(self, fragment: impl Into<String>, columns: &[&str], rows: Vec<Row>) -> Self {
        let columns = columns
            .iter()
            .map(|name| ColumnInfo::new(*name, "unknown"))
            .collect();
        self.with_result(fragment, RawResult::with_data(columns, rows))
    }

    /// Reports `count` affected rows for writes whose SQL contains `fragment`.
    pub fn with_affected(mut self, fragment: impl Into<String>, count: u64) -> Self {
        self.affected.push((fragment.into(), count));
        self
    }

    /// Fails any statement whose SQL contains `fragment`.
    pub fn failing_on(mut self, fragment: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.push((fragment.into(), message.into()));
        self
    }

    /// Every call observed so far, in order.
    pub fn events(&self) -> Vec<MockEvent> {
        self.log().clone()
    }

    /// SQL of every fetch and execute call, in order.
    pub fn statements(&self) -> Vec<String> {
        self.log()
            .iter()
            .filter_map(|event| match event {
                MockEvent::Fetch { sql, .. } | MockEvent::Execute { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of commits observed.
    pub fn commit_count(&self) -> usize {
        self.count(&MockEvent::Commit)
    }

    /// Number of rollbacks observed.
    pub fn rollback_count(&self) -> usize {
        self.count(&MockEvent::Rollback)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.count(&MockEvent::Close) > 0
    }

    fn count(&self, wanted: &MockEvent) -> usize {
        self.log().iter().filter(|event| *event == wanted).count()
    }

    fn log(&self) -> MutexGuard<'_, Vec<MockEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: MockEvent) {
        self.log().push(event);
    }

    fn check_failure(&self, sql: &str) -> Result<()> {
        match self.failures.iter().find(|(fragment, _)| sql.contains(fragment.as_str())) {
            Some((_, message)) => Err(TestbenchError::query(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn backend(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<RawResult> {
        self.record(MockEvent::Fetch {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.check_failure(sql)?;

        Ok(self
            .results
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(MockEvent::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        self.check_failure(sql)?;

        Ok(self
            .affected
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, count)| *count)
            .unwrap_or(0))
    }

    async fn commit(&self) -> Result<()> {
        self.record(MockEvent::Commit);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.record(MockEvent::Rollback);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(MockEvent::Close);
        Ok(())
    }
}
