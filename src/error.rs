//! Error types for testbench-db.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for testbench-db operations.
#[derive(Error, Debug)]
pub enum TestbenchError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, malformed DSN, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A lookup that must return an exact number of rows returned a different count.
    #[error("Expected {expected} row(s) from {query}, found {found}")]
    UnexpectedRowCount {
        query: String,
        expected: usize,
        found: usize,
    },

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TestbenchError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a row-count mismatch error for the named lookup.
    pub fn unexpected_row_count(query: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::UnexpectedRowCount {
            query: query.into(),
            expected,
            found,
        }
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::UnexpectedRowCount { .. } => "Row Count Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using TestbenchError.
pub type Result<T> = std::result::Result<T, TestbenchError>;
