//! Statement execution and result shaping.
//!
//! The executor runs single statements against a session; the shaper turns
//! raw rows into records or tables.

pub mod executor;
pub mod shape;

pub use executor::{OrEmpty, QueryExecutor, StatementKind, StatementOutcome, ROWS_AFFECTED};
pub use shape::{to_records, to_table, Record, Table};
