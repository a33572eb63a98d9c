//! testbench-db - data access for test bench records.
//!
//! Runs parameterized SQL against PostgreSQL or SQLite, shapes results into
//! records or tables, and assembles nested test-instance records.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
pub mod records;
