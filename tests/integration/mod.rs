//! Integration tests for testbench-db.

pub mod assembler_test;
pub mod common;
pub mod connection_test;
pub mod executor_test;
pub mod postgres_test;
