//! Higher-level reads over the test bench tables.

pub mod assembler;

pub use assembler::{
    assemble_test_instance, fetch_trial_data, RecordAssembler, TestInstanceRecord, DATA_KEY,
};
