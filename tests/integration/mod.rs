//! Integration tests for the suites and the harness.

pub mod harness_test;
pub mod mongo_test;
pub mod mysql_test;
