//! query-tasks - instructional query exercises against Northwind and awesomedb.
//!
//! Task suites live in [`tasks`]; [`harness`] runs them under timeouts and
//! checks their output contracts. The binary wires these to a CLI.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod explain;
pub mod fixtures;
pub mod harness;
pub mod logging;
pub mod output;
pub mod tasks;
pub mod verify;
