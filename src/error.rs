//! Error types for query-tasks.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for task execution.
#[derive(Error, Debug)]
pub enum TaskError {
    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Setup hook errors (index creation rejected by the database).
    #[error("Setup error: {0}")]
    Setup(String),

    /// Query execution errors (malformed query, connectivity lost mid-query, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fixture errors (unreadable or malformed expected-output files).
    #[error("Fixture error: {0}")]
    Fixture(String),

    /// Internal errors (unknown task names, unexpected states, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a setup error with the given message.
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a fixture error with the given message.
    pub fn fixture(msg: impl Into<String>) -> Self {
        Self::Fixture(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Setup(_) => "Setup Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Fixture(_) => "Fixture Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using TaskError.
pub type Result<T> = std::result::Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_connection() {
        let err = TaskError::connection("Cannot connect to localhost:3306");
        assert_eq!(
            err.to_string(),
            "Connection error: Cannot connect to localhost:3306"
        );
        assert_eq!(err.category(), "Connection Error");
    }

    #[test]
    fn test_error_display_setup() {
        let err =
            TaskError::setup("Index with name: OrderID_1 already exists with different options");
        assert_eq!(
            err.to_string(),
            "Setup error: Index with name: OrderID_1 already exists with different options"
        );
        assert_eq!(err.category(), "Setup Error");
    }

    #[test]
    fn test_error_display_query() {
        let err = TaskError::query("Unknown column 'Emal' in 'field list'");
        assert_eq!(
            err.to_string(),
            "Query error: Unknown column 'Emal' in 'field list'"
        );
        assert_eq!(err.category(), "Query Error");
    }

    #[test]
    fn test_error_display_config() {
        let err = TaskError::config("missing field 'database' in connections.sql");
        assert_eq!(
            err.to_string(),
            "Configuration error: missing field 'database' in connections.sql"
        );
        assert_eq!(err.category(), "Configuration Error");
    }

    #[test]
    fn test_error_display_fixture() {
        let err = TaskError::fixture("expected a JSON array in task_1_1.json");
        assert_eq!(
            err.to_string(),
            "Fixture error: expected a JSON array in task_1_1.json"
        );
        assert_eq!(err.category(), "Fixture Error");
    }

    #[test]
    fn test_error_display_internal() {
        let err = TaskError::internal("unknown task 'task_9_9'");
        assert_eq!(err.to_string(), "Internal error: unknown task 'task_9_9'");
        assert_eq!(err.category(), "Internal Error");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TaskError>();
    }
}
