//! MySQL database client implementation.
//!
//! Provides the `MySqlClient` struct that implements the `SqlDatabase` trait
//! for MySQL databases using sqlx.

use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, QueryResult, Row, SqlDatabase, Value};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySql, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of connection attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// MySQL database client.
#[derive(Debug)]
pub struct MySqlClient {
    pool: MySqlPool,
}

impl MySqlClient {
    /// Connects to the database, retrying transient failures with backoff.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = MySqlPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to {}", config.display_string());
                    return Ok(Self { pool });
                }
                Err(e) if attempt < MAX_RETRY_ATTEMPTS && is_transient_error(&e) => {
                    warn!(
                        "Connection attempt {} failed (transient error), retrying in {:?}",
                        attempt, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(map_connection_error(e, config)),
            }
        }
    }

    /// Creates a MySqlClient from an existing connection pool.
    ///
    /// Tests use this to pin a single connection so session-scoped
    /// temporary tables stay visible.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Column metadata for a statement that returned no rows.
    async fn describe_columns(&self, sql: &str) -> Vec<ColumnInfo> {
        match (&self.pool).describe(sql).await {
            Ok(described) => described
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            Err(e) => {
                debug!("Could not describe empty result: {e}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl SqlDatabase for MySqlClient {
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let result = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TaskError::query(format_query_error(e)))?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = match result.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            None => self.describe_columns(sql).await,
        };

        let rows: Vec<Row> = result.iter().map(convert_row).collect();
        debug!("Query returned {} rows in {:?}", rows.len(), execution_time);

        Ok(QueryResult::with_data(columns, rows).with_execution_time(execution_time))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Converts a sqlx MySqlRow to our Row type.
fn convert_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Decodes a nullable column, treating decode failures as NULL.
fn decode<'r, T>(row: &'r MySqlRow, index: usize) -> Option<T>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

/// Converts a single column value from a MySqlRow to our Value type.
fn convert_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOLEAN" => decode::<bool>(row, index).into(),

        "TINYINT" => decode::<i8>(row, index).map(i64::from).into(),
        "TINYINT UNSIGNED" => decode::<u8>(row, index).map(i64::from).into(),
        "SMALLINT" => decode::<i16>(row, index).map(i64::from).into(),
        "SMALLINT UNSIGNED" => decode::<u16>(row, index).map(i64::from).into(),
        "INT" | "MEDIUMINT" => decode::<i32>(row, index).map(i64::from).into(),
        "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => decode::<u32>(row, index).map(i64::from).into(),
        "BIGINT" => decode::<i64>(row, index).into(),
        "BIGINT UNSIGNED" => decode::<u64>(row, index).into(),

        "FLOAT" => decode::<f32>(row, index).map(f64::from).into(),
        "DOUBLE" => decode::<f64>(row, index).into(),
        "DECIMAL" => decode::<Decimal>(row, index)
            .and_then(|d| d.to_f64())
            .into(),

        "DATETIME" => decode::<chrono::NaiveDateTime>(row, index)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .into(),
        "TIMESTAMP" => decode::<chrono::DateTime<chrono::Utc>>(row, index)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .into(),
        "DATE" => decode::<chrono::NaiveDate>(row, index)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .into(),
        "TIME" => decode::<chrono::NaiveTime>(row, index)
            .map(|t| t.format("%H:%M:%S").to_string())
            .into(),

        // Text and anything else: string first, raw bytes as the fallback.
        // Computed string columns (CONCAT, DATE_FORMAT) may be flagged binary.
        _ => {
            if let Some(text) = decode::<String>(row, index) {
                return Value::String(text);
            }
            match decode::<Vec<u8>>(row, index) {
                Some(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => Value::String(text),
                    Err(e) => Value::Bytes(e.into_bytes()),
                },
                None => Value::Null,
            }
        }
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("access denied")
        || error_str.contains("unknown database")
        || error_str.contains("ssl")
        || error_str.contains("tls")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
        || error_str.contains("too many connections")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> TaskError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.effective_port();
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        TaskError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("access denied") {
        TaskError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("unknown database") {
        TaskError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        TaskError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        TaskError::connection(error.to_string())
    }
}

/// Formats a query error with the server's error number and SQLSTATE if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR");

    if let Some(mysql_error) = db_error.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
        result.push_str(&format!(" {}", mysql_error.number()));
    }
    if let Some(code) = db_error.code() {
        result.push_str(&format!(" ({code})"));
    }

    result.push_str(": ");
    result.push_str(db_error.message());
    result
}
