//! MongoDB database client implementation.
//!
//! Provides the `MongoClient` struct that implements the `DocumentDatabase`
//! trait using the official mongodb driver.

use crate::config::ConnectionConfig;
use crate::db::{AggregateOptions, DocumentDatabase, FindQuery, IndexSpec, Record, Value};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum number of connection attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// How long the driver looks for a usable server before giving up.
const SERVER_SELECTION_TIMEOUT_SECS: u64 = 10;

/// MongoDB database client bound to one database.
#[derive(Debug, Clone)]
pub struct MongoClient {
    client: Client,
    db: Database,
}

impl MongoClient {
    /// Connects and pings the server, retrying transient failures with backoff.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let uri = config.to_connection_string()?;
        let database = config.database_name()?;

        let mut options = ClientOptions::parse(&uri)
            .await
            .map_err(|e| TaskError::config(format!("Invalid MongoDB connection string: {e}")))?;
        options.server_selection_timeout = Some(Duration::from_secs(SERVER_SELECTION_TIMEOUT_SECS));
        options.app_name = Some("query-tasks".to_string());

        let client = Client::with_options(options).map_err(|e| map_connection_error(e, config))?;
        let mongo = Self::from_database(client, database);

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut attempt = 1;

        loop {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            match mongo.db.run_command(doc! { "ping": 1 }).await {
                Ok(_) => {
                    debug!("Connected to {}", config.display_string());
                    return Ok(mongo);
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

    /// Wraps an existing driver client, selecting `database`.
    pub fn from_database(client: Client, database: &str) -> Self {
        let db = client.database(database);
        Self { client, db }
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentDatabase for MongoClient {
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> Result<Vec<Record>> {
        let start = Instant::now();
        let stages = pipeline.len();

        let cursor = self
            .collection(collection)
            .aggregate(pipeline)
            .allow_disk_use(options.allow_disk_use)
            .await
            .map_err(|e| TaskError::query(format!("aggregate on '{collection}': {e}")))?;
        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| TaskError::query(format!("aggregate on '{collection}': {e}")))?;

        debug!(
            "Aggregated {} ({} stages) into {} documents in {:?}",
            collection,
            stages,
            docs.len(),
            start.elapsed()
        );
        Ok(docs.into_iter().map(convert_document).collect())
    }

    async fn find(&self, collection: &str, query: FindQuery) -> Result<Vec<Record>> {
        let start = Instant::now();

        let coll = self.collection(collection);
        let mut action = coll.find(query.filter);
        if let Some(projection) = query.projection {
            action = action.projection(projection);
        }
        if let Some(sort) = query.sort {
            action = action.sort(sort);
        }

        let cursor = action
            .await
            .map_err(|e| TaskError::query(format!("find on '{collection}': {e}")))?;
        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| TaskError::query(format!("find on '{collection}': {e}")))?;

        debug!(
            "Found {} documents in {} in {:?}",
            docs.len(),
            collection,
            start.elapsed()
        );
        Ok(docs.into_iter().map(convert_document).collect())
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> Result<u64> {
        self.collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| TaskError::query(format!("count on '{collection}': {e}")))
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<()> {
        let mut options = IndexOptions::default();
        if index.sparse {
            options.sparse = Some(true);
        }

        let mut model = IndexModel::default();
        model.keys = index.keys;
        model.options = Some(options);

        let created = self
            .collection(collection)
            .create_index(model)
            .await
            .map_err(|e| TaskError::setup(format!("index on '{collection}': {e}")))?;

        debug!("Ensured index {} on {}", created.index_name, collection);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Converts a BSON document into a record, keeping field order.
pub(crate) fn convert_document(doc: Document) -> Record {
    doc.into_iter().map(|(k, v)| (k, convert_bson(v))).collect()
}

/// Converts a single BSON value into our Value type.
fn convert_bson(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::Int(i64::from(i)),
        Bson::Int64(i) => Value::Int(i),
        Bson::Double(f) => Value::Float(f),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(
            dt.try_to_rfc3339_string()
                .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        ),
        Bson::Decimal128(d) => Value::String(d.to_string()),
        Bson::Binary(b) => Value::Bytes(b.bytes),
        Bson::Array(items) => Value::Array(items.into_iter().map(convert_bson).collect()),
        Bson::Document(doc) => Value::Document(convert_document(doc)),
        other => Value::String(other.to_string()),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &mongodb::error::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("authentication failed") || error_str.contains("tls") {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("server selection timeout")
        || error_str.contains("connection reset")
}

/// Maps driver connection errors to user-friendly messages.
fn map_connection_error(error: mongodb::error::Error, config: &ConnectionConfig) -> TaskError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.effective_port();
    let user = config.user.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("authentication failed") {
        TaskError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("server selection timeout")
        || error_str.contains("connection refused")
    {
        TaskError::connection(format!(
            "Cannot reach MongoDB at {host}:{port}. Check that the server is running."
        ))
    } else {
        TaskError::connection(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_convert_document_keeps_order_and_nesting() {
        let oid = ObjectId::parse_str("58af4da0b310d92314627290").unwrap();
        let doc = doc! {
            "_id": oid,
            "EmployeeID": 5_i32,
            "Amount, $": 73913.13,
            "ReportsTo": Bson::Null,
            "answers": { "question_id": 7_i64, "tags": ["a", true] },
        };

        let record = convert_document(doc);

        assert_eq!(
            record.keys().collect::<Vec<_>>(),
            vec!["_id", "EmployeeID", "Amount, $", "ReportsTo", "answers"]
        );
        assert_eq!(
            record.get("_id"),
            Some(&Value::String("58af4da0b310d92314627290".to_string()))
        );
        assert_eq!(record.get("EmployeeID"), Some(&Value::Int(5)));
        assert_eq!(record.get("Amount, $"), Some(&Value::Float(73913.13)));
        assert_eq!(record.get("ReportsTo"), Some(&Value::Null));
        assert_eq!(record.get_path("answers.question_id"), Some(&Value::Int(7)));
        assert_eq!(
            record.get_path("answers.tags"),
            Some(&Value::Array(vec![Value::from("a"), Value::Bool(true)]))
        );
    }

    #[test]
    fn test_convert_datetime_to_rfc3339() {
        let dt = mongodb::bson::DateTime::from_millis(0);
        assert_eq!(
            convert_bson(Bson::DateTime(dt)),
            Value::String("1970-01-01T00:00:00Z".to_string())
        );
    }

    #[tokio::test]
    async fn test_connect_and_count() {
        let Ok(url) = std::env::var("TASKS_MONGO_URL") else {
            eprintln!("Skipping test: TASKS_MONGO_URL not set");
            return;
        };
        let config = ConnectionConfig::from_connection_string(&url).unwrap();
        let client = MongoClient::connect(&config).await.unwrap();

        let count = client
            .count_documents("query_tasks_missing_collection", doc! {})
            .await
            .unwrap();
        assert_eq!(count, 0);

        client.close().await.unwrap();
    }
}
