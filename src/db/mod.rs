//! Database abstraction layer for query-tasks.
//!
//! Provides trait-based interfaces for the two kinds of database a task can
//! run against: a SQL database answering query text, and a document database
//! answering find/aggregate requests. Tasks only see the traits, so the real
//! clients and the in-memory mocks are interchangeable.

mod mock;
mod mongo;
mod mysql;
mod types;

pub use mock::{FailingDatabase, MockDocumentDatabase, MockSqlDatabase, RecordedCall};
pub use mongo::MongoClient;
pub use mysql::MySqlClient;
pub use types::{ColumnInfo, QueryResult, Record, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use mongodb::bson::Document;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Mysql,
    Mongodb,
}

impl DatabaseBackend {
    /// Returns the backend as a string for display and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Mongodb => "mongodb",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Self::Mysql),
            "mongodb" | "mongo" => Some(Self::Mongodb),
            _ => None,
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Mysql => 3306,
            Self::Mongodb => 27017,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Mongodb => "mongodb",
        }
    }
}

/// Connects to a SQL database for the given configuration.
pub async fn connect_sql(config: &ConnectionConfig) -> Result<Box<dyn SqlDatabase>> {
    match config.backend {
        DatabaseBackend::Mysql => Ok(Box::new(MySqlClient::connect(config).await?)),
        other => Err(TaskError::config(format!(
            "Backend '{}' cannot answer SQL queries",
            other.as_str()
        ))),
    }
}

/// Connects to a document database for the given configuration.
pub async fn connect_documents(config: &ConnectionConfig) -> Result<Box<dyn DocumentDatabase>> {
    match config.backend {
        DatabaseBackend::Mongodb => Ok(Box::new(MongoClient::connect(config).await?)),
        other => Err(TaskError::config(format!(
            "Backend '{}' cannot run aggregation pipelines",
            other.as_str()
        ))),
    }
}

/// Interface of a relational database handle.
///
/// All operations are async and return Results with TaskError.
#[async_trait]
pub trait SqlDatabase: Send + Sync {
    /// Executes a SQL query and returns the full result set.
    async fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}

/// Filter, projection and sort of a `find` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
}

impl FindQuery {
    /// Creates a query matching `filter`.
    pub fn new(filter: Document) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// Restricts the returned fields.
    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Orders the returned documents.
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// Options for an aggregation request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Lets blocking stages spill to disk once they exceed the memory limit.
    pub allow_disk_use: bool,
}

/// An index to ensure on a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub keys: Document,
    pub sparse: bool,
}

impl IndexSpec {
    /// A regular index over `keys`.
    pub fn new(keys: Document) -> Self {
        Self { keys, sparse: false }
    }

    /// A sparse index over `keys`; documents missing the fields are skipped.
    pub fn sparse(keys: Document) -> Self {
        Self { keys, sparse: true }
    }
}

/// Interface of a document database handle.
#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    /// Runs an aggregation pipeline against a collection.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> Result<Vec<Record>>;

    /// Runs a find request against a collection.
    async fn find(&self, collection: &str, query: FindQuery) -> Result<Vec<Record>>;

    /// Counts the documents in a collection matching `filter`.
    async fn count_documents(&self, collection: &str, filter: Document) -> Result<u64>;

    /// Creates an index unless an identical one exists.
    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<()>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
