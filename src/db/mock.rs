//! Mock database handles.
//!
//! In-memory implementations of the database traits that record every
//! request and answer from queues of canned results. Used by unit tests and
//! by the `explain` command to show what a task would send.

use super::{
    AggregateOptions, DocumentDatabase, FindQuery, IndexSpec, QueryResult, Record, SqlDatabase,
};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use mongodb::bson::Document;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock SQL database that returns queued results in order.
///
/// Once the queue is empty every query returns an empty result.
#[derive(Debug, Default)]
pub struct MockSqlDatabase {
    results: Mutex<VecDeque<QueryResult>>,
    queries: Mutex<Vec<String>>,
}

impl MockSqlDatabase {
    /// Creates a mock with no canned results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a result for the next query.
    pub fn with_result(self, result: QueryResult) -> Self {
        lock(&self.results).push_back(result);
        self
    }

    /// SQL text of every query issued so far.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl SqlDatabase for MockSqlDatabase {
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        lock(&self.queries).push(sql.to_string());
        Ok(lock(&self.results).pop_front().unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A request received by a [`MockDocumentDatabase`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Aggregate {
        collection: String,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    },
    Find {
        collection: String,
        query: FindQuery,
    },
    Count {
        collection: String,
        filter: Document,
    },
    CreateIndex {
        collection: String,
        index: IndexSpec,
    },
}

impl RecordedCall {
    /// Collection the request targeted.
    pub fn collection(&self) -> &str {
        match self {
            Self::Aggregate { collection, .. }
            | Self::Find { collection, .. }
            | Self::Count { collection, .. }
            | Self::CreateIndex { collection, .. } => collection,
        }
    }
}

/// A mock document database.
///
/// `aggregate` and `find` share one queue of row sets; `count_documents`
/// draws from a queue of counts. Empty queues answer with no rows and zero.
#[derive(Debug, Default)]
pub struct MockDocumentDatabase {
    rows: Mutex<VecDeque<Vec<Record>>>,
    counts: Mutex<VecDeque<u64>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockDocumentDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues rows for the next aggregate or find.
    pub fn with_rows(self, rows: Vec<Record>) -> Self {
        lock(&self.rows).push_back(rows);
        self
    }

    /// Queues the answer for the next count.
    pub fn with_count(self, count: u64) -> Self {
        lock(&self.counts).push_back(count);
        self
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: RecordedCall) {
        lock(&self.calls).push(call);
    }

    fn next_rows(&self) -> Vec<Record> {
        lock(&self.rows).pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl DocumentDatabase for MockDocumentDatabase {
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> Result<Vec<Record>> {
        self.record(RecordedCall::Aggregate {
            collection: collection.to_string(),
            pipeline,
            options,
        });
        Ok(self.next_rows())
    }

    async fn find(&self, collection: &str, query: FindQuery) -> Result<Vec<Record>> {
        self.record(RecordedCall::Find {
            collection: collection.to_string(),
            query,
        });
        Ok(self.next_rows())
    }

    async fn count_documents(&self, collection: &str, filter: Document) -> Result<u64> {
        self.record(RecordedCall::Count {
            collection: collection.to_string(),
            filter,
        });
        Ok(lock(&self.counts).pop_front().unwrap_or(0))
    }

    async fn create_index(&self, collection: &str, index: IndexSpec) -> Result<()> {
        self.record(RecordedCall::CreateIndex {
            collection: collection.to_string(),
            index,
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A database handle whose every request fails, for error-path tests.
#[derive(Debug, Default)]
pub struct FailingDatabase;

impl FailingDatabase {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SqlDatabase for FailingDatabase {
    async fn query(&self, _sql: &str) -> Result<QueryResult> {
        Err(TaskError::query("Lost connection to server during query"))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl DocumentDatabase for FailingDatabase {
    async fn aggregate(
        &self,
        collection: &str,
        _pipeline: Vec<Document>,
        _options: AggregateOptions,
    ) -> Result<Vec<Record>> {
        Err(TaskError::query(format!(
            "aggregate on '{collection}': connection closed"
        )))
    }

    async fn find(&self, collection: &str, _query: FindQuery) -> Result<Vec<Record>> {
        Err(TaskError::query(format!("find on '{collection}': connection closed")))
    }

    async fn count_documents(&self, collection: &str, _filter: Document) -> Result<u64> {
        Err(TaskError::query(format!("count on '{collection}': connection closed")))
    }

    async fn create_index(&self, collection: &str, _index: IndexSpec) -> Result<()> {
        Err(TaskError::setup(format!(
            "index on '{collection}': an index with the same name already exists \
             with different options"
        )))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
