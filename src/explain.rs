//! Shows what a suite would send to its database, without one.
//!
//! Each task runs against a fresh recording mock; the recorded SQL text or
//! MongoDB requests are printed in order.

use crate::db::{DatabaseBackend, MockDocumentDatabase, MockSqlDatabase, RecordedCall};
use crate::error::{Result, TaskError};
use crate::tasks::{MongoSuite, OptimizationSuite, SqlSuite, SuiteKind, TaskInfo, TaskSuite};
use mongodb::bson::{Bson, Document};
use std::fmt::Write;
use std::sync::Arc;

/// Renders the setup requests and the queries of `tasks`.
pub async fn explain(kind: SuiteKind, tasks: &[&TaskInfo]) -> Result<String> {
    let mut out = String::new();

    if kind.backend() == DatabaseBackend::Mongodb {
        let db = Arc::new(MockDocumentDatabase::new());
        document_suite(kind, db.clone()).before().await?;
        let _ = writeln!(out, "-- before");
        render_calls(&mut out, &db.calls())?;
    }

    for task in tasks {
        let _ = writeln!(out, "-- {}", task.name);
        match kind {
            SuiteKind::Sql => {
                let db = Arc::new(MockSqlDatabase::new());
                SqlSuite::new(db.clone()).run(task.name).await?;
                for sql in db.queries() {
                    let _ = writeln!(out, "{};", unindent(&sql));
                }
            }
            SuiteKind::Mongo | SuiteKind::Optimization => {
                // a non-zero count keeps two-step tasks from stopping early
                let db = Arc::new(MockDocumentDatabase::new().with_count(1));
                document_suite(kind, db.clone()).run(task.name).await?;
                render_calls(&mut out, &db.calls())?;
            }
        }
    }
    Ok(out)
}

fn document_suite(kind: SuiteKind, db: Arc<MockDocumentDatabase>) -> Box<dyn TaskSuite> {
    match kind {
        SuiteKind::Optimization => Box::new(OptimizationSuite::new(db)),
        _ => Box::new(MongoSuite::new(db)),
    }
}

fn render_calls(out: &mut String, calls: &[RecordedCall]) -> Result<()> {
    for call in calls {
        match call {
            RecordedCall::Aggregate {
                collection,
                pipeline,
                options,
            } => {
                let stages: Vec<Bson> = pipeline.iter().cloned().map(Bson::Document).collect();
                let disk = if options.allow_disk_use {
                    ", { allowDiskUse: true }"
                } else {
                    ""
                };
                let _ = writeln!(
                    out,
                    "db.getCollection('{collection}').aggregate({}{disk})",
                    to_json(Bson::Array(stages))?
                );
            }
            RecordedCall::Find { collection, query } => {
                let mut options = Document::new();
                if let Some(projection) = &query.projection {
                    options.insert("projection", projection.clone());
                }
                if let Some(sort) = &query.sort {
                    options.insert("sort", sort.clone());
                }
                let _ = writeln!(
                    out,
                    "db.getCollection('{collection}').find({}, {})",
                    to_json(Bson::Document(query.filter.clone()))?,
                    to_json(Bson::Document(options))?
                );
            }
            RecordedCall::Count { collection, filter } => {
                let _ = writeln!(
                    out,
                    "db.getCollection('{collection}').countDocuments({})",
                    to_json(Bson::Document(filter.clone()))?
                );
            }
            RecordedCall::CreateIndex { collection, index } => {
                let sparse = if index.sparse { ", { sparse: true }" } else { "" };
                let _ = writeln!(
                    out,
                    "db.getCollection('{collection}').createIndex({}{sparse})",
                    to_json(Bson::Document(index.keys.clone()))?
                );
            }
        }
    }
    Ok(())
}

fn to_json(value: Bson) -> Result<String> {
    serde_json::to_string_pretty(&value.into_relaxed_extjson())
        .map_err(|e| TaskError::internal(format!("cannot render request: {e}")))
}

/// Strips the common leading indentation of an embedded SQL literal.
fn unindent(sql: &str) -> String {
    let lines: Vec<&str> = sql.lines().filter(|l| !l.trim().is_empty()).collect();
    let indent = lines
        .iter()
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| &l[indent..])
        .collect::<Vec<_>>()
        .join("\n")
}
