//! Query task suites.
//!
//! A task is one named query with a fixed output contract: which columns it
//! returns, in what order rows come back, which numbers are rounded and which
//! fields never hold null. The contract is data ([`TaskInfo`]) so the harness
//! can check any task without knowing its query.

pub mod mongo;
pub mod optimization;
pub mod sql;

use crate::config::ConnectionConfig;
use crate::db::{self, DatabaseBackend, Record};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub use mongo::MongoSuite;
pub use optimization::OptimizationSuite;
pub use sql::SqlSuite;

/// The task suites shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SuiteKind {
    /// Northwind on MySQL.
    Sql,
    /// Northwind on MongoDB.
    Mongo,
    /// Survey answers on MongoDB (awesomedb).
    Optimization,
}

impl SuiteKind {
    pub const ALL: [SuiteKind; 3] = [Self::Sql, Self::Mongo, Self::Optimization];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Mongo => "mongo",
            Self::Optimization => "optimization",
        }
    }

    /// Backend the suite's queries are written for.
    pub fn backend(&self) -> DatabaseBackend {
        match self {
            Self::Sql => DatabaseBackend::Mysql,
            Self::Mongo | Self::Optimization => DatabaseBackend::Mongodb,
        }
    }

    /// Name of the config connection used when none is given.
    pub fn default_connection(&self) -> &'static str {
        self.as_str()
    }

    /// Database the suite's data lives in.
    pub fn default_database(&self) -> &'static str {
        match self {
            Self::Sql | Self::Mongo => "northwind",
            Self::Optimization => "awesomedb",
        }
    }

    /// Contracts of every task in the suite, in run order.
    pub fn tasks(&self) -> &'static [TaskInfo] {
        match self {
            Self::Sql => sql::TASKS,
            Self::Mongo => mongo::TASKS,
            Self::Optimization => optimization::TASKS,
        }
    }

    /// Looks up a task contract by name.
    pub fn task(&self, name: &str) -> Result<&'static TaskInfo> {
        self.tasks().iter().find(|t| t.name == name).ok_or_else(|| {
            TaskError::internal(format!("unknown task '{name}' in suite '{self}'"))
        })
    }

    /// Whether string sort keys follow an accent- and case-insensitive collation.
    ///
    /// MySQL's default collations (`utf8_general_ci`, `utf8mb4_0900_ai_ci`)
    /// ignore both; MongoDB compares bytes.
    pub fn folds_text(&self) -> bool {
        self.backend() == DatabaseBackend::Mysql
    }
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column names of the per-month order counts, January first.
pub(crate) const MONTHS: &[&str] = &[
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Direction of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One component of a task's sort key tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// Output field; dotted paths reach into nested records.
    pub field: &'static str,
    pub order: SortOrder,
}

pub const fn asc(field: &'static str) -> SortKey {
    SortKey {
        field,
        order: SortOrder::Ascending,
    }
}

pub const fn desc(field: &'static str) -> SortKey {
    SortKey {
        field,
        order: SortOrder::Descending,
    }
}

/// A numeric field rounded to at most `digits` decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rounding {
    pub field: &'static str,
    pub digits: usize,
}

pub const fn rounded(field: &'static str, digits: usize) -> Rounding {
    Rounding { field, digits }
}

/// A field whose missing values are reported as `placeholder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentinel {
    pub field: &'static str,
    pub placeholder: &'static str,
}

pub const fn sentinel(field: &'static str, placeholder: &'static str) -> Sentinel {
    Sentinel { field, placeholder }
}

/// The output contract of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub name: &'static str,
    pub summary: &'static str,
    /// Output fields, in order.
    pub columns: &'static [&'static str],
    /// Full sort key tuple; empty for single-row results.
    pub sort: &'static [SortKey],
    pub rounding: &'static [Rounding],
    pub sentinels: &'static [Sentinel],
}

impl TaskInfo {
    /// A contract with columns only; the rest is added with the builder methods.
    pub const fn new(
        name: &'static str,
        summary: &'static str,
        columns: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            summary,
            columns,
            sort: &[],
            rounding: &[],
            sentinels: &[],
        }
    }

    pub const fn sorted(mut self, sort: &'static [SortKey]) -> Self {
        self.sort = sort;
        self
    }

    pub const fn rounding(mut self, rounding: &'static [Rounding]) -> Self {
        self.rounding = rounding;
        self
    }

    pub const fn sentinels(mut self, sentinels: &'static [Sentinel]) -> Self {
        self.sentinels = sentinels;
        self
    }
}

/// A suite bound to an open database handle.
#[async_trait]
pub trait TaskSuite: Send + Sync {
    fn kind(&self) -> SuiteKind;

    /// Provisions indexes the suite's tasks rely on. Safe to run repeatedly.
    async fn before(&self) -> Result<()>;

    /// Runs one task by name.
    async fn run(&self, task: &str) -> Result<Vec<Record>>;

    /// Closes the underlying connection.
    async fn close(&self) -> Result<()>;
}

/// Connects to the suite's database and returns the bound suite.
pub async fn open(kind: SuiteKind, config: &ConnectionConfig) -> Result<Box<dyn TaskSuite>> {
    if config.backend != kind.backend() {
        return Err(TaskError::config(format!(
            "suite '{kind}' needs a {} connection, got {}",
            kind.backend().as_str(),
            config.backend.as_str()
        )));
    }

    let suite: Box<dyn TaskSuite> = match kind {
        SuiteKind::Sql => Box::new(SqlSuite::new(Arc::from(db::connect_sql(config).await?))),
        SuiteKind::Mongo => Box::new(MongoSuite::new(Arc::from(
            db::connect_documents(config).await?,
        ))),
        SuiteKind::Optimization => Box::new(OptimizationSuite::new(Arc::from(
            db::connect_documents(config).await?,
        ))),
    };
    Ok(suite)
}
