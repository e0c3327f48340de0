//! Suite runner.
//!
//! Drives a bound [`TaskSuite`]: runs the setup hook once under the setup
//! timeout, then each task under the task timeout, and checks what comes
//! back. Tasks run one after another so output and logs stay ordered.

use crate::config::HarnessConfig;
use crate::db::Record;
use crate::error::{Result, TaskError};
use crate::fixtures::FixtureStore;
use crate::tasks::{TaskInfo, TaskSuite};
use crate::verify;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of checking one task.
#[derive(Debug)]
pub enum Outcome {
    Passed,
    /// The task ran but its output broke the contract, drifted between runs
    /// or differs from the fixture.
    Failed(Vec<String>),
    /// The task itself returned an error.
    Errored(TaskError),
}

#[derive(Debug)]
pub struct TaskReport {
    pub name: &'static str,
    pub rows: usize,
    pub elapsed: Duration,
    /// Whether a fixture was found and compared.
    pub compared: bool,
    pub outcome: Outcome,
}

impl TaskReport {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed)
    }
}

/// Reports for every task checked in one `verify` call.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub tasks: Vec<TaskReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.tasks.iter().filter(|t| t.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.outcome, Outcome::Failed(_)))
            .count()
    }

    pub fn errored(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.outcome, Outcome::Errored(_)))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.tasks.iter().all(TaskReport::passed)
    }
}

/// Runs tasks of one suite with the configured timeouts.
pub struct Harness<'a> {
    suite: &'a dyn TaskSuite,
    setup_timeout: Duration,
    task_timeout: Duration,
}

impl<'a> Harness<'a> {
    pub fn new(suite: &'a dyn TaskSuite, config: &HarnessConfig) -> Self {
        Self {
            suite,
            setup_timeout: config.setup_timeout(),
            task_timeout: config.task_timeout(),
        }
    }

    /// Runs the suite's setup hook. Any failure here is fatal to the run.
    pub async fn setup(&self) -> Result<()> {
        let kind = self.suite.kind();
        let start = Instant::now();

        match tokio::time::timeout(self.setup_timeout, self.suite.before()).await {
            Ok(Ok(())) => {
                info!("Setup for {} finished in {:?}", kind, start.elapsed());
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TaskError::setup(format!(
                "setup for {kind} timed out after {:?}",
                self.setup_timeout
            ))),
        }
    }

    /// Runs one task and returns its rows.
    pub async fn run(&self, task: &TaskInfo) -> Result<Vec<Record>> {
        let start = Instant::now();

        let rows = tokio::time::timeout(self.task_timeout, self.suite.run(task.name))
            .await
            .map_err(|_| {
                TaskError::query(format!(
                    "{} timed out after {:?}",
                    task.name, self.task_timeout
                ))
            })??;

        debug!("{} returned {} rows in {:?}", task.name, rows.len(), start.elapsed());
        Ok(rows)
    }

    /// Runs each task `repeat` times and checks determinism, the output
    /// contract and, when a store is given, the stored fixture.
    pub async fn verify(
        &self,
        tasks: &[&TaskInfo],
        repeat: u32,
        fixtures: Option<&FixtureStore>,
    ) -> Result<SuiteReport> {
        self.setup().await?;

        let mut report = SuiteReport::default();
        for task in tasks {
            let task_report = self.verify_task(task, repeat.max(1), fixtures).await;
            match &task_report.outcome {
                Outcome::Passed => info!("{} passed ({} rows)", task.name, task_report.rows),
                Outcome::Failed(problems) => {
                    warn!("{} failed with {} problems", task.name, problems.len())
                }
                Outcome::Errored(e) => warn!("{} errored: {}", task.name, e),
            }
            report.tasks.push(task_report);
        }
        Ok(report)
    }

    async fn verify_task(
        &self,
        task: &TaskInfo,
        repeat: u32,
        fixtures: Option<&FixtureStore>,
    ) -> TaskReport {
        let start = Instant::now();
        let mut report = TaskReport {
            name: task.name,
            rows: 0,
            elapsed: Duration::ZERO,
            compared: false,
            outcome: Outcome::Passed,
        };

        let rows = match self.run(task).await {
            Ok(rows) => rows,
            Err(e) => {
                report.elapsed = start.elapsed();
                report.outcome = Outcome::Errored(e);
                return report;
            }
        };
        report.rows = rows.len();

        let mut problems: Vec<String> = verify::check(self.suite.kind(), task, &rows)
            .iter()
            .map(ToString::to_string)
            .collect();

        for attempt in 2..=repeat {
            match self.run(task).await {
                Ok(again) => {
                    if let Some(diff) = verify::diff_rows(&rows, &again) {
                        problems.push(format!("run {attempt} differs from run 1: {diff}"));
                    }
                }
                Err(e) => {
                    report.elapsed = start.elapsed();
                    report.outcome = Outcome::Errored(e);
                    return report;
                }
            }
        }

        if let Some(store) = fixtures {
            match store.load(self.suite.kind(), task.name) {
                Ok(Some(expected)) => {
                    report.compared = true;
                    if let Some(diff) = verify::diff_rows(&expected, &rows) {
                        problems.push(format!("fixture mismatch: {diff}"));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.elapsed = start.elapsed();
                    report.outcome = Outcome::Errored(e);
                    return report;
                }
            }
        }

        report.elapsed = start.elapsed();
        if !problems.is_empty() {
            report.outcome = Outcome::Failed(problems);
        }
        report
    }

    /// Runs the setup hook and every task, writing each output as a fixture.
    pub async fn snapshot(
        &self,
        tasks: &[&TaskInfo],
        store: &FixtureStore,
    ) -> Result<Vec<PathBuf>> {
        self.setup().await?;

        let mut written = Vec::with_capacity(tasks.len());
        for task in tasks {
            let rows = self.run(task).await?;
            let path = store.save(self.suite.kind(), task.name, &rows)?;
            info!("Saved {} rows for {} to {}", rows.len(), task.name, path.display());
            written.push(path);
        }
        Ok(written)
    }
}
