//! Rendering of rows, task lists and verification reports for the terminal.

use crate::db::{Record, Value};
use crate::error::{Result, TaskError};
use crate::harness::{Outcome, SuiteReport};
use crate::tasks::{SortOrder, SuiteKind, TaskInfo};
use std::fmt::Write;

/// How `run` prints rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned text table.
    #[default]
    Table,
    /// Pretty-printed JSON array, field order preserved.
    Json,
}

/// Renders rows in the requested format.
///
/// Table columns follow `columns`; fields a row has beyond those are
/// appended so nothing is hidden.
pub fn render_rows(columns: &[&str], rows: &[Record], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(rows)
            .map_err(|e| TaskError::internal(format!("cannot encode rows: {e}"))),
        OutputFormat::Table => Ok(render_table(columns, rows)),
    }
}

fn render_table(columns: &[&str], rows: &[Record]) -> String {
    let mut headers: Vec<&str> = columns.to_vec();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(&key) {
                headers.push(key);
            }
        }
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| row.get(h).map_or_else(String::new, Value::to_display_string))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, headers.iter().map(|h| h.to_string()), &widths);
    push_line(&mut out, widths.iter().map(|w| "-".repeat(*w)), &widths);
    for row in cells {
        push_line(&mut out, row.into_iter(), &widths);
    }
    let _ = write!(out, "({} rows)", rows.len());
    out
}

fn push_line(out: &mut String, cells: impl Iterator<Item = String>, widths: &[usize]) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect();
    out.push_str(line.join(" | ").trim_end());
    out.push('\n');
}

/// One block per task: name, summary, columns and sort keys.
pub fn render_task_list(kind: SuiteKind, tasks: &[TaskInfo]) -> String {
    let mut out = format!("{kind} ({} tasks, {})\n", tasks.len(), kind.backend().as_str());
    for task in tasks {
        let _ = writeln!(out, "  {:<10} {}", task.name, task.summary);
        let _ = writeln!(out, "             columns: {}", task.columns.join(" | "));
        if !task.sort.is_empty() {
            let keys: Vec<String> = task
                .sort
                .iter()
                .map(|k| match k.order {
                    SortOrder::Ascending => k.field.to_string(),
                    SortOrder::Descending => format!("{} desc", k.field),
                })
                .collect();
            let _ = writeln!(out, "             order:   {}", keys.join(", "));
        }
    }
    out
}

/// Summary of a verification run, one line per task plus problem details.
pub fn render_report(kind: SuiteKind, report: &SuiteReport) -> String {
    let mut out = String::new();
    for task in &report.tasks {
        let status = match task.outcome {
            Outcome::Passed => "ok",
            Outcome::Failed(_) => "FAILED",
            Outcome::Errored(_) => "ERROR",
        };
        let fixture = if task.compared { ", fixture" } else { "" };
        let _ = writeln!(
            out,
            "{status:<6} {kind}/{} ({} rows, {:.0?}{fixture})",
            task.name, task.rows, task.elapsed
        );
        match &task.outcome {
            Outcome::Passed => {}
            Outcome::Failed(problems) => {
                for problem in problems {
                    let _ = writeln!(out, "         {problem}");
                }
            }
            Outcome::Errored(e) => {
                let _ = writeln!(out, "         {}: {e}", e.category());
            }
        }
    }
    let _ = write!(
        out,
        "{} passed, {} failed, {} errored",
        report.passed(),
        report.failed(),
        report.errored()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TaskReport;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn employees() -> Vec<Record> {
        vec![
            Record::new()
                .with("EmployeeId", 2)
                .with("FullName", "Andrew Fuller")
                .with("ReportsTo", "-"),
            Record::new()
                .with("EmployeeId", 5)
                .with("FullName", "Steven Buchanan")
                .with("ReportsTo", "Andrew Fuller"),
        ]
    }

    #[test]
    fn test_table() {
        let table = render_rows(
            &["EmployeeId", "FullName", "ReportsTo"],
            &employees(),
            OutputFormat::Table,
        )
        .unwrap();

        assert_eq!(
            table,
            "EmployeeId | FullName        | ReportsTo\n\
             ---------- | --------------- | -------------\n\
             2          | Andrew Fuller   | -\n\
             5          | Steven Buchanan | Andrew Fuller\n\
             (2 rows)"
        );
    }

    #[test]
    fn test_table_shows_undeclared_fields() {
        let rows = vec![Record::new().with("a", 1).with("extra", Value::Null)];
        let table = render_rows(&["a"], &rows, OutputFormat::Table).unwrap();
        assert!(table.starts_with("a | extra\n"));
        assert!(table.contains("1 | NULL"));
    }

    #[test]
    fn test_json_keeps_field_order() {
        let json = render_rows(&[], &employees()[..1], OutputFormat::Json).unwrap();
        let first = json.find("EmployeeId").unwrap();
        let last = json.find("ReportsTo").unwrap();
        assert!(first < last);
        assert!(json.starts_with('['));
    }

    #[test]
    fn test_task_list() {
        let listing = render_task_list(SuiteKind::Sql, &SuiteKind::Sql.tasks()[..2]);
        assert!(listing.starts_with("sql (2 tasks, mysql)\n"));
        assert!(listing.contains("order:   Order Id desc"));
    }

    #[test]
    fn test_report_summary() {
        let report = SuiteReport {
            tasks: vec![
                TaskReport {
                    name: "task_1_1",
                    rows: 9,
                    elapsed: Duration::from_millis(3),
                    compared: true,
                    outcome: Outcome::Passed,
                },
                TaskReport {
                    name: "task_1_2",
                    rows: 0,
                    elapsed: Duration::from_millis(1),
                    compared: false,
                    outcome: Outcome::Errored(TaskError::query(
                        "Table 'OrderDetails' doesn't exist",
                    )),
                },
            ],
        };

        let text = render_report(SuiteKind::Sql, &report);
        assert!(text.contains("ok     sql/task_1_1 (9 rows, 3ms, fixture)"));
        assert!(text.contains("ERROR  sql/task_1_2"));
        assert!(text.ends_with("1 passed, 0 failed, 1 errored"));
    }
}
