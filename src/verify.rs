//! Contract checks on task output.
//!
//! Each check takes a task's declared contract and the rows it returned and
//! reports every row that breaks it. Checks never fail; an empty list means
//! the output honours the contract.

use crate::db::{DatabaseBackend, Record, Value};
use crate::tasks::{SortOrder, SuiteKind, TaskInfo};
use std::cmp::Ordering;
use std::fmt;

/// One broken contract rule, pointing at the offending row (0-based).
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    MissingColumn {
        row: usize,
        column: String,
    },
    UnexpectedColumn {
        row: usize,
        column: String,
    },
    ColumnOrder {
        row: usize,
        found: Vec<String>,
    },
    /// Row `row` sorts before row `row - 1` on `key`.
    OutOfOrder {
        row: usize,
        key: String,
    },
    TooPrecise {
        row: usize,
        field: String,
        digits: usize,
        value: Value,
    },
    MissingSentinel {
        row: usize,
        field: String,
        placeholder: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumn { row, column } => {
                write!(f, "row {row}: missing column '{column}'")
            }
            Self::UnexpectedColumn { row, column } => {
                write!(f, "row {row}: unexpected column '{column}'")
            }
            Self::ColumnOrder { row, found } => {
                write!(f, "row {row}: columns out of order: {}", found.join(", "))
            }
            Self::OutOfOrder { row, key } => {
                write!(f, "row {row}: sorts before row {} on '{key}'", row - 1)
            }
            Self::TooPrecise {
                row,
                field,
                digits,
                value,
            } => write!(
                f,
                "row {row}: '{field}' = {value} has more than {digits} decimal places"
            ),
            Self::MissingSentinel {
                row,
                field,
                placeholder,
            } => write!(
                f,
                "row {row}: '{field}' is empty, expected placeholder '{placeholder}'"
            ),
        }
    }
}

/// Runs every contract check for `task` on `rows`.
///
/// Column order is only enforced for SQL suites: a MongoDB projection keeps
/// the stored field order of the documents, so document suites are checked
/// for the column set alone.
pub fn check(kind: SuiteKind, task: &TaskInfo, rows: &[Record]) -> Vec<Violation> {
    let strict_order = kind.backend() == DatabaseBackend::Mysql;

    let mut violations = check_columns(task, rows, strict_order);
    violations.extend(check_sort(task, rows, kind.folds_text()));
    violations.extend(check_rounding(task, rows));
    violations.extend(check_sentinels(task, rows));
    violations
}

pub fn check_columns(task: &TaskInfo, rows: &[Record], strict_order: bool) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (i, row) in rows.iter().enumerate() {
        let before = violations.len();
        for column in task.columns {
            if row.get(column).is_none() {
                violations.push(Violation::MissingColumn {
                    row: i,
                    column: column.to_string(),
                });
            }
        }
        for key in row.keys() {
            if !task.columns.contains(&key) {
                violations.push(Violation::UnexpectedColumn {
                    row: i,
                    column: key.to_string(),
                });
            }
        }

        let in_order = row.keys().eq(task.columns.iter().copied());
        if strict_order && violations.len() == before && !in_order {
            violations.push(Violation::ColumnOrder {
                row: i,
                found: row.keys().map(str::to_string).collect(),
            });
        }
    }

    violations
}

/// Checks each adjacent pair of rows against the full sort key tuple.
pub fn check_sort(task: &TaskInfo, rows: &[Record], fold_text: bool) -> Vec<Violation> {
    if task.sort.is_empty() {
        return Vec::new();
    }

    let mut violations = Vec::new();
    for (i, pair) in rows.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        for key in task.sort {
            let a = prev.get_path(key.field).unwrap_or(&Value::Null);
            let b = next.get_path(key.field).unwrap_or(&Value::Null);
            let ordering = match key.order {
                SortOrder::Ascending => a.compare(b, fold_text),
                SortOrder::Descending => b.compare(a, fold_text),
            };
            match ordering {
                Ordering::Less => break,
                Ordering::Equal => continue,
                Ordering::Greater => {
                    violations.push(Violation::OutOfOrder {
                        row: i + 1,
                        key: key.field.to_string(),
                    });
                    break;
                }
            }
        }
    }
    violations
}

pub fn check_rounding(task: &TaskInfo, rows: &[Record]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        for rule in task.rounding {
            let Some(value) = row.get_path(rule.field) else {
                continue;
            };
            if value.decimal_places().is_some_and(|d| d > rule.digits) {
                violations.push(Violation::TooPrecise {
                    row: i,
                    field: rule.field.to_string(),
                    digits: rule.digits,
                    value: value.clone(),
                });
            }
        }
    }
    violations
}

/// A sentinel field must hold a value; null, absent and empty strings all
/// count as missing.
pub fn check_sentinels(task: &TaskInfo, rows: &[Record]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        for rule in task.sentinels {
            let missing = match row.get_path(rule.field) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if missing {
                violations.push(Violation::MissingSentinel {
                    row: i,
                    field: rule.field.to_string(),
                    placeholder: rule.placeholder.to_string(),
                });
            }
        }
    }
    violations
}

/// Describes the first difference between expected and actual rows.
pub fn diff_rows(expected: &[Record], actual: &[Record]) -> Option<String> {
    if let Some(i) = expected
        .iter()
        .zip(actual)
        .position(|(e, a)| !e.matches(a))
    {
        return Some(format!(
            "row {i} differs: expected {}, got {}",
            Value::Document(expected[i].clone()),
            Value::Document(actual[i].clone())
        ));
    }
    if expected.len() != actual.len() {
        return Some(format!(
            "expected {} rows, got {}",
            expected.len(),
            actual.len()
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{asc, desc, rounded, sentinel};
    use pretty_assertions::assert_eq;

    const PRICES: TaskInfo = TaskInfo::new("t", "prices", &["Name", "Price"])
        .sorted(&[desc("Price"), asc("Name")])
        .rounding(&[rounded("Price", 2)]);

    const MANAGERS: TaskInfo = TaskInfo::new("m", "managers", &["Id", "ReportsTo"])
        .sentinels(&[sentinel("ReportsTo", "-")]);

    fn price(name: &str, price: f64) -> Record {
        Record::new().with("Name", name).with("Price", price)
    }

    #[test]
    fn test_valid_rows_pass() {
        let rows = vec![
            price("Côte de Blaye", 263.5),
            price("Alice Mutton", 39.0),
            price("apple", 18.0),
            price("Chai", 18.0),
        ];
        assert_eq!(check(SuiteKind::Sql, &PRICES, &rows), vec![]);
    }

    #[test]
    fn test_tie_break_key_is_checked() {
        let rows = vec![price("Chai", 18.0), price("Chang", 19.0)];
        let violations = check_sort(&PRICES, &rows, false);
        assert_eq!(
            violations,
            vec![Violation::OutOfOrder {
                row: 1,
                key: "Price".to_string()
            }]
        );

        let rows = vec![price("Chang", 19.0), price("Aniseed", 19.0)];
        assert_eq!(
            check_sort(&PRICES, &rows, false),
            vec![Violation::OutOfOrder {
                row: 1,
                key: "Name".to_string()
            }]
        );
    }

    #[test]
    fn test_case_folding_depends_on_suite() {
        let rows = vec![price("apple", 18.0), price("Chai", 18.0)];
        assert!(check_sort(&PRICES, &rows, true).is_empty());
        assert_eq!(check_sort(&PRICES, &rows, false).len(), 1);
    }

    #[test]
    fn test_folded_sort_accepts_accented_names() {
        let rows = vec![
            price("Röd Kaviar", 15.0),
            price("Rogede sild", 15.0),
            price("Rössle Sauerkraut", 15.0),
        ];
        assert!(check_sort(&PRICES, &rows, true).is_empty());
        assert_eq!(check_sort(&PRICES, &rows, false).len(), 1);
    }

    #[test]
    fn test_nested_sort_keys() {
        const TASK: TaskInfo = TaskInfo::new("n", "nested", &["answers"]).sorted(&[asc("answers.question_id")]);
        let task = TASK;
        let row = |id: i64| Record::new().with("answers", Record::new().with("question_id", id));

        assert!(check_sort(&task, &[row(1), row(2), row(2)], false).is_empty());
        assert_eq!(check_sort(&task, &[row(3), row(2)], false).len(), 1);
    }

    #[test]
    fn test_rounding() {
        let rows = vec![price("Chai", 18.0), price("Chang", 19.125)];
        let violations = check_rounding(&PRICES, &rows);

        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].to_string(),
            "row 1: 'Price' = 19.125 has more than 2 decimal places"
        );
    }

    #[test]
    fn test_sentinels() {
        let rows = vec![
            Record::new().with("Id", 1).with("ReportsTo", "-"),
            Record::new().with("Id", 2).with("ReportsTo", Value::Null),
            Record::new().with("Id", 3).with("ReportsTo", ""),
            Record::new().with("Id", 4),
        ];
        let flagged: Vec<usize> = check_sentinels(&MANAGERS, &rows)
            .iter()
            .map(|v| match v {
                Violation::MissingSentinel { row, .. } => *row,
                other => panic!("unexpected {other}"),
            })
            .collect();
        assert_eq!(flagged, vec![1, 2, 3]);
    }

    #[test]
    fn test_columns() {
        let swapped = Record::new().with("Price", 1.0).with("Name", "Chai");
        let extra = price("Chai", 1.0).with("Discount", 0.0);
        let short = Record::new().with("Name", "Chai");

        let strict = check_columns(&PRICES, &[swapped.clone(), extra, short], true);
        assert!(matches!(strict[0], Violation::ColumnOrder { row: 0, .. }));
        assert!(matches!(strict[1], Violation::UnexpectedColumn { row: 1, .. }));
        assert!(matches!(strict[2], Violation::MissingColumn { row: 2, .. }));
        assert_eq!(strict.len(), 3);

        assert!(check_columns(&PRICES, &[swapped], false).is_empty());
    }

    #[test]
    fn test_diff_rows() {
        let expected = vec![price("Chai", 18.0)];

        let same = Record::new().with("Name", "Chai").with("Price", 18);
        assert_eq!(diff_rows(&expected, &[same]), None);
        assert_eq!(
            diff_rows(&expected, &[]),
            Some("expected 1 rows, got 0".to_string())
        );
        let diff = diff_rows(&expected, &[price("Chang", 19.0)]).unwrap();
        assert!(diff.starts_with("row 0 differs"));
    }
}
