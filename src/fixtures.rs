//! Expected-output fixtures.
//!
//! A fixture is the JSON array of rows a task returned against a known
//! database snapshot, stored at `<dir>/<suite>/<task>.json`. Field order in
//! each object is preserved on both read and write.

use crate::db::{Record, Value};
use crate::error::{Result, TaskError};
use crate::tasks::SuiteKind;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fixture files for all suites under one root directory.
#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl FixtureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the fixture for one task.
    pub fn path(&self, suite: SuiteKind, task: &str) -> PathBuf {
        self.root.join(suite.as_str()).join(format!("{task}.json"))
    }

    /// Loads a fixture. Returns `Ok(None)` when the task has none.
    pub fn load(&self, suite: SuiteKind, task: &str) -> Result<Option<Vec<Record>>> {
        let path = self.path(suite, task);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| TaskError::fixture(format!("cannot read {}: {e}", path.display())))?;
        let rows = parse_rows(&contents)
            .map_err(|e| TaskError::fixture(format!("{}: {e}", path.display())))?;

        debug!("Loaded {} rows from {}", rows.len(), path.display());
        Ok(Some(rows))
    }

    /// Writes a fixture, creating the suite directory if needed.
    pub fn save(&self, suite: SuiteKind, task: &str, rows: &[Record]) -> Result<PathBuf> {
        let path = self.path(suite, task);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                TaskError::fixture(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let mut json = serde_json::to_string_pretty(rows)
            .map_err(|e| TaskError::fixture(format!("cannot encode {task}: {e}")))?;
        json.push('\n');
        fs::write(&path, json)
            .map_err(|e| TaskError::fixture(format!("cannot write {}: {e}", path.display())))?;

        debug!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(path)
    }
}

/// Parses a JSON array of objects into records.
pub fn parse_rows(json: &str) -> std::result::Result<Vec<Record>, String> {
    let items: Vec<serde_json::Value> =
        serde_json::from_str(json).map_err(|e| format!("invalid JSON: {e}"))?;

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match Value::from(item) {
            Value::Document(record) => Ok(record),
            other => Err(format!("row {i} is not an object: {other}")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_path_layout() {
        let store = FixtureStore::new("/tmp/fixtures");
        assert_eq!(
            store.path(SuiteKind::Mongo, "task_1_7"),
            PathBuf::from("/tmp/fixtures/mongo/task_1_7.json")
        );
    }

    #[test]
    fn test_save_then_load_keeps_field_order() {
        let dir = TempDir::new().unwrap();
        let store = FixtureStore::new(dir.path());
        let rows = vec![
            Record::new()
                .with("Order Id", 11077)
                .with("Order Total Price", 1374.6)
                .with("Total Order Discount, %", 0.046),
            Record::new()
                .with("Order Id", 11076)
                .with("Order Total Price", 1057.0)
                .with("Total Order Discount, %", Value::Null),
        ];

        let path = store.save(SuiteKind::Sql, "task_1_2", &rows).unwrap();
        assert!(path.ends_with("sql/task_1_2.json"));

        let loaded = store.load(SuiteKind::Sql, "task_1_2").unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().zip(&rows).all(|(a, b)| a.matches(b)));
        assert_eq!(
            loaded[0].keys().collect::<Vec<_>>(),
            vec!["Order Id", "Order Total Price", "Total Order Discount, %"]
        );
    }

    #[test]
    fn test_missing_fixture() {
        let dir = TempDir::new().unwrap();
        let store = FixtureStore::new(dir.path());
        assert!(store.load(SuiteKind::Sql, "task_1_1").unwrap().is_none());
    }

    #[test]
    fn test_nested_rows() {
        let json = r#"[{"_id": 3, "answers": {"question_id": 12, "c": [1, 2]}}]"#;
        let rows = parse_rows(json).unwrap();
        assert_eq!(rows[0].get_path("answers.question_id"), Some(&Value::Int(12)));
    }

    #[test]
    fn test_binary_values_match_their_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = FixtureStore::new(dir.path());
        let rows = vec![Record::new()
            .with("CategoryName", "Beverages")
            .with("Picture", vec![0x15_u8, 0x1c, 0xff])];

        store.save(SuiteKind::Sql, "task_1_8", &rows).unwrap();
        let loaded = store.load(SuiteKind::Sql, "task_1_8").unwrap().unwrap();

        assert!(loaded[0].matches(&rows[0]));
        assert!(rows[0].matches(&loaded[0]));
        let other = vec![Record::new()
            .with("CategoryName", "Beverages")
            .with("Picture", vec![0x15_u8, 0x1c, 0xfe])];
        assert!(!loaded[0].matches(&other[0]));
    }

    #[test]
    fn test_malformed_fixture() {
        let dir = TempDir::new().unwrap();
        let store = FixtureStore::new(dir.path());
        let path = store.path(SuiteKind::Mongo, "task_1_1");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[1, 2]").unwrap();

        let err = store.load(SuiteKind::Mongo, "task_1_1").unwrap_err();
        assert!(matches!(err, TaskError::Fixture(_)));
        assert!(err.to_string().contains("row 0 is not an object"));
    }
}
