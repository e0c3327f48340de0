//! Snapshot and verification flow over in-memory databases.

use query_tasks::config::HarnessConfig;
use query_tasks::db::{MockDocumentDatabase, Record};
use query_tasks::fixtures::FixtureStore;
use query_tasks::harness::{Harness, Outcome};
use query_tasks::tasks::{MongoSuite, SuiteKind};
use std::sync::Arc;
use tempfile::TempDir;

fn customers() -> Vec<Record> {
    vec![
        Record::new()
            .with("CustomerID", "GREAL")
            .with("CompanyName", "Great Lakes Food Market"),
        Record::new()
            .with("CustomerID", "HUNGC")
            .with("CompanyName", "Hungry Coyote Import Store"),
    ]
}

#[tokio::test]
async fn test_snapshot_then_verify() {
    let dir = TempDir::new().unwrap();
    let store = FixtureStore::new(dir.path());
    let task = SuiteKind::Mongo.task("task_1_3").unwrap();

    let mut changed = customers();
    changed.pop();
    let db = Arc::new(
        MockDocumentDatabase::new()
            .with_rows(customers())
            .with_rows(customers())
            .with_rows(changed),
    );
    let suite = MongoSuite::new(db);
    let harness = Harness::new(&suite, &HarnessConfig::default());

    let written = harness.snapshot(&[task], &store).await.unwrap();
    assert_eq!(written, vec![dir.path().join("mongo").join("task_1_3.json")]);

    let report = harness.verify(&[task], 1, Some(&store)).await.unwrap();
    assert!(report.is_success());
    assert!(report.tasks[0].compared);

    let report = harness.verify(&[task], 1, Some(&store)).await.unwrap();
    assert!(!report.is_success());
    match &report.tasks[0].outcome {
        Outcome::Failed(problems) => {
            assert_eq!(problems.len(), 1);
            assert!(problems[0].starts_with("fixture mismatch"), "{problems:?}");
        }
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_verify_without_fixture_checks_contract_only() {
    let dir = TempDir::new().unwrap();
    let store = FixtureStore::new(dir.path());
    let task = SuiteKind::Mongo.task("task_1_3").unwrap();

    let mut unsorted = customers();
    unsorted.reverse();
    let suite = MongoSuite::new(Arc::new(MockDocumentDatabase::new().with_rows(unsorted)));
    let harness = Harness::new(&suite, &HarnessConfig::default());

    let report = harness.verify(&[task], 1, Some(&store)).await.unwrap();
    assert!(!report.tasks[0].compared);
    assert!(matches!(report.tasks[0].outcome, Outcome::Failed(_)));
}
