//! MongoDB suite tests against a live server.
//!
//! Each test seeds its own scratch database and drops it afterwards.

use mongodb::bson::{doc, Document};
use mongodb::{Client, Database};
use query_tasks::db::{MongoClient, Value};
use query_tasks::tasks::{MongoSuite, OptimizationSuite, TaskSuite};
use std::sync::Arc;

async fn get_scratch_database(name: &str) -> Option<(Client, Database)> {
    let url = std::env::var("TASKS_MONGO_URL").ok()?;
    let client = Client::with_uri_str(&url).await.ok()?;
    let database = client.database(&format!("query_tasks_{name}_{}", std::process::id()));
    Some((client, database))
}

#[tokio::test]
async fn test_employee_without_manager_reports_to_dash() {
    let Some((client, database)) = get_scratch_database("managers").await else {
        eprintln!("Skipping test: TASKS_MONGO_URL not set");
        return;
    };

    let employees = database.collection::<Document>("employees");
    employees
        .insert_many(vec![
            doc! {
                "EmployeeID": 2,
                "TitleOfCourtesy": "Dr.",
                "FirstName": "Andrew",
                "LastName": "Fuller",
            },
            doc! {
                "EmployeeID": 5,
                "TitleOfCourtesy": "Mr.",
                "FirstName": "Steven",
                "LastName": "Buchanan",
                "ReportsTo": 2,
            },
        ])
        .await
        .unwrap();

    let suite = MongoSuite::new(Arc::new(MongoClient::from_database(
        client,
        database.name(),
    )));
    suite.before().await.unwrap();
    let rows = suite.run("task_1_7").await;
    database.drop().await.unwrap();
    let rows = rows.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("EmployeeID"), Some(&Value::Int(2)));
    assert_eq!(rows[0].get("ReportsTo").and_then(Value::as_str), Some("-"));
    assert_eq!(
        rows[1].get("ReportsTo").and_then(Value::as_str),
        Some("Andrew Fuller")
    );
}

#[tokio::test]
async fn test_index_hooks_are_idempotent() {
    let Some((client, database)) = get_scratch_database("indexes").await else {
        eprintln!("Skipping test: TASKS_MONGO_URL not set");
        return;
    };

    let handle = Arc::new(MongoClient::from_database(client, database.name()));
    let northwind = MongoSuite::new(handle.clone());
    let awesomedb = OptimizationSuite::new(handle);

    let first = northwind.before().await;
    let second = northwind.before().await;
    let sparse_first = awesomedb.before().await;
    let sparse_second = awesomedb.before().await;
    let indexes = database
        .collection::<Document>("opportunities")
        .list_index_names()
        .await;
    database.drop().await.unwrap();

    first.unwrap();
    second.unwrap();
    sparse_first.unwrap();
    sparse_second.unwrap();
    // The default _id index plus the sparse compound index
    assert_eq!(indexes.unwrap().len(), 2);
}
