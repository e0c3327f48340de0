//! MySQL suite tests against a live server.
//!
//! Fixture tables are session TEMPORARY tables, so the pool is pinned to a
//! single connection and nothing outlives the test.

use query_tasks::db::{MySqlClient, Value};
use query_tasks::error::TaskError;
use query_tasks::tasks::{SqlSuite, TaskSuite};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::sync::Arc;

async fn get_test_pool() -> Option<MySqlPool> {
    let url = std::env::var("TASKS_MYSQL_URL").ok()?;
    MySqlPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .ok()
}

async fn create_order_details(pool: &MySqlPool) {
    sqlx::query(
        "CREATE TEMPORARY TABLE OrderDetails (
            OrderID INT NOT NULL,
            ProductID INT NOT NULL,
            UnitPrice DECIMAL(10, 4) NOT NULL,
            Quantity SMALLINT NOT NULL,
            Discount DOUBLE NOT NULL
        )",
    )
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO OrderDetails VALUES
            (10248, 11, 10.00, 2, 0),
            (10248, 42, 5.00, 4, 0.25),
            (10248, 72, 20.00, 1, 0),
            (10249, 14, 3.50, 2, 0)",
    )
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_order_totals_and_discount() {
    let Some(pool) = get_test_pool().await else {
        eprintln!("Skipping test: TASKS_MYSQL_URL not set");
        return;
    };
    create_order_details(&pool).await;

    let suite = SqlSuite::new(Arc::new(MySqlClient::from_pool(pool)));
    let rows = suite.run("task_1_2").await.unwrap();

    assert_eq!(rows.len(), 2);
    // Newest order first
    assert_eq!(rows[0].get("Order Id"), Some(&Value::Int(10249)));
    assert_eq!(rows[1].get("Order Id"), Some(&Value::Int(10248)));

    let total = rows[1].get("Order Total Price").and_then(Value::as_f64);
    assert_eq!(total, Some(60.0));
    let discount = rows[1]
        .get("Total Order Discount, %")
        .and_then(Value::as_f64)
        .unwrap();
    assert!((discount - 1.667).abs() < 1e-9, "got {discount}");

    suite.close().await.unwrap();
}

#[tokio::test]
async fn test_top_purchase_breaks_ties_by_order() {
    let Some(pool) = get_test_pool().await else {
        eprintln!("Skipping test: TASKS_MYSQL_URL not set");
        return;
    };
    create_order_details(&pool).await;
    sqlx::query("INSERT INTO OrderDetails VALUES (10250, 1, 60.00, 1, 0)")
        .execute(&pool)
        .await
        .unwrap();

    let suite = SqlSuite::new(Arc::new(MySqlClient::from_pool(pool)));
    let rows = suite.run("task_1_21").await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("OrderID"), Some(&Value::Int(10248)));

    suite.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_table_is_a_query_error() {
    let Some(pool) = get_test_pool().await else {
        eprintln!("Skipping test: TASKS_MYSQL_URL not set");
        return;
    };
    sqlx::query("CREATE TEMPORARY TABLE Employees (EmployeeID INT)")
        .execute(&pool)
        .await
        .unwrap();

    let suite = SqlSuite::new(Arc::new(MySqlClient::from_pool(pool)));
    let error = suite.run("task_1_1").await.unwrap_err();

    assert!(matches!(error, TaskError::Query(_)), "got {error:?}");
    suite.close().await.unwrap();
}
