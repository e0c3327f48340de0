//! Northwind exercises on MySQL.
//!
//! Every task is a single SELECT. Column aliases are quoted with backticks so
//! they can be referenced in ORDER BY and HAVING; string literals use single
//! quotes so the queries also run under `ANSI_QUOTES`. Year filters are
//! written as date ranges so an index on `OrderDate` stays usable.

use super::{asc, desc, rounded, sentinel, SuiteKind, TaskInfo, TaskSuite, MONTHS};
use crate::db::{Record, SqlDatabase};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const TASKS: &[TaskInfo] = &[
    TaskInfo::new(
        "task_1_1",
        "Employees with full name, title and city",
        &["Employee Id", "Employee Full Name", "Title", "City"],
    )
    .sorted(&[asc("City"), asc("Employee Full Name")]),
    TaskInfo::new(
        "task_1_2",
        "Order totals and discount percentage",
        &["Order Id", "Order Total Price", "Total Order Discount, %"],
    )
    .sorted(&[desc("Order Id")])
    .rounding(&[rounded("Total Order Discount, %", 3)]),
    TaskInfo::new(
        "task_1_3",
        "US customers without a fax number",
        &["CustomerId", "CompanyName"],
    )
    .sorted(&[asc("CustomerId")]),
    TaskInfo::new(
        "task_1_4",
        "Order count and share of all orders per customer",
        &["Customer Id", "Total number of Orders", "% of all orders"],
    )
    .sorted(&[desc("% of all orders"), asc("Customer Id")])
    .rounding(&[rounded("% of all orders", 5)]),
    TaskInfo::new(
        "task_1_5",
        "Products whose name starts with A to F",
        &["ProductId", "ProductName", "QuantityPerUnit"],
    )
    .sorted(&[asc("ProductName")]),
    TaskInfo::new(
        "task_1_6",
        "Products with category and supplier names",
        &["ProductName", "CategoryName", "SupplierCompanyName"],
    )
    .sorted(&[asc("ProductName"), asc("SupplierCompanyName")]),
    TaskInfo::new(
        "task_1_7",
        "Employees and the person they report to",
        &["EmployeeId", "FullName", "ReportsTo"],
    )
    .sorted(&[asc("EmployeeId")])
    .sentinels(&[sentinel("ReportsTo", "-")]),
    TaskInfo::new(
        "task_1_8",
        "Number of products per category",
        &["CategoryName", "TotalNumberOfProducts"],
    )
    .sorted(&[asc("CategoryName")]),
    TaskInfo::new(
        "task_1_9",
        "Customers whose contact name matches F__n%",
        &["CustomerID", "ContactName"],
    )
    .sorted(&[asc("CustomerID")]),
    TaskInfo::new(
        "task_1_10",
        "Discontinued products",
        &["ProductID", "ProductName"],
    )
    .sorted(&[asc("ProductID")]),
    TaskInfo::new(
        "task_1_11",
        "Products priced between $5 and $15",
        &["ProductName", "UnitPrice"],
    )
    .sorted(&[asc("UnitPrice"), asc("ProductName")]),
    TaskInfo::new(
        "task_1_12",
        "The twenty most expensive products",
        &["ProductName", "UnitPrice"],
    )
    .sorted(&[asc("UnitPrice"), asc("ProductName")]),
    TaskInfo::new(
        "task_1_13",
        "Count of all and of discontinued products",
        &["TotalOfCurrentProducts", "TotalOfDiscontinuedProducts"],
    ),
    TaskInfo::new(
        "task_1_14",
        "Products with less stock than units on order",
        &["ProductName", "UnitsOnOrder", "UnitsInStock"],
    )
    .sorted(&[asc("ProductName")]),
    TaskInfo::new("task_1_15", "Orders per month in 1997", MONTHS),
    TaskInfo::new(
        "task_1_16",
        "Orders with a ship postal code",
        &["OrderID", "CustomerID", "ShipCountry"],
    )
    .sorted(&[asc("OrderID")]),
    TaskInfo::new(
        "task_1_17",
        "Average product price per category",
        &["CategoryName", "AvgPrice"],
    )
    .sorted(&[desc("AvgPrice"), asc("CategoryName")]),
    TaskInfo::new(
        "task_1_18",
        "Orders per day in 1998",
        &["OrderDate", "Total Number of Orders"],
    )
    .sorted(&[asc("OrderDate")]),
    TaskInfo::new(
        "task_1_19",
        "Customers who ordered more than $10000",
        &["CustomerID", "CompanyName", "TotalOrdersAmount, $"],
    )
    .sorted(&[desc("TotalOrdersAmount, $"), asc("CustomerID")]),
    TaskInfo::new(
        "task_1_20",
        "The employee with the largest sales amount",
        &["EmployeeID", "Employee Full Name", "Amount, $"],
    ),
    TaskInfo::new(
        "task_1_21",
        "The order with the largest purchase amount",
        &["OrderID", "Maximum Purchase Amount, $"],
    ),
    TaskInfo::new(
        "task_1_22",
        "Each customer's most expensive purchased product",
        &["CompanyName", "ProductName", "PricePerItem"],
    )
    .sorted(&[desc("PricePerItem"), asc("CompanyName"), asc("ProductName")]),
];

/// The SQL suite bound to a database handle.
pub struct SqlSuite {
    db: Arc<dyn SqlDatabase>,
}

impl SqlSuite {
    pub fn new(db: Arc<dyn SqlDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskSuite for SqlSuite {
    fn kind(&self) -> SuiteKind {
        SuiteKind::Sql
    }

    /// The relational schema ships with its keys indexed; nothing to provision.
    async fn before(&self) -> Result<()> {
        Ok(())
    }

    async fn run(&self, task: &str) -> Result<Vec<Record>> {
        run_task(self.db.as_ref(), task).await
    }

    async fn close(&self) -> Result<()> {
        self.db.close().await
    }
}

/// Runs a task of this suite by name.
pub async fn run_task(db: &dyn SqlDatabase, name: &str) -> Result<Vec<Record>> {
    match name {
        "task_1_1" => task_1_1(db).await,
        "task_1_2" => task_1_2(db).await,
        "task_1_3" => task_1_3(db).await,
        "task_1_4" => task_1_4(db).await,
        "task_1_5" => task_1_5(db).await,
        "task_1_6" => task_1_6(db).await,
        "task_1_7" => task_1_7(db).await,
        "task_1_8" => task_1_8(db).await,
        "task_1_9" => task_1_9(db).await,
        "task_1_10" => task_1_10(db).await,
        "task_1_11" => task_1_11(db).await,
        "task_1_12" => task_1_12(db).await,
        "task_1_13" => task_1_13(db).await,
        "task_1_14" => task_1_14(db).await,
        "task_1_15" => task_1_15(db).await,
        "task_1_16" => task_1_16(db).await,
        "task_1_17" => task_1_17(db).await,
        "task_1_18" => task_1_18(db).await,
        "task_1_19" => task_1_19(db).await,
        "task_1_20" => task_1_20(db).await,
        "task_1_21" => task_1_21(db).await,
        "task_1_22" => task_1_22(db).await,
        other => Err(TaskError::internal(format!(
            "unknown task '{other}' in suite 'sql'"
        ))),
    }
}

async fn select(db: &dyn SqlDatabase, sql: &str) -> Result<Vec<Record>> {
    let result = db.query(sql).await?;
    debug!("{} rows in {:?}", result.row_count, result.execution_time);
    Ok(result.into_records())
}

pub async fn task_1_1(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            EmployeeID AS `Employee Id`,
            CONCAT(FirstName, ' ', LastName) AS `Employee Full Name`,
            Title,
            City
        FROM Employees
        ORDER BY City, `Employee Full Name`
        "#,
    )
    .await
}

/// Discount in OrderDetails is dollars per unit, so the percentage is the
/// discounted amount over the gross amount.
pub async fn task_1_2(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            OrderID AS `Order Id`,
            SUM(UnitPrice * Quantity) AS `Order Total Price`,
            ROUND(SUM(Quantity * Discount) / SUM(Quantity * UnitPrice) * 100, 3)
                AS `Total Order Discount, %`
        FROM OrderDetails
        GROUP BY OrderID
        ORDER BY OrderID DESC
        "#,
    )
    .await
}

pub async fn task_1_3(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            CustomerID AS CustomerId,
            CompanyName
        FROM Customers
        WHERE Fax IS NULL AND Country = 'USA'
        ORDER BY CustomerID
        "#,
    )
    .await
}

pub async fn task_1_4(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            CustomerID AS `Customer Id`,
            COUNT(OrderID) AS `Total number of Orders`,
            ROUND(COUNT(OrderID) / (SELECT COUNT(*) FROM Orders) * 100, 5) AS `% of all orders`
        FROM Orders
        GROUP BY CustomerID
        ORDER BY `% of all orders` DESC, CustomerID ASC
        "#,
    )
    .await
}

pub async fn task_1_5(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            ProductID AS ProductId,
            ProductName,
            QuantityPerUnit
        FROM Products
        WHERE ProductName REGEXP '^[A-F]'
        ORDER BY ProductName
        "#,
    )
    .await
}

pub async fn task_1_6(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            Products.ProductName,
            Categories.CategoryName,
            Suppliers.CompanyName AS SupplierCompanyName
        FROM Products
        JOIN Categories ON Products.CategoryID = Categories.CategoryID
        JOIN Suppliers ON Products.SupplierID = Suppliers.SupplierID
        ORDER BY Products.ProductName, SupplierCompanyName
        "#,
    )
    .await
}

/// A missing manager, or a manager id that matches nobody, reads as "-".
pub async fn task_1_7(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            Employee.EmployeeID AS EmployeeId,
            CONCAT_WS(' ', Employee.FirstName, Employee.LastName) AS FullName,
            IF(Manager.EmployeeID IS NULL, '-',
               CONCAT_WS(' ', Manager.FirstName, Manager.LastName)) AS ReportsTo
        FROM Employees AS Employee
        LEFT JOIN Employees AS Manager ON Employee.ReportsTo = Manager.EmployeeID
        ORDER BY Employee.EmployeeID
        "#,
    )
    .await
}

pub async fn task_1_8(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            Categories.CategoryName,
            COUNT(Products.ProductID) AS TotalNumberOfProducts
        FROM Categories
        LEFT JOIN Products ON Categories.CategoryID = Products.CategoryID
        GROUP BY Categories.CategoryID, Categories.CategoryName
        ORDER BY Categories.CategoryName
        "#,
    )
    .await
}

pub async fn task_1_9(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            CustomerID,
            ContactName
        FROM Customers
        WHERE ContactName LIKE 'F__n%'
        ORDER BY CustomerID
        "#,
    )
    .await
}

pub async fn task_1_10(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            ProductID,
            ProductName
        FROM Products
        WHERE Discontinued = 1
        ORDER BY ProductID
        "#,
    )
    .await
}

pub async fn task_1_11(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            ProductName,
            UnitPrice
        FROM Products
        WHERE UnitPrice BETWEEN 5 AND 15
        ORDER BY UnitPrice, ProductName
        "#,
    )
    .await
}

pub async fn task_1_12(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            ProductName,
            UnitPrice
        FROM (
            SELECT ProductName, UnitPrice
            FROM Products
            ORDER BY UnitPrice DESC, ProductName
            LIMIT 20
        ) AS MostExpensive
        ORDER BY UnitPrice, ProductName
        "#,
    )
    .await
}

/// `TotalOfCurrentProducts` counts every product, discontinued ones included.
pub async fn task_1_13(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            COUNT(*) AS TotalOfCurrentProducts,
            COUNT(IF(Discontinued = 0, NULL, 1)) AS TotalOfDiscontinuedProducts
        FROM Products
        "#,
    )
    .await
}

pub async fn task_1_14(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            ProductName,
            UnitsOnOrder,
            UnitsInStock
        FROM Products
        WHERE UnitsInStock < UnitsOnOrder
        ORDER BY ProductName
        "#,
    )
    .await
}

pub async fn task_1_15(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    let columns: Vec<String> = MONTHS
        .iter()
        .enumerate()
        .map(|(i, month)| format!("COUNT(IF(MONTH(OrderDate) = {}, 1, NULL)) AS {month}", i + 1))
        .collect();

    let sql = format!(
        "SELECT\n    {}\nFROM Orders\nWHERE OrderDate >= '1997-01-01' AND OrderDate < '1998-01-01'",
        columns.join(",\n    ")
    );
    select(db, &sql).await
}

pub async fn task_1_16(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            OrderID,
            CustomerID,
            ShipCountry
        FROM Orders
        WHERE ShipPostalCode IS NOT NULL
        ORDER BY OrderID
        "#,
    )
    .await
}

pub async fn task_1_17(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            Categories.CategoryName,
            AVG(Products.UnitPrice) AS AvgPrice
        FROM Products
        JOIN Categories ON Categories.CategoryID = Products.CategoryID
        GROUP BY Categories.CategoryName
        ORDER BY AvgPrice DESC, Categories.CategoryName
        "#,
    )
    .await
}

/// The formatted date sorts lexicographically in date order.
pub async fn task_1_18(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            DATE_FORMAT(Orders.OrderDate, '%Y-%m-%d %T') AS OrderDate,
            COUNT(Orders.OrderID) AS `Total Number of Orders`
        FROM Orders
        WHERE Orders.OrderDate >= '1998-01-01' AND Orders.OrderDate < '1999-01-01'
        GROUP BY Orders.OrderDate
        ORDER BY Orders.OrderDate
        "#,
    )
    .await
}

pub async fn task_1_19(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            Customers.CustomerID,
            Customers.CompanyName,
            SUM(OrderDetails.UnitPrice * OrderDetails.Quantity) AS `TotalOrdersAmount, $`
        FROM Customers
        JOIN Orders ON Customers.CustomerID = Orders.CustomerID
        JOIN OrderDetails ON Orders.OrderID = OrderDetails.OrderID
        GROUP BY Customers.CustomerID, Customers.CompanyName
        HAVING `TotalOrdersAmount, $` > 10000
        ORDER BY `TotalOrdersAmount, $` DESC, Customers.CustomerID
        "#,
    )
    .await
}

pub async fn task_1_20(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            Employees.EmployeeID,
            CONCAT_WS(' ', Employees.FirstName, Employees.LastName) AS `Employee Full Name`,
            SUM(OrderDetails.UnitPrice * OrderDetails.Quantity) AS `Amount, $`
        FROM Employees
        JOIN Orders ON Employees.EmployeeID = Orders.EmployeeID
        JOIN OrderDetails ON Orders.OrderID = OrderDetails.OrderID
        GROUP BY Employees.EmployeeID, Employees.FirstName, Employees.LastName
        ORDER BY `Amount, $` DESC, Employees.EmployeeID
        LIMIT 1
        "#,
    )
    .await
}

pub async fn task_1_21(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT
            OrderID,
            SUM(UnitPrice * Quantity) AS `Maximum Purchase Amount, $`
        FROM OrderDetails
        GROUP BY OrderID
        ORDER BY `Maximum Purchase Amount, $` DESC, OrderID
        LIMIT 1
        "#,
    )
    .await
}

/// Finds each customer's highest unit price first, then joins back to the
/// order lines that paid it; ties list every product at that price.
pub async fn task_1_22(db: &dyn SqlDatabase) -> Result<Vec<Record>> {
    select(
        db,
        r#"
        SELECT DISTINCT
            TopPrice.CompanyName,
            Products.ProductName,
            TopPrice.PricePerItem
        FROM (
            SELECT
                Customers.CustomerID,
                Customers.CompanyName,
                MAX(OrderDetails.UnitPrice) AS PricePerItem
            FROM Customers
            JOIN Orders ON Customers.CustomerID = Orders.CustomerID
            JOIN OrderDetails ON Orders.OrderID = OrderDetails.OrderID
            GROUP BY Customers.CustomerID, Customers.CompanyName
        ) AS TopPrice
        JOIN Orders ON TopPrice.CustomerID = Orders.CustomerID
        JOIN OrderDetails ON Orders.OrderID = OrderDetails.OrderID
            AND OrderDetails.UnitPrice = TopPrice.PricePerItem
        JOIN Products ON OrderDetails.ProductID = Products.ProductID
        ORDER BY TopPrice.PricePerItem DESC, TopPrice.CompanyName, Products.ProductName
        "#,
    )
    .await
}
