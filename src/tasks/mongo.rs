//! Northwind exercises on MongoDB.
//!
//! The collections mirror the relational tables (`employees`, `orders`,
//! `order-details`, ...). Dates are stored as strings, so year and month
//! filters parse them with `$dateFromString`. Where the shape allows it,
//! `$project` runs before `$unwind` to keep the documents small.

use super::{asc, desc, rounded, sentinel, SuiteKind, TaskInfo, TaskSuite, MONTHS};
use crate::db::{AggregateOptions, DocumentDatabase, FindQuery, IndexSpec, Record};
use crate::error::{Result, TaskError};
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use std::sync::Arc;
use tracing::debug;

pub const TASKS: &[TaskInfo] = &[
    TaskInfo::new(
        "task_1_1",
        "Employees with full name, title and city",
        &["EmployeeID", "Employee Full Name", "Title", "City"],
    )
    .sorted(&[asc("City"), asc("Employee Full Name")])
    .sentinels(&[sentinel("City", "Unspecified")]),
    TaskInfo::new(
        "task_1_2",
        "Order totals and discount percentage",
        &["Order Id", "Order Total Price", "Total Order Discount, %"],
    )
    .sorted(&[desc("Order Id")])
    .rounding(&[
        rounded("Order Total Price", 3),
        rounded("Total Order Discount, %", 3),
    ]),
    TaskInfo::new(
        "task_1_3",
        "Customers without a fax number",
        &["CustomerID", "CompanyName"],
    )
    .sorted(&[asc("CustomerID")]),
    TaskInfo::new(
        "task_1_4",
        "Order count and share of all orders per customer",
        &["Customer Id", "Total number of Orders", "% of all orders"],
    )
    .sorted(&[desc("% of all orders"), asc("Customer Id")])
    .rounding(&[rounded("% of all orders", 3)]),
    TaskInfo::new(
        "task_1_5",
        "Products whose name starts with A to F",
        &["ProductID", "ProductName", "QuantityPerUnit"],
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
        &["EmployeeID", "FullName", "ReportsTo"],
    )
    .sorted(&[asc("EmployeeID")])
    .sentinels(&[sentinel("ReportsTo", "-")]),
    TaskInfo::new(
        "task_1_8",
        "Number of products per category",
        &["CategoryName", "TotalNumberOfProducts"],
    )
    .sorted(&[asc("CategoryName")]),
    TaskInfo::new(
        "task_1_9",
        "Customers whose contact name matches ^F..n",
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
        "Products priced over $5 up to $15",
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
        "Orders with ship country",
        &["OrderID", "CustomerID", "ShipCountry"],
    )
    .sorted(&[asc("OrderID")]),
    TaskInfo::new(
        "task_1_17",
        "Average product price per category",
        &["CategoryName", "AvgPrice"],
    )
    .sorted(&[desc("AvgPrice"), asc("CategoryName")])
    .rounding(&[rounded("AvgPrice", 2)]),
    TaskInfo::new(
        "task_1_18",
        "Orders per day in 1998",
        &["Order Date", "Total Number of Orders"],
    )
    .sorted(&[asc("Order Date")]),
    TaskInfo::new(
        "task_1_19",
        "Customers who ordered more than $10000",
        &["CustomerID", "CompanyName", "TotalOrdersAmount, $"],
    )
    .sorted(&[desc("TotalOrdersAmount, $"), asc("CustomerID")])
    .rounding(&[rounded("TotalOrdersAmount, $", 2)]),
    TaskInfo::new(
        "task_1_20",
        "The employee with the largest sales amount",
        &["EmployeeID", "Employee Full Name", "Amount, $"],
    )
    .rounding(&[rounded("Amount, $", 2)]),
    TaskInfo::new(
        "task_1_21",
        "The order with the largest purchase amount",
        &["OrderID", "Maximum Purchase Amount, $"],
    )
    .rounding(&[rounded("Maximum Purchase Amount, $", 2)]),
    TaskInfo::new(
        "task_1_22",
        "Each customer's most expensive purchased product",
        &["CustomerID", "CompanyName", "ProductName", "PricePerItem"],
    )
    .sorted(&[desc("PricePerItem"), asc("CompanyName"), asc("ProductName")]),
];

/// Single-field indexes on the join and lookup keys.
const INDEXES: &[(&str, &str)] = &[
    ("employees", "CustomerID"),
    ("customers", "CustomerID"),
    ("orders", "OrderID"),
    ("order-details", "OrderID"),
    ("products", "ProductID"),
];

/// The document Northwind suite bound to a database handle.
pub struct MongoSuite {
    db: Arc<dyn DocumentDatabase>,
}

impl MongoSuite {
    pub fn new(db: Arc<dyn DocumentDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskSuite for MongoSuite {
    fn kind(&self) -> SuiteKind {
        SuiteKind::Mongo
    }

    async fn before(&self) -> Result<()> {
        before(self.db.as_ref()).await
    }

    async fn run(&self, task: &str) -> Result<Vec<Record>> {
        run_task(self.db.as_ref(), task).await
    }

    async fn close(&self) -> Result<()> {
        self.db.close().await
    }
}

/// Ensures the indexes the lookups rely on. Existing identical indexes are
/// left alone by the server.
pub async fn before(db: &dyn DocumentDatabase) -> Result<()> {
    for (collection, field) in INDEXES {
        let mut keys = Document::new();
        keys.insert(*field, 1_i32);
        db.create_index(collection, IndexSpec::new(keys)).await?;
    }
    debug!("Ensured {} indexes", INDEXES.len());
    Ok(())
}

/// Runs a task of this suite by name.
pub async fn run_task(db: &dyn DocumentDatabase, name: &str) -> Result<Vec<Record>> {
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
            "unknown task '{other}' in suite 'mongo'"
        ))),
    }
}

async fn aggregate(
    db: &dyn DocumentDatabase,
    collection: &str,
    pipeline: Vec<Document>,
) -> Result<Vec<Record>> {
    db.aggregate(collection, pipeline, AggregateOptions::default())
        .await
}

/// `{ $lookup: ... }` joining `local` to `foreign` in collection `from`.
fn lookup(from: &str, local: &str, foreign: &str, alias: &str) -> Document {
    doc! {
        "$lookup": {
            "from": from,
            "localField": local,
            "foreignField": foreign,
            "as": alias,
        }
    }
}

/// `{ $match }` on the year of the string `OrderDate`.
fn order_year(year: i32) -> Document {
    doc! {
        "$match": {
            "$expr": {
                "$eq": [{ "$year": { "$dateFromString": { "dateString": "$OrderDate" } } }, year]
            }
        }
    }
}

/// Joins orders to their detail lines and sums price times quantity per `key`.
fn order_amount_by(key: &str) -> Vec<Document> {
    vec![
        lookup("order-details", "OrderID", "OrderID", "details"),
        doc! { "$unwind": "$details" },
        doc! {
            "$group": {
                "_id": format!("${key}"),
                "price": { "$sum": { "$multiply": ["$details.UnitPrice", "$details.Quantity"] } },
            }
        },
    ]
}

pub async fn task_1_1(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    aggregate(
        db,
        "employees",
        vec![
            doc! {
                "$project": {
                    "_id": 0,
                    "EmployeeID": 1,
                    "Employee Full Name": { "$concat": ["$FirstName", " ", "$LastName"] },
                    "Title": 1,
                    "City": { "$ifNull": ["$City", "Unspecified"] },
                }
            },
            doc! { "$sort": { "City": 1, "Employee Full Name": 1 } },
        ],
    )
    .await
}

/// Discount is dollars per unit; both totals are rounded to 3 places.
pub async fn task_1_2(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    aggregate(
        db,
        "order-details",
        vec![
            doc! {
                "$group": {
                    "_id": "$OrderID",
                    "totalPrice": { "$sum": { "$multiply": ["$UnitPrice", "$Quantity"] } },
                    "discount": { "$sum": { "$multiply": ["$Discount", "$Quantity", 100] } },
                }
            },
            doc! {
                "$project": {
                    "_id": 0,
                    "Order Id": "$_id",
                    "Order Total Price": { "$round": ["$totalPrice", 3] },
                    "Total Order Discount, %": {
                        "$round": [{ "$divide": ["$discount", "$totalPrice"] }, 3]
                    },
                }
            },
            doc! { "$sort": { "Order Id": -1 } },
        ],
    )
    .await
}

/// The import stores a missing fax as the string "NULL".
pub async fn task_1_3(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    db.find(
        "customers",
        FindQuery::new(doc! { "Fax": "NULL" })
            .projection(doc! { "_id": 0, "CustomerID": 1, "CompanyName": 1 })
            .sort(doc! { "CustomerID": 1 }),
    )
    .await
}

/// Two round-trips: the order count, then the per-customer share of it.
pub async fn task_1_4(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    let total = db.count_documents("orders", doc! {}).await?;
    if total == 0 {
        return Ok(Vec::new());
    }
    let share = 1.0 / total as f64;

    aggregate(
        db,
        "orders",
        vec![
            doc! { "$group": { "_id": "$CustomerID", "customerOrders": { "$sum": 1 } } },
            doc! {
                "$project": {
                    "_id": 0,
                    "Customer Id": "$_id",
                    "Total number of Orders": "$customerOrders",
                    "% of all orders": {
                        "$round": [{ "$multiply": ["$customerOrders", share, 100] }, 3]
                    },
                }
            },
            doc! { "$sort": { "% of all orders": -1, "Customer Id": 1 } },
        ],
    )
    .await
}

pub async fn task_1_5(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    db.find(
        "products",
        FindQuery::new(doc! { "ProductName": { "$regex": "^[A-F]" } })
            .projection(doc! { "_id": 0, "ProductID": 1, "ProductName": 1, "QuantityPerUnit": 1 })
            .sort(doc! { "ProductName": 1 }),
    )
    .await
}

pub async fn task_1_6(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    aggregate(
        db,
        "products",
        vec![
            lookup("suppliers", "SupplierID", "SupplierID", "suppliers"),
            lookup("categories", "CategoryID", "CategoryID", "categories"),
            doc! {
                "$replaceRoot": {
                    "newRoot": {
                        "$mergeObjects": [
                            "$$ROOT",
                            { "$arrayElemAt": ["$suppliers", 0] },
                            { "$arrayElemAt": ["$categories", 0] },
                        ]
                    }
                }
            },
            doc! {
                "$project": {
                    "_id": 0,
                    "ProductName": 1,
                    "CategoryName": 1,
                    "SupplierCompanyName": "$CompanyName",
                }
            },
            doc! { "$sort": { "ProductName": 1, "SupplierCompanyName": 1 } },
        ],
    )
    .await
}

/// Full name carries the title of courtesy; an unmatched manager reads "-".
pub async fn task_1_7(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    aggregate(
        db,
        "employees",
        vec![
            lookup("employees", "ReportsTo", "EmployeeID", "boss"),
            doc! {
                "$project": {
                    "_id": 0,
                    "EmployeeID": 1,
                    "FullName": { "$concat": ["$TitleOfCourtesy", "$FirstName", " ", "$LastName"] },
                    "ReportsTo": {
                        "$ifNull": [
                            {
                                "$concat": [
                                    { "$arrayElemAt": ["$boss.FirstName", 0] },
                                    " ",
                                    { "$arrayElemAt": ["$boss.LastName", 0] },
                                ]
                            },
                            "-",
                        ]
                    },
                }
            },
            doc! { "$sort": { "EmployeeID": 1 } },
        ],
    )
    .await
}

pub async fn task_1_8(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    aggregate(
        db,
        "products",
        vec![
            lookup("categories", "CategoryID", "CategoryID", "categories"),
            doc! { "$unwind": "$categories" },
            doc! {
                "$group": {
                    "_id": "$categories.CategoryName",
                    "TotalNumberOfProducts": { "$sum": 1 },
                }
            },
            doc! { "$project": { "_id": 0, "CategoryName": "$_id", "TotalNumberOfProducts": 1 } },
            doc! { "$sort": { "CategoryName": 1 } },
        ],
    )
    .await
}

pub async fn task_1_9(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    db.find(
        "customers",
        FindQuery::new(doc! { "ContactName": { "$regex": "^F..n" } })
            .projection(doc! { "_id": 0, "CustomerID": 1, "ContactName": 1 })
            .sort(doc! { "CustomerID": 1 }),
    )
    .await
}

pub async fn task_1_10(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    db.find(
        "products",
        FindQuery::new(doc! { "Discontinued": 1 })
            .projection(doc! { "_id": 0, "ProductID": 1, "ProductName": 1 })
            .sort(doc! { "ProductID": 1 }),
    )
    .await
}

pub async fn task_1_11(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    db.find(
        "products",
        FindQuery::new(doc! { "UnitPrice": { "$gt": 5, "$lte": 15 } })
            .projection(doc! { "_id": 0, "ProductName": 1, "UnitPrice": 1 })
            .sort(doc! { "UnitPrice": 1, "ProductName": 1 }),
    )
    .await
}

pub async fn task_1_12(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    aggregate(
        db,
        "products",
        vec![
            doc! { "$project": { "_id": 0, "ProductName": 1, "UnitPrice": 1 } },
            doc! { "$sort": { "UnitPrice": -1, "ProductName": 1 } },
            doc! { "$limit": 20 },
            doc! { "$sort": { "UnitPrice": 1, "ProductName": 1 } },
        ],
    )
    .await
}

/// Two counts folded into one row.
pub async fn task_1_13(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    let current = db.count_documents("products", doc! {}).await?;
    let discontinued = db
        .count_documents("products", doc! { "Discontinued": 1 })
        .await?;

    Ok(vec![Record::new()
        .with("TotalOfCurrentProducts", current)
        .with("TotalOfDiscontinuedProducts", discontinued)])
}

pub async fn task_1_14(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    db.find(
        "products",
        FindQuery::new(doc! { "$expr": { "$lt": ["$UnitsInStock", "$UnitsOnOrder"] } })
            .projection(doc! { "_id": 0, "ProductName": 1, "UnitsOnOrder": 1, "UnitsInStock": 1 })
            .sort(doc! { "ProductName": 1 }),
    )
    .await
}

/// One row of twelve month counts, or no row when 1997 has no orders.
pub async fn task_1_15(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    let mut counts = doc! { "_id": Bson::Null };
    for (month, number) in MONTHS.iter().zip(1_i32..) {
        counts.insert(
            *month,
            doc! {
                "$sum": { "$cond": { "if": { "$eq": ["$month", number] }, "then": 1, "else": 0 } }
            },
        );
    }

    aggregate(
        db,
        "orders",
        vec![
            order_year(1997),
            doc! {
                "$project": {
                    "month": { "$month": { "$dateFromString": { "dateString": "$OrderDate" } } }
                }
            },
            doc! { "$group": counts },
            doc! { "$project": { "_id": 0 } },
        ],
    )
    .await
}

/// Every imported order carries a postal code field, so no filter applies.
pub async fn task_1_16(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    db.find(
        "orders",
        FindQuery::new(doc! {})
            .projection(doc! { "_id": 0, "OrderID": 1, "CustomerID": 1, "ShipCountry": 1 })
            .sort(doc! { "OrderID": 1 }),
    )
    .await
}

pub async fn task_1_17(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    aggregate(
        db,
        "products",
        vec![
            lookup("categories", "CategoryID", "CategoryID", "category"),
            doc! { "$unwind": "$category" },
            doc! {
                "$group": {
                    "_id": "$category.CategoryName",
                    "average": { "$avg": "$UnitPrice" },
                }
            },
            doc! {
                "$project": {
                    "_id": 0,
                    "CategoryName": "$_id",
                    "AvgPrice": { "$round": ["$average", 2] },
                }
            },
            doc! { "$sort": { "AvgPrice": -1, "CategoryName": 1 } },
        ],
    )
    .await
}

pub async fn task_1_18(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    aggregate(
        db,
        "orders",
        vec![
            order_year(1998),
            doc! {
                "$project": {
                    "date": {
                        "$dateToString": {
                            "date": { "$dateFromString": { "dateString": "$OrderDate" } },
                            "format": "%Y-%m-%d",
                        }
                    }
                }
            },
            doc! { "$group": { "_id": "$date", "orders": { "$sum": 1 } } },
            doc! {
                "$project": {
                    "_id": 0,
                    "Order Date": "$_id",
                    "Total Number of Orders": "$orders",
                }
            },
            doc! { "$sort": { "Order Date": 1 } },
        ],
    )
    .await
}

/// Groups before the customer lookup so only one join per customer remains.
pub async fn task_1_19(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    let mut pipeline = order_amount_by("CustomerID");
    pipeline.extend([
        lookup("customers", "_id", "CustomerID", "customers"),
        doc! { "$unwind": "$customers" },
        doc! {
            "$project": {
                "_id": 0,
                "CustomerID": "$_id",
                "CompanyName": "$customers.CompanyName",
                "TotalOrdersAmount, $": { "$round": ["$price", 2] },
            }
        },
        doc! { "$match": { "TotalOrdersAmount, $": { "$gt": 10000 } } },
        doc! { "$sort": { "TotalOrdersAmount, $": -1, "CustomerID": 1 } },
    ]);
    aggregate(db, "orders", pipeline).await
}

pub async fn task_1_20(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    let mut pipeline = order_amount_by("EmployeeID");
    pipeline.extend([
        lookup("employees", "_id", "EmployeeID", "employees"),
        doc! { "$unwind": "$employees" },
        doc! {
            "$project": {
                "_id": 0,
                "EmployeeID": "$_id",
                "Employee Full Name": {
                    "$concat": ["$employees.FirstName", " ", "$employees.LastName"]
                },
                "Amount, $": { "$round": ["$price", 2] },
            }
        },
        doc! { "$sort": { "Amount, $": -1, "EmployeeID": 1 } },
        doc! { "$limit": 1 },
    ]);
    aggregate(db, "orders", pipeline).await
}

pub async fn task_1_21(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    aggregate(
        db,
        "order-details",
        vec![
            doc! {
                "$group": {
                    "_id": "$OrderID",
                    "price": { "$sum": { "$multiply": ["$UnitPrice", "$Quantity"] } },
                }
            },
            doc! {
                "$project": {
                    "_id": 0,
                    "OrderID": "$_id",
                    "Maximum Purchase Amount, $": { "$round": ["$price", 2] },
                }
            },
            doc! { "$sort": { "Maximum Purchase Amount, $": -1, "OrderID": 1 } },
            doc! { "$limit": 1 },
        ],
    )
    .await
}

/// Sorting the detail lines by price first makes `$first` pick the most
/// expensive product; ProductID breaks ties.
pub async fn task_1_22(db: &dyn DocumentDatabase) -> Result<Vec<Record>> {
    aggregate(
        db,
        "orders",
        vec![
            lookup("order-details", "OrderID", "OrderID", "details"),
            doc! { "$unwind": "$details" },
            doc! { "$sort": { "details.UnitPrice": -1, "details.ProductID": 1 } },
            doc! {
                "$group": {
                    "_id": "$CustomerID",
                    "product": { "$first": "$details.ProductID" },
                    "price": { "$max": "$details.UnitPrice" },
                }
            },
            lookup("customers", "_id", "CustomerID", "customers"),
            doc! { "$unwind": "$customers" },
            lookup("products", "product", "ProductID", "products"),
            doc! { "$unwind": "$products" },
            doc! {
                "$project": {
                    "_id": 0,
                    "CustomerID": "$_id",
                    "CompanyName": "$customers.CompanyName",
                    "ProductName": "$products.ProductName",
                    "PricePerItem": "$price",
                }
            },
            doc! { "$sort": { "PricePerItem": -1, "CompanyName": 1, "ProductName": 1 } },
        ],
    )
    .await
}
