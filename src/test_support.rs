//! Fixtures shared by unit tests: a tiny Northwind database and policy corpus.
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) fn create_northwind(path: &Path) {
    let conn = Connection::open(path).expect("create database");
    conn.execute_batch(
        r#"
        CREATE TABLE Orders (
            OrderID INTEGER PRIMARY KEY,
            CustomerID TEXT,
            OrderDate TEXT
        );
        CREATE TABLE "Order Details" (
            OrderID INTEGER,
            ProductID INTEGER,
            UnitPrice REAL,
            Quantity INTEGER,
            Discount REAL
        );
        CREATE TABLE [Products] (
            [ProductID] INTEGER PRIMARY KEY,
            [ProductName] TEXT,
            [UnitPrice] REAL
        );
        CREATE TABLE Customers (
            CustomerID TEXT PRIMARY KEY,
            CompanyName TEXT
        );
        CREATE TABLE Categories (
            CategoryID INTEGER PRIMARY KEY,
            CategoryName TEXT
        );
        CREATE TABLE Suppliers (
            SupplierID INTEGER PRIMARY KEY,
            CompanyName TEXT
        );
        INSERT INTO Orders VALUES (1, 'ALFKI', '1997-01-01');
        INSERT INTO Orders VALUES (2, 'ANATR', '1997-06-12');
        INSERT INTO "Order Details" VALUES (1, 1, 18.0, 10, 0.0);
        INSERT INTO "Order Details" VALUES (1, 2, 19.0, 3, 0.0);
        INSERT INTO "Order Details" VALUES (2, 3, 10.0, 50, 0.1);
        INSERT INTO Products VALUES (1, 'Chai', 18.0);
        INSERT INTO Products VALUES (2, 'Chang', 19.0);
        INSERT INTO Products VALUES (3, 'Aniseed Syrup', 10.0);
        INSERT INTO Customers VALUES ('ALFKI', 'Alfreds Futterkiste');
        "#,
    )
    .expect("seed database");
}

pub(crate) fn create_policy_corpus(dir: &Path) -> PathBuf {
    let docs = dir.join("docs");
    fs::create_dir_all(&docs).expect("create docs dir");
    fs::write(
        docs.join("product_policy.md"),
        "# Returns & Policy\n\nBeverages unopened: 14 days return window.\n\nPerishables (Produce, Seafood, Dairy): no returns.",
    )
    .expect("write product policy");
    fs::write(
        docs.join("marketing_calendar.md"),
        "# Marketing Calendar (1997)\n\n## Summer Beverages 1997\nDates: 1997-06-01 to 1997-06-30\n\n## Winter Classics 1997\nDates: 1997-12-01 to 1997-12-31",
    )
    .expect("write marketing calendar");
    fs::write(
        docs.join("kpi_definitions.md"),
        "# KPI Definitions\n\nAverage Order Value (AOV) = SUM(UnitPrice * Quantity * (1 - Discount)) / COUNT(DISTINCT OrderID)",
    )
    .expect("write kpi definitions");
    docs
}
