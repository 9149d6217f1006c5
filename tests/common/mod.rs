//! Shared test infrastructure for integration tests.

use rusqlite::Connection;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

/// LM command that runs the canned-response script under `sh`.
pub fn mock_lm_command() -> String {
    let script = manifest_dir().join("tests/mock-lm.sh");
    format!("sh '{}'", script.display())
}

/// Output of one `copilot` invocation.
#[derive(Debug)]
pub struct RunOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|err| panic!("stdout is not JSON ({err}): {}", self.stdout))
    }
}

/// Temp directory holding a policy corpus and a small Northwind database.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn create() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let workspace = Self { dir };
        workspace.write_docs();
        workspace.write_database();
        workspace
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.root().join("docs")
    }

    pub fn db_path(&self) -> PathBuf {
        self.root().join("northwind.sqlite")
    }

    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directory");
        }
        fs::write(&path, contents.as_bytes()).expect("write file");
        path
    }

    /// Run the binary with this workspace's corpus and database. The process
    /// environment is scrubbed so only `args` decide the completion backend.
    pub fn copilot(&self, args: &[&str]) -> RunOutput {
        let output = Command::new(env!("CARGO_BIN_EXE_copilot"))
            .arg("--docs")
            .arg(self.docs_dir())
            .arg("--db")
            .arg(self.db_path())
            .args(args)
            .current_dir(self.root())
            .env_remove("COPILOT_LM_COMMAND")
            .env_remove("LLM_API_BASE")
            .env("XDG_CONFIG_HOME", self.root())
            .env("HOME", self.root())
            .env("RUST_LOG", "warn")
            .output()
            .expect("spawn copilot");
        RunOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }

    fn write_docs(&self) {
        self.write(
            "docs/product_policy.md",
            "# Returns & Policy\n\nBeverages unopened: 14 days return window.\n\nPerishables (Produce, Seafood, Dairy): no returns.\n",
        );
        self.write(
            "docs/marketing_calendar.md",
            "# Marketing Calendar (1997)\n\n## Summer Beverages 1997\nDates: 1997-06-01 to 1997-06-30\n\n## Winter Classics 1997\nDates: 1997-12-01 to 1997-12-31\n",
        );
        self.write(
            "docs/kpi_definitions.md",
            "# KPI Definitions\n\nAverage Order Value (AOV) = SUM(UnitPrice * Quantity * (1 - Discount)) / COUNT(DISTINCT OrderID)\n",
        );
    }

    fn write_database(&self) {
        let conn = Connection::open(self.db_path()).expect("create database");
        conn.execute_batch(
            r#"
            CREATE TABLE Orders (OrderID INTEGER PRIMARY KEY, CustomerID TEXT, OrderDate TEXT);
            CREATE TABLE "Order Details" (OrderID INTEGER, ProductID INTEGER, UnitPrice REAL, Quantity INTEGER, Discount REAL);
            CREATE TABLE Products (ProductID INTEGER PRIMARY KEY, ProductName TEXT, CategoryID INTEGER);
            CREATE TABLE Customers (CustomerID TEXT PRIMARY KEY, CompanyName TEXT);
            CREATE TABLE Categories (CategoryID INTEGER PRIMARY KEY, CategoryName TEXT);
            CREATE TABLE Suppliers (SupplierID INTEGER PRIMARY KEY, CompanyName TEXT);
            INSERT INTO Orders VALUES (1, 'ALFKI', '1997-01-01'), (2, 'ANATR', '1997-06-12');
            INSERT INTO "Order Details" VALUES (1, 1, 18.0, 10, 0.0), (1, 2, 19.0, 3, 0.0), (2, 3, 10.0, 50, 0.1);
            INSERT INTO Products VALUES (1, 'Chai', 1), (2, 'Chang', 1), (3, 'Aniseed Syrup', 2);
            INSERT INTO Categories VALUES (1, 'Beverages'), (2, 'Condiments');
            "#,
        )
        .expect("seed database");
    }
}
