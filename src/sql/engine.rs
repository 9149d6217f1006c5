//! Scoped SQLite access for the analytics store.
//!
//! Every public operation opens its own connection and drops it before
//! returning, so no handle outlives a single call.
use crate::error::{CopilotError, CopilotResult};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Statement};
use serde_json::{Map, Number, Value};
use std::path::PathBuf;

/// A result row: column name to scalar value, in result-set column order.
pub type Row = Map<String, Value>;

/// Canonical tables exposed to query generation, in prompt order.
pub const CANONICAL_TABLES: [&str; 6] = [
    "Categories",
    "Customers",
    "Order Details",
    "Orders",
    "Products",
    "Suppliers",
];

const READ_ONLY_MESSAGE: &str = "only read-only statements may be executed";

/// Lowercase compatibility views so generated queries may use either spelling.
const ALIAS_VIEWS: &str = r#"
    CREATE VIEW IF NOT EXISTS orders AS SELECT * FROM Orders;
    CREATE VIEW IF NOT EXISTS order_items AS SELECT * FROM "Order Details";
    CREATE VIEW IF NOT EXISTS products AS SELECT * FROM Products;
    CREATE VIEW IF NOT EXISTS customers AS SELECT * FROM Customers;
"#;

/// Read-query executor bound to one database file.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    db_path: PathBuf,
}

impl QueryEngine {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Open a connection and install the alias views.
    pub fn connect(&self) -> CopilotResult<Connection> {
        if !self.db_path.is_file() {
            return Err(CopilotError::DatabaseNotFound {
                path: self.db_path.clone(),
            });
        }
        let conn = Connection::open(&self.db_path).map_err(|err| CopilotError::QueryExecution {
            message: err.to_string(),
            query: format!("<open {}>", self.db_path.display()),
        })?;
        conn.execute_batch(ALIAS_VIEWS)
            .map_err(|err| CopilotError::QueryExecution {
                message: err.to_string(),
                query: ALIAS_VIEWS.trim().to_string(),
            })?;
        tracing::debug!(path = %self.db_path.display(), "database connected");
        Ok(conn)
    }

    /// The `CREATE TABLE` text for an allow-listed table, brackets removed.
    pub fn schema(&self, table: &str) -> CopilotResult<String> {
        let conn = self.connect()?;
        table_schema(&conn, table)
    }

    /// Schema text for every canonical table, sorted by table name.
    pub fn all_schemas(&self) -> CopilotResult<String> {
        let conn = self.connect()?;
        let mut tables = CANONICAL_TABLES.to_vec();
        tables.sort_unstable();
        let schemas = tables
            .into_iter()
            .map(|table| table_schema(&conn, table))
            .collect::<CopilotResult<Vec<_>>>()?;
        Ok(schemas.join("\n\n"))
    }

    /// Execute a single read-only statement and collect every row. Statements
    /// that would modify the store are rejected before they run.
    pub fn execute(&self, query: &str) -> CopilotResult<Vec<Row>> {
        let conn = self.connect()?;
        tracing::info!(query, "executing SQL");
        let rows = run_query(&conn, query).map_err(|message| {
            tracing::warn!(query, error = %message, "SQL execution failed");
            CopilotError::QueryExecution {
                message,
                query: query.to_string(),
            }
        })?;
        tracing::info!(rows = rows.len(), "SQL execution complete");
        Ok(rows)
    }
}

fn table_schema(conn: &Connection, table: &str) -> CopilotResult<String> {
    if !CANONICAL_TABLES.contains(&table) {
        return Err(CopilotError::TableNotAllowed {
            table: table.to_string(),
        });
    }
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND tbl_name = ?1",
            [table],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| CopilotError::QueryExecution {
            message: err.to_string(),
            query: format!("<schema lookup for {table}>"),
        })?;
    match sql {
        Some(sql) => Ok(sql.replace(['[', ']'], "")),
        None => Err(CopilotError::TableNotFound {
            table: table.to_string(),
        }),
    }
}

fn run_query(conn: &Connection, query: &str) -> Result<Vec<Row>, String> {
    let mut stmt = conn.prepare(query).map_err(|err| err.to_string())?;
    if !stmt.readonly() {
        return Err(READ_ONLY_MESSAGE.to_string());
    }
    collect_rows(&mut stmt).map_err(|err| err.to_string())
}

fn collect_rows(stmt: &mut Statement<'_>) -> rusqlite::Result<Vec<Row>> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (idx, column) in columns.iter().enumerate() {
            record.insert(column.clone(), to_json(row.get_ref(idx)?));
        }
        out.push(record);
    }
    Ok(out)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => Value::from(int),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::String(String::from_utf8_lossy(blob).into_owned()),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
