//! SQL execution, generation cleanup, and citation extraction.
mod citations;
mod cleanup;
mod engine;
mod generator;

pub use citations::{extract_tables, sql_citation};
pub use cleanup::SENTINEL_QUERY;
pub use engine::{QueryEngine, Row};
pub use generator::{GeneratedSql, SqlGenerator, PLACEHOLDER_QUERY};
