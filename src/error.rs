//! Error taxonomy shared by the retrieval, SQL, and completion layers.
//!
//! Component operations return `Result<T, CopilotError>` so the workflow can
//! record a readable message per failure; the CLI wraps these in `anyhow`.
use std::path::PathBuf;

use crate::validate::FormatIssue;

#[derive(Debug, thiserror::Error)]
pub enum CopilotError {
    #[error("corpus directory not found: {}", path.display())]
    CorpusNotFound { path: PathBuf },

    #[error("database file not found at {}", path.display())]
    DatabaseNotFound { path: PathBuf },

    #[error("access to table '{table}' is not allowed")]
    TableNotAllowed { table: String },

    #[error("table '{table}' not found in the database schema")]
    TableNotFound { table: String },

    #[error("database schema unavailable: {reason}")]
    SchemaUnavailable { reason: String },

    #[error("SQL execution failed: {message}. Query: '{query}'")]
    QueryExecution { message: String, query: String },

    #[error("completion service unavailable: {reason}")]
    CompletionUnavailable { reason: String },

    #[error("malformed {operation} output: {detail}")]
    MalformedCompletion {
        operation: &'static str,
        detail: String,
    },

    #[error("{0}")]
    FormatValidation(FormatIssue),
}

pub type CopilotResult<T> = Result<T, CopilotError>;

impl CopilotError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self::CompletionUnavailable {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedCompletion {
            operation,
            detail: detail.into(),
        }
    }
}
