//! Schema-aware wrapper around the GenerateSQL completion.
use super::cleanup::clean_generated_sql;
use super::engine::QueryEngine;
use crate::completion::{CompletionService, SqlRequest};
use crate::error::{CopilotError, CopilotResult};

/// Labelled query used when no completion service is configured.
pub const PLACEHOLDER_QUERY: &str =
    "SELECT 'completion service not configured' AS placeholder;";

/// Outcome of one generation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedSql {
    /// Cleaned statement ready to execute.
    Query(String),
    /// The model replied but nothing executable survived cleanup.
    Empty,
    /// No completion service is configured.
    Placeholder,
}

/// Built once per process and shared by reference across runs.
#[derive(Debug, Clone)]
pub struct SqlGenerator {
    /// Schema text, or why it could not be read.
    schema: Result<String, String>,
}

impl SqlGenerator {
    /// Capture the allow-listed schema text from the store. Only a missing
    /// database file is fatal; any other schema failure is kept and reported
    /// by every generation attempt.
    pub fn from_engine(engine: &QueryEngine) -> CopilotResult<Self> {
        let schema = match engine.all_schemas() {
            Ok(schema) => {
                tracing::debug!(schema_bytes = schema.len(), "sql generator schema loaded");
                Ok(schema)
            }
            Err(err @ CopilotError::DatabaseNotFound { .. }) => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "schema unavailable; SQL generation will fail");
                Err(err.to_string())
            }
        };
        Ok(Self { schema })
    }

    pub fn generate(
        &self,
        completion: Option<&dyn CompletionService>,
        question: &str,
        constraints: &str,
        feedback: &str,
    ) -> CopilotResult<GeneratedSql> {
        let Some(completion) = completion else {
            return Ok(GeneratedSql::Placeholder);
        };
        let schema = self
            .schema
            .as_ref()
            .map_err(|reason| CopilotError::SchemaUnavailable {
                reason: reason.clone(),
            })?;
        let request = SqlRequest {
            question: question.to_string(),
            schema: schema.clone(),
            constraints: constraints.to_string(),
            feedback: feedback.to_string(),
        };
        let output = completion.generate_sql(&request)?;
        Ok(match clean_generated_sql(&output.sql_query) {
            Some(query) => GeneratedSql::Query(query),
            None => GeneratedSql::Empty,
        })
    }
}
