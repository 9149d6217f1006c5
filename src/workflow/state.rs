//! Mutable state owned by one workflow run.
use crate::retrieval::DocumentChunk;
use crate::sql::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Which pipeline branch a question takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Rag,
    #[default]
    Sql,
    Hybrid,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Sql => "sql",
            Self::Hybrid => "hybrid",
        }
    }

    /// Routes that read the document corpus before anything else.
    pub fn needs_retrieval(self) -> bool {
        matches!(self, Self::Rag | Self::Hybrid)
    }

    pub fn needs_sql(self) -> bool {
        matches!(self, Self::Sql | Self::Hybrid)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States of the workflow machine. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Routing,
    Retrieving,
    Planning,
    SqlGenerating,
    Executing,
    Synthesizing,
    Validating,
    Repairing,
    Done,
}

/// Everything one question accumulates on its way through the workflow.
///
/// `errors` holds the current attempt only; repair moves it into `feedback`.
/// `trace` records every stage entered, in order.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub question: String,
    pub format_hint: String,
    pub route: Route,
    pub constraints: String,
    pub context: Vec<DocumentChunk>,
    pub sql_query: String,
    pub sql_results: Vec<Row>,
    pub sql_tables: BTreeSet<String>,
    pub final_answer: Value,
    pub confidence: f64,
    pub explanation: String,
    pub citations: Vec<String>,
    pub errors: Vec<String>,
    pub feedback: String,
    pub repair_count: u32,
    pub trace: Vec<Stage>,
}

impl RunState {
    pub fn new(question: &str, format_hint: &str) -> Self {
        Self {
            question: question.to_string(),
            format_hint: format_hint.to_string(),
            route: Route::default(),
            constraints: String::new(),
            context: Vec::new(),
            sql_query: String::new(),
            sql_results: Vec::new(),
            sql_tables: BTreeSet::new(),
            final_answer: Value::Null,
            confidence: 0.0,
            explanation: String::new(),
            citations: Vec::new(),
            errors: Vec::new(),
            feedback: String::new(),
            repair_count: 0,
            trace: Vec::new(),
        }
    }
}
