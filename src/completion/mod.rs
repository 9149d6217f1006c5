//! Completion Service boundary: typed request/response contracts per
//! operation, plus the prompt-driven implementation over a backend.
//!
//! The workflow only sees [`CompletionService`]; absence of a service is
//! modelled as `Option<&dyn CompletionService>` so every step can fall back.
//!
//! # Reply contracts
//!
//! | operation            | JSON key(s)                                           | raw text accepted |
//! |----------------------|-------------------------------------------------------|-------------------|
//! | classify             | `route`                                               | yes               |
//! | extract_constraints  | `constraints`                                         | yes               |
//! | generate_sql         | `sql_query` (or `sql`, `query`)                       | yes               |
//! | synthesize           | `final_answer`, `confidence`, `explanation`, `citations` | no             |
//!
//! Missing synthesis fields default to null / 0.0 / empty.
mod backend;
mod parse;

pub use backend::{CommandBackend, CompletionBackend, HttpBackend};

use crate::error::{CopilotError, CopilotResult};
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Instant;

// Prompt templates loaded at compile time
const ROUTE_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/route.md"));
const CONSTRAINTS_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/constraints.md"
));
const SQL_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/sql.md"));
const SYNTHESIZE_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/synthesize.md"
));

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder regex"));

#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub question: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifyOutput {
    /// Free text; normalized into a route by the workflow.
    pub route: String,
}

#[derive(Debug, Clone)]
pub struct ConstraintRequest {
    pub question: String,
    /// Retrieved chunks serialized as JSON.
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintOutput {
    pub constraints: String,
}

#[derive(Debug, Clone)]
pub struct SqlRequest {
    pub question: String,
    pub schema: String,
    pub constraints: String,
    /// Empty on the first attempt.
    pub feedback: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlOutput {
    /// Raw draft; cleaned by the SQL layer before execution.
    pub sql_query: String,
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub question: String,
    pub format_hint: String,
    pub constraints: String,
    pub context: String,
    pub sql_results: String,
    pub feedback: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisOutput {
    pub final_answer: Value,
    pub confidence: f64,
    pub explanation: String,
    pub citations: Vec<String>,
}

impl SynthesisOutput {
    /// Validate a JSON reply against the synthesis contract.
    pub fn from_value(value: &Value) -> CopilotResult<Self> {
        let Value::Object(map) = value else {
            return Err(CopilotError::malformed("synthesize", "reply is not a JSON object"));
        };
        if !map.contains_key("final_answer") {
            return Err(CopilotError::malformed("synthesize", "missing final_answer"));
        }
        Ok(Self {
            final_answer: map.get("final_answer").cloned().unwrap_or(Value::Null),
            confidence: map.get("confidence").map(parse::lenient_f64).unwrap_or(0.0),
            explanation: map
                .get("explanation")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            citations: map
                .get("citations")
                .map(parse::normalize_citations)
                .unwrap_or_default(),
        })
    }
}

/// The four LM-backed operations the workflow depends on.
pub trait CompletionService: Send + Sync {
    fn classify(&self, request: &ClassifyRequest) -> CopilotResult<ClassifyOutput>;

    fn extract_constraints(&self, request: &ConstraintRequest) -> CopilotResult<ConstraintOutput>;

    fn generate_sql(&self, request: &SqlRequest) -> CopilotResult<SqlOutput>;

    fn synthesize(&self, request: &SynthesisRequest) -> CopilotResult<SynthesisOutput>;
}

/// Completion Service that renders the bundled prompt templates and parses
/// the backend's reply at the boundary.
pub struct PromptedCompletion<B> {
    backend: B,
}

impl<B: CompletionBackend> PromptedCompletion<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    fn invoke(&self, operation: &'static str, prompt: &str) -> CopilotResult<String> {
        let start = Instant::now();
        let result = self.backend.complete(prompt);
        let elapsed_ms = start.elapsed().as_millis();
        match &result {
            Ok(reply) => tracing::info!(
                operation,
                backend = %self.backend.label(),
                elapsed_ms,
                prompt_bytes = prompt.len(),
                response_bytes = reply.len(),
                "lm invoke complete"
            ),
            Err(err) => tracing::warn!(
                operation,
                backend = %self.backend.label(),
                elapsed_ms,
                error = %err,
                "lm invoke failed"
            ),
        }
        result
    }
}

impl<B: CompletionBackend> CompletionService for PromptedCompletion<B> {
    fn classify(&self, request: &ClassifyRequest) -> CopilotResult<ClassifyOutput> {
        let prompt = render(ROUTE_TEMPLATE, &[("question", &request.question)]);
        let reply = self.invoke("classify", &prompt)?;
        Ok(ClassifyOutput {
            route: parse::text_field(&reply, &["route"]),
        })
    }

    fn extract_constraints(&self, request: &ConstraintRequest) -> CopilotResult<ConstraintOutput> {
        let prompt = render(
            CONSTRAINTS_TEMPLATE,
            &[("question", &request.question), ("context", &request.context)],
        );
        let reply = self.invoke("extract_constraints", &prompt)?;
        Ok(ConstraintOutput {
            constraints: parse::text_field(&reply, &["constraints"]),
        })
    }

    fn generate_sql(&self, request: &SqlRequest) -> CopilotResult<SqlOutput> {
        let feedback = feedback_section(&request.feedback);
        let prompt = render(
            SQL_TEMPLATE,
            &[
                ("question", &request.question),
                ("schema", &request.schema),
                ("constraints", &request.constraints),
                ("feedback", &feedback),
            ],
        );
        let reply = self.invoke("generate_sql", &prompt)?;
        Ok(SqlOutput {
            sql_query: parse::text_field(&reply, &["sql_query", "sql", "query"]),
        })
    }

    fn synthesize(&self, request: &SynthesisRequest) -> CopilotResult<SynthesisOutput> {
        let feedback = feedback_section(&request.feedback);
        let prompt = render(
            SYNTHESIZE_TEMPLATE,
            &[
                ("question", &request.question),
                ("format_hint", &request.format_hint),
                ("constraints", &request.constraints),
                ("context", &request.context),
                ("sql_results", &request.sql_results),
                ("feedback", &feedback),
            ],
        );
        let reply = self.invoke("synthesize", &prompt)?;
        let value = parse::extract_json_object(&reply).ok_or_else(|| {
            CopilotError::malformed(
                "synthesize",
                format!("no JSON object in reply: {}", crate::util::truncate_string(&reply, 200)),
            )
        })?;
        SynthesisOutput::from_value(&value)
    }
}

fn feedback_section(feedback: &str) -> String {
    if feedback.trim().is_empty() {
        return String::new();
    }
    format!("Feedback from the previous attempt (fix these problems):\n{feedback}")
}

/// Substitute `{name}` placeholders in one pass; unknown names are kept.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedBackend {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionBackend for &ScriptedBackend {
        fn label(&self) -> String {
            "scripted".to_string()
        }

        fn complete(&self, prompt: &str) -> CopilotResult<String> {
            self.prompts.lock().expect("prompts lock").push(prompt.to_string());
            self.replies
                .lock()
                .expect("replies lock")
                .pop()
                .ok_or_else(|| CopilotError::unavailable("script exhausted"))
        }
    }

    #[test]
    fn render_substitutes_in_one_pass() {
        let rendered = render(
            "Q: {question}\nS: {schema}\nkeep {unknown} and {\"json\": 1}",
            &[("question", "what is {schema}?"), ("schema", "CREATE TABLE Orders")],
        );
        assert_eq!(
            rendered,
            "Q: what is {schema}?\nS: CREATE TABLE Orders\nkeep {unknown} and {\"json\": 1}"
        );
    }

    #[test]
    fn classify_accepts_json_or_plain_text() {
        let backend = ScriptedBackend::new(&["{\"route\": \"hybrid\"}", "Route: rag"]);
        let completion = PromptedCompletion::new(&backend);
        let request = ClassifyRequest {
            question: "what is the return policy?".to_string(),
        };
        assert_eq!(completion.classify(&request).expect("json").route, "hybrid");
        assert_eq!(completion.classify(&request).expect("text").route, "Route: rag");
        let prompts = backend.prompts.lock().expect("prompts lock");
        assert!(prompts[0].contains("Question: what is the return policy?"));
    }

    #[test]
    fn generate_sql_includes_feedback_only_on_retry() {
        let backend = ScriptedBackend::new(&[
            "```json\n{\"sql_query\": \"SELECT 1\"}\n```",
            "{\"sql\": \"SELECT 2\"}",
        ]);
        let completion = PromptedCompletion::new(&backend);
        let mut request = SqlRequest {
            question: "how many orders?".to_string(),
            schema: "CREATE TABLE Orders (OrderID INTEGER)".to_string(),
            constraints: String::new(),
            feedback: String::new(),
        };
        assert_eq!(completion.generate_sql(&request).expect("first").sql_query, "SELECT 1");
        request.feedback = "Previous attempt failed with errors: no such table".to_string();
        assert_eq!(completion.generate_sql(&request).expect("retry").sql_query, "SELECT 2");

        let prompts = backend.prompts.lock().expect("prompts lock");
        assert!(!prompts[0].contains("Feedback from the previous attempt"));
        assert!(prompts[1].contains("no such table"));
        assert!(prompts[1].contains("CREATE TABLE Orders"));
    }

    #[test]
    fn synthesize_applies_contract_defaults() {
        let backend = ScriptedBackend::new(&[
            "{\"final_answer\": [\"Chai\"], \"citations\": \"['doc::chunk1']\"}",
            "I think the answer is 42.",
            "{\"confidence\": 0.9}",
        ]);
        let completion = PromptedCompletion::new(&backend);
        let request = SynthesisRequest {
            question: "q".to_string(),
            format_hint: "list".to_string(),
            constraints: String::new(),
            context: "[]".to_string(),
            sql_results: "[]".to_string(),
            feedback: String::new(),
        };

        let output = completion.synthesize(&request).expect("defaults");
        assert_eq!(output.final_answer, json!(["Chai"]));
        assert_eq!(output.confidence, 0.0);
        assert_eq!(output.explanation, "");
        assert_eq!(output.citations, vec!["doc::chunk1"]);

        assert!(matches!(
            completion.synthesize(&request),
            Err(CopilotError::MalformedCompletion { operation: "synthesize", .. })
        ));
        assert!(matches!(
            completion.synthesize(&request),
            Err(CopilotError::MalformedCompletion { .. })
        ));
    }
}
