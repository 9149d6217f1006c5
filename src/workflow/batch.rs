//! JSONL batch driver: one workflow run per input line, one output line per
//! run, flushed as soon as it is written so partial batches survive a crash.
use super::run::Workflow;
use super::state::RunState;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, Write};

#[derive(Debug, Deserialize)]
struct BatchQuestion {
    #[serde(default)]
    id: Value,
    question: String,
    #[serde(default)]
    format_hint: String,
}

/// Output record written for every non-blank input line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAnswer {
    pub id: Value,
    pub final_answer: Value,
    pub sql: String,
    pub confidence: f64,
    pub explanation: String,
    pub citations: Vec<String>,
}

impl BatchAnswer {
    fn from_state(id: Value, state: RunState) -> Self {
        Self {
            id,
            final_answer: state.final_answer,
            sql: state.sql_query,
            confidence: state.confidence,
            explanation: state.explanation,
            citations: state.citations,
        }
    }

    fn rejected(id: Value, reason: String) -> Self {
        Self {
            id,
            final_answer: Value::Null,
            sql: String::new(),
            confidence: 0.0,
            explanation: reason,
            citations: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub answered: usize,
    pub rejected: usize,
    /// Runs that finished with errors left after the repair budget.
    pub unresolved: usize,
}

/// Run every question in `input` and append answers to `output`.
pub fn run_batch<R: BufRead, W: Write>(
    workflow: &Workflow<'_>,
    input: R,
    output: &mut W,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    for (line_no, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("read batch input line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        let answer = match serde_json::from_str::<BatchQuestion>(&line) {
            Ok(record) => {
                tracing::info!(line = line_no + 1, id = %record.id, "batch question");
                let state = workflow.run(&record.question, &record.format_hint);
                if !state.errors.is_empty() {
                    summary.unresolved += 1;
                }
                summary.answered += 1;
                BatchAnswer::from_state(record.id, state)
            }
            Err(err) => {
                tracing::warn!(line = line_no + 1, error = %err, "rejecting batch line");
                summary.rejected += 1;
                BatchAnswer::rejected(
                    salvage_id(&line),
                    format!("invalid input on line {}: {err}", line_no + 1),
                )
            }
        };

        let encoded = serde_json::to_string(&answer).context("serialize batch answer")?;
        writeln!(output, "{encoded}").context("write batch answer")?;
        output.flush().context("flush batch output")?;
    }
    Ok(summary)
}

fn salvage_id(line: &str) -> Value {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|value| value.get("id").cloned())
        .unwrap_or(Value::Null)
}
