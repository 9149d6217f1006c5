//! The routing/repair state machine for one question.
//!
//! Each stage handler mutates [`RunState`] and returns the next [`Stage`].
//! Step failures are recorded in `state.errors` and feed the repair loop;
//! nothing past routing aborts a run.
use super::routing::{keyword_route, normalize_route, repair_feedback, repair_target, RepairTarget};
use super::state::{Route, RunState, Stage};
use crate::completion::{
    ClassifyRequest, CompletionService, ConstraintRequest, SynthesisRequest,
};
use crate::error::CopilotError;
use crate::retrieval::{DocumentChunk, RetrievalIndex, DEFAULT_TOP_K};
use crate::sql::{
    extract_tables, sql_citation, GeneratedSql, QueryEngine, Row, SqlGenerator, PLACEHOLDER_QUERY,
    SENTINEL_QUERY,
};
use crate::validate::validate_answer;
use serde_json::Value;

/// Repairs allowed per run before the workflow stops with what it has.
pub const MAX_REPAIRS: u32 = 2;

/// Constraints used when none could be extracted.
pub const NO_CONSTRAINTS: &str = "No specific constraints found.";

/// Answer returned when no completion service is configured.
pub const PLACEHOLDER_ANSWER: &str =
    "completion service not configured; no answer was synthesized";

const EMPTY_SQL_ERROR: &str = "SQL generation returned no usable query";

/// Wires the retrieval index, the query engine and the completion service
/// into the end-to-end pipeline. Holds shared references only, so one
/// workflow can drive any number of sequential runs.
pub struct Workflow<'a> {
    index: &'a RetrievalIndex,
    engine: &'a QueryEngine,
    generator: &'a SqlGenerator,
    completion: Option<&'a dyn CompletionService>,
    top_k: usize,
}

impl<'a> Workflow<'a> {
    pub fn new(
        index: &'a RetrievalIndex,
        engine: &'a QueryEngine,
        generator: &'a SqlGenerator,
        completion: Option<&'a dyn CompletionService>,
    ) -> Self {
        Self {
            index,
            engine,
            generator,
            completion,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Drive one question from `Routing` to `Done`.
    pub fn run(&self, question: &str, format_hint: &str) -> RunState {
        let mut state = RunState::new(question, format_hint);
        let mut stage = Stage::Routing;
        loop {
            state.trace.push(stage);
            tracing::debug!(?stage, repair_count = state.repair_count, "workflow stage");
            stage = match stage {
                Stage::Routing => self.route(&mut state),
                Stage::Retrieving => self.retrieve(&mut state),
                Stage::Planning => self.plan(&mut state),
                Stage::SqlGenerating => self.generate_sql(&mut state),
                Stage::Executing => self.execute(&mut state),
                Stage::Synthesizing => self.synthesize(&mut state),
                Stage::Validating => validate(&mut state),
                Stage::Repairing => repair(&mut state),
                Stage::Done => break,
            };
        }
        tracing::info!(
            route = %state.route,
            repair_count = state.repair_count,
            errors = state.errors.len(),
            confidence = state.confidence,
            "workflow done"
        );
        state
    }

    fn route(&self, state: &mut RunState) -> Stage {
        let classified = self.completion.and_then(|completion| {
            let request = ClassifyRequest {
                question: state.question.clone(),
            };
            match completion.classify(&request) {
                Ok(output) => normalize_route(&output.route),
                Err(err) => {
                    tracing::warn!(error = %err, "classification failed; using keyword routing");
                    None
                }
            }
        });
        state.route = classified.unwrap_or_else(|| keyword_route(&state.question));
        tracing::info!(route = %state.route, classified = classified.is_some(), "question routed");

        if state.route.needs_retrieval() {
            Stage::Retrieving
        } else {
            Stage::SqlGenerating
        }
    }

    fn retrieve(&self, state: &mut RunState) -> Stage {
        state.context = self.index.search(&state.question, self.top_k);
        tracing::info!(hits = state.context.len(), "context retrieved");
        Stage::Planning
    }

    fn plan(&self, state: &mut RunState) -> Stage {
        state.constraints = match self.completion {
            None => NO_CONSTRAINTS.to_string(),
            Some(completion) => {
                let request = ConstraintRequest {
                    question: state.question.clone(),
                    context: context_json(&state.context),
                };
                match completion.extract_constraints(&request) {
                    Ok(output) if !output.constraints.trim().is_empty() => output.constraints,
                    Ok(_) => NO_CONSTRAINTS.to_string(),
                    Err(err) => {
                        tracing::warn!(error = %err, "constraint extraction failed");
                        NO_CONSTRAINTS.to_string()
                    }
                }
            }
        };

        if state.route.needs_sql() {
            Stage::SqlGenerating
        } else {
            Stage::Synthesizing
        }
    }

    fn generate_sql(&self, state: &mut RunState) -> Stage {
        let generated = self.generator.generate(
            self.completion,
            &state.question,
            &state.constraints,
            &state.feedback,
        );
        state.sql_query = match generated {
            Ok(GeneratedSql::Query(query)) => query,
            Ok(GeneratedSql::Placeholder) => PLACEHOLDER_QUERY.to_string(),
            Ok(GeneratedSql::Empty) => {
                state.errors.push(EMPTY_SQL_ERROR.to_string());
                SENTINEL_QUERY.to_string()
            }
            Err(err) => {
                state.errors.push(format!("SQL generation failed: {err}"));
                SENTINEL_QUERY.to_string()
            }
        };
        Stage::Executing
    }

    fn execute(&self, state: &mut RunState) -> Stage {
        state.sql_results.clear();
        state.sql_tables.clear();
        match self.engine.execute(&state.sql_query) {
            Ok(rows) => {
                state.sql_tables = extract_tables(&state.sql_query);
                state.sql_results = rows;
            }
            Err(err) => state.errors.push(err.to_string()),
        }
        Stage::Synthesizing
    }

    fn synthesize(&self, state: &mut RunState) -> Stage {
        match self.completion {
            None => {
                state.final_answer = Value::String(PLACEHOLDER_ANSWER.to_string());
                state.confidence = 0.0;
                state.explanation =
                    "No completion service is configured; citations list the evidence gathered."
                        .to_string();
                state.citations = state.context.iter().map(|chunk| chunk.id.clone()).collect();
            }
            Some(completion) => {
                let request = SynthesisRequest {
                    question: state.question.clone(),
                    format_hint: state.format_hint.clone(),
                    constraints: state.constraints.clone(),
                    context: context_json(&state.context),
                    sql_results: rows_json(&state.sql_results),
                    feedback: state.feedback.clone(),
                };
                match completion.synthesize(&request) {
                    Ok(output) => {
                        state.final_answer = output.final_answer;
                        state.confidence = output.confidence.clamp(0.0, 1.0);
                        state.explanation = output.explanation;
                        state.citations = output.citations;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "synthesis failed");
                        state.confidence = 0.0;
                        state.errors.push(format!("Answer synthesis failed: {err}"));
                        return Stage::Validating;
                    }
                }
            }
        }

        if let Some(citation) = sql_citation(&state.sql_tables) {
            if !state.citations.contains(&citation) {
                state.citations.push(citation);
            }
        }
        Stage::Validating
    }
}

fn validate(state: &mut RunState) -> Stage {
    if state.errors.is_empty() {
        let issues = validate_answer(&state.final_answer, &state.format_hint);
        state.errors.extend(
            issues
                .into_iter()
                .map(|issue| CopilotError::FormatValidation(issue).to_string()),
        );
    }

    if !state.errors.is_empty() && state.repair_count < MAX_REPAIRS {
        Stage::Repairing
    } else {
        Stage::Done
    }
}

fn repair(state: &mut RunState) -> Stage {
    state.repair_count += 1;
    state.feedback = repair_feedback(&state.errors);
    state.errors.clear();
    tracing::warn!(
        repair_count = state.repair_count,
        feedback = %state.feedback,
        "repairing run"
    );

    // A rag run never drafted a query, so there is nothing to regenerate.
    if state.route == Route::Rag {
        return Stage::Synthesizing;
    }
    match repair_target(&state.feedback) {
        RepairTarget::SqlGenerating => Stage::SqlGenerating,
        RepairTarget::Synthesizing => Stage::Synthesizing,
    }
}

fn context_json(context: &[DocumentChunk]) -> String {
    serde_json::to_string(context).unwrap_or_else(|_| "[]".to_string())
}

fn rows_json(rows: &[Row]) -> String {
    serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
