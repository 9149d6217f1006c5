//! Pure decisions the workflow makes from free text: which route a question
//! takes and where a repair attempt resumes.
use super::state::Route;

/// Feedback used when a repair starts without recorded errors.
pub const GENERIC_REPAIR_FEEDBACK: &str =
    "Previous attempt failed validation. Re-check the answer against the format hint.";

const SQL_REPAIR_MARKERS: [&str; 4] = ["sql", "execution", "database", "syntax"];

/// Where a repair attempt resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairTarget {
    SqlGenerating,
    Synthesizing,
}

/// Map classifier output to a route. Containment is tested in the order
/// `rag`, `hybrid`, then anything else is `sql`. Blank output is `None` so
/// the caller can fall back to [`keyword_route`].
pub fn normalize_route(text: &str) -> Option<Route> {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }
    if text.contains("rag") {
        Some(Route::Rag)
    } else if text.contains("hybrid") {
        Some(Route::Hybrid)
    } else {
        Some(Route::Sql)
    }
}

/// Deterministic routing from the question text alone.
pub fn keyword_route(question: &str) -> Route {
    let question = question.to_lowercase();
    if question.contains("average order value") {
        Route::Hybrid
    } else if question.contains("policy") || question.contains("calendar") {
        Route::Rag
    } else {
        Route::Sql
    }
}

/// Fold the current attempt's errors into feedback for the next one.
pub fn repair_feedback(errors: &[String]) -> String {
    if errors.is_empty() {
        return GENERIC_REPAIR_FEEDBACK.to_string();
    }
    format!("Previous attempt failed with errors: {}", errors.join("; "))
}

/// Query-side failures go back to SQL generation; everything else only
/// needs a new synthesis.
pub fn repair_target(feedback: &str) -> RepairTarget {
    let feedback = feedback.to_lowercase();
    if SQL_REPAIR_MARKERS
        .iter()
        .any(|marker| feedback.contains(marker))
    {
        RepairTarget::SqlGenerating
    } else {
        RepairTarget::Synthesizing
    }
}
