//! Syntactic checks of a synthesized answer against its format hint.
//!
//! These are sanity checks only: a bracket-delimited answer passes the list
//! check whatever its contents.
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digit regex"));
static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+").expect("decimal regex"));

/// One reason an answer does not match its hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatIssue {
    EmptyAnswer,
    MissingInteger,
    MissingNumber,
    NotAList,
    NotAnObject,
}

impl fmt::Display for FormatIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAnswer => write!(f, "Final answer is empty."),
            Self::MissingInteger => write!(f, "Expected an integer answer but found no digits."),
            Self::MissingNumber => write!(f, "Expected a numeric answer but found no number."),
            Self::NotAList => write!(f, "Expected a list answer enclosed in [ and ]."),
            Self::NotAnObject => write!(f, "Expected an object answer enclosed in {{ and }}."),
        }
    }
}

/// Check `answer` against `format_hint`. An empty or null answer yields a
/// single issue whatever the hint says.
pub fn validate_answer(answer: &Value, format_hint: &str) -> Vec<FormatIssue> {
    let text = answer_text(answer);
    if text.trim().is_empty() {
        return vec![FormatIssue::EmptyAnswer];
    }

    let hint = format_hint.to_lowercase();
    let trimmed = text.trim();
    let mut issues = Vec::new();
    if hint.contains("int") && !DIGITS.is_match(trimmed) {
        issues.push(FormatIssue::MissingInteger);
    }
    if hint.contains("float") && !DECIMAL.is_match(trimmed) && !DIGITS.is_match(trimmed) {
        issues.push(FormatIssue::MissingNumber);
    }
    if hint.contains("list") && !(trimmed.starts_with('[') && trimmed.ends_with(']')) {
        issues.push(FormatIssue::NotAList);
    }
    if (hint.contains("json") || hint.contains('{'))
        && !(trimmed.starts_with('{') && trimmed.ends_with('}'))
    {
        issues.push(FormatIssue::NotAnObject);
    }
    issues
}

/// Stringify an answer the way the checks see it: strings verbatim, other
/// values as compact JSON, null as empty.
pub fn answer_text(answer: &Value) -> String {
    match answer {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
