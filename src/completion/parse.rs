//! Boundary parsing of LM replies into JSON values and plain text.
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

static QUOTED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'([^']*)'|"([^"]*)""#).expect("quoted item regex"));

/// Locate a JSON object in a reply that may carry code fences or prose.
pub(crate) fn extract_json_object(text: &str) -> Option<Value> {
    let candidate = extract_fenced(text);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
        return Some(value);
    }
    first_object_in_text(candidate)
}

/// Text inside the first code fence, or the trimmed input when unfenced.
pub(crate) fn extract_fenced(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip language identifier if present
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}

fn first_object_in_text(raw: &str) -> Option<Value> {
    for (idx, ch) in raw.char_indices() {
        if ch != '{' {
            continue;
        }
        let mut deserializer = serde_json::Deserializer::from_str(&raw[idx..]);
        if let Ok(value @ Value::Object(_)) = Value::deserialize(&mut deserializer) {
            return Some(value);
        }
    }
    None
}

/// Read the first string-valued key out of a JSON reply, falling back to the
/// whole reply as text when it holds no JSON object.
pub(crate) fn text_field(reply: &str, keys: &[&str]) -> String {
    if let Some(Value::Object(map)) = extract_json_object(reply) {
        if let Some(text) = keys
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
        {
            return text.trim().to_string();
        }
    }
    reply.trim().to_string()
}

/// Normalize citations that arrive as a list, a list literal inside a
/// string, or one citation per line.
pub(crate) fn normalize_citations(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(clean_citation(text)),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|text| !text.is_empty())
            .collect(),
        Value::String(text) => unwrap_citation_text(text),
        _ => Vec::new(),
    }
}

fn unwrap_citation_text(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items
                .iter()
                .map(String::as_str)
                .map(clean_citation)
                .filter(|item| !item.is_empty())
                .collect();
        }
        let inner = &trimmed[1..trimmed.len() - 1];
        let quoted: Vec<String> = QUOTED_ITEM
            .captures_iter(inner)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|item| clean_citation(item.as_str()))
            .filter(|item| !item.is_empty())
            .collect();
        if !quoted.is_empty() {
            return quoted;
        }
        return inner
            .split(',')
            .map(clean_citation)
            .filter(|item| !item.is_empty())
            .collect();
    }
    trimmed
        .lines()
        .map(clean_citation)
        .filter(|item| !item.is_empty())
        .collect()
}

fn clean_citation(text: &str) -> String {
    text.trim()
        .trim_matches(|ch: char| matches!(ch, '[' | ']' | '"' | '\'') || ch.is_whitespace())
        .trim_start_matches("- ")
        .to_string()
}

/// Accept a number or a numeric string; anything else, including NaN and
/// infinities, reads as zero.
pub(crate) fn lenient_f64(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|number| number.is_finite()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_plain() {
        let value = extract_json_object(r#"{"route": "sql"}"#).expect("object");
        assert_eq!(value["route"], "sql");
    }

    #[test]
    fn test_extract_json_with_fences() {
        let text = "Here is the response:\n```json\n{\"route\": \"rag\"}\n```\n";
        assert_eq!(extract_json_object(text).expect("object")["route"], "rag");
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = "Sure! {\"constraints\": \"1997-06-01..1997-06-30\"} hope that helps";
        assert_eq!(
            text_field(text, &["constraints"]),
            "1997-06-01..1997-06-30"
        );
    }

    #[test]
    fn text_field_falls_back_to_raw_reply() {
        assert_eq!(text_field("  hybrid\n", &["route"]), "hybrid");
        assert_eq!(text_field(r#"{"other": 1}"#, &["route"]), r#"{"other": 1}"#);
    }

    #[test]
    fn citations_are_unwrapped_from_list_literals() {
        assert_eq!(
            normalize_citations(&json!("['product_policy::chunk1', 'SQL: Orders']")),
            vec!["product_policy::chunk1", "SQL: Orders"]
        );
        assert_eq!(
            normalize_citations(&json!(r#"["kpi_definitions::chunk1", "SQL: Orders, Products"]"#)),
            vec!["kpi_definitions::chunk1", "SQL: Orders, Products"]
        );
        assert_eq!(
            normalize_citations(&json!("['kpi_definitions::chunk1', 'SQL: Orders, Products']")),
            vec!["kpi_definitions::chunk1", "SQL: Orders, Products"]
        );
        assert_eq!(
            normalize_citations(&json!("[doc::chunk0, doc::chunk3]")),
            vec!["doc::chunk0", "doc::chunk3"]
        );
        assert_eq!(
            normalize_citations(&json!(["[doc::chunk0]", null, ""])),
            vec!["doc::chunk0"]
        );
        assert_eq!(
            normalize_citations(&json!("- doc::chunk0\n- doc::chunk2")),
            vec!["doc::chunk0", "doc::chunk2"]
        );
    }

    #[test]
    fn confidence_accepts_numeric_strings() {
        assert_eq!(lenient_f64(&json!(0.75)), 0.75);
        assert_eq!(lenient_f64(&json!("0.5")), 0.5);
        assert_eq!(lenient_f64(&json!("high")), 0.0);
        assert_eq!(lenient_f64(&Value::Null), 0.0);
        assert_eq!(lenient_f64(&json!("NaN")), 0.0);
        assert_eq!(lenient_f64(&json!("inf")), 0.0);
        assert_eq!(lenient_f64(&json!("-infinity")), 0.0);
    }
}
