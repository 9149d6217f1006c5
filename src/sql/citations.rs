//! Table-name extraction from executed SQL, used to build `SQL: ...` citations.
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static TABLE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+(?:"([^"]+)"|'([^']+)'|`([^`]+)`|([^\s,;()]+))"#)
        .expect("table reference regex")
});

const RESERVED: [&str; 3] = ["AS", "ON", "WHERE"];

/// Every table named after `FROM` or `JOIN`, deduplicated and sorted.
pub fn extract_tables(query: &str) -> BTreeSet<String> {
    TABLE_REF
        .captures_iter(query)
        .filter_map(|caps| {
            (1..=4)
                .find_map(|group| caps.get(group))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|name| {
            !name.is_empty()
                && !RESERVED
                    .iter()
                    .any(|reserved| reserved.eq_ignore_ascii_case(name))
        })
        .collect()
}

/// Render a table set as a single citation entry.
pub fn sql_citation(tables: &BTreeSet<String>) -> Option<String> {
    if tables.is_empty() {
        return None;
    }
    let names: Vec<&str> = tables.iter().map(String::as_str).collect();
    Some(format!("SQL: {}", names.join(", ")))
}
