//! Deterministic cleanup of model-drafted SQL before execution.

/// Query executed when generation produced nothing usable; it always fails so
/// the run still reaches execution and the repair loop sees an SQL error.
pub const SENTINEL_QUERY: &str = "SELECT * FROM __no_generated_query__;";

/// Normalize raw generator output into a single statement ending in `;`.
///
/// Returns `None` when nothing resembling a `SELECT` statement remains.
pub fn clean_generated_sql(raw: &str) -> Option<String> {
    let unfenced = strip_leading_fence(raw);
    let start = find_select(unfenced)?;
    let statement = unfenced[start..]
        .trim()
        .trim_start_matches(|ch: char| ch == ']' || ch.is_whitespace())
        .trim_end_matches(|ch: char| ch == ';' || ch.is_whitespace());
    if statement.is_empty() {
        return None;
    }
    Some(format!("{statement};"))
}

fn strip_leading_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.get(..3) {
        Some(tag) if tag.eq_ignore_ascii_case("sql") => &rest[3..],
        _ => rest,
    };
    match rest.find("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

fn find_select(text: &str) -> Option<usize> {
    text.to_ascii_uppercase().find("SELECT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_output_with_language_tag_is_unwrapped() {
        let raw = "```sql\nSELECT ProductName FROM Products LIMIT 3\n```";
        assert_eq!(
            clean_generated_sql(raw).as_deref(),
            Some("SELECT ProductName FROM Products LIMIT 3;")
        );
    }

    #[test]
    fn prose_before_the_statement_is_discarded() {
        let raw = "Here is the query you asked for: select count(*) from Orders;;  ";
        assert_eq!(
            clean_generated_sql(raw).as_deref(),
            Some("select count(*) from Orders;")
        );
    }

    #[test]
    fn bracket_artifacts_and_plain_fences_are_removed() {
        let raw = "```\n]  SELECT 1\n```\ntrailing notes";
        assert_eq!(clean_generated_sql(raw).as_deref(), Some("SELECT 1;"));
    }

    #[test]
    fn output_without_a_select_is_empty() {
        assert_eq!(clean_generated_sql(""), None);
        assert_eq!(clean_generated_sql("   "), None);
        assert_eq!(clean_generated_sql("I cannot answer that."), None);
        assert_eq!(clean_generated_sql("```sql\n```"), None);
    }
}
