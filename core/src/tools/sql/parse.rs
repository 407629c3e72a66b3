//! Extraction of SQL and validation verdicts from model answers.

use std::sync::LazyLock;

use regex::Regex;

use crate::tools::ToolError;

static VALIDATION: LazyLock<Option<Regex>> = LazyLock::new(|| {
  Regex::new(r"(?im)^Valid:\s*(?P<valid>yes|no)\s*Reason:\s*(?P<reason>.*)$").ok()
});

/// Pulls the query out of a fenced `sql` block.
///
/// The first ```` ```sql ```` fence wins, a single-backtick `` `sql `` fence
/// is the fallback. With `limit` set and no `LIMIT` in the query, a trailing
/// semicolon is dropped and `LIMIT <limit>` appended.
pub fn parse_query(response: &str, limit: Option<usize>) -> Result<String, ToolError> {
  let response = response.replace(['\n', '\r'], " ");
  let lowered = response.to_ascii_lowercase();

  let (start, marker_len) = match lowered.find("```sql") {
    Some(pos) => (pos, "```sql".len()),
    None => (lowered.find("`sql").ok_or(ToolError::Parse)?, "`sql".len()),
  };
  let body_start = start + marker_len;
  let end = find_from(&response, "```", body_start)
    .or_else(|| find_from(&response, "`", body_start))
    .ok_or(ToolError::Parse)?;

  let mut query = response
    .get(body_start..end)
    .unwrap_or_default()
    .trim()
    .to_string();

  if let Some(limit) = limit {
    if !query.to_uppercase().contains("LIMIT") {
      if let Some((index, _)) = query
        .char_indices()
        .rev()
        .take(3)
        .find(|(_, c)| *c == ';')
      {
        query.truncate(index);
      }
      query = format!("{} LIMIT {limit}", query.trim_end());
    }
  }

  Ok(query)
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
  haystack
    .get(from..)
    .and_then(|rest| rest.find(needle))
    .map(|pos| pos + from)
}

/// Verdict of an LLM validation answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
  pub is_valid: bool,
  /// Reason given by the model, or the whole answer when it was unparsable
  pub complaint: String,
}

/// Parses a `Valid: yes|no` / `Reason: ...` answer.
pub fn parse_validation(response: &str) -> Validation {
  let captures = VALIDATION
    .as_ref()
    .and_then(|pattern| pattern.captures(response));
  match captures {
    Some(captures) => Validation {
      is_valid: captures
        .name("valid")
        .is_some_and(|valid| valid.as_str().to_lowercase().contains('y')),
      complaint: captures
        .name("reason")
        .map(|reason| reason.as_str().to_string())
        .unwrap_or_default(),
    },
    None => Validation {
      is_valid: false,
      complaint: response.to_string(),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn triple_backtick_fence_is_extracted() {
    let response = "Here you go:\n```sql\nSELECT id\nFROM orders\n```\nDone.";
    assert_eq!(
      parse_query(response, None).expect("parse"),
      "SELECT id FROM orders"
    );
  }

  #[test]
  fn fence_tag_is_case_insensitive() {
    assert_eq!(
      parse_query("```SQL select 1```", None).expect("parse"),
      "select 1"
    );
  }

  #[test]
  fn single_backtick_fence_is_fallback() {
    assert_eq!(
      parse_query("run `sql SELECT 1` please", None).expect("parse"),
      "SELECT 1"
    );
  }

  #[test]
  fn missing_fence_is_a_parse_error() {
    assert!(matches!(
      parse_query("SELECT * FROM t", None),
      Err(ToolError::Parse)
    ));
    assert!(matches!(parse_query("```sql SELECT 1", None), Err(ToolError::Parse)));
  }

  #[test]
  fn limit_is_appended_once() {
    assert_eq!(
      parse_query("```sql SELECT * FROM t; ```", Some(3)).expect("parse"),
      "SELECT * FROM t LIMIT 3"
    );
    assert_eq!(
      parse_query("```sql SELECT * FROM t```", Some(5)).expect("parse"),
      "SELECT * FROM t LIMIT 5"
    );
    assert_eq!(
      parse_query("```sql SELECT * FROM t limit 10```", Some(3)).expect("parse"),
      "SELECT * FROM t limit 10"
    );
  }

  #[test]
  fn semicolon_after_non_ascii_literal_is_dropped() {
    let query = parse_query("```sql SELECT name FROM t WHERE c = 'é';```", Some(3)).expect("parse");
    assert_eq!(query, "SELECT name FROM t WHERE c = 'é' LIMIT 3");

    let query =
      parse_query("```sql SELECT name FROM t WHERE city = 'Zürich';```", Some(3)).expect("parse");
    assert_eq!(query, "SELECT name FROM t WHERE city = 'Zürich' LIMIT 3");
    assert!(crate::tools::sql::is_sql_query_safe(&query));
  }

  #[test]
  fn validation_answers_are_parsed() {
    assert_eq!(
      parse_validation("Valid: yes\nReason: matches the question"),
      Validation {
        is_valid: true,
        complaint: "matches the question".to_string(),
      }
    );
    assert_eq!(
      parse_validation("Thoughts first.\nvalid: NO\nreason: wrong table"),
      Validation {
        is_valid: false,
        complaint: "wrong table".to_string(),
      }
    );
    assert_eq!(
      parse_validation("I am not sure"),
      Validation {
        is_valid: false,
        complaint: "I am not sure".to_string(),
      }
    );
  }
}
