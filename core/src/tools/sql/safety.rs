//! Read-only SQL guard.
//!
//! Accepts a statement only when, after lower-casing and stripping comments,
//! it starts with `select` or `with`, contains no forbidden keyword or
//! pattern, and is made of whitelisted characters only. Anything else is
//! rejected, including text this module cannot inspect.

use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

const FORBIDDEN_KEYWORDS: &[&str] = &[
  "base64", "insert", "update", "delete", "replace", "create", "alter", "drop", "truncate", "grant",
  "revoke",
];

const FORBIDDEN_PATTERNS: &[&str] = &[
  ";",
  "--",
  "/*",
  "*/",
  "\\",
  "`",
  "|",
  "&",
  "$",
  "perl",
  "exec",
  "socket",
  "connect",
  "inet_aton",
  "sockaddr_in",
];

static FILTER: LazyLock<Option<SqlSafetyFilter>> = LazyLock::new(|| SqlSafetyFilter::new().ok());

/// True when `sql` is a single read-only query.
pub fn is_sql_query_safe(sql: &str) -> bool {
  FILTER.as_ref().is_some_and(|filter| filter.is_safe(sql))
}

#[derive(Debug)]
pub struct SqlSafetyFilter {
  comments: Regex,
  read_only_start: Regex,
  allowed_characters: Regex,
}

impl SqlSafetyFilter {
  pub fn new() -> Result<Self, regex::Error> {
    Ok(Self {
      comments: Regex::new(r"(?s)--[^\n]*|/\*.*?\*/")?,
      read_only_start: Regex::new(r"^\s*(select|with)\b")?,
      allowed_characters: Regex::new(r"^[a-zA-Z0-9\s,.*()_=<>!+\-/%']*$")?,
    })
  }

  pub fn is_safe(&self, sql: &str) -> bool {
    let lowered = sql.to_lowercase();
    let sql = self.comments.replace_all(&lowered, "");

    if !self.read_only_start.is_match(&sql) {
      info!("SQL query does not start with SELECT or WITH: {sql}");
      return false;
    }
    if FORBIDDEN_KEYWORDS.iter().any(|keyword| sql.contains(keyword)) {
      info!("SQL query contains forbidden keywords: {sql}");
      return false;
    }
    if FORBIDDEN_PATTERNS.iter().any(|pattern| sql.contains(pattern)) {
      info!("SQL query contains forbidden patterns: {sql}");
      return false;
    }
    if !self.allowed_characters.is_match(&sql) {
      info!("SQL query contains forbidden characters: {sql}");
      return false;
    }
    true
  }
}
