//! `{name}` style prompt templates.
//!
//! Placeholder names are identifier characters only; a `{` followed by
//! anything else is literal text. Substitution is lenient: placeholders
//! without a value are left as they are so a template can be filled in
//! several passes. `{{` and `}}` stay escaped until the final
//! [`PromptTemplate::format`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate(String);

impl PromptTemplate {
  pub fn new(template: impl Into<String>) -> Self {
    Self(template.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Substitutes the given values and keeps escapes for a later pass.
  pub fn partial(&self, vars: &[(&str, &str)]) -> PromptTemplate {
    PromptTemplate(substitute(&self.0, vars, false))
  }

  /// Substitutes the given values and resolves `{{`/`}}` escapes.
  pub fn format(&self, vars: &[(&str, &str)]) -> String {
    substitute(&self.0, vars, true)
  }
}

impl std::fmt::Display for PromptTemplate {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

fn substitute(template: &str, vars: &[(&str, &str)], unescape: bool) -> String {
  let mut out = String::with_capacity(template.len());
  let mut rest = template;

  while let Some(pos) = rest.find(['{', '}']) {
    out.push_str(&rest[..pos]);
    let tail = &rest[pos..];

    if tail.starts_with("{{") || tail.starts_with("}}") {
      out.push_str(if unescape { &tail[..1] } else { &tail[..2] });
      rest = &tail[2..];
      continue;
    }

    if let Some(after) = tail.strip_prefix('{') {
      let name_len = after
        .find(|c: char| !is_name_char(c))
        .unwrap_or(after.len());
      if after[name_len..].starts_with('}') {
        let name = &after[..name_len];
        match vars.iter().find(|(key, _)| *key == name) {
          Some((_, value)) => out.push_str(value),
          None => out.push_str(&tail[..name_len + 2]),
        }
        rest = &after[name_len + 1..];
        continue;
      }
    }

    out.push_str(&tail[..1]);
    rest = &tail[1..];
  }

  out.push_str(rest);
  out
}

fn is_name_char(c: char) -> bool {
  c.is_alphanumeric() || c == '_'
}
