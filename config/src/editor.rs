//! In-place edits of a config file that keep comments and layout.

use std::path::Path;

use toml_edit::{DocumentMut, Item, Table, value};
use tracing::info;

use crate::error::{ConfigError, Result};

/// Sets a dotted `key` in the TOML file at `path`, creating the file and
/// intermediate tables when missing. Integers and booleans are written as
/// such, anything else as a string.
pub fn set_value(path: &Path, key: &str, raw: &str) -> Result<()> {
  let content = if path.exists() {
    std::fs::read_to_string(path)?
  } else {
    String::new()
  };
  let mut doc = content.parse::<DocumentMut>()?;

  let segments: Vec<&str> = key.split('.').collect();
  let Some((last, parents)) = segments.split_last() else {
    return Err(ConfigError::UnknownKey(key.to_string()));
  };
  if last.is_empty() || parents.iter().any(|segment| segment.is_empty()) {
    return Err(ConfigError::UnknownKey(key.to_string()));
  }

  let mut table: &mut Table = doc.as_table_mut();
  for segment in parents {
    let entry = table
      .entry(segment)
      .or_insert(Item::Table(Table::new()));
    table = entry.as_table_mut().ok_or_else(|| ConfigError::InvalidValue {
      key: key.to_string(),
      reason: format!("'{segment}' is not a table"),
    })?;
  }

  table[*last] = if let Ok(number) = raw.parse::<i64>() {
    value(number)
  } else if let Ok(flag) = raw.parse::<bool>() {
    value(flag)
  } else {
    value(raw)
  };

  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, doc.to_string())?;
  info!("Set {key} in {}", path.display());
  Ok(())
}
