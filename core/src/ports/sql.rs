//! Read-only relational database port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Schema information for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
  pub schema_name: String,
  pub table_name: String,
  /// Column listing or DDL, shown verbatim to the model.
  pub structure: String,
}

impl TableInfo {
  pub fn new(
    schema_name: impl Into<String>,
    table_name: impl Into<String>,
    structure: impl Into<String>,
  ) -> Self {
    Self {
      schema_name: schema_name.into(),
      table_name: table_name.into(),
      structure: structure.into(),
    }
  }

  /// Qualified `schema.table` name.
  pub fn name(&self) -> String {
    if self.schema_name.is_empty() {
      self.table_name.clone()
    } else {
      format!("{}.{}", self.schema_name, self.table_name)
    }
  }
}

/// Result rows of a query, cells in column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryRows {
  pub columns: Vec<String>,
  pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  /// Rows as `column -> value` records.
  pub fn into_records(self) -> Vec<Map<String, Value>> {
    let columns = self.columns;
    self
      .rows
      .into_iter()
      .map(|row| columns.iter().cloned().zip(row).collect())
      .collect()
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlError {
  #[error("SQL execution failed: {0}")]
  Execution(String),

  #[error("Database schema information is not initialized")]
  MissingSchema,
}

#[async_trait]
pub trait SqlDatabase: Send + Sync {
  async fn tables(&self) -> Result<Vec<TableInfo>, SqlError>;

  /// Runs a statement. `None` means the statement produced no result set.
  async fn execute(&self, query: &str) -> Result<Option<QueryRows>, SqlError>;
}
