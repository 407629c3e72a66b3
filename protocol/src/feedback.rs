use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::UserSettings;

/// User feedback on one agent answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
  pub conversation_id: Uuid,
  pub message_id: Uuid,
  pub user: String,
  pub score: i64,
  pub comment: String,
  pub key: String,
  #[serde(default)]
  pub settings: Option<UserSettings>,
  /// Feedback previously given for the same message, replaced by this one.
  #[serde(default)]
  pub previous_id: Option<String>,
}

/// Rows returned by a direct SQL execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
  pub raw_result: Vec<serde_json::Map<String, serde_json::Value>>,
  pub affected_rows: Option<u64>,
  pub error: Option<String>,
}

/// Envelope returned by the guarded SQL execution entry point.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqlExecutionResponse {
  pub message: String,
  pub data: Option<ExecutionResult>,
}

impl SqlExecutionResponse {
  pub fn message(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      data: None,
    }
  }
}
