use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{ChatMessage, UserSettings};

/// Outputs of the previous plan step, keyed by tool name, in execution order.
pub type IntermediateSteps = serde_json::Map<String, Value>;

/// The only contract between the router and a tool.
///
/// Built fresh for every tool invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolInput {
  #[serde(default)]
  pub chat_history: Vec<ChatMessage>,
  pub latest_human_message: String,
  #[serde(default)]
  pub user_settings: Option<UserSettings>,
  #[serde(default)]
  pub intermediate_steps: IntermediateSteps,
}

impl ToolInput {
  pub fn new(latest_human_message: impl Into<String>) -> Self {
    Self {
      latest_human_message: latest_human_message.into(),
      ..Default::default()
    }
  }

  /// Output of a previous tool rendered as text.
  pub fn step_output(&self, tool: &str) -> Option<String> {
    self.intermediate_steps.get(tool).map(render_value)
  }
}

/// Renders a tool output the way it is shown to a model: strings verbatim,
/// anything structured as compact JSON.
pub fn render_value(value: &Value) -> String {
  match value {
    Value::String(text) => text.clone(),
    other => other.to_string(),
  }
}
