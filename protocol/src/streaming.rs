use serde::{Deserialize, Serialize};

/// Free-form key/value metadata attached to every streamed item.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Kind of payload carried by a [`StreamingData`] item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingDataType {
  /// Plain text.
  #[default]
  Text,
  /// Model token or model-level error text.
  Llm,
  /// Rich result rendered next to the answer (tables, charts, configs).
  Appendix,
  /// Progress marker for a tool step.
  Action,
  /// Lifecycle signal, see [`StreamingSignal`].
  Signal,
}

/// Lifecycle signals carried as `data` of a [`StreamingDataType::Signal`] item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamingSignal {
  #[display("START")]
  Start,
  #[display("END")]
  End,
  #[display("TOOL_END")]
  ToolEnd,
  #[display("LLM_END")]
  LlmEnd,
}

/// One item of the event stream sent back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingData {
  pub data: String,
  #[serde(default)]
  pub data_type: StreamingDataType,
  #[serde(default)]
  pub metadata: Metadata,
}

impl StreamingData {
  pub fn new(data: impl Into<String>, data_type: StreamingDataType, metadata: Metadata) -> Self {
    Self {
      data: data.into(),
      data_type,
      metadata,
    }
  }

  pub fn signal(signal: StreamingSignal, metadata: Metadata) -> Self {
    Self::new(signal.to_string(), StreamingDataType::Signal, metadata)
  }

  /// True when this item is the given lifecycle signal.
  pub fn is_signal(&self, signal: StreamingSignal) -> bool {
    self.data_type == StreamingDataType::Signal && self.data == signal.to_string()
  }

  pub fn run_id(&self) -> Option<&str> {
    self.metadata.get("run_id").and_then(|value| value.as_str())
  }
}
