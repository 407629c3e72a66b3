use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
  System,
  User,
  Agent,
}

/// A single chat message. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: ChatRole,
  pub content: String,
}

impl ChatMessage {
  pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
    Self {
      role,
      content: content.into(),
    }
  }

  pub fn system(content: impl Into<String>) -> Self {
    Self::new(ChatRole::System, content)
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self::new(ChatRole::User, content)
  }

  pub fn agent(content: impl Into<String>) -> Self {
    Self::new(ChatRole::Agent, content)
  }
}

/// Opaque per-user settings blob forwarded to every tool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserSettings {
  pub data: serde_json::Map<String, serde_json::Value>,
  #[serde(default)]
  pub version: Option<i64>,
}

/// A submitted chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatQuery {
  pub messages: Vec<ChatMessage>,
  #[serde(default)]
  pub api_key: Option<String>,
  pub conversation_id: Uuid,
  pub new_message_id: Uuid,
  pub user_email: String,
  #[serde(default)]
  pub settings: Option<UserSettings>,
}

impl ChatQuery {
  /// Content of the last message, empty when there are no messages.
  pub fn latest_message(&self) -> &str {
    self
      .messages
      .last()
      .map(|message| message.content.as_str())
      .unwrap_or_default()
  }

  /// Every message before the last one.
  pub fn history(&self) -> &[ChatMessage] {
    match self.messages.split_last() {
      Some((_, history)) => history,
      None => &[],
    }
  }
}
