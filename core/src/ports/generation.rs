//! Text generation port.
//!
//! The agent never talks to a model provider directly. Every prompt goes
//! through a [`TextGenerator`] built by a [`GeneratorFactory`] for the
//! configured model name and the caller's API key.

use std::sync::Arc;

use agentkit_protocol::{ChatMessage, ChatRole};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Callback receiving each streamed token.
pub type TokenCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
  System,
  Human,
  Ai,
}

/// Provider-neutral prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
  pub role: PromptRole,
  pub content: String,
}

impl PromptMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self {
      role: PromptRole::System,
      content: content.into(),
    }
  }

  pub fn human(content: impl Into<String>) -> Self {
    Self {
      role: PromptRole::Human,
      content: content.into(),
    }
  }

  pub fn ai(content: impl Into<String>) -> Self {
    Self {
      role: PromptRole::Ai,
      content: content.into(),
    }
  }
}

impl From<&ChatMessage> for PromptMessage {
  fn from(message: &ChatMessage) -> Self {
    let role = match message.role {
      ChatRole::System => PromptRole::System,
      ChatRole::User => PromptRole::Human,
      ChatRole::Agent => PromptRole::Ai,
    };
    Self {
      role,
      content: message.content.clone(),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, derive_more::IsVariant)]
pub enum GenerationError {
  /// The provider rejected the API key
  #[error("Authentication failed: {0}")]
  Authentication(String),

  #[error("Model request timed out")]
  Timeout,

  #[error("Model provider error: {0}")]
  Provider(String),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
  fn model_name(&self) -> &str;

  async fn generate(&self, messages: &[PromptMessage]) -> Result<String, GenerationError>;

  /// Generates while reporting tokens as they arrive. Providers without
  /// streaming fall back to a single [`TextGenerator::generate`] call and
  /// report no tokens.
  async fn generate_streaming(
    &self,
    messages: &[PromptMessage],
    _on_token: TokenCallback<'_>,
  ) -> Result<String, GenerationError> {
    self.generate(messages).await
  }
}

/// Builds generators for a model name, optionally with a per-request API key.
pub trait GeneratorFactory: Send + Sync {
  fn create(
    &self,
    model: &str,
    api_key: Option<&str>,
  ) -> Result<Arc<dyn TextGenerator>, GenerationError>;
}
