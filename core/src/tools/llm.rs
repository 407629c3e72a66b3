//! Model access shared by the built-in tools.

use std::sync::Arc;

use tracing::debug;

use crate::bus::EventSink;
use crate::ports::{GenerationError, PromptMessage, TextGenerator};
use crate::tokens::estimate_tokens;

/// Main and fast generators of one tool.
#[derive(Clone)]
pub struct ToolLlm {
  llm: Arc<dyn TextGenerator>,
  fast_llm: Arc<dyn TextGenerator>,
  fast_llm_token_limit: usize,
}

impl std::fmt::Debug for ToolLlm {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ToolLlm")
      .field("llm", &self.llm.model_name())
      .field("fast_llm", &self.fast_llm.model_name())
      .field("fast_llm_token_limit", &self.fast_llm_token_limit)
      .finish()
  }
}

impl ToolLlm {
  pub fn new(
    llm: Arc<dyn TextGenerator>,
    fast_llm: Arc<dyn TextGenerator>,
    fast_llm_token_limit: usize,
  ) -> Self {
    Self {
      llm,
      fast_llm,
      fast_llm_token_limit,
    }
  }

  pub fn main(&self) -> &Arc<dyn TextGenerator> {
    &self.llm
  }

  /// The fast model for short prompts unless the caller insists on the main one.
  pub fn select(&self, messages: &[PromptMessage], discard_fast: bool) -> &Arc<dyn TextGenerator> {
    if discard_fast {
      return &self.llm;
    }
    let prompt: String = messages
      .iter()
      .map(|message| message.content.as_str())
      .collect();
    if estimate_tokens(&prompt) < self.fast_llm_token_limit {
      &self.fast_llm
    } else {
      &self.llm
    }
  }

  pub async fn generate(
    &self,
    messages: &[PromptMessage],
    discard_fast: bool,
  ) -> Result<String, GenerationError> {
    let generator = self.select(messages, discard_fast);
    debug!(model = generator.model_name(), "generating response");
    generator.generate(messages).await
  }

  /// Generates on the main model, streaming tokens and `LLM_END` to the bus.
  pub async fn generate_streamed(
    &self,
    messages: &[PromptMessage],
    sink: &EventSink,
  ) -> Result<String, GenerationError> {
    let on_token = |token: &str| sink.on_llm_new_token(token);
    let output = self.llm.generate_streaming(messages, &on_token).await?;
    sink.on_llm_end();
    Ok(output)
  }
}
