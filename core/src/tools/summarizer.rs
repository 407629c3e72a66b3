//! Summarizes the outputs of the previous step.
//!
//! Inputs within the token budget are summarized in one call. Larger inputs
//! are split into budget-sized chunks, each chunk is summarized on its own
//! and the partial summaries are summarized once more.

use agentkit_config::{PromptTemplate, ToolConfig};
use agentkit_protocol::{ToolInput, render_value};
use async_trait::async_trait;
use itertools::Itertools;
use tracing::info;

use crate::ports::PromptMessage;
use crate::tokens::{estimate_tokens, split_by_tokens};
use crate::tools::{RunContext, Tool, ToolError, ToolLlm, ToolOutput};

pub struct SummarizerTool {
  name: String,
  description: String,
  prompt: PromptTemplate,
  max_token_length: usize,
  llm: ToolLlm,
}

impl SummarizerTool {
  pub fn new(
    name: impl Into<String>,
    config: &ToolConfig,
    max_token_length: usize,
    llm: ToolLlm,
  ) -> Self {
    let prompts = config.render();
    let prompt = if prompts.prompt_message.is_empty() {
      PromptTemplate::new("Write a concise summary of the following:\n\n{text}")
    } else {
      prompts.prompt_message
    };
    Self {
      name: name.into(),
      description: prompts.description.to_string(),
      prompt,
      max_token_length,
      llm,
    }
  }

  fn messages(&self, text: &str) -> [PromptMessage; 1] {
    [PromptMessage::human(self.prompt.format(&[("text", text)]))]
  }
}

#[async_trait]
impl Tool for SummarizerTool {
  fn name(&self) -> &str {
    &self.name
  }

  fn description(&self) -> &str {
    &self.description
  }

  async fn run(&self, input: &ToolInput, ctx: &RunContext) -> Result<ToolOutput, ToolError> {
    let outputs: Vec<String> = input
      .intermediate_steps
      .iter()
      .map(|(tool, output)| format!("{tool}: {}", render_value(output)))
      .collect();
    let raw_input = serde_json::to_string(input).unwrap_or_default();

    if estimate_tokens(&raw_input) <= self.max_token_length {
      let text = outputs.join("\n\n");
      let summary = self
        .llm
        .generate_streamed(&self.messages(&text), &ctx.sink)
        .await?;
      return Ok(ToolOutput::Text(summary));
    }

    info!("Splitting text into chunks");
    let chunks: Vec<String> = outputs
      .iter()
      .flat_map(|output| split_by_tokens(output, self.max_token_length))
      .collect();
    let mut partials = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
      partials.push(self.llm.main().generate(&self.messages(chunk)).await?);
    }
    let combined = partials.iter().join("\n\n");
    let summary = self
      .llm
      .generate_streamed(&self.messages(&combined), &ctx.sink)
      .await?;
    Ok(ToolOutput::Text(summary))
  }
}
