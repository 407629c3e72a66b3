//! Single-prompt model tools (`clarify_tool`, `expert_tool`, `entertainer_tool`).
//!
//! Differ only in their prompts, so one implementation serves every name.

use agentkit_config::{PromptTemplate, ToolConfig};
use agentkit_protocol::ToolInput;
use async_trait::async_trait;

use crate::ports::PromptMessage;
use crate::tools::{RunContext, Tool, ToolError, ToolLlm, ToolOutput, standard_query_format};

pub struct BaseLlmTool {
  name: String,
  description: String,
  system_context: PromptTemplate,
  prompt_message: PromptTemplate,
  llm: ToolLlm,
}

impl BaseLlmTool {
  pub fn new(name: impl Into<String>, config: &ToolConfig, llm: ToolLlm) -> Self {
    let prompts = config.render();
    Self {
      name: name.into(),
      description: prompts.description.to_string(),
      system_context: prompts.system_context,
      prompt_message: prompts.prompt_message,
      llm,
    }
  }
}

#[async_trait]
impl Tool for BaseLlmTool {
  fn name(&self) -> &str {
    &self.name
  }

  fn description(&self) -> &str {
    &self.description
  }

  async fn run(&self, input: &ToolInput, ctx: &RunContext) -> Result<ToolOutput, ToolError> {
    let question = standard_query_format(input);
    let messages = [
      PromptMessage::system(self.system_context.format(&[])),
      PromptMessage::human(self.prompt_message.format(&[("question", &question)])),
    ];
    let response = self.llm.generate_streamed(&messages, &ctx.sink).await?;
    Ok(ToolOutput::Text(response))
  }
}
