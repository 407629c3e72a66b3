//! Turns SQL results into a JSX chart component.

use agentkit_config::{PromptTemplate, ToolConfig};
use agentkit_protocol::{Metadata, ToolInput};
use async_trait::async_trait;
use serde_json::Value;

use crate::bus::metadata;
use crate::ports::PromptMessage;
use crate::tools::{RunContext, Tool, ToolError, ToolLlm, ToolOutput};

pub const APPENDIX_TITLE: &str = "Visualisation Appendix";
const SQL_STEP: &str = "sql_tool";

pub struct VisualizerTool {
  name: String,
  description: String,
  system_context: PromptTemplate,
  prompt_message: PromptTemplate,
  llm: ToolLlm,
}

impl VisualizerTool {
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
impl Tool for VisualizerTool {
  fn name(&self) -> &str {
    &self.name
  }

  fn description(&self) -> &str {
    &self.description
  }

  async fn run(&self, input: &ToolInput, ctx: &RunContext) -> Result<ToolOutput, ToolError> {
    ctx.action(&self.name, "build_visualization", 1, Metadata::new());

    // Without a SQL step (memory-only plans) the last answer holds the data.
    let results = match input.step_output(SQL_STEP) {
      Some(results) => results,
      None => input
        .chat_history
        .last()
        .map(|message| message.content.clone())
        .ok_or_else(|| ToolError::MissingInput("sql_tool output or chat history".to_string()))?,
    };

    let messages = [
      PromptMessage::system(self.system_context.format(&[])),
      PromptMessage::human(self.prompt_message.format(&[
        ("question", &input.latest_human_message),
        ("results", &results),
      ])),
    ];
    let response = self.llm.generate(&messages, true).await?;

    if response.contains("jsx") {
      ctx.appendix(&self.name, &response, APPENDIX_TITLE);
    } else {
      ctx.action(
        &self.name,
        "no_data",
        1,
        metadata([("result", Value::from(response.as_str()))]),
      );
    }
    Ok(ToolOutput::Text(response))
  }
}
