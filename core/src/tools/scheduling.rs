//! Project scheduling tools working on per-conversation optimisation artifacts.

use std::sync::Arc;

use agentkit_config::{PromptTemplate, ToolConfig};
use agentkit_protocol::ToolInput;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::bus::metadata;
use crate::ports::{ArtifactKind, ArtifactStore, ArtifactVersion, PromptMessage};
use crate::tools::{RunContext, Tool, ToolError, ToolLlm, ToolOutput, standard_query_format};

pub const CONFIG_APPENDIX_TITLE: &str = "Available resources Appendix";
pub const INPUT_APPENDIX_TITLE: &str = "Optimization input generator Appendix";

/// Answer prefix and fences removed before an artifact is stored.
const ARTIFACT_NOISE: &[&str] = &["```json", "`", "New parameter configuration:"];

fn require_store(store: &Option<Arc<dyn ArtifactStore>>) -> Result<&dyn ArtifactStore, ToolError> {
  store
    .as_deref()
    .ok_or(ToolError::Unavailable("Artifact store"))
}

fn require_conversation(ctx: &RunContext) -> Result<&str, ToolError> {
  ctx
    .conversation_id()
    .ok_or_else(|| ToolError::MissingInput("conversation id".to_string()))
}

/// Loads `version` of the conversation's artifact, else the shared default.
async fn load_or_default(
  store: &dyn ArtifactStore,
  kind: ArtifactKind,
  conversation_id: &str,
  version: ArtifactVersion,
) -> Result<String, ToolError> {
  if let Some(content) = store.load(kind, conversation_id, version).await? {
    return Ok(content);
  }
  store
    .load_default(kind)
    .await?
    .ok_or_else(|| ToolError::MissingInput(kind.default_file_name()))
}

pub fn clean_artifact(response: &str) -> String {
  ARTIFACT_NOISE
    .iter()
    .fold(response.to_string(), |text, noise| text.replace(noise, ""))
}

/// Asks the model for a new version of an artifact and stores valid answers
/// (`generate_config_tool`, `generate_optim_input_tool`).
pub struct ArtifactGeneratorTool {
  name: String,
  description: String,
  kind: ArtifactKind,
  appendix_title: &'static str,
  system_context: PromptTemplate,
  prompt_message: PromptTemplate,
  llm: ToolLlm,
  store: Option<Arc<dyn ArtifactStore>>,
}

impl ArtifactGeneratorTool {
  pub fn new(
    name: impl Into<String>,
    kind: ArtifactKind,
    config: &ToolConfig,
    llm: ToolLlm,
    store: Option<Arc<dyn ArtifactStore>>,
  ) -> Self {
    let prompts = config.render();
    let appendix_title = match kind {
      ArtifactKind::OptimizationConfig => CONFIG_APPENDIX_TITLE,
      ArtifactKind::OptimizationInput => INPUT_APPENDIX_TITLE,
    };
    Self {
      name: name.into(),
      description: prompts.description.to_string(),
      kind,
      appendix_title,
      system_context: prompts.system_context,
      prompt_message: prompts.prompt_message,
      llm,
      store,
    }
  }
}

#[async_trait]
impl Tool for ArtifactGeneratorTool {
  fn name(&self) -> &str {
    &self.name
  }

  fn description(&self) -> &str {
    &self.description
  }

  async fn run(&self, input: &ToolInput, ctx: &RunContext) -> Result<ToolOutput, ToolError> {
    let store = require_store(&self.store)?;
    let conversation_id = require_conversation(ctx)?;
    let current =
      load_or_default(store, self.kind, conversation_id, ArtifactVersion::New).await?;

    let question = standard_query_format(input);
    let messages = [
      PromptMessage::system(self.system_context.format(&[])),
      PromptMessage::human(
        self
          .prompt_message
          .format(&[("question", &question), ("parameter_config", &current)]),
      ),
    ];
    let response = self.llm.generate(&messages, false).await?;

    if response.contains("json") {
      ctx.appendix(&self.name, &response, self.appendix_title);
      store
        .write_rotating(self.kind, conversation_id, &clean_artifact(&response))
        .await?;
      info!(kind = %self.kind, conversation_id, "saved new artifact version");
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

/// Explains the difference between the previous and the new optimisation
/// input (`summarize_config_changes_tool`).
pub struct ConfigChangesTool {
  name: String,
  description: String,
  system_context: PromptTemplate,
  prompt_message: PromptTemplate,
  llm: ToolLlm,
  store: Option<Arc<dyn ArtifactStore>>,
}

impl ConfigChangesTool {
  pub fn new(
    name: impl Into<String>,
    config: &ToolConfig,
    llm: ToolLlm,
    store: Option<Arc<dyn ArtifactStore>>,
  ) -> Self {
    let prompts = config.render();
    Self {
      name: name.into(),
      description: prompts.description.to_string(),
      system_context: prompts.system_context,
      prompt_message: prompts.prompt_message,
      llm,
      store,
    }
  }
}

#[async_trait]
impl Tool for ConfigChangesTool {
  fn name(&self) -> &str {
    &self.name
  }

  fn description(&self) -> &str {
    &self.description
  }

  async fn run(&self, input: &ToolInput, ctx: &RunContext) -> Result<ToolOutput, ToolError> {
    let store = require_store(&self.store)?;
    let conversation_id = require_conversation(ctx)?;
    let kind = ArtifactKind::OptimizationInput;

    let new_tasks = store
      .load(kind, conversation_id, ArtifactVersion::New)
      .await?
      .ok_or_else(|| ToolError::MissingInput(kind.file_name(conversation_id, ArtifactVersion::New)))?;
    let current_tasks = load_or_default(store, kind, conversation_id, ArtifactVersion::Old).await?;

    let question = standard_query_format(input);
    let messages = [
      PromptMessage::system(self.system_context.format(&[])),
      PromptMessage::human(self.prompt_message.format(&[
        ("new_parameter_tasks", &new_tasks),
        ("current_parameter_tasks", &current_tasks),
        ("question", &question),
      ])),
    ];
    let response = self.llm.generate_streamed(&messages, &ctx.sink).await?;
    Ok(ToolOutput::Text(response))
  }
}
