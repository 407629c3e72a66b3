// Agent Tools
// Tool trait, run context and the invocation wrapper used by the router

pub mod basellm;
pub mod llm;
pub mod query_format;
pub mod registry;
pub mod retrieval;
pub mod scheduling;
pub mod sql;
pub mod summarizer;
pub mod visualizer;

pub use llm::ToolLlm;
pub use query_format::standard_query_format;
pub use registry::{ToolBuildContext, ToolFactory, ToolRegistry, ToolServices, Toolset, factory};

use agentkit_protocol::{Metadata, StreamingDataType, ToolInput};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::bus::EventSink;
use crate::ports::{ArtifactError, GenerationError, RetrievalError, SqlError};

/// Result of one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
  Text(String),
  Structured(Value),
}

impl ToolOutput {
  /// Value stored in the next step's `intermediate_steps`.
  pub fn into_value(self) -> Value {
    match self {
      ToolOutput::Text(text) => Value::String(text),
      ToolOutput::Structured(value) => value,
    }
  }

  pub fn render(&self) -> String {
    match self {
      ToolOutput::Text(text) => text.clone(),
      ToolOutput::Structured(value) => value.to_string(),
    }
  }
}

impl From<String> for ToolOutput {
  fn from(text: String) -> Self {
    ToolOutput::Text(text)
  }
}

/// Failures at the tool boundary.
#[derive(Error, Debug)]
pub enum ToolError {
  /// The model answer held no SQL block
  #[error("Could not parse query from response")]
  Parse,

  /// Required data from a previous step or the history is absent
  #[error("Missing input: {0}")]
  MissingInput(String),

  /// A capability this tool needs was not configured
  #[error("{0} is not configured")]
  Unavailable(&'static str),

  #[error("Tool is misconfigured: {0}")]
  Misconfigured(String),

  #[error(transparent)]
  Generation(#[from] GenerationError),

  #[error(transparent)]
  Sql(#[from] SqlError),

  #[error(transparent)]
  Retrieval(#[from] RetrievalError),

  #[error(transparent)]
  Artifact(#[from] ArtifactError),
}

impl ToolError {
  /// Fatal errors end the run instead of becoming the tool's output.
  pub fn is_fatal(&self) -> bool {
    matches!(self, ToolError::Parse)
  }
}

/// Per-run context handed to every tool.
#[derive(Debug, Clone)]
pub struct RunContext {
  pub run_id: String,
  /// Trace tags, such as `conversation_id=...`
  pub tags: Vec<String>,
  pub sink: EventSink,
}

impl RunContext {
  pub fn new(run_id: impl Into<String>, tags: Vec<String>, sink: EventSink) -> Self {
    Self {
      run_id: run_id.into(),
      tags,
      sink,
    }
  }

  /// Value of the first `key=value` tag with the given key.
  pub fn tag_value(&self, key: &str) -> Option<&str> {
    self.tags.iter().find_map(|tag| {
      tag
        .split_once('=')
        .filter(|(name, _)| *name == key)
        .map(|(_, value)| value)
    })
  }

  pub fn conversation_id(&self) -> Option<&str> {
    self.tag_value("conversation_id")
  }

  /// Progress marker for `tool`, upper-cased on the bus.
  pub fn action(&self, tool: &str, action: &str, step: u32, mut extra: Metadata) {
    extra.insert("tool".to_string(), Value::from(tool));
    extra.insert("step".to_string(), Value::from(step));
    self.sink.on_text(action, StreamingDataType::Action, extra);
  }

  /// Rich result shown next to the answer.
  pub fn appendix(&self, tool: &str, data: &str, title: &str) {
    let mut metadata = Metadata::new();
    metadata.insert("tool".to_string(), Value::from(tool));
    metadata.insert("step".to_string(), Value::from(1));
    metadata.insert("title".to_string(), Value::from(title));
    self.sink.on_text(data, StreamingDataType::Appendix, metadata);
  }
}

#[async_trait]
pub trait Tool: Send + Sync {
  fn name(&self) -> &str;

  fn description(&self) -> &str;

  async fn run(&self, input: &ToolInput, ctx: &RunContext) -> Result<ToolOutput, ToolError>;
}

/// Runs a tool with lifecycle events around it.
///
/// Non-fatal errors are reported on the bus and returned as the tool's
/// text output, so the next step still receives a value.
pub async fn invoke(
  tool: &dyn Tool,
  input: &ToolInput,
  ctx: &RunContext,
) -> Result<ToolOutput, ToolError> {
  let name = tool.name();
  ctx.sink.on_tool_start(name);

  let output = match tool.run(input, ctx).await {
    Ok(output) => output,
    Err(err) => {
      warn!(tool = name, run_id = %ctx.run_id, "tool failed: {err}");
      ctx.sink.on_tool_error(name, &format!("{err:?}"));
      if err.is_fatal() {
        return Err(err);
      }
      ToolOutput::Text(err.to_string())
    }
  };

  ctx.sink.on_tool_end(name);
  Ok(output)
}

#[cfg(test)]
pub(crate) mod testing {
  //! Scripted ports shared by the tool tests.

  use std::collections::VecDeque;
  use std::sync::{Arc, Mutex};

  use agentkit_protocol::{Metadata, StreamingData};
  use async_trait::async_trait;
  use serde_json::json;

  use super::RunContext;
  use crate::bus::{EventStream, channel, metadata};
  use crate::ports::{
    GenerationError, GeneratorFactory, PromptMessage, TextGenerator, TokenCallback,
  };
  use crate::tools::ToolLlm;

  /// Generator answering from a script and recording every prompt.
  #[derive(Default)]
  pub struct ScriptedGenerator {
    pub name: String,
    pub replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    pub calls: Mutex<Vec<Vec<PromptMessage>>>,
    pub tokens: Vec<String>,
  }

  impl ScriptedGenerator {
    pub fn new(name: &str, replies: Vec<&str>) -> Arc<Self> {
      Arc::new(Self {
        name: name.to_string(),
        replies: Mutex::new(replies.into_iter().map(|reply| Ok(reply.to_string())).collect()),
        ..Default::default()
      })
    }

    pub fn with_results(name: &str, replies: Vec<Result<String, GenerationError>>) -> Arc<Self> {
      Arc::new(Self {
        name: name.to_string(),
        replies: Mutex::new(replies.into_iter().collect()),
        ..Default::default()
      })
    }

    pub fn streaming(name: &str, tokens: &[&str]) -> Arc<Self> {
      Arc::new(Self {
        name: name.to_string(),
        tokens: tokens.iter().map(|token| token.to_string()).collect(),
        ..Default::default()
      })
    }

    pub fn calls(&self) -> Vec<Vec<PromptMessage>> {
      self.calls.lock().expect("calls lock").clone()
    }
  }

  #[async_trait]
  impl TextGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
      &self.name
    }

    async fn generate(&self, messages: &[PromptMessage]) -> Result<String, GenerationError> {
      self.calls.lock().expect("calls lock").push(messages.to_vec());
      if !self.tokens.is_empty() {
        return Ok(self.tokens.concat());
      }
      self
        .replies
        .lock()
        .expect("replies lock")
        .pop_front()
        .unwrap_or_else(|| Ok(String::new()))
    }

    async fn generate_streaming(
      &self,
      messages: &[PromptMessage],
      on_token: TokenCallback<'_>,
    ) -> Result<String, GenerationError> {
      for token in &self.tokens {
        on_token(token);
      }
      self.generate(messages).await
    }
  }

  /// Hands out `fast` for the fast model name and `main` for anything else.
  pub struct ScriptedFactory {
    pub main: Arc<ScriptedGenerator>,
    pub fast: Arc<ScriptedGenerator>,
  }

  impl GeneratorFactory for ScriptedFactory {
    fn create(
      &self,
      model: &str,
      _api_key: Option<&str>,
    ) -> Result<Arc<dyn TextGenerator>, GenerationError> {
      if model == self.fast.name {
        Ok(self.fast.clone())
      } else {
        Ok(self.main.clone())
      }
    }
  }

  pub fn llm_pair(main: Arc<ScriptedGenerator>, fast: Arc<ScriptedGenerator>) -> ToolLlm {
    ToolLlm::new(main, fast, 2500)
  }

  pub fn run_context() -> (RunContext, EventStream) {
    let (sink, stream) = channel(metadata([("run_id", json!("run-test"))]));
    let ctx = RunContext::new(
      "run-test",
      vec!["agent_chat".to_string(), "conversation_id=conv-1".to_string()],
      sink,
    );
    (ctx, stream)
  }

  /// Finishes the bus and returns everything after `START`.
  pub async fn drain(ctx: RunContext, mut stream: EventStream) -> Vec<StreamingData> {
    ctx.sink.finish();
    drop(ctx);
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
      items.push(item);
    }
    items.into_iter().skip(1).collect()
  }

  pub fn meta_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(|value| value.as_str())
  }
}
