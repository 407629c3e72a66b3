//! Action plan router.
//!
//! A run first asks the model to pick one of the configured plans, then
//! executes the plan's steps in order. Tools of one step run concurrently;
//! their outputs become the `intermediate_steps` of the next step. Liveness
//! is checked in the run registry before every transition, so a cancelled
//! run stops at the next step boundary.

mod cursor;

pub use cursor::PlanCursor;

use std::sync::Arc;

use agentkit_config::{ActionPlan, AgentConfig, MEMORY_TOOL, PromptTemplate};
use agentkit_protocol::{ChatMessage, ChatQuery, IntermediateSteps, ToolInput, UserSettings};
use futures::future::join_all;
use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::memory::chat_history;
use crate::ports::{GenerationError, PromptMessage, RunRegistry, TextGenerator};
use crate::tools::{RunContext, ToolOutput, Toolset, invoke};

/// Plan selection retries after the first attempt.
pub const MAX_PLAN_RETRIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::IsVariant)]
pub enum RouterState {
  SelectingPlan,
  ExecutingStep { plan: String, step: usize },
  Finished,
  Cancelled,
}

/// What the router needs from a chat turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouterInput {
  pub latest_human_message: String,
  pub chat_history: Vec<ChatMessage>,
  pub user_settings: Option<UserSettings>,
}

impl RouterInput {
  /// Latest message plus the history pruned to `max_history_tokens`.
  pub fn from_query(query: &ChatQuery, max_history_tokens: usize) -> Self {
    Self {
      latest_human_message: query.latest_message().to_string(),
      chat_history: chat_history(query, max_history_tokens),
      user_settings: query.settings.clone(),
    }
  }
}

pub struct ActionPlanRouter {
  config: Arc<AgentConfig>,
  llm: Arc<dyn TextGenerator>,
  tools: Toolset,
  runs: Arc<dyn RunRegistry>,
}

impl ActionPlanRouter {
  pub fn new(
    config: Arc<AgentConfig>,
    llm: Arc<dyn TextGenerator>,
    tools: Toolset,
    runs: Arc<dyn RunRegistry>,
  ) -> Self {
    Self {
      config,
      llm,
      tools,
      runs,
    }
  }

  /// Runs the plan selected for `input` to exhaustion and returns the
  /// `"{tool}:\n{output}"` transcript of every executed tool.
  pub async fn run(&self, input: &RouterInput, ctx: &RunContext) -> Result<String> {
    let mut state = RouterState::SelectingPlan;
    let mut cursor: Option<PlanCursor<'_>> = None;
    let mut previous = IntermediateSteps::new();
    let mut transcript: Vec<(String, String)> = Vec::new();

    loop {
      if !self.runs.is_running(&ctx.run_id).await {
        debug!(from = ?state, "run is no longer live");
        state = RouterState::Cancelled;
      }

      state = match state {
        RouterState::SelectingPlan => {
          let plan = self.select_plan(input).await?;
          next_state(cursor.insert(PlanCursor::new(plan)))
        }
        RouterState::ExecutingStep { step, .. } => {
          let Some(current) = cursor.as_mut() else {
            return Ok(render_transcript(&transcript));
          };
          if step >= self.config.limits.max_iterations {
            return Err(AgentError::IterationLimit(self.config.limits.max_iterations));
          }
          let Some(tools) = current.next_step() else {
            return Ok(render_transcript(&transcript));
          };
          info!(
            "Next action plan step ({} remaining)",
            current.remaining() + 1
          );

          let tool_input = self.step_input(input, tools, &previous);
          let outputs = self.execute_step(tools, &tool_input, ctx).await?;

          previous = IntermediateSteps::new();
          for (tool, output) in outputs {
            transcript.push((tool.clone(), output.render()));
            previous.insert(tool, output.into_value());
          }
          next_state(current)
        }
        RouterState::Finished => {
          return Ok(render_transcript(&transcript));
        }
        RouterState::Cancelled => {
          info!(run_id = ctx.run_id.as_str(), "router cancelled");
          return Err(AgentError::Cancelled {
            run_id: ctx.run_id.clone(),
          });
        }
      };
    }
  }

  /// Asks the model for a plan name until it answers with a known one.
  pub async fn select_plan(&self, input: &RouterInput) -> Result<&ActionPlan> {
    let plans = &self.config.action_plans;
    let system = PromptTemplate::new(self.config.system_context.as_str())
      .format(&[("action_plans", &plans.describe())]);
    let human = PromptTemplate::new(self.config.prompt_message.as_str())
      .format(&[("input", &input.latest_human_message)]);

    let mut messages = vec![PromptMessage::system(system)];
    messages.extend(input.chat_history.iter().map(PromptMessage::from));
    messages.push(PromptMessage::human(human));

    let mut retries = 0;
    loop {
      let authentication_failed = match self.llm.generate(&messages).await {
        Ok(output) => match plans.get(&output) {
          Some(plan) => {
            info!(
              plan = plan.name.as_str(),
              steps = plan.step_count(),
              "Action plan selected"
            );
            return Ok(plan);
          }
          None => {
            warn!(output = output.as_str(), "model answered with an unknown plan");
            false
          }
        },
        Err(GenerationError::Authentication(reason)) => {
          warn!("plan selection failed to authenticate: {reason}");
          true
        }
        Err(err) => {
          warn!("plan selection failed: {err}");
          false
        }
      };

      retries += 1;
      if retries > MAX_PLAN_RETRIES {
        return Err(if authentication_failed {
          AgentError::InvalidApiKey
        } else {
          AgentError::PlanSelection { attempts: retries }
        });
      }
    }
  }

  /// A step sees the previous step's outputs. Without any, it sees the chat
  /// history when it lists `memory`.
  fn step_input(
    &self,
    input: &RouterInput,
    tools: &[String],
    previous: &IntermediateSteps,
  ) -> ToolInput {
    let mut tool_input = ToolInput {
      latest_human_message: input.latest_human_message.clone(),
      user_settings: input.user_settings.clone(),
      ..Default::default()
    };
    if !previous.is_empty() {
      tool_input.intermediate_steps = previous.clone();
    } else if tools.iter().any(|tool| tool == MEMORY_TOOL) {
      tool_input.chat_history = input.chat_history.clone();
    }
    tool_input
  }

  async fn execute_step(
    &self,
    tools: &[String],
    tool_input: &ToolInput,
    ctx: &RunContext,
  ) -> Result<Vec<(String, ToolOutput)>> {
    let selected = tools
      .iter()
      .filter(|name| name.as_str() != MEMORY_TOOL)
      .unique()
      .map(|name| match self.tools.get(name) {
        Some(tool) => Ok((name.clone(), Arc::clone(tool))),
        None => Err(AgentError::UnknownTool(name.clone())),
      })
      .collect::<Result<Vec<_>>>()?;

    let results = join_all(
      selected
        .iter()
        .map(|(_, tool)| invoke(tool.as_ref(), tool_input, ctx)),
    )
    .await;

    selected
      .into_iter()
      .zip(results)
      .map(|((name, _), result)| match result {
        Ok(output) => Ok((name, output)),
        Err(source) => Err(AgentError::Tool { tool: name, source }),
      })
      .collect()
  }
}

fn next_state(cursor: &PlanCursor<'_>) -> RouterState {
  if cursor.is_exhausted() {
    RouterState::Finished
  } else {
    RouterState::ExecutingStep {
      plan: cursor.plan().name.clone(),
      step: cursor.position(),
    }
  }
}

fn render_transcript(transcript: &[(String, String)]) -> String {
  transcript
    .iter()
    .map(|(tool, output)| format!("{tool}:\n{output}"))
    .join("\n\n")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bus::{channel, metadata};
  use crate::ports::InMemoryRunRegistry;
  use crate::tools::testing::ScriptedGenerator;
  use crate::tools::{Tool, ToolError};
  use agentkit_config::ActionPlans;
  use async_trait::async_trait;
  use pretty_assertions::assert_eq;
  use serde_json::json;
  use std::sync::Mutex;

  /// Echoes what it received so tests can inspect the threading of inputs.
  struct RecordingTool {
    name: &'static str,
    seen: Mutex<Vec<ToolInput>>,
  }

  impl RecordingTool {
    fn new(name: &'static str) -> Arc<Self> {
      Arc::new(Self {
        name,
        seen: Mutex::new(Vec::new()),
      })
    }

    fn seen(&self) -> Vec<ToolInput> {
      self.seen.lock().expect("seen lock").clone()
    }
  }

  #[async_trait]
  impl Tool for RecordingTool {
    fn name(&self) -> &str {
      self.name
    }

    fn description(&self) -> &str {
      "records its inputs"
    }

    async fn run(&self, input: &ToolInput, _ctx: &RunContext) -> std::result::Result<ToolOutput, ToolError> {
      self.seen.lock().expect("seen lock").push(input.clone());
      Ok(ToolOutput::Text(format!("{} saw {}", self.name, input.intermediate_steps.len())))
    }
  }

  fn plan(name: &str, actions: &[&[&str]]) -> ActionPlan {
    ActionPlan {
      name: name.to_string(),
      description: format!("{name} description"),
      actions: actions
        .iter()
        .map(|step| step.iter().map(|tool| tool.to_string()).collect())
        .collect(),
    }
  }

  fn config(plans: Vec<ActionPlan>) -> Arc<AgentConfig> {
    Arc::new(AgentConfig {
      action_plans: ActionPlans::new(plans),
      ..Default::default()
    })
  }

  async fn live_context(runs: &Arc<InMemoryRunRegistry>) -> RunContext {
    runs.register("run-1").await;
    let (sink, _stream) = channel(metadata([("run_id", json!("run-1"))]));
    RunContext::new("run-1", vec![], sink)
  }

  fn input(latest: &str) -> RouterInput {
    RouterInput {
      latest_human_message: latest.to_string(),
      chat_history: vec![ChatMessage::user("earlier"), ChatMessage::agent("reply")],
      user_settings: None,
    }
  }

  #[tokio::test]
  async fn steps_thread_outputs_and_memory() {
    let first = RecordingTool::new("sql_tool");
    let second = RecordingTool::new("summarizer_tool");
    let runs = Arc::new(InMemoryRunRegistry::new());
    let router = ActionPlanRouter::new(
      config(vec![plan("sql", &[&["memory", "sql_tool"], &["summarizer_tool"]])]),
      ScriptedGenerator::new("router", vec!["sql"]),
      [first.clone() as Arc<dyn Tool>, second.clone()].into_iter().collect(),
      runs.clone(),
    );

    let ctx = live_context(&runs).await;
    let output = router.run(&input("sales?"), &ctx).await.expect("run");
    assert_eq!(
      output,
      "sql_tool:\nsql_tool saw 0\n\nsummarizer_tool:\nsummarizer_tool saw 1"
    );

    let first_seen = first.seen();
    assert_eq!(first_seen[0].chat_history.len(), 2);
    assert!(first_seen[0].intermediate_steps.is_empty());
    let second_seen = second.seen();
    assert!(second_seen[0].chat_history.is_empty());
    assert_eq!(
      second_seen[0].step_output("sql_tool").as_deref(),
      Some("sql_tool saw 0")
    );
  }

  #[tokio::test]
  async fn first_step_without_memory_gets_no_history() {
    let tool = RecordingTool::new("clarify_tool");
    let runs = Arc::new(InMemoryRunRegistry::new());
    let router = ActionPlanRouter::new(
      config(vec![plan("chat", &[&["clarify_tool", "clarify_tool"]])]),
      ScriptedGenerator::new("router", vec!["chat"]),
      [tool.clone() as Arc<dyn Tool>].into_iter().collect(),
      runs.clone(),
    );

    let ctx = live_context(&runs).await;
    router.run(&input("hi"), &ctx).await.expect("run");
    let seen = tool.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].chat_history.is_empty());
  }

  #[tokio::test]
  async fn plan_selection_retries_then_fails() {
    let generator = ScriptedGenerator::new("router", vec!["nope", "Chat", "chat ", "???"]);
    let runs = Arc::new(InMemoryRunRegistry::new());
    let router = ActionPlanRouter::new(
      config(vec![plan("chat", &[])]),
      generator.clone(),
      Toolset::default(),
      runs,
    );

    let result = router.select_plan(&input("hi")).await;
    assert!(matches!(result, Err(AgentError::PlanSelection { attempts: 4 })));
    assert_eq!(generator.calls().len(), 4);
  }

  #[tokio::test]
  async fn plan_selection_succeeds_after_a_retry() {
    let generator = ScriptedGenerator::new("router", vec!["unknown", "chat"]);
    let runs = Arc::new(InMemoryRunRegistry::new());
    let router = ActionPlanRouter::new(
      config(vec![plan("chat", &[]), plan("sql", &[])]),
      generator.clone(),
      Toolset::default(),
      runs,
    );

    let selected = router.select_plan(&input("hi")).await.expect("select plan");
    assert_eq!(selected.name, "chat");

    let calls = generator.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0][0].content.contains("chat: chat description\nsql: sql description"));
    assert_eq!(calls[0].len(), 4);
    assert_eq!(calls[0][3].content, "hi");
  }

  #[tokio::test]
  async fn repeated_authentication_failures_report_invalid_key() {
    let auth = || Err(GenerationError::Authentication("bad key".to_string()));
    let generator = ScriptedGenerator::with_results("router", vec![auth(), auth(), auth(), auth()]);
    let router = ActionPlanRouter::new(
      config(vec![plan("chat", &[])]),
      generator,
      Toolset::default(),
      Arc::new(InMemoryRunRegistry::new()),
    );

    assert!(matches!(
      router.select_plan(&input("hi")).await,
      Err(AgentError::InvalidApiKey)
    ));
  }

  #[tokio::test]
  async fn unknown_tool_in_plan_ends_the_run() {
    let runs = Arc::new(InMemoryRunRegistry::new());
    let router = ActionPlanRouter::new(
      config(vec![plan("chat", &[&["pdf_tool"]])]),
      ScriptedGenerator::new("router", vec!["chat"]),
      Toolset::default(),
      runs.clone(),
    );

    let ctx = live_context(&runs).await;
    assert!(matches!(
      router.run(&input("hi"), &ctx).await,
      Err(AgentError::UnknownTool(name)) if name == "pdf_tool"
    ));
  }

  #[tokio::test]
  async fn iteration_limit_stops_long_plans() {
    let tool = RecordingTool::new("clarify_tool");
    let runs = Arc::new(InMemoryRunRegistry::new());
    let mut agent_config = AgentConfig {
      action_plans: ActionPlans::new(vec![plan(
        "loop",
        &[&["clarify_tool"], &["clarify_tool"], &["clarify_tool"]],
      )]),
      ..Default::default()
    };
    agent_config.limits.max_iterations = 2;
    let router = ActionPlanRouter::new(
      Arc::new(agent_config),
      ScriptedGenerator::new("router", vec!["loop"]),
      [tool.clone() as Arc<dyn Tool>].into_iter().collect(),
      runs.clone(),
    );

    let ctx = live_context(&runs).await;
    assert!(matches!(
      router.run(&input("hi"), &ctx).await,
      Err(AgentError::IterationLimit(2))
    ));
    assert_eq!(tool.seen().len(), 2);
  }

  #[tokio::test]
  async fn stopped_run_never_selects_a_plan() {
    let generator = ScriptedGenerator::new("router", vec!["chat"]);
    let router = ActionPlanRouter::new(
      config(vec![plan("chat", &[])]),
      generator.clone(),
      Toolset::default(),
      Arc::new(InMemoryRunRegistry::new()),
    );
    let (sink, _stream) = channel(metadata([("run_id", json!("gone"))]));
    let ctx = RunContext::new("gone", vec![], sink);

    let result = router.run(&input("hi"), &ctx).await;
    assert!(result.is_err_and(|err| err.is_cancelled()));
    assert!(generator.calls().is_empty());
  }

  #[tokio::test]
  async fn empty_plan_finishes_with_empty_output() {
    let runs = Arc::new(InMemoryRunRegistry::new());
    let router = ActionPlanRouter::new(
      config(vec![plan("noop", &[])]),
      ScriptedGenerator::new("router", vec!["noop"]),
      Toolset::default(),
      runs.clone(),
    );
    let ctx = live_context(&runs).await;
    assert_eq!(router.run(&input("hi"), &ctx).await.expect("run"), "");
  }

  #[test]
  fn router_input_prunes_history() {
    let query = ChatQuery {
      messages: vec![
        ChatMessage::user("a".repeat(40)),
        ChatMessage::agent("b".repeat(8)),
        ChatMessage::user("latest"),
      ],
      api_key: None,
      conversation_id: uuid::Uuid::new_v4(),
      new_message_id: uuid::Uuid::new_v4(),
      user_email: String::new(),
      settings: None,
    };
    let input = RouterInput::from_query(&query, 5);
    assert_eq!(input.latest_human_message, "latest");
    assert_eq!(input.chat_history, vec![ChatMessage::agent("b".repeat(8))]);
  }
}
