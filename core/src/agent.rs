// Agentkit Agent
// Run orchestration: tool construction, the background router task, feedback and SQL execution

use std::sync::Arc;

use agentkit_config::AgentConfig;
use agentkit_protocol::{ChatQuery, ExecutionResult, Feedback, SqlExecutionResponse};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{EventStream, channel, metadata, report_error};
use crate::error::{AgentError, Result};
use crate::ports::{InMemoryRunRegistry, InMemoryTraceStore, RunOutcome, RunRegistry, TraceStore};
use crate::router::{ActionPlanRouter, RouterInput};
use crate::tools::sql::is_sql_query_safe;
use crate::tools::{RunContext, ToolRegistry, ToolServices};

pub const UNSAFE_SQL_MESSAGE: &str = "SQL query contains forbidden keywords (DML, DDL statements)";
pub const SQL_DISABLED_MESSAGE: &str = "SQL query execution is disabled";
pub const SQL_SUCCESS_MESSAGE: &str = "Successfully executed SQL query";

/// A started run: its id and the event stream the client drains.
#[derive(Debug)]
pub struct AgentRun {
  pub run_id: String,
  pub events: EventStream,
}

/// Entry point for chat turns and the operations around them.
pub struct Agent {
  config: Arc<AgentConfig>,
  registry: Arc<ToolRegistry>,
  services: ToolServices,
  runs: Arc<dyn RunRegistry>,
  traces: Arc<dyn TraceStore>,
}

impl Agent {
  /// Validates `config` and uses the built-in tools with in-memory run and
  /// trace registries.
  pub fn new(config: AgentConfig, services: ToolServices) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      config: Arc::new(config),
      registry: Arc::new(ToolRegistry::builtin()),
      services,
      runs: Arc::new(InMemoryRunRegistry::new()),
      traces: Arc::new(InMemoryTraceStore::new()),
    })
  }

  pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
    self.registry = Arc::new(registry);
    self
  }

  pub fn with_run_registry(mut self, runs: Arc<dyn RunRegistry>) -> Self {
    self.runs = runs;
    self
  }

  pub fn with_trace_store(mut self, traces: Arc<dyn TraceStore>) -> Self {
    self.traces = traces;
    self
  }

  pub fn config(&self) -> &AgentConfig {
    &self.config
  }

  pub fn traces(&self) -> &Arc<dyn TraceStore> {
    &self.traces
  }

  /// Starts a run for `query` in the background.
  ///
  /// Tool construction and model lookup failures are returned directly.
  /// Anything failing later is reported on the returned event stream, which
  /// always ends with either an `END` signal or a single error event.
  pub async fn start_run(&self, query: ChatQuery) -> Result<AgentRun> {
    let api_key = query.api_key.as_deref().filter(|key| !key.is_empty());
    let tools = self.registry.build(&self.config, &self.services, api_key)?;
    let llm = self
      .services
      .generators
      .create(&self.config.common.llm, api_key)?;

    let run_id = Uuid::new_v4().to_string();
    let tags = run_tags(&query);
    self.traces.start_run(&run_id, &tags).await?;
    self.runs.register(&run_id).await;
    info!(run_id = run_id.as_str(), conversation_id = %query.conversation_id, "starting run");

    let (sink, events) = channel(metadata([("run_id", Value::from(run_id.as_str()))]));
    let input = RouterInput::from_query(&query, self.config.common.max_token_length);
    let router = ActionPlanRouter::new(self.config.clone(), llm, tools, self.runs.clone());
    let limit = self.config.limits.max_execution_time();
    let runs = self.runs.clone();
    let traces = self.traces.clone();
    let ctx = RunContext::new(run_id.clone(), tags, sink);

    tokio::spawn(async move {
      let result = match tokio::time::timeout(limit, router.run(&input, &ctx)).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::Timeout(limit)),
      };

      runs.stop_run(&ctx.run_id).await;
      let outcome = match &result {
        Ok(output) => RunOutcome::Completed(output.clone()),
        Err(err) => RunOutcome::Failed(err.to_string()),
      };
      if let Err(err) = traces.finish_run(&ctx.run_id, outcome).await {
        warn!(run_id = ctx.run_id.as_str(), "failed to record run outcome: {err}");
      }

      match result {
        Ok(_) => {
          info!(run_id = ctx.run_id.as_str(), "run finished");
          ctx.sink.on_agent_finish();
        }
        Err(err) => report_error(&err, &ctx.sink),
      }
    });

    Ok(AgentRun { run_id, events })
  }

  pub async fn run_status(&self, run_id: &str) -> bool {
    self.runs.is_running(run_id).await
  }

  /// Marks the run as stopped; the router notices at its next step.
  pub async fn cancel_run(&self, run_id: &str) -> bool {
    info!(run_id, "cancelling run");
    self.runs.stop_run(run_id).await;
    true
  }

  /// Stores feedback on the run that answered `feedback.message_id` and
  /// returns the new feedback id.
  pub async fn submit_feedback(&self, feedback: &Feedback) -> Result<String> {
    let tag = format!("message_id={}", feedback.message_id);
    let run = self
      .traces
      .find_run_by_tag(&tag)
      .await?
      .ok_or_else(|| AgentError::RunNotFound(feedback.message_id.to_string()))?;

    if let Some(previous_id) = &feedback.previous_id {
      self.traces.delete_feedback(previous_id).await?;
    }
    let id = self.traces.create_feedback(&run.run_id, feedback).await?;
    info!(run_id = run.run_id.as_str(), feedback_id = id.as_str(), "stored feedback");
    Ok(id)
  }

  /// Runs a read-only statement against the configured database.
  pub async fn execute_sql(&self, statement: &str) -> SqlExecutionResponse {
    if !is_sql_query_safe(statement) {
      return SqlExecutionResponse::message(UNSAFE_SQL_MESSAGE);
    }
    let Some(database) = &self.services.database else {
      return SqlExecutionResponse::message(SQL_DISABLED_MESSAGE);
    };

    match database.execute(statement).await {
      Ok(rows) => SqlExecutionResponse {
        message: SQL_SUCCESS_MESSAGE.to_string(),
        data: Some(ExecutionResult {
          raw_result: rows.map(|rows| rows.into_records()).unwrap_or_default(),
          affected_rows: None,
          error: None,
        }),
      },
      Err(err) => {
        warn!("direct SQL execution failed: {err}");
        SqlExecutionResponse::message(err.to_string())
      }
    }
  }
}

/// Trace tags recorded at run start; feedback finds runs by `message_id=`.
fn run_tags(query: &ChatQuery) -> Vec<String> {
  let version = query
    .settings
    .as_ref()
    .and_then(|settings| settings.version)
    .map_or_else(|| "N/A".to_string(), |version| version.to_string());
  vec![
    "agent_chat".to_string(),
    format!("user_email={}", query.user_email),
    format!("conversation_id={}", query.conversation_id),
    format!("message_id={}", query.new_message_id),
    format!("timestamp={}", chrono::Utc::now().to_rfc3339()),
    format!("version={version}"),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ports::{FeedbackRecord, QueryRows, RunTrace, SqlDatabase, SqlError, TableInfo, TraceError};
  use crate::tools::testing::{ScriptedFactory, ScriptedGenerator};
  use agentkit_config::{ActionPlan, ActionPlans, ToolConfig};
  use agentkit_protocol::{ChatMessage, StreamingData, StreamingSignal, UserSettings};
  use async_trait::async_trait;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  fn chat_config() -> AgentConfig {
    AgentConfig {
      tools: vec!["clarify_tool".to_string()],
      action_plans: ActionPlans::new(vec![ActionPlan {
        name: "chat".to_string(),
        description: "Ask back".to_string(),
        actions: vec![vec!["memory".to_string(), "clarify_tool".to_string()]],
      }]),
      tools_library: [(
        "clarify_tool".to_string(),
        ToolConfig {
          description: "Clarify".to_string(),
          prompt_message: Some("{question}".to_string()),
          ..Default::default()
        },
      )]
      .into_iter()
      .collect(),
      ..Default::default()
    }
  }

  fn services(main: Arc<ScriptedGenerator>) -> ToolServices {
    ToolServices::new(Arc::new(ScriptedFactory {
      fast: ScriptedGenerator::new("gpt-3.5-turbo", vec![]),
      main,
    }))
  }

  fn query(text: &str) -> ChatQuery {
    ChatQuery {
      messages: vec![ChatMessage::user(text)],
      api_key: None,
      conversation_id: Uuid::new_v4(),
      new_message_id: Uuid::new_v4(),
      user_email: "user@example.com".to_string(),
      settings: Some(UserSettings {
        version: Some(3),
        ..Default::default()
      }),
    }
  }

  async fn collect(run: AgentRun) -> Vec<StreamingData> {
    let mut events = run.events;
    let mut items = Vec::new();
    while let Some(item) = events.next().await {
      items.push(item);
    }
    items
  }

  #[tokio::test]
  async fn run_streams_and_records_trace() {
    let main = ScriptedGenerator::new("gpt-4", vec!["chat", "Which year?"]);
    let agent = Agent::new(chat_config(), services(main)).expect("agent");
    let query = query("sales?");
    let message_id = query.new_message_id;

    let run = agent.start_run(query).await.expect("start run");
    let run_id = run.run_id.clone();
    let items = collect(run).await;

    assert!(items[0].is_signal(StreamingSignal::Start));
    assert!(items.last().is_some_and(|item| item.is_signal(StreamingSignal::End)));
    assert!(items.iter().all(|item| item.run_id() == Some(run_id.as_str())));
    assert!(!agent.run_status(&run_id).await);

    let trace = agent
      .traces()
      .find_run_by_tag(&format!("message_id={message_id}"))
      .await
      .expect("find run")
      .expect("run recorded");
    assert_eq!(trace.output.as_deref(), Some("clarify_tool:\nWhich year?"));
    assert!(trace.tags.contains(&"version=3".to_string()));
    assert!(trace.tags.contains(&"user_email=user@example.com".to_string()));
  }

  #[tokio::test]
  async fn failed_plan_selection_ends_stream_with_error() {
    let main = ScriptedGenerator::new("gpt-4", vec!["a", "b", "c", "d"]);
    let agent = Agent::new(chat_config(), services(main)).expect("agent");

    let items = collect(agent.start_run(query("hi")).await.expect("start run")).await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].data, "Invalid action plan selected (4x)");
    assert!(!items.iter().any(|item| item.is_signal(StreamingSignal::End)));
  }

  #[tokio::test]
  async fn unknown_configured_tool_fails_before_the_run() {
    let mut config = chat_config();
    config.tools.push("image_generation_tool".to_string());
    config.tools_library.insert(
      "image_generation_tool".to_string(),
      ToolConfig::default(),
    );
    let agent = Agent::new(config, services(ScriptedGenerator::new("gpt-4", vec![])))
      .expect("agent");

    assert!(matches!(
      agent.start_run(query("hi")).await,
      Err(AgentError::InvalidTools(_))
    ));
  }

  #[tokio::test]
  async fn feedback_replaces_previous_entry() {
    let main = ScriptedGenerator::new("gpt-4", vec!["chat", "ok"]);
    let agent = Agent::new(chat_config(), services(main)).expect("agent");
    let query = query("hi");
    let mut feedback = Feedback {
      conversation_id: query.conversation_id,
      message_id: query.new_message_id,
      user: "user@example.com".to_string(),
      score: 1,
      comment: "good".to_string(),
      key: "user_score".to_string(),
      settings: None,
      previous_id: None,
    };
    collect(agent.start_run(query).await.expect("start run")).await;

    let first = agent.submit_feedback(&feedback).await.expect("first feedback");
    feedback.previous_id = Some(first.clone());
    feedback.score = 0;
    let second = agent.submit_feedback(&feedback).await.expect("second feedback");
    assert_ne!(first, second);

    let run = agent
      .traces()
      .find_run_by_tag(&format!("message_id={}", feedback.message_id))
      .await
      .expect("find run")
      .expect("run recorded");
    let stored = agent.traces().list_feedback(&run.run_id).await.expect("list feedback");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].feedback.score, 0);
  }

  #[tokio::test]
  async fn feedback_for_unknown_message_is_rejected() {
    let agent = Agent::new(chat_config(), services(ScriptedGenerator::new("gpt-4", vec![])))
      .expect("agent");
    let feedback = Feedback {
      conversation_id: Uuid::new_v4(),
      message_id: Uuid::new_v4(),
      user: String::new(),
      score: 1,
      comment: String::new(),
      key: "user_score".to_string(),
      settings: None,
      previous_id: None,
    };
    assert!(matches!(
      agent.submit_feedback(&feedback).await,
      Err(AgentError::RunNotFound(_))
    ));
  }

  struct OneRow;

  #[async_trait]
  impl SqlDatabase for OneRow {
    async fn tables(&self) -> std::result::Result<Vec<TableInfo>, SqlError> {
      Ok(vec![])
    }

    async fn execute(&self, query: &str) -> std::result::Result<Option<QueryRows>, SqlError> {
      if query.contains("missing") {
        return Err(SqlError::Execution("no such table: missing".to_string()));
      }
      Ok(Some(QueryRows {
        columns: vec!["id".to_string()],
        rows: vec![vec![json!(1)]],
      }))
    }
  }

  #[tokio::test]
  async fn execute_sql_guards_and_reports() {
    let generators = services(ScriptedGenerator::new("gpt-4", vec![]));
    let disabled = Agent::new(chat_config(), generators.clone()).expect("agent");
    assert_eq!(
      disabled.execute_sql("SELECT 1").await.message,
      SQL_DISABLED_MESSAGE
    );

    let agent = Agent::new(chat_config(), generators.with_database(Arc::new(OneRow)))
      .expect("agent");
    assert_eq!(
      agent.execute_sql("DELETE FROM t").await,
      SqlExecutionResponse::message(UNSAFE_SQL_MESSAGE)
    );

    let ok = agent.execute_sql("SELECT id FROM t").await;
    assert_eq!(ok.message, SQL_SUCCESS_MESSAGE);
    let data = ok.data.expect("rows");
    assert_eq!(data.raw_result[0]["id"], json!(1));

    let failed = agent.execute_sql("SELECT id FROM missing").await;
    assert!(failed.message.contains("no such table"));
    assert_eq!(failed.data, None);
  }

  #[tokio::test]
  async fn cancel_clears_status() {
    let agent = Agent::new(chat_config(), services(ScriptedGenerator::new("gpt-4", vec![])))
      .expect("agent");
    assert!(agent.cancel_run("unknown").await);
    assert!(!agent.run_status("unknown").await);
  }

  struct FullDisk;

  #[async_trait]
  impl TraceStore for FullDisk {
    async fn start_run(&self, _run_id: &str, _tags: &[String]) -> std::result::Result<(), TraceError> {
      Err(TraceError::Storage("disk full".to_string()))
    }

    async fn finish_run(&self, run_id: &str, _outcome: RunOutcome) -> std::result::Result<(), TraceError> {
      Err(TraceError::RunNotFound(run_id.to_string()))
    }

    async fn find_run_by_tag(&self, _tag: &str) -> std::result::Result<Option<RunTrace>, TraceError> {
      Ok(None)
    }

    async fn list_runs(&self, _limit: usize) -> std::result::Result<Vec<RunTrace>, TraceError> {
      Ok(vec![])
    }

    async fn create_feedback(
      &self,
      _run_id: &str,
      _feedback: &Feedback,
    ) -> std::result::Result<String, TraceError> {
      Err(TraceError::Storage("disk full".to_string()))
    }

    async fn delete_feedback(&self, _feedback_id: &str) -> std::result::Result<(), TraceError> {
      Ok(())
    }

    async fn list_feedback(&self, _run_id: &str) -> std::result::Result<Vec<FeedbackRecord>, TraceError> {
      Ok(vec![])
    }
  }

  #[tokio::test]
  async fn trace_failure_leaves_no_live_run() {
    let runs = Arc::new(InMemoryRunRegistry::new());
    let agent = Agent::new(chat_config(), services(ScriptedGenerator::new("gpt-4", vec!["chat"])))
      .expect("agent")
      .with_run_registry(runs.clone())
      .with_trace_store(Arc::new(FullDisk));

    assert!(matches!(
      agent.start_run(query("hi")).await,
      Err(AgentError::Trace(TraceError::Storage(_)))
    ));
    assert!(runs.is_empty());
  }
}
