use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use uuid::Uuid;

use agentkit_config::{ActionPlan, ActionPlans, AgentConfig, ToolConfig};
use agentkit_core::agent::{SQL_DISABLED_MESSAGE, UNSAFE_SQL_MESSAGE};
use agentkit_core::ports::{GenerationError, GeneratorFactory, PromptMessage, TextGenerator};
use agentkit_core::{Agent, ToolServices};
use agentkit_protocol::{SqlExecutionResponse, StreamingData, StreamingSignal};
use agentkit_server::Server;

struct ScriptedModel {
  replies: Mutex<VecDeque<String>>,
}

#[async_trait]
impl TextGenerator for ScriptedModel {
  fn model_name(&self) -> &str {
    "scripted"
  }

  async fn generate(&self, _messages: &[PromptMessage]) -> Result<String, GenerationError> {
    Ok(
      self
        .replies
        .lock()
        .expect("replies lock")
        .pop_front()
        .unwrap_or_default(),
    )
  }
}

struct ScriptedModels(Arc<ScriptedModel>);

impl GeneratorFactory for ScriptedModels {
  fn create(
    &self,
    _model: &str,
    _api_key: Option<&str>,
  ) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    Ok(self.0.clone())
  }
}

async fn start_server(replies: &[&str]) -> Server {
  let models = Arc::new(ScriptedModels(Arc::new(ScriptedModel {
    replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
  })));
  let config = AgentConfig {
    tools: vec!["clarify_tool".to_string()],
    action_plans: ActionPlans::new([ActionPlan {
      name: "chat".to_string(),
      description: "talk to the user".to_string(),
      actions: vec![vec!["memory".to_string(), "clarify_tool".to_string()]],
    }]),
    tools_library: [(
      "clarify_tool".to_string(),
      ToolConfig {
        description: "asks a clarifying question".to_string(),
        prompt_message: Some("{question}".to_string()),
        ..Default::default()
      },
    )]
    .into_iter()
    .collect(),
    ..Default::default()
  };
  let agent = Agent::new(config, ToolServices::new(models)).expect("agent");
  Server::start(agent, SocketAddr::from(([127, 0, 0, 1], 0)))
    .await
    .expect("start server")
}

fn url(server: &Server, path: &str) -> String {
  format!("http://{}/api/v1{path}", server.addr())
}

fn chat_body(message_id: Uuid) -> Value {
  json!({
    "messages": [{"role": "user", "content": "hello"}],
    "conversation_id": Uuid::new_v4(),
    "new_message_id": message_id,
    "user_email": "a@b.c",
    "settings": null
  })
}

#[tokio::test]
async fn chat_streams_newline_separated_events() {
  let server = start_server(&["chat", "Hi there"]).await;
  let client = reqwest::Client::new();

  let response = client
    .post(url(&server, "/chat/agent"))
    .json(&chat_body(Uuid::new_v4()))
    .send()
    .await
    .expect("send chat");
  assert!(response.status().is_success());
  let run_id = response
    .headers()
    .get("x-run-id")
    .and_then(|value| value.to_str().ok())
    .map(str::to_string)
    .expect("run id header");
  let body = response.text().await.expect("read body");

  let events: Vec<StreamingData> = body
    .lines()
    .map(|line| serde_json::from_str(line).expect("event line"))
    .collect();
  assert!(events.first().is_some_and(|item| item.is_signal(StreamingSignal::Start)));
  assert!(events.last().is_some_and(|item| item.is_signal(StreamingSignal::End)));
  assert!(events.iter().all(|item| item.run_id() == Some(run_id.as_str())));

  let status: bool = client
    .get(url(&server, &format!("/chat/run/{run_id}/status")))
    .send()
    .await
    .expect("send status")
    .json()
    .await
    .expect("status body");
  assert!(!status);
}

#[tokio::test]
async fn cancel_always_answers_true() {
  let server = start_server(&[]).await;
  let cancelled: bool = reqwest::get(url(&server, "/chat/run/unknown/cancel"))
    .await
    .expect("send cancel")
    .json()
    .await
    .expect("cancel body");
  assert!(cancelled);
}

#[tokio::test]
async fn feedback_is_attached_to_the_answered_message() {
  let server = start_server(&["chat", "Hi there"]).await;
  let client = reqwest::Client::new();
  let message_id = Uuid::new_v4();

  client
    .post(url(&server, "/chat/agent"))
    .json(&chat_body(message_id))
    .send()
    .await
    .expect("send chat")
    .text()
    .await
    .expect("drain chat");

  let feedback = |message_id: Uuid| {
    json!({
      "conversation_id": Uuid::new_v4(),
      "message_id": message_id,
      "user": "a@b.c",
      "score": 1,
      "comment": "",
      "key": "user_score"
    })
  };

  let response = client
    .post(url(&server, "/statistics/feedback"))
    .json(&feedback(message_id))
    .send()
    .await
    .expect("send feedback");
  assert!(response.status().is_success());
  let id: String = response.json().await.expect("feedback id");
  assert!(!id.is_empty());

  let missing = client
    .post(url(&server, "/statistics/feedback"))
    .json(&feedback(Uuid::new_v4()))
    .send()
    .await
    .expect("send feedback");
  assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
  let body: Value = missing.json().await.expect("error body");
  assert_eq!(body["ok"], json!(false));
  assert_eq!(body["error"]["code"], json!("not_found"));
}

#[tokio::test]
async fn sql_execution_is_guarded() {
  let server = start_server(&[]).await;
  let client = reqwest::Client::new();

  let unsafe_statement: SqlExecutionResponse = client
    .post(url(&server, "/sql/execute"))
    .json(&json!({"statement": "DROP TABLE users"}))
    .send()
    .await
    .expect("send sql")
    .json()
    .await
    .expect("sql body");
  assert_eq!(unsafe_statement, SqlExecutionResponse::message(UNSAFE_SQL_MESSAGE));

  let disabled: SqlExecutionResponse = client
    .get(url(&server, "/sql/execute"))
    .query(&[("statement", "SELECT 1")])
    .send()
    .await
    .expect("send sql")
    .json()
    .await
    .expect("sql body");
  assert_eq!(disabled, SqlExecutionResponse::message(SQL_DISABLED_MESSAGE));
}
