use tracing::{error, warn};

use super::EventSink;
use crate::error::AgentError;
use crate::ports::GenerationError;

/// Shown to the user when the run or a model call times out.
pub const TIMEOUT_MESSAGE: &str = "Model API timed out. Please try again.";

/// Reports a run failure on the bus and completes it.
pub fn report_error(err: &AgentError, sink: &EventSink) {
  match err {
    AgentError::Timeout(_) | AgentError::Generation(GenerationError::Timeout) => {
      error!(run_id = ?sink.run_id(), "{err}");
      sink.on_llm_error(TIMEOUT_MESSAGE);
    }
    AgentError::Cancelled { run_id } => {
      warn!(run_id = %run_id, "run cancelled");
      sink.on_llm_error(&err.to_string());
    }
    other => {
      error!(run_id = ?sink.run_id(), "run failed: {other}");
      sink.on_llm_error(&other.to_string());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bus::{channel, metadata};
  use agentkit_protocol::StreamingDataType;
  use pretty_assertions::assert_eq;
  use serde_json::json;
  use std::time::Duration;

  async fn drain(mut stream: crate::bus::EventStream) -> Vec<agentkit_protocol::StreamingData> {
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
      items.push(item);
    }
    items
  }

  #[tokio::test]
  async fn timeout_is_reported_with_fixed_message() {
    let (sink, stream) = channel(metadata([("run_id", json!("r1"))]));
    report_error(&AgentError::Timeout(Duration::from_secs(300)), &sink);
    assert!(sink.is_finished());
    drop(sink);

    let items = drain(stream).await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].data, TIMEOUT_MESSAGE);
    assert_eq!(items[1].data_type, StreamingDataType::Llm);
  }

  #[tokio::test]
  async fn model_timeout_uses_the_same_message() {
    let (sink, stream) = channel(metadata([("run_id", json!("r1"))]));
    report_error(&AgentError::Generation(GenerationError::Timeout), &sink);
    drop(sink);

    let items = drain(stream).await;
    assert_eq!(items[1].data, TIMEOUT_MESSAGE);
  }

  #[tokio::test]
  async fn cancellation_is_reported_by_its_message() {
    let (sink, stream) = channel(metadata([("run_id", json!("r2"))]));
    let err = AgentError::Cancelled {
      run_id: "r2".to_string(),
    };
    report_error(&err, &sink);
    drop(sink);

    let items = drain(stream).await;
    assert_eq!(items[1].data, "The agent is cancelled.");
    assert_eq!(items[1].run_id(), Some("r2"));
  }

  #[tokio::test]
  async fn other_errors_are_reported_verbatim() {
    let (sink, stream) = channel(metadata([("run_id", json!("r3"))]));
    report_error(&AgentError::PlanSelection { attempts: 4 }, &sink);
    drop(sink);

    let items = drain(stream).await;
    assert_eq!(items[1].data, "Invalid action plan selected (4x)");
  }
}
