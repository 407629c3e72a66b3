use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_TYPE, HeaderName};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::info;

use agentkit_protocol::ChatQuery;

use crate::ServerState;
use crate::error::ApiError;

const RUN_ID_HEADER: HeaderName = HeaderName::from_static("x-run-id");

/// Starts a run and streams its events as newline separated JSON objects.
#[tracing::instrument(skip_all)]
pub(crate) async fn agent_chat(
  State(state): State<Arc<ServerState>>,
  Json(query): Json<ChatQuery>,
) -> Result<Response, ApiError> {
  let run = state.agent.start_run(query).await?;
  info!(run_id = run.run_id.as_str(), "streaming run");

  let lines = run.events.into_stream().map(|item| {
    serde_json::to_string(&item).map(|mut line| {
      line.push('\n');
      line
    })
  });

  Ok(
    (
      [
        (CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
        (RUN_ID_HEADER, run.run_id),
      ],
      Body::from_stream(lines),
    )
      .into_response(),
  )
}

pub(crate) async fn run_status(
  State(state): State<Arc<ServerState>>,
  Path(run_id): Path<String>,
) -> Json<bool> {
  Json(state.agent.run_status(&run_id).await)
}

pub(crate) async fn run_cancel(
  State(state): State<Arc<ServerState>>,
  Path(run_id): Path<String>,
) -> Json<bool> {
  Json(state.agent.cancel_run(&run_id).await)
}
