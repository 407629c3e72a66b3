use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use agentkit_protocol::{Feedback, SqlExecutionResponse};

use crate::ServerState;
use crate::error::ApiError;

/// Records user feedback on an answered message; returns the feedback id.
pub(crate) async fn send_feedback(
  State(state): State<Arc<ServerState>>,
  Json(feedback): Json<Feedback>,
) -> Result<Json<String>, ApiError> {
  let id = state.agent.submit_feedback(&feedback).await?;
  Ok(Json(id))
}

#[derive(Debug, Deserialize)]
pub struct SqlStatement {
  pub statement: String,
}

pub(crate) async fn execute_sql(
  State(state): State<Arc<ServerState>>,
  Json(request): Json<SqlStatement>,
) -> Json<SqlExecutionResponse> {
  Json(state.agent.execute_sql(&request.statement).await)
}

/// Query-string form: `GET /sql/execute?statement=...`.
pub(crate) async fn execute_sql_query(
  State(state): State<Arc<ServerState>>,
  Query(request): Query<SqlStatement>,
) -> Json<SqlExecutionResponse> {
  Json(state.agent.execute_sql(&request.statement).await)
}
