use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use agentkit_core::AgentError;

/// Error body returned by every endpoint:
/// `{ "ok": false, "error": { "code": "<code>", "message": "<message>" } }`
#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  body: ApiErrorResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorResponse {
  pub ok: bool,
  pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
  pub code: String,
  pub message: String,
}

impl ApiError {
  pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      status,
      body: ApiErrorResponse {
        ok: false,
        error: ApiErrorBody {
          code: code.into(),
          message: message.into(),
        },
      },
    }
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new(StatusCode::NOT_FOUND, "not_found", message)
  }

  pub fn bad_request(message: impl Into<String>) -> Self {
    Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
  }

  pub fn unauthorized(message: impl Into<String>) -> Self {
    Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
  }

  pub fn status(&self) -> StatusCode {
    self.status
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status, Json(self.body)).into_response()
  }
}

impl From<AgentError> for ApiError {
  fn from(err: AgentError) -> Self {
    let message = err.to_string();
    match err {
      AgentError::InvalidTools(_) | AgentError::UnknownTool(_) | AgentError::Config(_) => {
        Self::bad_request(message)
      }
      AgentError::InvalidApiKey => Self::unauthorized(message),
      AgentError::RunNotFound(_) => Self::not_found(message),
      AgentError::Generation(_) => Self::new(StatusCode::BAD_GATEWAY, "model_unavailable", message),
      _ => Self::internal(message),
    }
  }
}
