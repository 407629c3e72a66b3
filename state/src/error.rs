use agentkit_core::ports::TraceError;
use thiserror::Error;

/// State database errors
#[derive(Error, Debug)]
pub enum StateError {
  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Stored record is malformed: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Stored timestamp is malformed: {0}")]
  Timestamp(#[from] chrono::ParseError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

impl From<StateError> for TraceError {
  fn from(err: StateError) -> Self {
    TraceError::Storage(err.to_string())
  }
}

pub type Result<T> = std::result::Result<T, StateError>;
