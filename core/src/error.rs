//! Run-level error types

use std::time::Duration;

use agentkit_config::ConfigError;
use thiserror::Error;

use crate::ports::{GenerationError, TraceError};
use crate::tools::ToolError;

/// Errors that end a run or reject an agent operation
#[derive(Error, Debug, derive_more::IsVariant)]
pub enum AgentError {
  /// The run id was removed from the run registry
  #[error("The agent is cancelled.")]
  Cancelled { run_id: String },

  /// Plan selection kept failing on authentication
  #[error("Oops! It seems like your API key is invalid. Please check your Settings.")]
  InvalidApiKey,

  /// The model never answered with a known plan name
  #[error("Invalid action plan selected ({attempts}x)")]
  PlanSelection { attempts: usize },

  /// Wall-clock ceiling of the run exceeded
  #[error("Agent stopped after exceeding the time limit of {}s", .0.as_secs())]
  Timeout(Duration),

  /// More plan steps than the iteration ceiling allows
  #[error("Agent stopped after reaching the iteration limit of {0}")]
  IterationLimit(usize),

  /// A plan step names a tool that was not built for this agent
  #[error("Unknown tool '{0}' in action plan")]
  UnknownTool(String),

  /// Configured tool names without a constructor
  #[error("Invalid tool name(s): {0:?}")]
  InvalidTools(Vec<String>),

  /// A tool failed in a way that cannot be reported as its output
  #[error("Tool '{tool}' failed: {source}")]
  Tool {
    tool: String,
    #[source]
    source: ToolError,
  },

  /// Feedback refers to a message no run was recorded for
  #[error("No run found for message {0}")]
  RunNotFound(String),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Generation(#[from] GenerationError),

  #[error(transparent)]
  Trace(#[from] TraceError),
}

/// Alias for Result<T, AgentError>
pub type Result<T> = std::result::Result<T, AgentError>;
