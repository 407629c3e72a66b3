//! Run traces and user feedback.

use std::sync::Mutex;
use std::sync::PoisonError;

use agentkit_protocol::Feedback;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Recorded run with its searchable tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
  pub run_id: String,
  pub tags: Vec<String>,
  pub started_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
  pub output: Option<String>,
  pub error: Option<String>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::IsVariant)]
pub enum RunOutcome {
  Completed(String),
  Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
  pub id: String,
  pub run_id: String,
  pub feedback: Feedback,
  pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum TraceError {
  #[error("No run found with tag '{0}'")]
  RunNotFound(String),

  #[error("Trace storage error: {0}")]
  Storage(String),
}

#[async_trait]
pub trait TraceStore: Send + Sync {
  async fn start_run(&self, run_id: &str, tags: &[String]) -> Result<(), TraceError>;

  async fn finish_run(&self, run_id: &str, outcome: RunOutcome) -> Result<(), TraceError>;

  /// Most recent run carrying `tag`.
  async fn find_run_by_tag(&self, tag: &str) -> Result<Option<RunTrace>, TraceError>;

  async fn list_runs(&self, limit: usize) -> Result<Vec<RunTrace>, TraceError>;

  /// Stores feedback for a run and returns the new feedback id.
  async fn create_feedback(&self, run_id: &str, feedback: &Feedback) -> Result<String, TraceError>;

  async fn delete_feedback(&self, feedback_id: &str) -> Result<(), TraceError>;

  async fn list_feedback(&self, run_id: &str) -> Result<Vec<FeedbackRecord>, TraceError>;
}

#[derive(Debug, Default)]
struct TraceTables {
  runs: Vec<RunTrace>,
  feedback: Vec<FeedbackRecord>,
}

/// Trace store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryTraceStore {
  tables: Mutex<TraceTables>,
}

impl InMemoryTraceStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn with_tables<T>(&self, f: impl FnOnce(&mut TraceTables) -> T) -> T {
    let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut tables)
  }
}

#[async_trait]
impl TraceStore for InMemoryTraceStore {
  async fn start_run(&self, run_id: &str, tags: &[String]) -> Result<(), TraceError> {
    self.with_tables(|tables| {
      tables.runs.push(RunTrace {
        run_id: run_id.to_string(),
        tags: tags.to_vec(),
        started_at: Utc::now(),
        finished_at: None,
        output: None,
        error: None,
      });
    });
    Ok(())
  }

  async fn finish_run(&self, run_id: &str, outcome: RunOutcome) -> Result<(), TraceError> {
    self.with_tables(|tables| {
      let run = tables
        .runs
        .iter_mut()
        .find(|run| run.run_id == run_id)
        .ok_or_else(|| TraceError::RunNotFound(run_id.to_string()))?;
      run.finished_at = Some(Utc::now());
      match outcome {
        RunOutcome::Completed(output) => run.output = Some(output),
        RunOutcome::Failed(error) => run.error = Some(error),
      }
      Ok(())
    })
  }

  async fn find_run_by_tag(&self, tag: &str) -> Result<Option<RunTrace>, TraceError> {
    Ok(self.with_tables(|tables| {
      tables
        .runs
        .iter()
        .rev()
        .find(|run| run.tags.iter().any(|candidate| candidate == tag))
        .cloned()
    }))
  }

  async fn list_runs(&self, limit: usize) -> Result<Vec<RunTrace>, TraceError> {
    Ok(self.with_tables(|tables| tables.runs.iter().rev().take(limit).cloned().collect()))
  }

  async fn create_feedback(&self, run_id: &str, feedback: &Feedback) -> Result<String, TraceError> {
    let id = Uuid::new_v4().to_string();
    self.with_tables(|tables| {
      tables.feedback.push(FeedbackRecord {
        id: id.clone(),
        run_id: run_id.to_string(),
        feedback: feedback.clone(),
        created_at: Utc::now(),
      });
    });
    Ok(id)
  }

  async fn delete_feedback(&self, feedback_id: &str) -> Result<(), TraceError> {
    self.with_tables(|tables| tables.feedback.retain(|record| record.id != feedback_id));
    Ok(())
  }

  async fn list_feedback(&self, run_id: &str) -> Result<Vec<FeedbackRecord>, TraceError> {
    Ok(self.with_tables(|tables| {
      tables
        .feedback
        .iter()
        .filter(|record| record.run_id == run_id)
        .cloned()
        .collect()
    }))
  }
}
