// Agentkit State Database
// Run traces and feedback kept in a local SQLite file

use std::path::{Path, PathBuf};

use agentkit_core::ports::{FeedbackRecord, RunOutcome, RunTrace, TraceError, TraceStore};
use agentkit_protocol::Feedback;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;

pub const STATE_DB_FILE_NAME: &str = "state.db";

const SCHEMA: &str = include_str!("schema.sql");

const RUN_COLUMNS: &str = "runs.run_id, runs.tags, runs.started_at, runs.finished_at, runs.output, runs.error";

/// SQLite backed [`TraceStore`].
#[derive(Clone)]
pub struct StateDb {
  pool: SqlitePool,
}

impl StateDb {
  /// Opens (or creates) the database at `path` and applies the schema.
  pub async fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true)
      .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(4)
      .connect_with(options)
      .await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    info!(path = %path.display(), "opened state database");
    Ok(Self { pool })
  }

  /// `~/.agentkit/state.db`, or a relative path when there is no home directory.
  pub fn default_path() -> PathBuf {
    dirs::home_dir()
      .unwrap_or_default()
      .join(".agentkit")
      .join(STATE_DB_FILE_NAME)
  }

  pub async fn close(&self) {
    self.pool.close().await;
  }

  async fn insert_run(&self, run_id: &str, tags: &[String]) -> Result<()> {
    let mut tx = self.pool.begin().await?;
    sqlx::query("INSERT INTO runs (run_id, tags, started_at) VALUES (?1, ?2, ?3)")
      .bind(run_id)
      .bind(serde_json::to_string(tags)?)
      .bind(timestamp(Utc::now()))
      .execute(&mut *tx)
      .await?;
    for tag in tags {
      sqlx::query("INSERT OR IGNORE INTO run_tags (run_id, tag) VALUES (?1, ?2)")
        .bind(run_id)
        .bind(tag)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
  }

  /// Returns false when no run has `run_id`.
  async fn update_outcome(&self, run_id: &str, outcome: RunOutcome) -> Result<bool> {
    let (output, error) = match outcome {
      RunOutcome::Completed(output) => (Some(output), None),
      RunOutcome::Failed(error) => (None, Some(error)),
    };
    let result = sqlx::query(
      "UPDATE runs SET finished_at = ?2, output = ?3, error = ?4 WHERE run_id = ?1",
    )
    .bind(run_id)
    .bind(timestamp(Utc::now()))
    .bind(output)
    .bind(error)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn select_run_by_tag(&self, tag: &str) -> Result<Option<RunTrace>> {
    let sql = format!(
      "SELECT {RUN_COLUMNS} FROM runs JOIN run_tags ON run_tags.run_id = runs.run_id \
       WHERE run_tags.tag = ?1 ORDER BY runs.started_at DESC, runs.rowid DESC LIMIT 1"
    );
    let row = sqlx::query(&sql).bind(tag).fetch_optional(&self.pool).await?;
    row.as_ref().map(run_from_row).transpose()
  }

  async fn select_runs(&self, limit: usize) -> Result<Vec<RunTrace>> {
    let sql =
      format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY started_at DESC, rowid DESC LIMIT ?1");
    let rows = sqlx::query(&sql)
      .bind(i64::try_from(limit).unwrap_or(i64::MAX))
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(run_from_row).collect()
  }

  async fn insert_feedback(&self, run_id: &str, feedback: &Feedback) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO feedback (id, run_id, record_json, created_at) VALUES (?1, ?2, ?3, ?4)")
      .bind(&id)
      .bind(run_id)
      .bind(serde_json::to_string(feedback)?)
      .bind(timestamp(Utc::now()))
      .execute(&self.pool)
      .await?;
    debug!(feedback_id = id.as_str(), run_id, "stored feedback");
    Ok(id)
  }

  async fn remove_feedback(&self, feedback_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM feedback WHERE id = ?1")
      .bind(feedback_id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn select_feedback(&self, run_id: &str) -> Result<Vec<FeedbackRecord>> {
    let rows = sqlx::query(
      "SELECT id, run_id, record_json, created_at FROM feedback \
       WHERE run_id = ?1 ORDER BY created_at, rowid",
    )
    .bind(run_id)
    .fetch_all(&self.pool)
    .await?;
    rows
      .iter()
      .map(|row| -> Result<FeedbackRecord> {
        let record_json: String = row.try_get("record_json")?;
        Ok(FeedbackRecord {
          id: row.try_get("id")?,
          run_id: row.try_get("run_id")?,
          feedback: serde_json::from_str(&record_json)?,
          created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        })
      })
      .collect()
  }
}

fn timestamp(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
  Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn run_from_row(row: &SqliteRow) -> Result<RunTrace> {
  let tags: String = row.try_get("tags")?;
  let finished_at: Option<String> = row.try_get("finished_at")?;
  Ok(RunTrace {
    run_id: row.try_get("run_id")?,
    tags: serde_json::from_str(&tags)?,
    started_at: parse_timestamp(&row.try_get::<String, _>("started_at")?)?,
    finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
    output: row.try_get("output")?,
    error: row.try_get("error")?,
  })
}

#[async_trait]
impl TraceStore for StateDb {
  async fn start_run(&self, run_id: &str, tags: &[String]) -> std::result::Result<(), TraceError> {
    Ok(self.insert_run(run_id, tags).await?)
  }

  async fn finish_run(
    &self,
    run_id: &str,
    outcome: RunOutcome,
  ) -> std::result::Result<(), TraceError> {
    if self.update_outcome(run_id, outcome).await? {
      Ok(())
    } else {
      Err(TraceError::RunNotFound(run_id.to_string()))
    }
  }

  async fn find_run_by_tag(&self, tag: &str) -> std::result::Result<Option<RunTrace>, TraceError> {
    Ok(self.select_run_by_tag(tag).await?)
  }

  async fn list_runs(&self, limit: usize) -> std::result::Result<Vec<RunTrace>, TraceError> {
    Ok(self.select_runs(limit).await?)
  }

  async fn create_feedback(
    &self,
    run_id: &str,
    feedback: &Feedback,
  ) -> std::result::Result<String, TraceError> {
    Ok(self.insert_feedback(run_id, feedback).await?)
  }

  async fn delete_feedback(&self, feedback_id: &str) -> std::result::Result<(), TraceError> {
    Ok(self.remove_feedback(feedback_id).await?)
  }

  async fn list_feedback(
    &self,
    run_id: &str,
  ) -> std::result::Result<Vec<FeedbackRecord>, TraceError> {
    Ok(self.select_feedback(run_id).await?)
  }
}
