//! Per-conversation configuration artifacts.
//!
//! Artifacts are JSON documents kept in two versions per conversation. A
//! write first rotates the current `new` file to `old`, so a later step can
//! compare what changed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ArtifactKind {
  #[display("optimization_config")]
  OptimizationConfig,
  #[display("optimization_input")]
  OptimizationInput,
}

impl ArtifactKind {
  /// File holding the artifact every conversation starts from.
  pub fn default_file_name(self) -> String {
    format!("{self}.json")
  }

  pub fn file_name(self, conversation_id: &str, version: ArtifactVersion) -> String {
    format!("{self}_{conversation_id}_{version}.json")
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ArtifactVersion {
  #[display("new")]
  New,
  #[display("old")]
  Old,
}

#[derive(Error, Debug)]
pub enum ArtifactError {
  #[error("Artifact storage error: {0}")]
  Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
  async fn load(
    &self,
    kind: ArtifactKind,
    conversation_id: &str,
    version: ArtifactVersion,
  ) -> Result<Option<String>, ArtifactError>;

  async fn load_default(&self, kind: ArtifactKind) -> Result<Option<String>, ArtifactError>;

  /// Removes `old`, renames `new` to `old`, then writes `content` as `new`.
  async fn write_rotating(
    &self,
    kind: ArtifactKind,
    conversation_id: &str,
    content: &str,
  ) -> Result<(), ArtifactError>;
}

/// Artifacts stored as files in one directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
  root: PathBuf,
}

impl FsArtifactStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  async fn read_optional(path: &Path) -> Result<Option<String>, ArtifactError> {
    match tokio::fs::read_to_string(path).await {
      Ok(content) => Ok(Some(content)),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(err) => Err(err.into()),
    }
  }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
  async fn load(
    &self,
    kind: ArtifactKind,
    conversation_id: &str,
    version: ArtifactVersion,
  ) -> Result<Option<String>, ArtifactError> {
    Self::read_optional(&self.root.join(kind.file_name(conversation_id, version))).await
  }

  async fn load_default(&self, kind: ArtifactKind) -> Result<Option<String>, ArtifactError> {
    Self::read_optional(&self.root.join(kind.default_file_name())).await
  }

  async fn write_rotating(
    &self,
    kind: ArtifactKind,
    conversation_id: &str,
    content: &str,
  ) -> Result<(), ArtifactError> {
    tokio::fs::create_dir_all(&self.root).await?;
    let new_path = self
      .root
      .join(kind.file_name(conversation_id, ArtifactVersion::New));
    let old_path = self
      .root
      .join(kind.file_name(conversation_id, ArtifactVersion::Old));

    if tokio::fs::try_exists(&old_path).await? {
      tokio::fs::remove_file(&old_path).await?;
    }
    if tokio::fs::try_exists(&new_path).await? {
      tokio::fs::rename(&new_path, &old_path).await?;
    }
    tokio::fs::write(&new_path, content).await?;
    debug!(path = %new_path.display(), "wrote artifact");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use tempfile::TempDir;

  #[test]
  fn file_names_follow_kind_and_version() {
    assert_eq!(
      ArtifactKind::OptimizationConfig.default_file_name(),
      "optimization_config.json"
    );
    assert_eq!(
      ArtifactKind::OptimizationInput.file_name("c1", ArtifactVersion::Old),
      "optimization_input_c1_old.json"
    );
  }

  #[tokio::test]
  async fn write_rotating_keeps_previous_version() {
    let dir = TempDir::new().expect("tempdir");
    let store = FsArtifactStore::new(dir.path());
    let kind = ArtifactKind::OptimizationInput;

    assert_eq!(store.load(kind, "c1", ArtifactVersion::New).await.expect("load"), None);

    store.write_rotating(kind, "c1", "{\"v\": 1}").await.expect("first write");
    store.write_rotating(kind, "c1", "{\"v\": 2}").await.expect("second write");
    store.write_rotating(kind, "c1", "{\"v\": 3}").await.expect("third write");

    assert_eq!(
      store.load(kind, "c1", ArtifactVersion::New).await.expect("load new"),
      Some("{\"v\": 3}".to_string())
    );
    assert_eq!(
      store.load(kind, "c1", ArtifactVersion::Old).await.expect("load old"),
      Some("{\"v\": 2}".to_string())
    );
  }

  #[tokio::test]
  async fn load_default_reads_shared_file() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("optimization_config.json"), "{}").expect("write default");
    let store = FsArtifactStore::new(dir.path());

    assert_eq!(
      store
        .load_default(ArtifactKind::OptimizationConfig)
        .await
        .expect("load default"),
      Some("{}".to_string())
    );
    assert_eq!(
      store
        .load_default(ArtifactKind::OptimizationInput)
        .await
        .expect("load default"),
      None
    );
  }
}
