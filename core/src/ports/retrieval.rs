//! Document similarity search port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
  pub content: String,
  /// Where the document came from, shown to the user as a source.
  pub source: String,
}

impl Document {
  pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      content: content.into(),
      source: source.into(),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
  #[error("Document index unavailable: {0}")]
  Unavailable(String),

  #[error("Similarity search failed: {0}")]
  Search(String),
}

#[async_trait]
pub trait DocumentRetriever: Send + Sync {
  /// Returns at most `k` documents, most similar first.
  async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>, RetrievalError>;
}
