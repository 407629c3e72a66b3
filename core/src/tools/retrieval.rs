//! Document retrieval tool (`pdf_tool`).

use std::collections::BTreeSet;
use std::sync::Arc;

use agentkit_config::ToolConfig;
use agentkit_protocol::{ChatMessage, ToolInput};
use async_trait::async_trait;
use itertools::Itertools;
use serde_json::{Value, json};
use tracing::info;

use crate::bus::metadata;
use crate::ports::{Document, DocumentRetriever};
use crate::tokens::estimate_tokens;
use crate::tools::{RunContext, Tool, ToolError, ToolOutput};

/// Everything after this marker in a stored message is replayed tool output.
const TOOL_OUTPUT_MARKER: &str = "Tool outputs streamed to the user:";
const MAX_HISTORY_MESSAGES: usize = 6;

pub struct RetrievalTool {
  name: String,
  description: String,
  n_docs: usize,
  max_history_tokens: usize,
  retriever: Option<Arc<dyn DocumentRetriever>>,
}

impl RetrievalTool {
  pub fn new(
    name: impl Into<String>,
    config: &ToolConfig,
    max_token_length: usize,
    retriever: Option<Arc<dyn DocumentRetriever>>,
  ) -> Self {
    Self {
      name: name.into(),
      description: config.render().description.to_string(),
      n_docs: config.retrieval.n_docs,
      max_history_tokens: config
        .retrieval
        .max_tokens_chat_history
        .unwrap_or(max_token_length),
      retriever,
    }
  }

  /// Latest question plus earlier user questions, without replayed outputs.
  fn search_query(input: &ToolInput) -> String {
    std::iter::once(input.latest_human_message.as_str())
      .chain(
        input
          .chat_history
          .iter()
          .filter(|message| message.role.is_user())
          .map(|message| message.content.as_str()),
      )
      .map(strip_tool_outputs)
      .join("\n")
  }

  /// Up to six most recent messages fitting the budget left after the documents.
  fn recent_history(&self, history: &[ChatMessage], used_tokens: usize) -> Vec<ChatMessage> {
    let mut total = used_tokens;
    let mut recent: Vec<ChatMessage> = Vec::new();
    for message in history.iter().rev().take(MAX_HISTORY_MESSAGES) {
      let tokens = estimate_tokens(&message.content);
      if total + tokens > self.max_history_tokens {
        break;
      }
      total += tokens;
      recent.push(message.clone());
    }
    recent.reverse();
    recent
  }
}

fn strip_tool_outputs(content: &str) -> &str {
  content
    .split(TOOL_OUTPUT_MARKER)
    .next()
    .unwrap_or_default()
    .trim()
}

fn format_document(document: &Document) -> String {
  format!(
    "Document Source: {}\nDocument Content:\n{}",
    document.source, document.content
  )
}

#[async_trait]
impl Tool for RetrievalTool {
  fn name(&self) -> &str {
    &self.name
  }

  fn description(&self) -> &str {
    &self.description
  }

  async fn run(&self, input: &ToolInput, ctx: &RunContext) -> Result<ToolOutput, ToolError> {
    let retriever = self
      .retriever
      .as_deref()
      .ok_or(ToolError::Unavailable("Document retriever"))?;

    let search_query = Self::search_query(input);
    info!("PDF Tool Search Query - {search_query}");
    let documents = retriever.similarity_search(&search_query, self.n_docs).await?;

    let retrieved = documents.iter().map(format_document).join("\n\n");
    let sources: Vec<String> = documents
      .iter()
      .map(|document| document.source.clone())
      .collect();
    let unique: BTreeSet<&str> = sources.iter().map(String::as_str).collect();
    info!("PDF Tool {} Sources - {sources:?}", sources.len());

    ctx.action(
      &self.name,
      "retreived_sources",
      2,
      metadata([
        ("number_sources", Value::from(unique.len())),
        ("sources", Value::from(unique.iter().join(", "))),
      ]),
    );

    let history = self.recent_history(&input.chat_history, estimate_tokens(&retrieved));
    Ok(ToolOutput::Structured(json!({
      "result": retrieved,
      "metadata": sources,
      "chat_history": history,
    })))
  }
}
