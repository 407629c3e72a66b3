//! Conversation memory.
//!
//! The submitted messages minus the latest one form the chat history given
//! to the router and to tools. History is pruned oldest-first to the token
//! budget; system messages are never carried over.

use agentkit_protocol::{ChatMessage, ChatQuery};

use crate::tokens::estimate_tokens;

/// History for a chat turn, newest messages kept within `max_tokens`.
pub fn chat_history(query: &ChatQuery, max_tokens: usize) -> Vec<ChatMessage> {
  let mut history: Vec<ChatMessage> = query
    .history()
    .iter()
    .filter(|message| !message.role.is_system())
    .cloned()
    .collect();
  prune_to_budget(&mut history, max_tokens);
  history
}

/// Drops messages from the front until the estimate fits `max_tokens`.
pub fn prune_to_budget(history: &mut Vec<ChatMessage>, max_tokens: usize) {
  let mut total: usize = history
    .iter()
    .map(|message| estimate_tokens(&message.content))
    .sum();
  let mut drop_count = 0;
  for message in history.iter() {
    if total <= max_tokens {
      break;
    }
    total -= estimate_tokens(&message.content);
    drop_count += 1;
  }
  history.drain(..drop_count);
}
