//! Token length estimates.
//!
//! No tokenizer ships with the workspace, so lengths are estimated at four
//! characters per token. Every budget in the agent (fast model cut-over,
//! history pruning, summarizer chunking) goes through these helpers so the
//! estimate stays consistent.

const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
  text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Splits `text` into chunks of at most `max_tokens` estimated tokens,
/// breaking on whitespace where possible.
pub fn split_by_tokens(text: &str, max_tokens: usize) -> Vec<String> {
  let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
  let mut chunks = Vec::new();
  let mut current = String::new();
  let mut current_chars = 0;

  for word in text.split_inclusive(char::is_whitespace) {
    let word_chars = word.chars().count();
    if current_chars + word_chars > max_chars && !current.is_empty() {
      chunks.push(std::mem::take(&mut current));
      current_chars = 0;
    }
    if word_chars > max_chars {
      // A single oversized word is cut on character boundaries.
      let chars: Vec<char> = word.chars().collect();
      for piece in chars.chunks(max_chars) {
        chunks.push(piece.iter().collect());
      }
      continue;
    }
    current.push_str(word);
    current_chars += word_chars;
  }
  if !current.is_empty() {
    chunks.push(current);
  }
  chunks
}
