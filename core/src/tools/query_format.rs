//! Renders a [`ToolInput`] as the question text most tool prompts expect.

use agentkit_protocol::{ChatRole, ToolInput, render_value};
use itertools::Itertools;

/// Tool whose output is never passed on to later prompts.
const EXCLUDED_STEP: &str = "entertainer_tool";

pub fn standard_query_format(input: &ToolInput) -> String {
  let mut query = String::new();

  if !input.chat_history.is_empty() {
    query.push_str("\nChat history: \n");
    query.push_str(
      &input
        .chat_history
        .iter()
        .map(|message| {
          let content = strip_event_lines(&message.content);
          match message.role {
            ChatRole::User => format!("Human: {content}"),
            ChatRole::Agent | ChatRole::System => format!("AI: {content}"),
          }
        })
        .join("\n"),
    );
  }

  let steps = input
    .intermediate_steps
    .iter()
    .filter(|(tool, _)| tool.as_str() != EXCLUDED_STEP)
    .map(|(tool, output)| format!("{tool}: {}", render_value(output)))
    .join("\n");
  if !steps.is_empty() {
    query.push_str("\nIntermediate tool outputs: ");
    query.push_str(&steps);
  }

  query.push_str("Latest user question: ");
  query.push_str(&input.latest_human_message);
  query
}

/// Removes replayed `action:`/`signal:` lines from a stored answer.
fn strip_event_lines(content: &str) -> String {
  content
    .split('\n')
    .filter(|line| !line.starts_with("action:") && !line.starts_with("signal:"))
    .join("\n")
}
