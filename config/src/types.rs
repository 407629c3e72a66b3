// Configuration Types
// Agent, action plan and tool library definitions

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::template::PromptTemplate;

/// Pseudo-tool name meaning "give this step the chat history".
pub const MEMORY_TOOL: &str = "memory";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
  /// Model settings shared by the router and every tool
  pub common: CommonConfig,
  /// Run ceilings
  #[serde(default)]
  pub limits: RunLimits,
  /// Tools enabled for this agent
  #[serde(default)]
  pub tools: Vec<String>,
  /// Router human prompt, `{input}` is the latest user message
  pub prompt_message: String,
  /// Router system prompt, `{action_plans}` lists the available plans
  pub system_context: String,
  /// Selectable plans keyed by name
  #[serde(default)]
  pub action_plans: ActionPlans,
  /// Per-tool prompt configuration
  #[serde(default)]
  pub tools_library: BTreeMap<String, ToolConfig>,
}

impl Default for AgentConfig {
  fn default() -> Self {
    Self {
      common: CommonConfig::default(),
      limits: RunLimits::default(),
      tools: Vec::new(),
      prompt_message: "{input}".to_string(),
      system_context: concat!(
        "Select the action plan that best answers the user. ",
        "Reply with the plan name only.\n\n",
        "Available action plans:\n{action_plans}"
      )
      .to_string(),
      action_plans: ActionPlans::default(),
      tools_library: BTreeMap::new(),
    }
  }
}

impl AgentConfig {
  /// Checks cross references between plans, enabled tools and the tool library.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.common.fast_llm_token_limit == 0 {
      return Err(ConfigError::InvalidValue {
        key: "common.fast_llm_token_limit".to_string(),
        reason: "must be greater than zero".to_string(),
      });
    }
    if self.limits.max_iterations == 0 {
      return Err(ConfigError::InvalidValue {
        key: "limits.max_iterations".to_string(),
        reason: "must be greater than zero".to_string(),
      });
    }

    for tool in &self.tools {
      if !self.tools_library.contains_key(tool) {
        return Err(ConfigError::MissingToolConfig(tool.clone()));
      }
    }

    for (plan_name, plan) in self.action_plans.iter() {
      for tool in plan.actions.iter().flatten() {
        if tool != MEMORY_TOOL && !self.tools.contains(tool) {
          return Err(ConfigError::UnknownTool {
            plan: plan_name.clone(),
            tool: tool.clone(),
          });
        }
      }
    }

    Ok(())
  }

  pub fn tool_config(&self, name: &str) -> Option<&ToolConfig> {
    self.tools_library.get(name)
  }
}

// ============================================================================
// COMMON MODEL SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonConfig {
  /// Main model identifier
  pub llm: String,
  /// Cheaper model used for short prompts
  pub fast_llm: String,
  /// Prompts estimated below this many tokens go to the fast model
  pub fast_llm_token_limit: usize,
  /// Token budget for chat history and summarisation input
  pub max_token_length: usize,
}

impl Default for CommonConfig {
  fn default() -> Self {
    Self {
      llm: "gpt-4".to_string(),
      fast_llm: "gpt-3.5-turbo".to_string(),
      fast_llm_token_limit: 2500,
      max_token_length: 4000,
    }
  }
}

/// Ceilings applied to one router run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLimits {
  pub max_iterations: usize,
  pub max_execution_time_secs: u64,
}

impl Default for RunLimits {
  fn default() -> Self {
    Self {
      max_iterations: 15,
      max_execution_time_secs: 300,
    }
  }
}

impl RunLimits {
  pub fn max_execution_time(&self) -> Duration {
    Duration::from_secs(self.max_execution_time_secs)
  }
}

// ============================================================================
// ACTION PLANS
// ============================================================================

/// A named sequence of steps; each step is a set of tools run concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
  /// Filled from the table key when left empty
  #[serde(default)]
  pub name: String,
  pub description: String,
  pub actions: Vec<Vec<String>>,
}

impl ActionPlan {
  pub fn step_count(&self) -> usize {
    self.actions.len()
  }
}

/// Plans keyed by name. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionPlans(BTreeMap<String, ActionPlan>);

impl ActionPlans {
  pub fn new(plans: impl IntoIterator<Item = ActionPlan>) -> Self {
    Self(
      plans
        .into_iter()
        .map(|plan| (plan.name.clone(), plan))
        .collect(),
    )
  }

  pub fn get(&self, name: &str) -> Option<&ActionPlan> {
    self.0.get(name)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &ActionPlan)> {
    self.0.iter()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// `name: description` lines listed in the router prompt.
  pub fn describe(&self) -> String {
    self
      .0
      .iter()
      .map(|(name, plan)| format!("{name}: {}", plan.description))
      .collect::<Vec<_>>()
      .join("\n")
  }

  /// Copies each table key into the plan's `name` when it was omitted.
  pub fn fill_names(&mut self) {
    for (key, plan) in self.0.iter_mut() {
      if plan.name.is_empty() {
        plan.name = key.clone();
      }
    }
  }
}

// ============================================================================
// TOOL LIBRARY
// ============================================================================

/// Named snippet substituted into every template of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptInput {
  pub name: String,
  pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolConfig {
  pub description: String,
  #[serde(default)]
  pub prompt_message: Option<String>,
  #[serde(default)]
  pub system_context: Option<String>,
  #[serde(default)]
  pub prompt_selection: Option<String>,
  #[serde(default)]
  pub system_context_selection: Option<String>,
  #[serde(default)]
  pub prompt_validation: Option<String>,
  #[serde(default)]
  pub system_context_validation: Option<String>,
  #[serde(default)]
  pub prompt_refinement: Option<String>,
  #[serde(default)]
  pub system_context_refinement: Option<String>,
  #[serde(default)]
  pub prompt_inputs: Vec<PromptInput>,
  #[serde(flatten)]
  pub sql: SqlToolOptions,
  #[serde(flatten)]
  pub retrieval: RetrievalToolOptions,
}

impl ToolConfig {
  /// Templates with this tool's `prompt_inputs` already substituted.
  pub fn render(&self) -> ToolPrompts {
    let vars: Vec<(&str, &str)> = self
      .prompt_inputs
      .iter()
      .map(|input| (input.name.as_str(), input.content.as_str()))
      .collect();
    let partial = |template: &Option<String>| {
      template
        .as_deref()
        .map(|raw| PromptTemplate::new(raw).partial(&vars))
    };

    ToolPrompts {
      description: PromptTemplate::new(&self.description).partial(&vars),
      prompt_message: partial(&self.prompt_message).unwrap_or_default(),
      system_context: partial(&self.system_context).unwrap_or_default(),
      prompt_selection: partial(&self.prompt_selection),
      system_context_selection: partial(&self.system_context_selection),
      prompt_validation: partial(&self.prompt_validation),
      system_context_validation: partial(&self.system_context_validation),
      prompt_refinement: partial(&self.prompt_refinement),
      system_context_refinement: partial(&self.system_context_refinement),
    }
  }
}

/// Rendered templates of one tool, ready for run-time placeholders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolPrompts {
  pub description: PromptTemplate,
  pub prompt_message: PromptTemplate,
  pub system_context: PromptTemplate,
  pub prompt_selection: Option<PromptTemplate>,
  pub system_context_selection: Option<PromptTemplate>,
  pub prompt_validation: Option<PromptTemplate>,
  pub system_context_validation: Option<PromptTemplate>,
  pub prompt_refinement: Option<PromptTemplate>,
  pub system_context_refinement: Option<PromptTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlToolOptions {
  pub nb_example_rows: usize,
  pub validate_empty_results: bool,
  pub validate_with_llm: bool,
  pub always_limit_query: bool,
}

impl Default for SqlToolOptions {
  fn default() -> Self {
    Self {
      nb_example_rows: 3,
      validate_empty_results: false,
      validate_with_llm: false,
      always_limit_query: false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalToolOptions {
  pub n_docs: usize,
  pub max_tokens_chat_history: Option<usize>,
}

impl Default for RetrievalToolOptions {
  fn default() -> Self {
    Self {
      n_docs: 4,
      max_tokens_chat_history: None,
    }
  }
}
