// Configuration Loader
// Layered configuration loading system

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;
use crate::layered::{ConfigLayerSource, LayeredConfig};
use crate::types::AgentConfig;

/// File name used in both the global and the project config directory.
pub const CONFIG_FILE_NAME: &str = "agent.toml";
/// Directory holding agentkit configuration.
pub const CONFIG_DIR_NAME: &str = ".agentkit";

/// Configuration loader with layered support
pub struct ConfigLoader {
  /// Global config directory
  global_dir: PathBuf,
  /// Project directory containing `.agentkit/`
  project_dir: Option<PathBuf>,
  /// Explicit config file, highest file precedence
  explicit_file: Option<PathBuf>,
}

impl ConfigLoader {
  /// Create a new configuration loader
  pub fn new() -> Self {
    let global_dir = dirs::home_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join(CONFIG_DIR_NAME);

    Self {
      global_dir,
      project_dir: None,
      explicit_file: None,
    }
  }

  /// Override the global config directory
  pub fn with_global_dir(mut self, dir: PathBuf) -> Self {
    self.global_dir = dir;
    self
  }

  /// Set project directory
  pub fn with_project_dir(mut self, dir: PathBuf) -> Self {
    self.project_dir = Some(dir);
    self
  }

  /// Load one more file on top of global and project config
  pub fn with_file(mut self, path: PathBuf) -> Self {
    self.explicit_file = Some(path);
    self
  }

  /// Path of the project config file, when a project directory is set
  pub fn project_config_path(&self) -> Option<PathBuf> {
    self
      .project_dir
      .as_ref()
      .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
  }

  /// Load configuration with CLI overrides
  pub fn load_with_cli_overrides(&self, cli_overrides: Vec<(String, String)>) -> Result<AgentConfig> {
    // Load layers in order:
    // 1. Built-in defaults
    // 2. Global config (~/.agentkit/agent.toml)
    // 3. Project config (.agentkit/agent.toml)
    // 4. Explicit file
    // 5. CLI overrides
    let mut layered = LayeredConfig::new();
    layered.add_layer(
      ConfigLayerSource::Default,
      toml::Value::try_from(AgentConfig::default()).context("serialize default config")?,
    );

    let global_path = self.global_dir.join(CONFIG_FILE_NAME);
    if let Some(values) = Self::read_layer(&global_path)? {
      layered.add_layer(ConfigLayerSource::GlobalConfig, values);
    }

    if let Some(project_path) = self.project_config_path() {
      if let Some(values) = Self::read_layer(&project_path)? {
        layered.add_layer(ConfigLayerSource::ProjectConfig, values);
      }
    }

    if let Some(path) = &self.explicit_file {
      let values = Self::read_layer(path)?
        .with_context(|| format!("config file not found: {}", path.display()))?;
      layered.add_layer(ConfigLayerSource::ExplicitFile, values);
    }

    debug!(sources = ?layered.sources(), "merging config layers");
    let mut config: AgentConfig = layered
      .merge()
      .try_into()
      .context("invalid agent configuration")?;
    config.action_plans.fill_names();

    for (key, value) in cli_overrides {
      config = self.apply_override(config, &key, &value)?;
    }

    Ok(config)
  }

  fn read_layer(path: &Path) -> Result<Option<toml::Value>> {
    if !path.exists() {
      return Ok(None);
    }
    let content = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read {}", path.display()))?;
    let values = toml::from_str(&content)
      .map_err(ConfigError::from)
      .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(values))
  }

  /// Apply a single CLI override
  fn apply_override(&self, mut config: AgentConfig, key: &str, value: &str) -> Result<AgentConfig> {
    match key {
      "common.llm" => config.common.llm = value.to_string(),
      "common.fast_llm" => config.common.fast_llm = value.to_string(),
      "common.fast_llm_token_limit" => {
        config.common.fast_llm_token_limit = parse_number(key, value)?;
      }
      "common.max_token_length" => {
        config.common.max_token_length = parse_number(key, value)?;
      }
      "limits.max_iterations" => {
        config.limits.max_iterations = parse_number(key, value)?;
      }
      "limits.max_execution_time_secs" => {
        config.limits.max_execution_time_secs = parse_number(key, value)?;
      }
      "tools" => {
        config.tools = value
          .split(',')
          .map(str::trim)
          .filter(|tool| !tool.is_empty())
          .map(str::to_string)
          .collect();
      }
      _ => return Err(ConfigError::UnknownKey(key.to_string()).into()),
    }
    Ok(config)
  }
}

impl Default for ConfigLoader {
  fn default() -> Self {
    Self::new()
  }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
  T::Err: std::fmt::Display,
{
  value.parse::<T>().map_err(|err| {
    ConfigError::InvalidValue {
      key: key.to_string(),
      reason: err.to_string(),
    }
    .into()
  })
}

/// Splits `KEY=VALUE` override strings.
pub fn parse_overrides(raw: &[String]) -> Result<Vec<(String, String)>> {
  raw
    .iter()
    .map(|item| match item.split_once('=') {
      Some((key, value)) => Ok((key.trim().to_string(), value.trim().to_string())),
      None => anyhow::bail!("Invalid override '{item}', expected KEY=VALUE"),
    })
    .collect()
}
