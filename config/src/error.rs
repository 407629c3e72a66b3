use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
  /// A plan step names a tool the agent does not enable
  #[error("Action plan '{plan}' uses unknown tool '{tool}'")]
  UnknownTool { plan: String, tool: String },

  /// An enabled tool has no `tools_library` entry
  #[error("Tool '{0}' has no entry in tools_library")]
  MissingToolConfig(String),

  /// A value is out of range or unparsable
  #[error("Invalid value for {key}: {reason}")]
  InvalidValue { key: String, reason: String },

  /// Unknown override or settable key
  #[error("Unknown config key: {0}")]
  UnknownKey(String),

  #[error("Failed to parse TOML: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("Failed to edit TOML: {0}")]
  Edit(#[from] toml_edit::TomlError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
