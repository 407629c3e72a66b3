// Agentkit Configuration System
// Layered agent, plan and tool configuration

pub mod editor;
pub mod error;
pub mod layered;
pub mod loader;
pub mod template;
pub mod types;

pub use error::ConfigError;
pub use layered::{ConfigLayerSource, LayeredConfig};
pub use loader::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, ConfigLoader, parse_overrides};
pub use template::PromptTemplate;
pub use types::*;
