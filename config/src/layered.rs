// Layered Configuration
// Stacks TOML layers with later layers taking precedence

use serde::{Deserialize, Serialize};

/// Layered configuration wrapper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayeredConfig {
  /// Configuration layers, lowest precedence first
  layers: Vec<ConfigLayer>,
}

/// Configuration layer with source tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLayer {
  /// Layer source
  pub source: ConfigLayerSource,
  /// Configuration values
  pub values: toml::Value,
}

/// Configuration layer source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigLayerSource {
  /// Built-in defaults
  Default,
  /// Global user config
  GlobalConfig,
  /// Project-specific config
  ProjectConfig,
  /// File given explicitly on the command line
  ExplicitFile,
}

impl LayeredConfig {
  /// Create a new layered configuration
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a layer
  pub fn add_layer(&mut self, source: ConfigLayerSource, values: toml::Value) {
    self.layers.push(ConfigLayer { source, values });
  }

  /// Sources that contributed, in precedence order
  pub fn sources(&self) -> Vec<ConfigLayerSource> {
    self.layers.iter().map(|layer| layer.source).collect()
  }

  /// Deep-merges all layers. Tables merge key by key, any other value is replaced.
  pub fn merge(&self) -> toml::Value {
    let mut merged = toml::Value::Table(toml::map::Map::new());
    for layer in &self.layers {
      Self::merge_into(&mut merged, &layer.values);
    }
    merged
  }

  fn merge_into(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
      (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
        for (key, value) in overlay_table {
          match base_table.get_mut(key) {
            Some(existing) => Self::merge_into(existing, value),
            None => {
              base_table.insert(key.clone(), value.clone());
            }
          }
        }
      }
      (slot, value) => *slot = value.clone(),
    }
  }
}
