//! Configuration settings structures
//!
//! The `[plugin]` table is the runtime's own configuration; the other tables
//! belong to this binary.

use plugin_runtime::PluginConfig;
use serde::{Deserialize, Serialize};

/// Main configuration structure, stored as TOML.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Connection, batching and dispatch settings for the runtime
    #[serde(default = "default_plugin")]
    pub plugin: PluginConfig,
    /// What the greeter says and filters
    #[serde(default)]
    pub greeter: GreeterSettings,
    /// Log output
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_plugin() -> PluginConfig {
    let mut plugin = PluginConfig::new("greeter");
    plugin.name = "Greeter".to_string();
    plugin
}

/// Greeter behaviour.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GreeterSettings {
    /// Sent to joining players; `{name}` is replaced by the player's name
    pub welcome_message: String,
    /// Word to replace in chat (case-insensitive); empty disables the filter
    pub filtered_word: String,
    pub replacement: String,
    /// World queried by `/players`
    pub world: String,
    pub dimension: String,
}

impl Default for GreeterSettings {
    fn default() -> Self {
        Self {
            welcome_message: "Welcome to the server, {name}!".to_string(),
            filtered_word: String::new(),
            replacement: "***".to_string(),
            world: "world".to_string(),
            dimension: "overworld".to_string(),
        }
    }
}

/// Logging system configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugin: default_plugin(),
            greeter: GreeterSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
