//! Runtime configuration.
//!
//! [`PluginConfig`] deserializes from TOML with a default for every field, so
//! a config file only needs the values it changes. Environment variables
//! override the file for the identity and address the host hands a plugin
//! when it launches one.

use crate::error::PluginError;
use plugin_protocol::transport::{default_address, TransportAddress};
use plugin_protocol::{parse_api_version, API_VERSION};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the plugin id assigned by the host.
pub const ENV_PLUGIN_ID: &str = "DF_PLUGIN_ID";
/// Environment variable holding the host address.
pub const ENV_SERVER_ADDRESS: &str = "DF_PLUGIN_SERVER_ADDRESS";

fn default_plugin_id() -> String {
    "plugin".to_string()
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

/// Top-level plugin configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Identifier stamped on every outbound message
    #[serde(default = "default_plugin_id")]
    pub plugin_id: String,
    /// Display name sent in the hello (falls back to the id)
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Protocol version announced to the host, `v<N>`
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Host address; the platform default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub batching: BatchSettings,
    #[serde(default)]
    pub correlation: CorrelationSettings,
}

/// How inbound events are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One event is processed through its ack before the next is read.
    #[default]
    Sequential,
    /// Each event runs in its own task.
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DispatchSettings {
    #[serde(default)]
    pub mode: DispatchMode,
}

/// Outbound action batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Time window opened by the first queued action, in microseconds
    #[serde(default = "default_flush_window_us")]
    pub flush_window_us: u64,
    /// Queue length that forces an immediate flush
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Capacity of the outbound frame queue
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_flush_window_us() -> u64 {
    1_000
}

fn default_max_batch_size() -> usize {
    512
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            flush_window_us: default_flush_window_us(),
            max_batch_size: default_max_batch_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl BatchSettings {
    pub fn flush_window(&self) -> Duration {
        Duration::from_micros(self.flush_window_us)
    }
}

/// Pending correlation bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationSettings {
    /// Age after which an unanswered correlation is dropped (0 keeps them forever)
    #[serde(default = "default_expiry_ms")]
    pub expiry_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_expiry_ms() -> u64 {
    30_000
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            expiry_ms: default_expiry_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl CorrelationSettings {
    /// `None` when expiry is disabled.
    pub fn expiry(&self) -> Option<Duration> {
        (self.expiry_ms > 0).then(|| Duration::from_millis(self.expiry_ms))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            plugin_id: default_plugin_id(),
            name: String::new(),
            version: default_version(),
            api_version: default_api_version(),
            server_address: None,
            dispatch: DispatchSettings::default(),
            batching: BatchSettings::default(),
            correlation: CorrelationSettings::default(),
        }
    }
}

impl PluginConfig {
    /// A default configuration with the given plugin id.
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            ..Self::default()
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, PluginError> {
        toml::from_str(content).map_err(|e| PluginError::Config(e.to_string()))
    }

    /// Applies `DF_PLUGIN_ID` and `DF_PLUGIN_SERVER_ADDRESS` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup.
    ///
    /// Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup(ENV_PLUGIN_ID).filter(|v| !v.trim().is_empty()) {
            self.plugin_id = id;
        }
        if let Some(addr) = lookup(ENV_SERVER_ADDRESS).filter(|v| !v.trim().is_empty()) {
            self.server_address = Some(addr);
        }
    }

    /// The name announced in the hello.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.plugin_id
        } else {
            &self.name
        }
    }

    /// The configured host address, or the platform default.
    pub fn address(&self) -> Result<TransportAddress, PluginError> {
        match &self.server_address {
            Some(raw) => Ok(TransportAddress::parse(raw)?),
            None => Ok(default_address()),
        }
    }

    /// Validates the configuration for consistency.
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.plugin_id.trim().is_empty() {
            return Err(PluginError::Config("plugin_id must not be empty".to_string()));
        }
        if parse_api_version(&self.api_version).is_none() {
            return Err(PluginError::Config(format!(
                "api_version '{}' is not of the form v<N>",
                self.api_version
            )));
        }
        if self.batching.max_batch_size == 0 {
            return Err(PluginError::Config("batching.max_batch_size must be at least 1".to_string()));
        }
        if self.batching.flush_window_us == 0 {
            return Err(PluginError::Config("batching.flush_window_us must be at least 1".to_string()));
        }
        if self.batching.channel_capacity == 0 {
            return Err(PluginError::Config("batching.channel_capacity must be at least 1".to_string()));
        }
        self.address()?;
        Ok(())
    }
}
