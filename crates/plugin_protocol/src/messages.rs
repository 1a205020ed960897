//! Top-level envelopes exchanged over the plugin stream.
//!
//! Every frame carries exactly one [`HostToPlugin`] (host to plugin) or
//! [`PluginToHost`] (plugin to host). The populated variant lives in the
//! `payload` field.

use crate::actions::{ActionBatch, ActionResult};
use crate::commands::CommandSpec;
use crate::custom::{CustomBlockDefinition, CustomItemDefinition};
use crate::events::{EventEnvelope, EventResult};
use crate::types::EventType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostToPlugin {
    #[serde(default)]
    pub plugin_id: String,
    pub payload: HostPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostPayload {
    Hello(HostHello),
    Shutdown(HostShutdown),
    Event(EventEnvelope),
    ActionResult(ActionResult),
}

impl HostPayload {
    /// Short variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HostPayload::Hello(_) => "hello",
            HostPayload::Shutdown(_) => "shutdown",
            HostPayload::Event(_) => "event",
            HostPayload::ActionResult(_) => "action_result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostHello {
    pub api_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostShutdown {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginToHost {
    pub plugin_id: String,
    pub payload: PluginPayload,
}

impl PluginToHost {
    pub fn new(plugin_id: impl Into<String>, payload: PluginPayload) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginPayload {
    Hello(PluginHello),
    Subscribe(EventSubscribe),
    Actions(ActionBatch),
    Log(LogMessage),
    EventResult(EventResult),
}

impl PluginPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            PluginPayload::Hello(_) => "hello",
            PluginPayload::Subscribe(_) => "subscribe",
            PluginPayload::Actions(_) => "actions",
            PluginPayload::Log(_) => "log",
            PluginPayload::EventResult(_) => "event_result",
        }
    }
}

/// Capabilities announced once at the start of every stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginHello {
    pub name: String,
    pub version: String,
    pub api_version: String,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
    #[serde(default)]
    pub custom_items: Vec<CustomItemDefinition>,
    #[serde(default)]
    pub custom_blocks: Vec<CustomBlockDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventSubscribe {
    pub events: Vec<EventType>,
}

/// A line for the host's diagnostic log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: String,
    pub message: String,
}
