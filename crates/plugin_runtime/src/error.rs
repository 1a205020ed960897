use plugin_protocol::{CommandSpecError, EventType, ProtocolError};
use thiserror::Error;

/// Errors surfaced by the plugin runtime.
///
/// The first three variants are protocol violations made by plugin code.
/// They are returned loudly so the bug shows up in testing.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A second explicit response was attempted for one event
    #[error("Event {event_id} already has a response")]
    AlreadyResponded { event_id: String },
    /// A mutation was offered for an event type it cannot answer
    #[error("Event {event_id} is {event_type}, cannot answer with a {mutation_type} mutation")]
    MutationMismatch {
        event_id: String,
        event_type: EventType,
        mutation_type: EventType,
    },
    /// A correlation id was reused while still pending
    #[error("Correlation id {correlation_id} is already pending")]
    DuplicateCorrelation { correlation_id: String },
    /// The stream to the host is gone
    #[error("Stream to host closed")]
    StreamClosed,
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Handler error: {0}")]
    Handler(String),
    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid command: {0}")]
    Command(#[from] CommandSpecError),
}

impl PluginError {
    /// Convenience for handler code returning free-form failures.
    pub fn handler(message: impl Into<String>) -> Self {
        PluginError::Handler(message.into())
    }

    /// True for the errors that mean the plugin misused the protocol.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            PluginError::AlreadyResponded { .. }
                | PluginError::MutationMismatch { .. }
                | PluginError::DuplicateCorrelation { .. }
        )
    }
}
