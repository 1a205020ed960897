//! Handshake and subscription.
//!
//! The plugin speaks first: one hello, then one subscribe, before anything
//! else is written on the stream. The host's hello is informational; a
//! version mismatch is logged and the plugin carries on.

use crate::error::PluginError;
use crate::writer::WriterHandle;
use plugin_protocol::{parse_api_version, EventSubscribe, EventType, HostHello, PluginHello, PluginPayload};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// The event types to subscribe to.
///
/// `COMMAND` is added when commands are registered. A catch-all subscription
/// replaces the whole list.
pub fn subscription_set(
    handler_types: &BTreeSet<EventType>,
    explicit: &BTreeSet<EventType>,
    has_commands: bool,
) -> Vec<EventType> {
    let mut events: BTreeSet<EventType> = handler_types.union(explicit).copied().collect();
    if has_commands {
        events.insert(EventType::Command);
    }
    events.remove(&EventType::Unrecognized);
    if events.contains(&EventType::All) {
        return vec![EventType::All];
    }
    events.into_iter().collect()
}

/// Writes the hello and the subscription, in that order.
pub async fn send_handshake(
    writer: &WriterHandle,
    hello: PluginHello,
    events: Vec<EventType>,
) -> Result<(), PluginError> {
    info!(
        "🤝 Handshaking as {} {} (api {}, {} commands, {} event types)",
        hello.name,
        hello.version,
        hello.api_version,
        hello.commands.len(),
        events.len()
    );
    writer.send(PluginPayload::Hello(hello)).await?;
    writer.send(PluginPayload::Subscribe(EventSubscribe { events })).await
}

/// Compares the host's API version with ours.
///
/// # Returns
///
/// `true` when they match. A mismatch is only a warning.
pub fn check_host_hello(local_api_version: &str, host: &HostHello) -> bool {
    if host.api_version == local_api_version {
        info!("🤝 Host speaks API {}", host.api_version);
        return true;
    }
    match (parse_api_version(local_api_version), parse_api_version(&host.api_version)) {
        (Some(local), Some(remote)) => warn!(
            "⚠️ API version mismatch: plugin v{}, host v{}; continuing",
            local, remote
        ),
        _ => warn!(
            "⚠️ Unrecognized host API version '{}' (plugin {}); continuing",
            host.api_version, local_api_version
        ),
    }
    false
}
