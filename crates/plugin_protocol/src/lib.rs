//! # Plugin Protocol
//!
//! Wire model and framed transport for plugins that talk to a game-server
//! host over a bidirectional event stream.
//!
//! ## Layout
//!
//! - [`messages`]: the `HostToPlugin` / `PluginToHost` envelopes
//! - [`events`], [`actions`], [`types`]: payloads carried by those envelopes
//! - [`commands`]: command specifications and their validation
//! - [`codec`]: JSON body encoding with a frame size limit
//! - [`transport`]: length-prefixed frames over TCP, Unix sockets or memory
//!
//! The runtime that drives a plugin lives in the `plugin_runtime` crate.

pub mod actions;
pub mod codec;
pub mod commands;
pub mod custom;
pub mod error;
pub mod events;
pub mod messages;
pub mod transport;
pub mod types;

pub use actions::*;
pub use commands::{CommandSpec, CommandSpecError, ParamSpec, ParamType};
pub use custom::{BlockTexture, CustomBlockDefinition, CustomItemDefinition, ItemCategory};
pub use error::ProtocolError;
pub use events::*;
pub use messages::*;
pub use transport::{FrameSink, FrameSource, TransportAddress};
pub use types::*;

/// Protocol version this crate speaks.
pub const API_VERSION: &str = "v1";

/// Extracts `N` from an API version string of the form `v<N>`.
pub fn parse_api_version(raw: &str) -> Option<u32> {
    raw.strip_prefix('v')?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_versions_parse() {
        assert_eq!(parse_api_version(API_VERSION), Some(1));
        assert_eq!(parse_api_version("v12"), Some(12));
        assert_eq!(parse_api_version("1"), None);
        assert_eq!(parse_api_version("v"), None);
        assert_eq!(parse_api_version("vx"), None);
    }
}
