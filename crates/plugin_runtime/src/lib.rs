//! # Plugin Runtime
//!
//! Client-side runtime for plugins that attach to a game-server host over a
//! single bidirectional event stream. The host pushes events; the plugin
//! answers them, sends actions and runs queries.
//!
//! ## Core Features
//!
//! - **Handshake**: hello with commands and custom content, then the event subscription
//! - **Ack Contract**: every event that expects a response gets exactly one `EventResult`
//! - **Action Batching**: actions sent within about a millisecond share one message
//! - **Correlation**: query results are routed back to the callback that asked
//! - **Commands**: declared parameters are parsed before the handler runs
//! - **Panic Safety**: a failing handler is logged and the event is still answered
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use plugin_runtime::{PluginConfig, PluginRuntime};
//! use plugin_runtime::plugin_protocol::{EventMutation, EventType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = PluginRuntime::builder(PluginConfig::new("shouter"))
//!         .on(EventType::Chat, |ctx| async move {
//!             if let Some(chat) = ctx.event().chat() {
//!                 ctx.respond_with(EventMutation::chat_message(chat.message.to_uppercase())).await?;
//!             }
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Lifecycle
//!
//! `Connecting → Handshaking → Running → Draining → Closed`. Every way out of
//! `Running` drains: in-flight events finish, `on_disable` hooks run and queued
//! actions are flushed before the write side closes.

pub mod batch;
pub mod commands;
pub mod config;
pub mod context;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod handshake;
pub mod runtime;
pub mod server;
pub mod writer;

pub use commands::{ArgError, ArgValue, CommandArgs, CommandHandler};
pub use config::{BatchSettings, CorrelationSettings, DispatchMode, DispatchSettings, PluginConfig};
pub use context::EventContext;
pub use error::PluginError;
pub use handlers::{EventHandler, FnEventHandler, HandlerRegistry};
pub use runtime::{LoopState, PluginBuilder, PluginRuntime, ShutdownHandle, StopReason};
pub use server::Server;

pub use plugin_protocol;
