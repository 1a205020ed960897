//! Event dispatch.
//!
//! Every event goes through the same path: command routing (for COMMAND),
//! then the registered handlers in order, then [`EventContext::ack_if_unhandled`].
//! The last step always runs, whatever the handlers did, so an event that
//! expects a response gets exactly one.

use crate::commands::CommandRouter;
use crate::context::EventContext;
use crate::handlers::{invoke, HandlerRegistry};
use crate::server::Server;
use plugin_protocol::codec::EventHeader;
use plugin_protocol::{EventEnvelope, EventResult, EventType};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    router: Arc<CommandRouter>,
    server: Server,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, router: Arc<CommandRouter>, server: Server) -> Self {
        Self {
            registry,
            router,
            server,
        }
    }

    /// Runs one event through routing, handlers and the default ack.
    pub async fn dispatch_event(&self, event: EventEnvelope) {
        let ctx = EventContext::new(event, self.server.clone());
        let event_type = ctx.event_type();

        if event_type == EventType::Unrecognized {
            debug!("Event {} has a type this plugin does not know", ctx.event_id());
        } else if !ctx.event().payload_matches_type() {
            warn!(
                "⚠️ Event {} claims type {} but carries another payload; acknowledging only",
                ctx.event_id(),
                event_type
            );
        } else {
            self.run_handlers(&ctx).await;
        }

        match ctx.ack_if_unhandled().await {
            Ok(true) => debug!("Default ack for event {}", ctx.event_id()),
            Ok(false) => {}
            Err(e) => warn!("⚠️ Could not acknowledge event {}: {}", ctx.event_id(), e),
        }
    }

    async fn run_handlers(&self, ctx: &EventContext) {
        let routed = ctx.event_type() == EventType::Command && self.router.route(ctx).await;

        let handlers = self.registry.handlers_for(ctx.event_type()).await;
        if handlers.is_empty() && !routed {
            debug!("No handlers for {} (event {})", ctx.event_type(), ctx.event_id());
            return;
        }

        debug!(
            "📥 Dispatching {} {} to {} handlers",
            ctx.event_type(),
            ctx.event_id(),
            handlers.len()
        );
        for handler in &handlers {
            invoke(handler.as_ref(), ctx.clone()).await;
        }
    }

    /// Answers an event whose body could not be decoded.
    pub async fn ack_undecodable(&self, header: EventHeader) {
        warn!("⚠️ Event {} could not be decoded; acknowledging", header.event_id);
        if !header.expects_response {
            return;
        }
        if let Err(e) = self.server.send_event_result(EventResult::ack(header.event_id.clone())).await {
            warn!("⚠️ Could not acknowledge event {}: {}", header.event_id, e);
        }
    }
}
