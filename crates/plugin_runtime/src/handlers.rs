//! Event handler registration and invocation.
//!
//! Handlers are kept per [`EventType`] in registration order. A handler
//! registered for [`EventType::All`] sees every event after the handlers for
//! the specific type. Handler failures, including panics, are logged and never
//! stop the remaining handlers for the same event.

use crate::context::EventContext;
use crate::correlation::panic_message;
use crate::error::PluginError;
use async_trait::async_trait;
use futures::FutureExt;
use plugin_protocol::EventType;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Something that reacts to events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The event and its response contract, shared with other handlers
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` if the event was handled successfully. An error is
    /// logged; the event still gets its default ack.
    async fn handle(&self, ctx: EventContext) -> Result<(), PluginError>;

    /// Returns a human-readable name for this handler for debugging.
    fn handler_name(&self) -> &str;
}

/// Adapts an async closure into an [`EventHandler`].
pub struct FnEventHandler<F> {
    name: String,
    handler: F,
}

impl<F> FnEventHandler<F> {
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
where
    F: Fn(EventContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), PluginError>> + Send,
{
    async fn handle(&self, ctx: EventContext) -> Result<(), PluginError> {
        (self.handler)(ctx).await
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

pub type HandlerMap = HashMap<EventType, Vec<Arc<dyn EventHandler>>>;

/// Handlers keyed by event type.
///
/// Lookups take a read lock and clone the handler list out, so handlers run
/// without holding the lock and registration at runtime never blocks dispatch
/// for long.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HandlerMap>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(handlers: HandlerMap) -> Self {
        Self {
            handlers: RwLock::new(handlers),
        }
    }

    /// Adds a handler after the ones already registered for `event_type`.
    pub async fn register(&self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        debug!("Registering handler {} for {}", handler.handler_name(), event_type);
        self.handlers
            .write()
            .await
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    /// Handlers for `event_type`, followed by the catch-all handlers.
    pub async fn handlers_for(&self, event_type: EventType) -> Vec<Arc<dyn EventHandler>> {
        let handlers = self.handlers.read().await;
        let mut found: Vec<Arc<dyn EventHandler>> = handlers.get(&event_type).cloned().unwrap_or_default();
        if event_type != EventType::All {
            if let Some(all) = handlers.get(&EventType::All) {
                found.extend(all.iter().cloned());
            }
        }
        found
    }

    /// Event types with at least one handler, in numeric order.
    pub async fn event_types(&self) -> BTreeSet<EventType> {
        self.handlers
            .read()
            .await
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(event_type, _)| *event_type)
            .collect()
    }

    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.values().map(Vec::len).sum()
    }
}

/// Runs one handler, turning errors and panics into log lines.
///
/// # Returns
///
/// `false` if the handler failed.
pub async fn invoke(handler: &dyn EventHandler, ctx: EventContext) -> bool {
    let event_id = ctx.event_id().to_string();
    let outcome = AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await;
    match outcome {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("❌ Handler {} failed on event {}: {}", handler.handler_name(), event_id, e);
            false
        }
        Err(panic) => {
            let e = PluginError::HandlerPanicked(panic_message(panic.as_ref()));
            error!("❌ Handler {} failed on event {}: {}", handler.handler_name(), event_id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::harness;
    use plugin_protocol::{ChatEvent, EventEnvelope, EventPayload};
    use std::sync::Mutex;

    fn named(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn EventHandler> {
        Arc::new(FnEventHandler::new(name, move |_ctx: EventContext| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name);
                Ok::<(), PluginError>(())
            }
        }))
    }

    #[tokio::test]
    async fn specific_handlers_run_before_catch_all() {
        let registry = HandlerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(EventType::All, named("all", Arc::clone(&log))).await;
        registry.register(EventType::Chat, named("chat-1", Arc::clone(&log))).await;
        registry.register(EventType::Chat, named("chat-2", Arc::clone(&log))).await;

        let names: Vec<String> = registry
            .handlers_for(EventType::Chat)
            .await
            .iter()
            .map(|h| h.handler_name().to_string())
            .collect();
        assert_eq!(names, ["chat-1", "chat-2", "all"]);
        assert_eq!(registry.handlers_for(EventType::PlayerJoin).await.len(), 1);
        assert_eq!(registry.handler_count().await, 3);
        assert_eq!(
            registry.event_types().await.into_iter().collect::<Vec<_>>(),
            vec![EventType::All, EventType::Chat]
        );
    }

    struct Exploding;

    #[async_trait]
    impl EventHandler for Exploding {
        async fn handle(&self, _ctx: EventContext) -> Result<(), PluginError> {
            panic!("handler exploded")
        }

        fn handler_name(&self) -> &str {
            "exploding"
        }
    }

    #[tokio::test]
    async fn invoke_contains_errors_and_panics() {
        let (server, _host) = harness();
        let ctx = EventContext::new(
            EventEnvelope::new("e1", false, EventPayload::Chat(ChatEvent::default())),
            server,
        );

        let failing = FnEventHandler::new("failing", |_ctx: EventContext| async {
            Err::<(), _>(PluginError::handler("nope"))
        });
        assert!(!invoke(&failing, ctx.clone()).await);

        assert!(!invoke(&Exploding, ctx.clone()).await);

        let fine = FnEventHandler::new("fine", |_ctx: EventContext| async { Ok::<(), PluginError>(()) });
        assert!(invoke(&fine, ctx).await);
    }
}
