//! Per-event response contract.
//!
//! An [`EventContext`] is shared by every handler that sees one event. Its
//! `handled` flag latches on the first explicit response (ack, cancel or
//! mutation) with a compare-and-swap, so exactly one `EventResult` leaves the
//! plugin even when handlers run in parallel. Further explicit responses fail
//! with `AlreadyResponded`; [`EventContext::ack_if_unhandled`] quietly does
//! nothing once the flag is set.
//!
//! Events that do not expect a response still latch, but nothing is sent.

use crate::error::PluginError;
use crate::server::Server;
use plugin_protocol::{EventEnvelope, EventMutation, EventResult, EventType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

struct ContextInner {
    event: EventEnvelope,
    handled: AtomicBool,
    server: Server,
}

#[derive(Clone)]
pub struct EventContext {
    inner: Arc<ContextInner>,
}

impl EventContext {
    pub fn new(event: EventEnvelope, server: Server) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                event,
                handled: AtomicBool::new(false),
                server,
            }),
        }
    }

    pub fn event(&self) -> &EventEnvelope {
        &self.inner.event
    }

    pub fn event_id(&self) -> &str {
        &self.inner.event.event_id
    }

    pub fn event_type(&self) -> EventType {
        self.inner.event.event_type
    }

    pub fn expects_response(&self) -> bool {
        self.inner.event.expects_response
    }

    pub fn server(&self) -> &Server {
        &self.inner.server
    }

    /// Whether some response has already been given.
    pub fn is_handled(&self) -> bool {
        self.inner.handled.load(Ordering::Acquire)
    }

    /// Accept the event unchanged.
    pub async fn ack(&self) -> Result<(), PluginError> {
        self.respond(EventResult::ack(self.event_id()), true).await.map(|_| ())
    }

    /// Veto the game action behind the event.
    pub async fn cancel(&self) -> Result<(), PluginError> {
        self.respond(EventResult::cancel(self.event_id()), true).await.map(|_| ())
    }

    /// Accept the event with a modified payload.
    ///
    /// The mutation must belong to this event's type. A mismatch is refused
    /// without consuming the response, so a correct one can still follow.
    pub async fn respond_with(&self, mutation: EventMutation) -> Result<(), PluginError> {
        let mutation_type = mutation.event_type();
        if mutation_type != self.event_type() {
            return Err(PluginError::MutationMismatch {
                event_id: self.event_id().to_string(),
                event_type: self.event_type(),
                mutation_type,
            });
        }
        self.respond(EventResult::mutate(self.event_id(), mutation), true)
            .await
            .map(|_| ())
    }

    /// Sends the default ack unless a response was already given.
    ///
    /// # Returns
    ///
    /// `true` if this call produced the response.
    pub async fn ack_if_unhandled(&self) -> Result<bool, PluginError> {
        self.respond(EventResult::ack(self.event_id()), false).await
    }

    /// Cancels the event unless a response was already given.
    pub(crate) async fn cancel_if_unhandled(&self) -> Result<bool, PluginError> {
        self.respond(EventResult::cancel(self.event_id()), false).await
    }

    async fn respond(&self, result: EventResult, explicit: bool) -> Result<bool, PluginError> {
        let latched = self
            .inner
            .handled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if !latched {
            if explicit {
                return Err(PluginError::AlreadyResponded {
                    event_id: self.event_id().to_string(),
                });
            }
            return Ok(false);
        }

        if !self.expects_response() {
            debug!("Event {} expects no response, not sending one", self.event_id());
            return Ok(true);
        }

        debug!(
            "Responding to event {} (cancel={:?}, mutated={})",
            self.event_id(),
            result.cancel,
            result.update.is_some()
        );
        self.inner.server.send_event_result(result).await?;
        Ok(true)
    }
}
