//! Correlation registry for asynchronous action results.
//!
//! A callback registered under a correlation id fires at most once: the entry
//! is removed before the callback runs. Results with no matching entry are
//! dropped. Entries can expire after a configured age so results that never
//! arrive do not accumulate.

use crate::error::PluginError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use plugin_protocol::ActionResult;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// One-shot callback run with the matching result.
pub type ResultCallback = Box<dyn FnOnce(ActionResult) -> BoxFuture<'static, ()> + Send + Sync + 'static>;

struct PendingCorrelation {
    callback: ResultCallback,
    registered_at: Instant,
}

/// Pending correlation ids and their callbacks.
#[derive(Default)]
pub struct CorrelationRegistry {
    pending: DashMap<String, PendingCorrelation>,
    closed: AtomicBool,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `correlation_id`.
    ///
    /// # Returns
    ///
    /// `DuplicateCorrelation` if the id is still pending; the existing
    /// registration is left untouched. `StreamClosed` once the registry
    /// has been closed.
    pub fn register(&self, correlation_id: impl Into<String>, callback: ResultCallback) -> Result<(), PluginError> {
        if self.is_closed() {
            return Err(PluginError::StreamClosed);
        }
        let correlation_id = correlation_id.into();
        match self.pending.entry(correlation_id.clone()) {
            Entry::Occupied(entry) => {
                return Err(PluginError::DuplicateCorrelation {
                    correlation_id: entry.key().clone(),
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingCorrelation {
                    callback,
                    registered_at: Instant::now(),
                });
            }
        }
        // close() may have cleared the map between the check and the insert
        if self.is_closed() {
            self.pending.remove(&correlation_id);
            return Err(PluginError::StreamClosed);
        }
        Ok(())
    }

    /// Registers a plain closure, for callers that need no async work.
    pub fn register_fn<F>(&self, correlation_id: impl Into<String>, callback: F) -> Result<(), PluginError>
    where
        F: FnOnce(ActionResult) + Send + Sync + 'static,
    {
        self.register(
            correlation_id,
            Box::new(move |result| {
                callback(result);
                futures::future::ready(()).boxed()
            }),
        )
    }

    /// Routes a result to its callback.
    ///
    /// # Returns
    ///
    /// `true` if a callback was found and run.
    pub async fn dispatch(&self, result: ActionResult) -> bool {
        let Some((correlation_id, pending)) = self.pending.remove(&result.correlation_id) else {
            debug!(
                "Dropping action result for unknown correlation id {}",
                result.correlation_id
            );
            return false;
        };

        if !result.is_ok() {
            debug!(
                "Action {} failed on host: {}",
                correlation_id,
                result.status.error.as_deref().unwrap_or("unknown error")
            );
        }

        let run = AssertUnwindSafe(async move { (pending.callback)(result).await }).catch_unwind();
        if let Err(panic) = run.await {
            error!(
                "❌ Callback for correlation {} panicked: {}",
                correlation_id,
                panic_message(panic.as_ref())
            );
        }
        true
    }

    /// Forgets a pending registration without running it.
    pub fn cancel(&self, correlation_id: &str) -> bool {
        self.pending.remove(correlation_id).is_some()
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes entries registered more than `max_age` ago.
    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.pending.len();
        self.pending.retain(|correlation_id, pending| {
            let keep = now.duration_since(pending.registered_at) < max_age;
            if !keep {
                warn!("⏰ Correlation {} expired without a result", correlation_id);
            }
            keep
        });
        before.saturating_sub(self.pending.len())
    }

    /// Drops every pending entry. Async waiters observe `StreamClosed`.
    pub fn clear(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Drops every pending entry and refuses new registrations.
    ///
    /// Results can no longer arrive once the read side stops, so anything
    /// still waiting is released with `StreamClosed`.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        self.clear()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Starts the periodic expiry sweep. Returns `None` when expiry is disabled.
    pub fn spawn_sweeper(self: &Arc<Self>, expiry: Option<Duration>, interval: Duration) -> Option<JoinHandle<()>> {
        let expiry = expiry?;
        let registry = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = registry.sweep_expired(expiry);
                if removed > 0 {
                    debug!("Swept {} expired correlations", removed);
                }
            }
        }))
    }
}

/// Best-effort text from a panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
