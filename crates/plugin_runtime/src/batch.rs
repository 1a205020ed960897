//! Action batching layer.
//!
//! Actions are queued rather than written one by one. The first action queued
//! after a flush opens a time window; when the window elapses, or the queue
//! reaches `max_batch_size`, the queue is written as one [`ActionBatch`] per
//! `max_batch_size` actions.
//!
//! A batch whose encoding exceeds the frame limit is halved until each part
//! fits; a single action too large to send on its own is dropped and reported.
//!
//! A flush takes the whole queue out under the lock before it writes, so an
//! action queued while a batch is in flight lands in the next window. Flushes
//! are serialized by a second lock held across the write, which keeps batches
//! on the wire in the order they were formed.

use crate::config::BatchSettings;
use crate::error::PluginError;
use crate::writer::WriterHandle;
use plugin_protocol::{Action, ActionBatch, PluginPayload};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

struct Pending {
    actions: Vec<Action>,
    /// Bumped on every flush; a window timer only fires for the generation it was started in.
    generation: u64,
}

struct BatcherInner {
    writer: WriterHandle,
    settings: BatchSettings,
    pending: Mutex<Pending>,
    flush_order: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

/// Queues outbound actions and writes them in batches.
#[derive(Clone)]
pub struct ActionBatcher {
    inner: Arc<BatcherInner>,
}

enum Enqueued {
    /// Queue went from empty to non-empty; open a window
    OpenWindow(u64),
    /// Queue reached the size limit
    Full,
    Queued,
}

impl ActionBatcher {
    pub fn new(writer: WriterHandle, settings: BatchSettings) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                writer,
                settings,
                pending: Mutex::new(Pending {
                    actions: Vec::new(),
                    generation: 0,
                }),
                flush_order: tokio::sync::Mutex::new(()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Queues one action.
    pub async fn send(&self, action: Action) -> Result<(), PluginError> {
        self.send_batch(vec![action]).await
    }

    /// Queues several actions, keeping their order.
    pub async fn send_batch(&self, actions: Vec<Action>) -> Result<(), PluginError> {
        if actions.is_empty() {
            return Ok(());
        }
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PluginError::StreamClosed);
        }

        let outcome = {
            let mut pending = self.lock_pending();
            // close() sets the flag before its flush takes the lock
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(PluginError::StreamClosed);
            }
            let was_empty = pending.actions.is_empty();
            pending.actions.extend(actions);
            if pending.actions.len() >= self.inner.settings.max_batch_size {
                Enqueued::Full
            } else if was_empty {
                Enqueued::OpenWindow(pending.generation)
            } else {
                Enqueued::Queued
            }
        };

        match outcome {
            Enqueued::Full => self.flush().await,
            Enqueued::OpenWindow(generation) => {
                self.start_window(generation);
                Ok(())
            }
            Enqueued::Queued => Ok(()),
        }
    }

    /// Writes everything queued so far.
    ///
    /// Returns once the batches are handed to the writer. A flush with an
    /// empty queue writes nothing.
    pub async fn flush(&self) -> Result<(), PluginError> {
        let _order = self.inner.flush_order.lock().await;
        let actions = self.take_pending(None);
        self.write_batches(actions).await
    }

    /// Number of actions waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        self.lock_pending().actions.len()
    }

    /// Flushes the queue and refuses further actions.
    pub async fn close(&self) -> Result<(), PluginError> {
        self.inner.closed.store(true, Ordering::Release);
        self.flush().await
    }

    fn start_window(&self, generation: u64) {
        let batcher = self.clone();
        let window = self.inner.settings.flush_window();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _order = batcher.inner.flush_order.lock().await;
            let actions = batcher.take_pending(Some(generation));
            if let Err(e) = batcher.write_batches(actions).await {
                warn!("⚠️ Timed action flush failed: {}", e);
            }
        });
    }

    /// Empties the queue. With `Some(generation)` the queue is only taken if
    /// no flush happened since that window opened.
    fn take_pending(&self, generation: Option<u64>) -> Vec<Action> {
        let mut pending = self.lock_pending();
        if let Some(generation) = generation {
            if pending.generation != generation {
                return Vec::new();
            }
        }
        pending.generation = pending.generation.wrapping_add(1);
        std::mem::take(&mut pending.actions)
    }

    async fn write_batches(&self, mut actions: Vec<Action>) -> Result<(), PluginError> {
        let max = self.inner.settings.max_batch_size.max(1);
        let mut chunks = VecDeque::new();
        while actions.len() > max {
            let rest = actions.split_off(max);
            chunks.push_back(std::mem::replace(&mut actions, rest));
        }
        if !actions.is_empty() {
            chunks.push_back(actions);
        }

        let mut refused = None;
        while let Some(chunk) = chunks.pop_front() {
            let count = chunk.len();
            match self.inner.writer.encode(PluginPayload::Actions(ActionBatch { actions: chunk })) {
                Ok(frame) => {
                    debug!("📦 Flushing batch of {} actions", count);
                    self.inner.writer.send_frame(frame).await?;
                }
                Err(unencodable) => {
                    let PluginPayload::Actions(ActionBatch { actions: mut chunk }) = unencodable.payload else {
                        return Err(unencodable.error.into());
                    };
                    if count > 1 {
                        let back = chunk.split_off(count / 2);
                        chunks.push_front(back);
                        chunks.push_front(chunk);
                    } else {
                        error!("❌ Dropping action too large to send: {}", unencodable.error);
                        refused.get_or_insert(unencodable.error);
                    }
                }
            }
        }
        match refused {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Pending> {
        // The queue holds plain data, so a poisoned lock is still consistent.
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
