//! Serialized write path.
//!
//! One task owns the [`FrameSink`]. Everything bound for the host goes
//! through its queue, so frames are never interleaved no matter how many
//! tasks are sending. Messages are encoded before they are queued, so a
//! message that cannot go on the wire is refused to its sender instead of
//! being lost inside the task.

use crate::error::PluginError;
use plugin_protocol::codec;
use plugin_protocol::transport::FrameSink;
use plugin_protocol::{PluginPayload, PluginToHost, ProtocolError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// An outbound message already encoded for the wire.
pub(crate) struct EncodedFrame {
    kind: &'static str,
    body: Vec<u8>,
}

/// A payload that failed to encode, handed back so the caller can retry.
pub(crate) struct Unencodable {
    pub payload: PluginPayload,
    pub error: ProtocolError,
}

/// Commands sent to the writer task
enum WriterCommand {
    Send(EncodedFrame),
    Close(oneshot::Sender<()>),
}

/// Cloneable handle onto the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    plugin_id: String,
    tx: mpsc::Sender<WriterCommand>,
}

impl WriterHandle {
    /// Starts the writer task for `sink`.
    ///
    /// # Arguments
    ///
    /// * `plugin_id` - Stamped on every outbound message
    /// * `sink` - Outbound half of the connection
    /// * `capacity` - Queue depth before senders wait
    pub fn spawn(plugin_id: impl Into<String>, sink: Box<dyn FrameSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(writer_loop(sink, rx));
        (
            Self {
                plugin_id: plugin_id.into(),
                tx,
            },
            task,
        )
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Queues a payload for the host, in call order.
    ///
    /// Fails with `Protocol` when the payload cannot be encoded (for example
    /// when it exceeds the frame limit); nothing is queued in that case.
    pub async fn send(&self, payload: PluginPayload) -> Result<(), PluginError> {
        let frame = self.encode(payload).map_err(|e| PluginError::Protocol(e.error))?;
        self.send_frame(frame).await
    }

    /// Encodes `payload`, giving it back on failure.
    pub(crate) fn encode(&self, payload: PluginPayload) -> Result<EncodedFrame, Unencodable> {
        let message = PluginToHost::new(self.plugin_id.clone(), payload);
        match codec::encode(&message) {
            Ok(body) => Ok(EncodedFrame {
                kind: message.payload.kind(),
                body,
            }),
            Err(error) => Err(Unencodable {
                payload: message.payload,
                error,
            }),
        }
    }

    pub(crate) async fn send_frame(&self, frame: EncodedFrame) -> Result<(), PluginError> {
        self.tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| PluginError::StreamClosed)
    }

    /// Writes everything queued so far, then shuts the sink down.
    ///
    /// Resolves once the write side is terminated. Calling it on an already
    /// closed writer is a no-op.
    pub async fn close(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Close(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn writer_loop(mut sink: Box<dyn FrameSink>, mut rx: mpsc::Receiver<WriterCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Send(frame) => {
                if let Err(e) = sink.send_frame(&frame.body).await {
                    warn!("⚠️ Write to host failed, closing writer: {}", e);
                    break;
                }
                debug!("📤 Sent {} ({} bytes)", frame.kind, frame.body.len());
            }
            WriterCommand::Close(done) => {
                if let Err(e) = sink.close().await {
                    debug!("Sink shutdown reported: {}", e);
                }
                let _ = done.send(());
                break;
            }
        }
    }
    rx.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_protocol::transport::memory_pair;
    use plugin_protocol::LogMessage;

    fn log(message: &str) -> PluginPayload {
        PluginPayload::Log(LogMessage {
            level: "info".to_string(),
            message: message.to_string(),
        })
    }

    #[tokio::test]
    async fn frames_arrive_in_send_order_and_close_ends_stream() {
        let (plugin_end, mut host_end) = memory_pair(64 * 1024);
        let (_source, sink) = plugin_end.into_boxed();
        let (writer, task) = WriterHandle::spawn("test", sink, 4);

        for i in 0..10 {
            writer.send(log(&i.to_string())).await.unwrap();
        }
        writer.close().await;
        task.await.unwrap();

        for i in 0..10 {
            let body = host_end.reader.read_frame().await.unwrap().unwrap();
            let msg: PluginToHost = codec::decode(&body).unwrap();
            assert_eq!(msg.plugin_id, "test");
            assert_eq!(msg.payload, log(&i.to_string()));
        }
        assert!(host_end.reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_after_close_reports_stream_closed() {
        let (plugin_end, _host_end) = memory_pair(1024);
        let (_source, sink) = plugin_end.into_boxed();
        let (writer, task) = WriterHandle::spawn("test", sink, 4);
        writer.close().await;
        task.await.unwrap();

        assert!(matches!(writer.send(log("late")).await, Err(PluginError::StreamClosed)));
        // second close is harmless
        writer.close().await;
    }

    #[tokio::test]
    async fn oversized_payload_is_refused_to_the_sender() {
        let (plugin_end, mut host_end) = memory_pair(1024);
        let (_source, sink) = plugin_end.into_boxed();
        let (writer, task) = WriterHandle::spawn("test", sink, 4);

        let huge = log(&"x".repeat(codec::MAX_FRAME_SIZE));
        assert!(matches!(
            writer.send(huge).await,
            Err(PluginError::Protocol(ProtocolError::FrameTooLarge { .. }))
        ));
        writer.send(log("small")).await.unwrap();
        writer.close().await;
        task.await.unwrap();

        let body = host_end.reader.read_frame().await.unwrap().unwrap();
        assert_eq!(codec::decode::<PluginToHost>(&body).unwrap().payload, log("small"));
        assert!(host_end.reader.read_frame().await.unwrap().is_none());
    }
}
