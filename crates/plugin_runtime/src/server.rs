//! The plugin's handle onto the host.
//!
//! [`Server`] is cheap to clone and is handed to every handler, command and
//! lifecycle hook. Actions go through the batching layer; queries register a
//! correlation callback before their action is queued.

use crate::batch::ActionBatcher;
use crate::correlation::{CorrelationRegistry, ResultCallback};
use crate::error::PluginError;
use crate::writer::WriterHandle;
use futures::FutureExt;
use plugin_protocol::*;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

struct ServerInner {
    writer: WriterHandle,
    batcher: ActionBatcher,
    correlations: Arc<CorrelationRegistry>,
}

#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub(crate) fn new(writer: WriterHandle, batcher: ActionBatcher, correlations: Arc<CorrelationRegistry>) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                writer,
                batcher,
                correlations,
            }),
        }
    }

    pub fn plugin_id(&self) -> &str {
        self.inner.writer.plugin_id()
    }

    /// Queues an action for the next batch.
    pub async fn send(&self, action: impl Into<Action>) -> Result<(), PluginError> {
        self.inner.batcher.send(action.into()).await
    }

    /// Queues several actions; they stay in order.
    pub async fn send_batch(&self, actions: Vec<Action>) -> Result<(), PluginError> {
        self.inner.batcher.send_batch(actions).await
    }

    /// Writes queued actions now instead of waiting for the window.
    pub async fn flush(&self) -> Result<(), PluginError> {
        self.inner.batcher.flush().await
    }

    /// Sends `kind` with a fresh correlation id and runs `callback` with the result.
    ///
    /// Returns as soon as the action is queued. This is the pattern to use
    /// from sequential handlers, which must not wait for results themselves.
    ///
    /// # Returns
    ///
    /// The correlation id assigned to the action.
    pub async fn query<F, Fut>(&self, kind: ActionKind, callback: F) -> Result<String, PluginError>
    where
        F: FnOnce(ActionResult) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ResultCallback = Box::new(move |result| callback(result).boxed());
        self.query_with(kind, callback).await
    }

    async fn query_with(&self, kind: ActionKind, callback: ResultCallback) -> Result<String, PluginError> {
        let correlation_id = Uuid::new_v4().to_string();
        self.inner.correlations.register(correlation_id.clone(), callback)?;
        if let Err(e) = self.send(Action::correlated(correlation_id.clone(), kind)).await {
            self.inner.correlations.cancel(&correlation_id);
            return Err(e);
        }
        Ok(correlation_id)
    }

    /// Sends `kind` and waits for its result.
    ///
    /// Fails with `StreamClosed` if the stream ends, or the entry expires,
    /// before the host answers. Waiting inside a sequential handler stalls
    /// the dispatch loop; call it from a spawned task or in concurrent mode.
    pub async fn query_async(&self, kind: ActionKind) -> Result<ActionResult, PluginError> {
        let (tx, rx) = oneshot::channel();
        let callback: ResultCallback = Box::new(move |result| {
            let _ = tx.send(result);
            futures::future::ready(()).boxed()
        });
        self.query_with(kind, callback).await?;
        rx.await.map_err(|_| PluginError::StreamClosed)
    }

    /// Forwards a line to the host's diagnostic log.
    pub async fn log(&self, level: &str, message: impl Into<String>) -> Result<(), PluginError> {
        self.inner
            .writer
            .send(PluginPayload::Log(LogMessage {
                level: level.to_string(),
                message: message.into(),
            }))
            .await
    }

    /// Replaces the subscription set announced at handshake.
    pub async fn resubscribe(&self, events: Vec<EventType>) -> Result<(), PluginError> {
        self.inner
            .writer
            .send(PluginPayload::Subscribe(EventSubscribe { events }))
            .await
    }

    pub fn pending_queries(&self) -> usize {
        self.inner.correlations.len()
    }

    /// Flushes queued actions, then writes the event result behind them.
    ///
    /// A result whose mutation cannot be encoded is replaced by a plain ack
    /// (or cancel, if it cancelled) so the event is still resolved; the
    /// encoding error is returned afterwards.
    pub(crate) async fn send_event_result(&self, result: EventResult) -> Result<(), PluginError> {
        if let Err(e) = self.inner.batcher.flush().await {
            warn!("⚠️ Queued actions not flushed before event result: {}", e);
        }
        let unencodable = match self.inner.writer.encode(PluginPayload::EventResult(result)) {
            Ok(frame) => return self.inner.writer.send_frame(frame).await,
            Err(unencodable) => unencodable,
        };
        let PluginPayload::EventResult(result) = unencodable.payload else {
            return Err(unencodable.error.into());
        };
        warn!(
            "⚠️ Event result for {} could not be encoded, answering without its mutation: {}",
            result.event_id, unencodable.error
        );
        let fallback = if result.is_cancelled() {
            EventResult::cancel(result.event_id)
        } else {
            EventResult::ack(result.event_id)
        };
        self.inner.writer.send(PluginPayload::EventResult(fallback)).await?;
        Err(unencodable.error.into())
    }

    pub async fn send_chat(&self, target_uuid: impl Into<String>, message: impl Into<String>) -> Result<(), PluginError> {
        self.send(ActionKind::SendChat(SendChatAction {
            target_uuid: target_uuid.into(),
            message: message.into(),
        }))
        .await
    }

    pub async fn teleport(&self, player_uuid: impl Into<String>, position: Vec3, rotation: Option<Vec3>) -> Result<(), PluginError> {
        self.send(ActionKind::Teleport(TeleportAction {
            player_uuid: player_uuid.into(),
            position: Some(position),
            rotation,
        }))
        .await
    }

    pub async fn kick(&self, player_uuid: impl Into<String>, reason: impl Into<String>) -> Result<(), PluginError> {
        self.send(ActionKind::Kick(KickAction {
            player_uuid: player_uuid.into(),
            reason: reason.into(),
        }))
        .await
    }

    pub async fn set_game_mode(&self, player_uuid: impl Into<String>, game_mode: GameMode) -> Result<(), PluginError> {
        self.send(ActionKind::SetGameMode(SetGameModeAction {
            player_uuid: player_uuid.into(),
            game_mode,
        }))
        .await
    }

    pub async fn give_item(&self, player_uuid: impl Into<String>, item: ItemStack) -> Result<(), PluginError> {
        self.send(ActionKind::GiveItem(GiveItemAction {
            player_uuid: player_uuid.into(),
            item,
        }))
        .await
    }

    pub async fn clear_inventory(&self, player_uuid: impl Into<String>) -> Result<(), PluginError> {
        self.send(ActionKind::ClearInventory(ClearInventoryAction {
            player_uuid: player_uuid.into(),
        }))
        .await
    }

    pub async fn set_health(&self, player_uuid: impl Into<String>, health: f64, max_health: Option<f64>) -> Result<(), PluginError> {
        self.send(ActionKind::SetHealth(SetHealthAction {
            player_uuid: player_uuid.into(),
            health,
            max_health,
        }))
        .await
    }

    pub async fn set_food(&self, player_uuid: impl Into<String>, food: i32) -> Result<(), PluginError> {
        self.send(ActionKind::SetFood(SetFoodAction {
            player_uuid: player_uuid.into(),
            food,
        }))
        .await
    }

    pub async fn send_title(
        &self,
        player_uuid: impl Into<String>,
        title: impl Into<String>,
        subtitle: impl Into<String>,
    ) -> Result<(), PluginError> {
        self.send(ActionKind::SendTitle(SendTitleAction {
            player_uuid: player_uuid.into(),
            title: title.into(),
            subtitle: subtitle.into(),
            ..Default::default()
        }))
        .await
    }

    pub async fn play_sound(&self, player_uuid: impl Into<String>, sound: impl Into<String>) -> Result<(), PluginError> {
        self.send(ActionKind::PlaySound(PlaySoundAction {
            player_uuid: player_uuid.into(),
            sound: sound.into(),
            position: None,
            volume: 1.0,
            pitch: 1.0,
        }))
        .await
    }

    /// Runs a command as the given player.
    pub async fn execute_command(&self, player_uuid: impl Into<String>, command: impl Into<String>) -> Result<(), PluginError> {
        self.send(ActionKind::ExecuteCommand(ExecuteCommandAction {
            player_uuid: player_uuid.into(),
            command: command.into(),
        }))
        .await
    }

    /// Sets a block; `None` clears it.
    pub async fn set_block(&self, world: WorldRef, position: BlockPos, block: Option<BlockState>) -> Result<(), PluginError> {
        self.send(ActionKind::WorldSetBlock(WorldSetBlockAction { world, position, block }))
            .await
    }

    pub async fn add_particle(&self, world: WorldRef, position: Vec3, particle: impl Into<String>) -> Result<(), PluginError> {
        self.send(ActionKind::WorldAddParticle(WorldAddParticleAction {
            world,
            position,
            particle: particle.into(),
        }))
        .await
    }

    /// Asks for the players in `world`; `callback` receives the result.
    pub async fn query_players<F, Fut>(&self, world: WorldRef, callback: F) -> Result<String, PluginError>
    where
        F: FnOnce(ActionResult) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.query(ActionKind::WorldQueryPlayers(WorldQueryPlayersAction { world }), callback)
            .await
    }

    pub async fn query_entities(&self, world: WorldRef, entity_type: Option<String>) -> Result<ActionResult, PluginError> {
        self.query_async(ActionKind::WorldQueryEntities(WorldQueryEntitiesAction { world, entity_type }))
            .await
    }

    pub async fn query_block(&self, world: WorldRef, position: BlockPos) -> Result<ActionResult, PluginError> {
        self.query_async(ActionKind::WorldQueryBlock(WorldQueryBlockAction { world, position }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, next_payload};

    #[tokio::test]
    async fn query_async_sees_its_result() {
        let (server, mut host) = harness();
        let pending = tokio::spawn({
            let server = server.clone();
            async move { server.query_block(WorldRef::default(), BlockPos::default()).await }
        });

        let correlation_id = match next_payload(&mut host).await {
            PluginPayload::Actions(batch) => batch.actions[0].correlation_id.clone().unwrap(),
            other => panic!("unexpected {}", other.kind()),
        };
        assert_eq!(server.pending_queries(), 1);
        server.inner.correlations.dispatch(ActionResult::error(correlation_id, "unloaded")).await;

        let result = pending.await.unwrap().unwrap();
        assert!(!result.is_ok());
        assert_eq!(server.pending_queries(), 0);
    }

    #[tokio::test]
    async fn query_async_fails_when_registry_is_cleared() {
        let (server, mut host) = harness();
        let pending = tokio::spawn({
            let server = server.clone();
            async move { server.query_entities(WorldRef::default(), None).await }
        });
        next_payload(&mut host).await;

        server.inner.correlations.clear();
        assert!(matches!(pending.await.unwrap(), Err(PluginError::StreamClosed)));
    }

    #[tokio::test]
    async fn resubscribe_writes_a_new_set() {
        let (server, mut host) = harness();
        server.resubscribe(vec![EventType::Chat]).await.unwrap();
        match next_payload(&mut host).await {
            PluginPayload::Subscribe(subscribe) => assert_eq!(subscribe.events, vec![EventType::Chat]),
            other => panic!("unexpected {}", other.kind()),
        }
    }
}
