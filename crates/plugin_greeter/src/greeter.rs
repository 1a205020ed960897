//! The greeter's handlers.
//!
//! - welcomes joining players by name
//! - rewrites a filtered word in chat
//! - `/players` asks the host who is online and replies with the count

use crate::config::GreeterSettings;
use plugin_runtime::plugin_protocol::{
    ActionResult, CommandSpec, EventMutation, EventType, PlayerJoinEvent, WorldRef,
};
use plugin_runtime::{CommandArgs, EventContext, PluginConfig, PluginError, PluginRuntime};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared greeter state.
pub struct Greeter {
    settings: GreeterSettings,
    welcome_count: AtomicU32,
}

impl Greeter {
    pub fn new(settings: GreeterSettings) -> Self {
        Self {
            settings,
            welcome_count: AtomicU32::new(0),
        }
    }

    pub fn welcome_count(&self) -> u32 {
        self.welcome_count.load(Ordering::Relaxed)
    }

    fn welcome_message(&self, player: &PlayerJoinEvent) -> String {
        self.settings.welcome_message.replace("{name}", &player.name)
    }

    fn world(&self) -> WorldRef {
        WorldRef {
            name: self.settings.world.clone(),
            dimension: self.settings.dimension.clone(),
        }
    }

    async fn on_join(&self, ctx: EventContext) -> Result<(), PluginError> {
        let Some(player) = ctx.event().player_join() else {
            return Ok(());
        };
        let count = self.welcome_count.fetch_add(1, Ordering::Relaxed) + 1;
        info!("👋 Greeter: Welcoming {} (#{})", player.name, count);
        ctx.server()
            .send_chat(player.player_uuid.clone(), self.welcome_message(player))
            .await
    }

    async fn on_chat(&self, ctx: EventContext) -> Result<(), PluginError> {
        let Some(chat) = ctx.event().chat() else {
            return Ok(());
        };
        match replace_word(&chat.message, &self.settings.filtered_word, &self.settings.replacement) {
            Some(filtered) => {
                debug!("Filtered chat from {}", chat.name);
                ctx.respond_with(EventMutation::chat_message(filtered)).await
            }
            None => Ok(()),
        }
    }

    async fn on_players(&self, ctx: EventContext) -> Result<(), PluginError> {
        let Some(command) = ctx.event().command() else {
            return Ok(());
        };
        let server = ctx.server().clone();
        let requester = command.player_uuid.clone();
        ctx.server()
            .query_players(self.world(), move |result: ActionResult| async move {
                let reply = players_reply(&result);
                if let Err(e) = server.send_chat(requester, reply).await {
                    debug!("Could not answer /players: {}", e);
                }
            })
            .await?;
        Ok(())
    }
}

/// Replaces every case-insensitive occurrence of `word`.
///
/// Returns `None` when `word` is empty or does not occur.
pub fn replace_word(message: &str, word: &str, replacement: &str) -> Option<String> {
    if word.is_empty() {
        return None;
    }
    let lower = message.to_lowercase();
    let needle = word.to_lowercase();
    // Lowercasing can change byte lengths outside ASCII; only splice when offsets line up.
    if lower.len() != message.len() || !lower.contains(&needle) {
        return None;
    }

    let mut out = String::with_capacity(message.len());
    let mut rest = 0;
    for (start, _) in lower.match_indices(&needle) {
        out.push_str(&message[rest..start]);
        out.push_str(replacement);
        rest = start + needle.len();
    }
    out.push_str(&message[rest..]);
    Some(out)
}

fn players_reply(result: &ActionResult) -> String {
    if !result.is_ok() {
        let reason = result.status.error.as_deref().unwrap_or("unknown error");
        return format!("Could not list players: {}", reason);
    }
    match result.players().map(|players| players.len()).unwrap_or(0) {
        1 => "There is 1 player online".to_string(),
        n => format!("There are {} players online", n),
    }
}

/// Builds the runtime with every greeter handler registered.
pub fn build_runtime(plugin: PluginConfig, settings: GreeterSettings) -> Result<PluginRuntime, PluginError> {
    let greeter = Arc::new(Greeter::new(settings));

    let join = Arc::clone(&greeter);
    let chat = Arc::clone(&greeter);
    let players = Arc::clone(&greeter);
    let farewell = Arc::clone(&greeter);

    PluginRuntime::builder(plugin)
        .on_named(EventType::PlayerJoin, "greeter.join", move |ctx: EventContext| {
            let greeter = Arc::clone(&join);
            async move { greeter.on_join(ctx).await }
        })
        .on_named(EventType::Chat, "greeter.chat", move |ctx: EventContext| {
            let greeter = Arc::clone(&chat);
            async move { greeter.on_chat(ctx).await }
        })
        .command(
            CommandSpec::new("players")
                .description("Show how many players are online")
                .alias("online"),
            move |ctx: EventContext, _args: CommandArgs| {
                let greeter = Arc::clone(&players);
                async move { greeter.on_players(ctx).await }
            },
        )
        .on_enable(|server| async move {
            info!("👋 Greeter: Starting up! Ready to welcome players!");
            server.log("info", "Greeter plugin is now online").await
        })
        .on_disable(move |_server| {
            let greeter = Arc::clone(&farewell);
            async move {
                info!(
                    "👋 Greeter: Shutting down. Welcomed {} players total!",
                    greeter.welcome_count()
                );
                Ok(())
            }
        })
        .build()
}
