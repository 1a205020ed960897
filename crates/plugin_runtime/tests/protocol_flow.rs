//! End-to-end tests of the plugin runtime against a scripted host.
//!
//! Each test drives a real `PluginRuntime` over an in-memory framed
//! connection. The host side reads and writes frames directly, so what is
//! asserted here is exactly what would cross the wire.

use plugin_runtime::plugin_protocol::codec;
use plugin_runtime::plugin_protocol::transport::{memory_pair, MemoryEnd};
use plugin_runtime::plugin_protocol::{
    Action, ActionKind, ActionResult, ActionResultPayload, ChatEvent, ClearInventoryAction, CommandEvent,
    EntityRef, EventEnvelope, EventMutation, EventPayload, EventResult, EventSubscribe, EventType, HostHello, HostPayload,
    HostShutdown, HostToPlugin, PlayerJoinEvent, PluginHello, PluginPayload, PluginToHost, WorldPlayersResult,
    WorldRef,
};
use plugin_runtime::plugin_protocol::{CommandSpec, ParamSpec, ParamType};
use plugin_runtime::{
    DispatchMode, EventContext, LoopState, PluginConfig, PluginError, PluginRuntime, StopReason,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

const WAIT: Duration = Duration::from_secs(5);

/// The host end of the stream.
struct MockHost {
    end: MemoryEnd,
}

impl MockHost {
    async fn send(&mut self, payload: HostPayload) {
        let message = HostToPlugin {
            plugin_id: "test-plugin".to_string(),
            payload,
        };
        let body = codec::encode(&message).unwrap();
        self.end.writer.write_frame(&body).await.unwrap();
    }

    async fn send_event(&mut self, event: EventEnvelope) {
        self.send(HostPayload::Event(event)).await;
    }

    async fn shutdown(&mut self, reason: &str) {
        self.send(HostPayload::Shutdown(HostShutdown {
            reason: reason.to_string(),
        }))
        .await;
    }

    /// Next message from the plugin, or `None` once its write side is closed.
    async fn recv(&mut self) -> Option<PluginPayload> {
        let body = timeout(WAIT, self.end.reader.read_frame())
            .await
            .expect("timed out waiting for the plugin")
            .unwrap()?;
        let message: PluginToHost = codec::decode(&body).unwrap();
        assert_eq!(message.plugin_id, "test-plugin");
        Some(message.payload)
    }

    async fn expect(&mut self) -> PluginPayload {
        self.recv().await.expect("plugin closed the stream")
    }

    async fn handshake(&mut self) -> (PluginHello, EventSubscribe) {
        let hello = match self.expect().await {
            PluginPayload::Hello(hello) => hello,
            other => panic!("expected hello, got {}", other.kind()),
        };
        let subscribe = match self.expect().await {
            PluginPayload::Subscribe(subscribe) => subscribe,
            other => panic!("expected subscribe, got {}", other.kind()),
        };
        self.send(HostPayload::Hello(HostHello {
            api_version: "v1".to_string(),
        }))
        .await;
        (hello, subscribe)
    }

    async fn expect_result(&mut self) -> EventResult {
        match self.expect().await {
            PluginPayload::EventResult(result) => result,
            other => panic!("expected event result, got {}", other.kind()),
        }
    }

    /// Everything the plugin writes until it closes the stream.
    async fn drain(&mut self) -> Vec<PluginPayload> {
        let mut seen = Vec::new();
        while let Some(payload) = self.recv().await {
            seen.push(payload);
        }
        seen
    }
}

fn config() -> PluginConfig {
    PluginConfig::new("test-plugin")
}

fn start(runtime: PluginRuntime) -> (MockHost, JoinHandle<Result<StopReason, PluginError>>) {
    let (plugin, host) = memory_pair(8 * 1024 * 1024);
    let (source, sink) = plugin.into_boxed();
    let task = tokio::spawn(runtime.run_with_transport(source, sink));
    (MockHost { end: host }, task)
}

async fn finish(task: JoinHandle<Result<StopReason, PluginError>>) -> Result<StopReason, PluginError> {
    timeout(WAIT, task).await.expect("runtime did not stop").unwrap()
}

fn chat_event(id: &str, expects_response: bool) -> EventEnvelope {
    EventEnvelope::new(
        id,
        expects_response,
        EventPayload::Chat(ChatEvent {
            player_uuid: "p-1".to_string(),
            name: "Steve".to_string(),
            message: "hello".to_string(),
        }),
    )
}

fn results(payloads: &[PluginPayload]) -> Vec<&EventResult> {
    payloads
        .iter()
        .filter_map(|p| match p {
            PluginPayload::EventResult(result) => Some(result),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn handshake_precedes_everything_else() {
    let mut config = config();
    config.name = "Greeter".to_string();
    let runtime = PluginRuntime::builder(config)
        .on(EventType::Chat, |_ctx| async { Ok(()) })
        .command(CommandSpec::new("spawn").description("Go to spawn"), |_ctx, _args| async {
            Ok(())
        })
        .subscribe(EventType::PlayerQuit)
        .build()
        .unwrap();
    let mut state = runtime.state();
    let (mut host, task) = start(runtime);

    let (hello, subscribe) = host.handshake().await;
    assert_eq!(hello.name, "Greeter");
    assert_eq!(hello.api_version, "v1");
    assert_eq!(hello.commands.len(), 1);
    assert_eq!(hello.commands[0].name, "spawn");
    assert_eq!(
        subscribe.events,
        vec![EventType::PlayerQuit, EventType::Chat, EventType::Command]
    );

    host.shutdown("test over").await;
    assert!(host.drain().await.is_empty());
    assert_eq!(finish(task).await.unwrap(), StopReason::HostShutdown("test over".to_string()));

    state.wait_for(|s| *s == LoopState::Closed).await.unwrap();
}

#[tokio::test]
async fn chat_without_handlers_gets_default_ack() {
    let runtime = PluginRuntime::builder(config())
        .subscribe(EventType::Chat)
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    host.send_event(chat_event("e1", true)).await;
    let result = host.expect_result().await;
    assert_eq!(result.event_id, "e1");
    assert_eq!(result.cancel, Some(false));
    assert!(result.update.is_none());

    host.shutdown("done").await;
    assert!(host.drain().await.is_empty());
    finish(task).await.unwrap();
}

#[tokio::test]
async fn exactly_one_result_for_any_number_of_handlers() {
    for handler_count in 0..4 {
        let mut builder = PluginRuntime::builder(config()).subscribe(EventType::Chat);
        for i in 0..handler_count {
            builder = builder.on(EventType::Chat, move |ctx: EventContext| async move {
                if i == 1 {
                    ctx.cancel().await?;
                }
                Ok(())
            });
        }
        let (mut host, task) = start(builder.build().unwrap());
        host.handshake().await;

        host.send_event(chat_event("e1", true)).await;
        host.shutdown("done").await;
        let seen = host.drain().await;
        let results = results(&seen);
        assert_eq!(results.len(), 1, "{} handlers", handler_count);
        assert_eq!(results[0].is_cancelled(), handler_count >= 2);
        finish(task).await.unwrap();
    }
}

#[tokio::test]
async fn failing_and_panicking_handlers_still_get_an_ack() {
    let runtime = PluginRuntime::builder(config())
        .on(EventType::Chat, |_ctx| async { Err(PluginError::handler("broken")) })
        .on(EventType::Chat, |ctx: EventContext| async move {
            if ctx.event_id() == "boom" {
                panic!("handler exploded");
            }
            Ok(())
        })
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    host.send_event(chat_event("boom", true)).await;
    assert_eq!(host.expect_result().await, EventResult::ack("boom"));

    host.send_event(chat_event("calm", true)).await;
    assert_eq!(host.expect_result().await, EventResult::ack("calm"));

    host.shutdown("done").await;
    finish(task).await.unwrap();
}

#[tokio::test]
async fn no_result_when_none_is_expected() {
    let runtime = PluginRuntime::builder(config())
        .on(EventType::Chat, |ctx: EventContext| async move { ctx.cancel().await })
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    host.send_event(chat_event("quiet", false)).await;
    host.send_event(chat_event("loud", true)).await;
    host.shutdown("done").await;

    let seen = host.drain().await;
    let results = results(&seen);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].event_id, "loud");
    finish(task).await.unwrap();
}

#[tokio::test]
async fn command_cancel_is_final() {
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    let runtime = PluginRuntime::builder(config())
        .on(EventType::Command, move |ctx: EventContext| {
            let errors_tx = errors_tx.clone();
            async move {
                ctx.cancel().await?;
                if let Err(e) = ctx.ack().await {
                    let _ = errors_tx.send(e);
                }
                Ok(())
            }
        })
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    let command = CommandEvent {
        player_uuid: "p-1".to_string(),
        name: "Steve".to_string(),
        raw: "/home".to_string(),
        command: "home".to_string(),
        args: vec![],
    };
    host.send_event(EventEnvelope::new("e2", true, EventPayload::Command(command))).await;

    let result = host.expect_result().await;
    assert_eq!(result.event_id, "e2");
    assert_eq!(result.cancel, Some(true));
    assert!(matches!(
        errors_rx.recv().await,
        Some(PluginError::AlreadyResponded { event_id }) if event_id == "e2"
    ));

    host.shutdown("done").await;
    assert!(results(&host.drain().await).is_empty());
    finish(task).await.unwrap();
}

#[tokio::test]
async fn registered_command_parses_args_and_cancels() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let spec = CommandSpec::new("give")
        .param(ParamSpec::required("item", ParamType::String))
        .param(ParamSpec::optional("count", ParamType::Int));
    let runtime = PluginRuntime::builder(config())
        .command(spec, move |_ctx, args| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send((args.str("item").map(str::to_string), args.int("count")));
                Ok(())
            }
        })
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    let command = |id: &str, args: &[&str]| {
        EventEnvelope::new(
            id,
            true,
            EventPayload::Command(CommandEvent {
                player_uuid: "p-1".to_string(),
                name: "Steve".to_string(),
                command: "give".to_string(),
                args: args.iter().map(|a| a.to_string()).collect(),
                ..Default::default()
            }),
        )
    };

    host.send_event(command("c1", &["diamond", "3"])).await;
    assert!(host.expect_result().await.is_cancelled());
    assert_eq!(seen_rx.recv().await, Some((Some("diamond".to_string()), Some(3))));

    host.send_event(command("c2", &["diamond", "lots"])).await;
    match host.expect().await {
        PluginPayload::Actions(batch) => match &batch.actions[0].kind {
            ActionKind::SendChat(chat) => {
                assert_eq!(chat.target_uuid, "p-1");
                assert!(chat.message.contains("Usage: /give <item> [count]"));
            }
            other => panic!("unexpected action {:?}", other),
        },
        other => panic!("expected usage reply, got {}", other.kind()),
    }
    assert!(host.expect_result().await.is_cancelled());

    host.shutdown("done").await;
    finish(task).await.unwrap();
    assert!(seen_rx.try_recv().is_err());
}

#[tokio::test]
async fn correlated_result_reaches_its_callback_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (names_tx, mut names_rx) = mpsc::unbounded_channel();
    let counter = Arc::clone(&calls);
    let runtime = PluginRuntime::builder(config())
        .on(EventType::PlayerJoin, move |ctx: EventContext| {
            let counter = Arc::clone(&counter);
            let names_tx = names_tx.clone();
            async move {
                ctx.server()
                    .query_players(WorldRef::default(), move |result: ActionResult| async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let names: Vec<String> = result
                            .players()
                            .map(|players| players.iter().filter_map(|p| p.name.clone()).collect())
                            .unwrap_or_default();
                        let _ = names_tx.send(names);
                    })
                    .await?;
                Ok(())
            }
        })
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    let join = EventEnvelope::new("j1", true, EventPayload::PlayerJoin(PlayerJoinEvent::default()));
    host.send_event(join).await;

    let correlation_id = match host.expect().await {
        PluginPayload::Actions(batch) => {
            assert_eq!(batch.actions.len(), 1);
            assert!(batch.actions[0].kind.is_query());
            batch.actions[0].correlation_id.clone().unwrap()
        }
        other => panic!("expected the query, got {}", other.kind()),
    };
    assert_eq!(host.expect_result().await, EventResult::ack("j1"));

    let result = ActionResult::ok(
        correlation_id,
        Some(ActionResultPayload::WorldPlayers(WorldPlayersResult {
            world: WorldRef::default(),
            players: vec![EntityRef {
                uuid: "p-1".to_string(),
                name: Some("Steve".to_string()),
                ..Default::default()
            }],
        })),
    );
    host.send(HostPayload::ActionResult(result.clone())).await;
    host.send(HostPayload::ActionResult(result)).await;
    host.send(HostPayload::ActionResult(ActionResult::error("unknown-id", "late"))).await;

    assert_eq!(names_rx.recv().await, Some(vec!["Steve".to_string()]));
    host.shutdown("done").await;
    finish(task).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oversized_burst_is_split_in_order() {
    let runtime = PluginRuntime::builder(config())
        .on_enable(|server| async move {
            let actions = (0..600)
                .map(|i| {
                    Action::new(ActionKind::ClearInventory(ClearInventoryAction {
                        player_uuid: i.to_string(),
                    }))
                })
                .collect();
            server.send_batch(actions).await
        })
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    let mut sizes = Vec::new();
    let mut next = 0;
    while sizes.iter().sum::<usize>() < 600 {
        match host.expect().await {
            PluginPayload::Actions(batch) => {
                sizes.push(batch.actions.len());
                for action in batch.actions {
                    match action.kind {
                        ActionKind::ClearInventory(clear) => assert_eq!(clear.player_uuid, next.to_string()),
                        other => panic!("unexpected action {:?}", other),
                    }
                    next += 1;
                }
            }
            other => panic!("expected actions, got {}", other.kind()),
        }
    }
    assert_eq!(sizes, vec![512, 88]);

    host.shutdown("done").await;
    finish(task).await.unwrap();
}

#[tokio::test]
async fn pending_actions_are_flushed_on_shutdown() {
    let mut config = config();
    config.batching.flush_window_us = 60_000_000;
    let runtime = PluginRuntime::builder(config)
        .on(EventType::Chat, |ctx: EventContext| async move {
            ctx.server().send_chat("p-1", "one").await?;
            ctx.server().send_chat("p-1", "two").await?;
            Ok(())
        })
        .on_disable(|server| async move { server.send_chat("p-1", "bye").await })
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    host.send_event(chat_event("fire-and-forget", false)).await;
    host.shutdown("restart").await;

    let seen = host.drain().await;
    let messages: Vec<String> = seen
        .iter()
        .flat_map(|p| match p {
            PluginPayload::Actions(batch) => batch.actions.clone(),
            _ => Vec::new(),
        })
        .filter_map(|a| match a.kind {
            ActionKind::SendChat(chat) => Some(chat.message),
            _ => None,
        })
        .collect();
    assert_eq!(messages, ["one", "two", "bye"]);
    assert_eq!(finish(task).await.unwrap(), StopReason::HostShutdown("restart".to_string()));
}

#[tokio::test]
async fn local_shutdown_drains_and_closes() {
    let runtime = PluginRuntime::builder(config())
        .subscribe(EventType::Chat)
        .build()
        .unwrap();
    let shutdown = runtime.shutdown_handle();
    let mut state = runtime.state();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    state.wait_for(|s| *s == LoopState::Running).await.unwrap();
    shutdown.shutdown();

    assert!(host.drain().await.is_empty());
    assert_eq!(finish(task).await.unwrap(), StopReason::LocalShutdown);
    assert_eq!(*state.borrow(), LoopState::Closed);
}

#[tokio::test]
async fn end_of_stream_is_an_error_after_draining() {
    let runtime = PluginRuntime::builder(config())
        .subscribe(EventType::Chat)
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    host.send_event(chat_event("last", true)).await;
    host.end.writer.shutdown().await.unwrap();

    let seen = host.drain().await;
    assert_eq!(results(&seen).len(), 1);
    assert!(matches!(finish(task).await, Err(PluginError::StreamClosed)));
}

#[tokio::test]
async fn concurrent_mode_overlaps_handlers() {
    let mut config = config();
    config.dispatch.mode = DispatchMode::Concurrent;
    let gate = Arc::new(Notify::new());
    let runtime = PluginRuntime::builder(config)
        .on(EventType::Chat, move |ctx: EventContext| {
            let gate = Arc::clone(&gate);
            async move {
                if ctx.event_id() == "slow" {
                    gate.notified().await;
                } else {
                    gate.notify_one();
                }
                ctx.ack().await
            }
        })
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    host.send_event(chat_event("slow", true)).await;
    host.send_event(chat_event("fast", true)).await;

    let mut ids = vec![host.expect_result().await.event_id, host.expect_result().await.event_id];
    ids.sort();
    assert_eq!(ids, ["fast", "slow"]);

    host.shutdown("done").await;
    finish(task).await.unwrap();
}

#[tokio::test]
async fn oversized_mutation_still_resolves_the_event() {
    let runtime = PluginRuntime::builder(config())
        .on(EventType::Chat, |ctx: EventContext| async move {
            let huge = "x".repeat(codec::MAX_FRAME_SIZE + 1);
            ctx.respond_with(EventMutation::chat_message(huge)).await
        })
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    host.send_event(chat_event("big", true)).await;
    host.shutdown("done").await;

    let seen = host.drain().await;
    assert_eq!(results(&seen), vec![&EventResult::ack("big")]);
    finish(task).await.unwrap();
}

#[tokio::test]
async fn shutdown_releases_handlers_waiting_on_queries() {
    let mut config = config();
    config.dispatch.mode = DispatchMode::Concurrent;
    config.correlation.expiry_ms = 0;
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let runtime = PluginRuntime::builder(config)
        .on(EventType::Chat, move |ctx: EventContext| {
            let outcome_tx = outcome_tx.clone();
            async move {
                let result = ctx.server().query_entities(WorldRef::default(), None).await;
                let _ = outcome_tx.send(result);
                Ok(())
            }
        })
        .build()
        .unwrap();
    let mut state = runtime.state();
    let (mut host, task) = start(runtime);
    host.handshake().await;

    host.send_event(chat_event("waiting", true)).await;
    match host.expect().await {
        PluginPayload::Actions(batch) => assert!(batch.actions[0].kind.is_query()),
        other => panic!("expected the query, got {}", other.kind()),
    }
    host.shutdown("restart").await;

    let seen = host.drain().await;
    assert_eq!(results(&seen), vec![&EventResult::ack("waiting")]);
    assert_eq!(finish(task).await.unwrap(), StopReason::HostShutdown("restart".to_string()));
    assert_eq!(*state.borrow_and_update(), LoopState::Closed);
    assert!(matches!(outcome_rx.recv().await, Some(Err(PluginError::StreamClosed))));
}

#[tokio::test]
async fn undecodable_event_is_still_acked() {
    let runtime = PluginRuntime::builder(config())
        .subscribe(EventType::All)
        .build()
        .unwrap();
    let (mut host, task) = start(runtime);
    let (_, subscribe) = host.handshake().await;
    assert_eq!(subscribe.events, vec![EventType::All]);

    let body = br#"{"plugin_id":"test-plugin","payload":{"event":{
        "event_id":"odd-1","type":"CHAT","expects_response":true,
        "payload":{"chat":{"player_uuid":42}}}}}"#;
    host.end.writer.write_frame(body).await.unwrap();
    host.end.writer.write_frame(b"not even json").await.unwrap();

    let unknown = br#"{"payload":{"event":{"event_id":"odd-2","type":"PLAYER_DANCE","expects_response":true}}}"#;
    host.end.writer.write_frame(unknown).await.unwrap();

    assert_eq!(host.expect_result().await, EventResult::ack("odd-1"));
    assert_eq!(host.expect_result().await, EventResult::ack("odd-2"));

    host.shutdown("done").await;
    finish(task).await.unwrap();
}
