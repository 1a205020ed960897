//! Plugin lifecycle and the dispatch loop.
//!
//! A [`PluginRuntime`] owns everything that lives for one stream: the writer
//! task, the batching layer, the correlation registry and the handlers. It
//! moves through [`LoopState`] in order:
//!
//! 1. **Connecting**: opening the transport
//! 2. **Handshaking**: hello and subscribe written
//! 3. **Running**: reading host messages until shutdown or end of stream
//! 4. **Draining**: pending queries fail, in-flight events finish, `on_disable` runs, queued actions flush
//! 5. **Closed**: write side terminated
//!
//! A host shutdown, a local [`ShutdownHandle::shutdown`], an end of stream and
//! a transport error all take the same draining path. Only the first two count
//! as a clean stop.

use crate::batch::ActionBatcher;
use crate::commands::{CommandArgs, CommandHandler, CommandRouter};
use crate::config::{DispatchMode, PluginConfig};
use crate::context::EventContext;
use crate::correlation::CorrelationRegistry;
use crate::dispatch::Dispatcher;
use crate::error::PluginError;
use crate::handlers::{EventHandler, FnEventHandler, HandlerMap, HandlerRegistry};
use crate::handshake::{check_host_hello, send_handshake, subscription_set};
use crate::server::Server;
use crate::writer::WriterHandle;
use futures::future::BoxFuture;
use futures::FutureExt;
use plugin_protocol::codec::{self, peek_event_header};
use plugin_protocol::transport::{self, FrameSink, FrameSource};
use plugin_protocol::{
    CommandSpec, CustomBlockDefinition, CustomItemDefinition, EventType, HostPayload, HostToPlugin, PluginHello,
};
use std::collections::BTreeSet;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Where the dispatch loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Connecting,
    Handshaking,
    Running,
    Draining,
    Closed,
}

/// Why a run ended cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The host sent Shutdown, with its reason.
    HostShutdown(String),
    /// [`ShutdownHandle::shutdown`] was called.
    LocalShutdown,
}

/// Async hook run with the server handle at enable or disable time.
pub type LifecycleHook = Arc<dyn Fn(Server) -> BoxFuture<'static, Result<(), PluginError>> + Send + Sync>;

/// Requests a local shutdown of a running plugin.
#[derive(Clone)]
pub struct ShutdownHandle {
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    /// Starts draining as if the host had sent Shutdown.
    ///
    /// Calling it before the loop starts makes the loop stop right after
    /// the handshake.
    pub fn shutdown(&self) {
        self.notify.notify_one();
    }
}

/// Collects handlers, commands and capabilities before the stream opens.
pub struct PluginBuilder {
    config: PluginConfig,
    handlers: HandlerMap,
    router: CommandRouter,
    subscriptions: BTreeSet<EventType>,
    custom_items: Vec<CustomItemDefinition>,
    custom_blocks: Vec<CustomBlockDefinition>,
    on_enable: Vec<LifecycleHook>,
    on_disable: Vec<LifecycleHook>,
    error: Option<PluginError>,
}

impl PluginBuilder {
    pub fn new(config: PluginConfig) -> Self {
        Self {
            config,
            handlers: HandlerMap::new(),
            router: CommandRouter::new(),
            subscriptions: BTreeSet::new(),
            custom_items: Vec::new(),
            custom_blocks: Vec::new(),
            on_enable: Vec::new(),
            on_disable: Vec::new(),
            error: None,
        }
    }

    /// Registers an async closure for `event_type`.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// PluginRuntime::builder(config)
    ///     .on(EventType::Chat, |ctx| async move {
    ///         ctx.cancel().await
    ///     })
    /// ```
    pub fn on<F, Fut>(self, event_type: EventType, handler: F) -> Self
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PluginError>> + Send + 'static,
    {
        let count = self.handlers.get(&event_type).map_or(0, Vec::len);
        let name = format!("{}#{}", event_type, count);
        self.on_named(event_type, name, handler)
    }

    /// Like [`PluginBuilder::on`] with a name used in logs.
    pub fn on_named<F, Fut>(self, event_type: EventType, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PluginError>> + Send + 'static,
    {
        self.handler(event_type, Arc::new(FnEventHandler::new(name, handler)))
    }

    /// Registers a handler object for `event_type`.
    pub fn handler(mut self, event_type: EventType, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.entry(event_type).or_default().push(handler);
        self
    }

    /// Registers a command. An invalid spec fails [`PluginBuilder::build`].
    pub fn command<F, Fut>(self, spec: CommandSpec, handler: F) -> Self
    where
        F: Fn(EventContext, CommandArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PluginError>> + Send + 'static,
    {
        self.command_handler(spec, Arc::new(handler))
    }

    pub fn command_handler(mut self, spec: CommandSpec, handler: Arc<dyn CommandHandler>) -> Self {
        if let Err(e) = self.router.register(spec, handler) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Subscribes to `event_type` even without a handler for it.
    pub fn subscribe(mut self, event_type: EventType) -> Self {
        self.subscriptions.insert(event_type);
        self
    }

    pub fn custom_item(mut self, item: CustomItemDefinition) -> Self {
        self.custom_items.push(item);
        self
    }

    pub fn custom_block(mut self, block: CustomBlockDefinition) -> Self {
        self.custom_blocks.push(block);
        self
    }

    /// Runs after the handshake, before the first host message is handled.
    pub fn on_enable<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Server) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PluginError>> + Send + 'static,
    {
        self.on_enable.push(Arc::new(move |server: Server| hook(server).boxed()));
        self
    }

    /// Runs while draining, before queued actions are flushed.
    pub fn on_disable<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Server) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PluginError>> + Send + 'static,
    {
        self.on_disable.push(Arc::new(move |server: Server| hook(server).boxed()));
        self
    }

    /// Validates the configuration and every registration.
    pub fn build(self) -> Result<PluginRuntime, PluginError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.config.validate()?;

        let (state_tx, _) = watch::channel(LoopState::Connecting);
        Ok(PluginRuntime {
            config: self.config,
            registry: Arc::new(HandlerRegistry::from_map(self.handlers)),
            router: Arc::new(self.router),
            subscriptions: self.subscriptions,
            custom_items: self.custom_items,
            custom_blocks: self.custom_blocks,
            on_enable: self.on_enable,
            on_disable: self.on_disable,
            state_tx,
            shutdown: Arc::new(Notify::new()),
        })
    }
}

/// Frames and stream endings forwarded by the reader task.
enum Inbound {
    Frame(Vec<u8>),
    Closed,
    Failed(io::Error),
}

/// The plugin runtime for one host stream.
pub struct PluginRuntime {
    config: PluginConfig,
    registry: Arc<HandlerRegistry>,
    router: Arc<CommandRouter>,
    subscriptions: BTreeSet<EventType>,
    custom_items: Vec<CustomItemDefinition>,
    custom_blocks: Vec<CustomBlockDefinition>,
    on_enable: Vec<LifecycleHook>,
    on_disable: Vec<LifecycleHook>,
    state_tx: watch::Sender<LoopState>,
    shutdown: Arc<Notify>,
}

impl PluginRuntime {
    pub fn builder(config: PluginConfig) -> PluginBuilder {
        PluginBuilder::new(config)
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Observes lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state_tx.subscribe()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            notify: Arc::clone(&self.shutdown),
        }
    }

    /// The handler registry; handlers added while running take effect for the next event.
    pub fn registry(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.registry)
    }

    /// Connects to the configured address and runs until the stream ends.
    ///
    /// # Returns
    ///
    /// Why the run stopped cleanly, or the error that ended it. An end of
    /// stream without a host Shutdown is `StreamClosed`.
    pub async fn run(self) -> Result<StopReason, PluginError> {
        self.set_state(LoopState::Connecting);
        let address = self.config.address()?;
        info!("🔌 Connecting to host at {}", address);
        let (source, sink) = match transport::connect(&address).await {
            Ok(halves) => halves,
            Err(e) => {
                error!("❌ Could not connect to {}: {}", address, e);
                self.set_state(LoopState::Closed);
                return Err(e.into());
            }
        };
        self.run_with_transport(source, sink).await
    }

    /// Runs over an already open transport.
    pub async fn run_with_transport(
        self,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
    ) -> Result<StopReason, PluginError> {
        self.set_state(LoopState::Handshaking);

        let (writer, writer_task) =
            WriterHandle::spawn(self.config.plugin_id.clone(), sink, self.config.batching.channel_capacity);
        let batcher = ActionBatcher::new(writer.clone(), self.config.batching);
        let correlations = Arc::new(CorrelationRegistry::new());
        let server = Server::new(writer.clone(), batcher.clone(), Arc::clone(&correlations));

        let events = subscription_set(
            &self.registry.event_types().await,
            &self.subscriptions,
            !self.router.is_empty(),
        );
        let handshake = send_handshake(&writer, self.hello(), events).await;

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.batching.channel_capacity.max(1));
        let reader_task = tokio::spawn(reader_loop(source, inbound_tx));
        let sweeper = correlations.spawn_sweeper(
            self.config.correlation.expiry(),
            self.config.correlation.sweep_interval(),
        );
        let mut in_flight = JoinSet::new();

        let outcome = match handshake {
            Ok(()) => {
                self.set_state(LoopState::Running);
                info!("✅ Plugin {} running", self.config.plugin_id);
                self.run_hooks(&self.on_enable, &server, "on_enable").await;
                self.serve(inbound_rx, &server, &correlations, &mut in_flight).await
            }
            Err(e) => {
                error!("❌ Handshake failed: {}", e);
                Err(e)
            }
        };

        self.set_state(LoopState::Draining);
        // Nothing reads results from here on; release query_async waiters
        // before joining the tasks that may be blocked on them.
        let dropped = correlations.close();
        if dropped > 0 {
            debug!("Dropped {} pending correlations", dropped);
        }
        if !in_flight.is_empty() {
            debug!("Waiting for {} in-flight tasks", in_flight.len());
        }
        while let Some(joined) = in_flight.join_next().await {
            report_join(joined);
        }
        self.run_hooks(&self.on_disable, &server, "on_disable").await;
        if let Err(e) = batcher.close().await {
            warn!("⚠️ Could not flush queued actions: {}", e);
        }
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        reader_task.abort();
        writer.close().await;
        if let Err(e) = writer_task.await {
            warn!("⚠️ Writer task ended abnormally: {}", e);
        }
        self.set_state(LoopState::Closed);

        match &outcome {
            Ok(reason) => info!("🛑 Plugin {} stopped: {:?}", self.config.plugin_id, reason),
            Err(e) => warn!("⚠️ Plugin {} stopped abnormally: {}", self.config.plugin_id, e),
        }
        outcome
    }

    async fn serve(
        &self,
        mut inbound: mpsc::Receiver<Inbound>,
        server: &Server,
        correlations: &Arc<CorrelationRegistry>,
        in_flight: &mut JoinSet<()>,
    ) -> Result<StopReason, PluginError> {
        let dispatcher = Dispatcher::new(Arc::clone(&self.registry), Arc::clone(&self.router), server.clone());
        let concurrent = self.config.dispatch.mode == DispatchMode::Concurrent;

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("🛑 Local shutdown requested");
                    return Ok(StopReason::LocalShutdown);
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    report_join(joined);
                }
                message = inbound.recv() => match message {
                    Some(Inbound::Frame(body)) => {
                        if let Some(reason) = self
                            .handle_frame(&body, &dispatcher, correlations, concurrent, in_flight)
                            .await
                        {
                            info!("🛑 Host requested shutdown: {}", reason);
                            return Ok(StopReason::HostShutdown(reason));
                        }
                    }
                    Some(Inbound::Failed(e)) => {
                        error!("❌ Transport error: {}", e);
                        return Err(PluginError::Transport(e));
                    }
                    Some(Inbound::Closed) | None => {
                        warn!("⚠️ Host closed the stream without Shutdown");
                        return Err(PluginError::StreamClosed);
                    }
                },
            }
        }
    }

    /// Handles one host frame. Returns the reason when it was a Shutdown.
    async fn handle_frame(
        &self,
        body: &[u8],
        dispatcher: &Dispatcher,
        correlations: &Arc<CorrelationRegistry>,
        concurrent: bool,
        in_flight: &mut JoinSet<()>,
    ) -> Option<String> {
        let message: HostToPlugin = match codec::decode(body) {
            Ok(message) => message,
            Err(e) => {
                match peek_event_header(body) {
                    Some(header) => {
                        debug!("Undecodable event body: {}", e);
                        dispatcher.ack_undecodable(header).await;
                    }
                    None => warn!("⚠️ Ignoring undecodable host message: {}", e),
                }
                return None;
            }
        };
        debug!("📥 Received {}", message.payload.kind());

        match message.payload {
            HostPayload::Hello(hello) => {
                check_host_hello(&self.config.api_version, &hello);
            }
            HostPayload::Event(event) => {
                if concurrent {
                    let dispatcher = dispatcher.clone();
                    in_flight.spawn(async move { dispatcher.dispatch_event(event).await });
                } else {
                    dispatcher.dispatch_event(event).await;
                }
            }
            HostPayload::ActionResult(result) => {
                if concurrent {
                    let correlations = Arc::clone(correlations);
                    in_flight.spawn(async move {
                        correlations.dispatch(result).await;
                    });
                } else {
                    correlations.dispatch(result).await;
                }
            }
            HostPayload::Shutdown(shutdown) => return Some(shutdown.reason),
        }
        None
    }

    async fn run_hooks(&self, hooks: &[LifecycleHook], server: &Server, stage: &str) {
        for hook in hooks {
            let outcome = std::panic::AssertUnwindSafe(hook(server.clone())).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("❌ {} hook failed: {}", stage, e),
                Err(_) => error!("❌ {} hook panicked", stage),
            }
        }
    }

    fn hello(&self) -> PluginHello {
        PluginHello {
            name: self.config.display_name().to_string(),
            version: self.config.version.clone(),
            api_version: self.config.api_version.clone(),
            commands: self.router.specs(),
            custom_items: self.custom_items.clone(),
            custom_blocks: self.custom_blocks.clone(),
        }
    }

    fn set_state(&self, state: LoopState) {
        debug!("Loop state -> {:?}", state);
        self.state_tx.send_replace(state);
    }
}

fn report_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("❌ Event task panicked: {}", e);
        }
    }
}

async fn reader_loop(mut source: Box<dyn FrameSource>, tx: mpsc::Sender<Inbound>) {
    loop {
        let inbound = match source.recv_frame().await {
            Ok(Some(body)) => Inbound::Frame(body),
            Ok(None) => Inbound::Closed,
            Err(e) => Inbound::Failed(e),
        };
        let last = !matches!(inbound, Inbound::Frame(_));
        if tx.send(inbound).await.is_err() || last {
            break;
        }
    }
}
