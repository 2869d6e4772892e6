use crate::channel::{CommandChannel, FrameReader};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{HeosError, Result};
use crate::protocol::{Command, HeosResult};
use crate::queue::PlayQueue;
use crate::subscription::{Event, EventPump, Subscriptions};
use crate::types::{AccountStatus, BrowseItem, DeviceDescriptor, MusicSource, Player, PlayerId, SourceId};
use std::future::Future;
use std::sync::Arc;

/// Session with one HEOS device
///
/// A session uses two TCP connections to the same device: one for commands
/// and their responses, one on which the device pushes change events. Events
/// are handed to callbacks registered with [`subscribe`](Self::subscribe).
///
/// # Example
///
/// ```no_run
/// use heos_control::{events, ClientConfig, HeosClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HeosClient::new("192.168.1.31", ClientConfig::default());
///     client.subscribe(events::PLAYER_VOLUME_CHANGED, |event| async move {
///         println!("Volume of {:?} is now {:?}", event.var("pid"), event.var("level"));
///     });
///     client.connect().await?;
///
///     for source in client.get_music_sources().await? {
///         println!("{} ({})", source.name, source.sid);
///     }
///
///     client.close().await;
///     Ok(())
/// }
/// ```
pub struct HeosClient {
    host: String,
    config: ClientConfig,
    commands: Arc<CommandChannel>,
    events: Arc<Connection>,
    subscriptions: Subscriptions,
    pump: parking_lot::Mutex<Option<EventPump>>,
    span: tracing::Span,
}

impl HeosClient {
    /// Create an unconnected session for the device at `host`
    pub fn new(host: impl Into<String>, config: ClientConfig) -> Self {
        let host = host.into();
        let span = tracing::info_span!("heos", host = %host);
        Self::with_span(host, config, span)
    }

    /// Create an unconnected session that logs under `span`
    pub fn with_span(host: impl Into<String>, config: ClientConfig, span: tracing::Span) -> Self {
        let command_connection = Arc::new(Connection::new(
            tracing::debug_span!(parent: &span, "command_connection"),
        ));
        let commands = Arc::new(CommandChannel::new(
            command_connection,
            config.command_reader(),
            tracing::debug_span!(parent: &span, "commands"),
        ));
        let events = Arc::new(Connection::new(
            tracing::debug_span!(parent: &span, "event_connection"),
        ));

        Self {
            host: host.into(),
            config,
            commands,
            events,
            subscriptions: Subscriptions::new(),
            pump: parking_lot::Mutex::new(None),
            span,
        }
    }

    /// Create a session for a discovered device
    pub fn for_device(device: &DeviceDescriptor, config: ClientConfig) -> Result<Self> {
        let host = device.host().ok_or_else(|| {
            HeosError::Discovery(format!("no host in device location '{}'", device.location))
        })?;
        Ok(Self::new(host, config))
    }

    /// Connect to `host` on the default port with default settings
    pub async fn connect_to(host: impl Into<String>) -> Result<Self> {
        let client = Self::new(host, ClientConfig::default());
        client.connect().await?;
        Ok(client)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the command channel and, when enabled, the event channel.
    ///
    /// Calling this again reconnects both channels.
    pub async fn connect(&self) -> Result<()> {
        self.stop_pump().await;

        self.commands
            .connection()
            .connect(&self.host, self.config.port, self.config.connect_timeout)
            .await?;

        if self.config.enable_events {
            self.events
                .connect(&self.host, self.config.port, self.config.connect_timeout)
                .await?;
            self.register_events(true).await?;
            self.start_pump();
        }

        self.span.in_scope(|| tracing::info!("Connected"));
        Ok(())
    }

    /// Close both channels and stop the event pump
    pub async fn close(&self) {
        self.stop_pump().await;
        self.events.close().await;
        self.commands.connection().close().await;

        self.span.in_scope(|| tracing::info!("Disconnected"));
    }

    pub fn is_connected(&self) -> bool {
        self.commands.is_connected()
    }

    /// Whether the event pump is running
    pub fn is_receiving_events(&self) -> bool {
        self.pump.lock().as_ref().is_some_and(EventPump::is_running)
    }

    /// Turn change events on or off for this session.
    ///
    /// The pump is paused while the registration is sent so it cannot take
    /// the response for an event. Events arriving in that window are skipped.
    /// If the registration fails, the previous state is kept.
    pub async fn set_event_reception(&self, enable: bool) -> Result<()> {
        if !self.events.is_connected() {
            if !enable {
                return Ok(());
            }
            self.events
                .connect(&self.host, self.config.port, self.config.connect_timeout)
                .await?;
        }

        let was_receiving = self.is_receiving_events();
        self.stop_pump().await;

        let registered = self.register_events(enable).await;
        let receiving = match &registered {
            Ok(()) => enable,
            Err(e) => {
                self.span
                    .in_scope(|| tracing::warn!("Event registration failed: {}", e));
                was_receiving
            }
        };
        if receiving {
            self.start_pump();
        }
        registered
    }

    /// Register `callback` for events named `event_name`.
    ///
    /// Works before and after [`connect`](Self::connect). Callbacks run as
    /// independent tasks, in registration order.
    pub fn subscribe<F, Fut>(&self, event_name: impl Into<String>, callback: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.subscriptions.subscribe(event_name, callback);
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// The command channel, for verbs without a wrapper here
    pub fn commands(&self) -> &Arc<CommandChannel> {
        &self.commands
    }

    /// Send a raw command
    pub async fn call(&self, command: Command) -> Result<HeosResult> {
        self.commands.call(command).await
    }

    /// The play queue of `player_id`
    pub fn queue(&self, player_id: PlayerId) -> PlayQueue {
        PlayQueue::new(self.commands.clone(), player_id, self.config.queue_settle_delay)
    }

    pub async fn heart_beat(&self) -> Result<()> {
        self.commands.heart_beat().await
    }

    pub async fn check_account(&self) -> Result<(AccountStatus, Option<String>)> {
        self.commands.check_account().await
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<()> {
        self.commands.sign_in(username, password).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.commands.sign_out().await
    }

    /// Players in the HEOS system; their `pid` addresses queues and playback
    pub async fn get_players(&self) -> Result<Vec<Player>> {
        self.commands.get_players().await
    }

    pub async fn get_player_info(&self, player_id: PlayerId) -> Result<Player> {
        self.commands.get_player_info(player_id).await
    }

    pub async fn get_music_sources(&self) -> Result<Vec<MusicSource>> {
        self.commands.get_music_sources().await
    }

    pub async fn browse_source(&self, source_id: SourceId, container_id: Option<&str>) -> Result<Vec<BrowseItem>> {
        self.commands.browse_source(source_id, container_id).await
    }

    pub async fn search(&self, source_id: SourceId, query: &str, criteria_id: i64) -> Result<Vec<BrowseItem>> {
        self.commands.search(source_id, query, criteria_id).await
    }

    pub async fn play_url(&self, player_id: PlayerId, url: &str) -> Result<()> {
        self.commands.play_url(player_id, url).await
    }

    /// Send the event registration on the event connection
    async fn register_events(&self, enable: bool) -> Result<()> {
        let registrar = CommandChannel::new(
            self.events.clone(),
            self.config.event_reader(),
            tracing::debug_span!(parent: &self.span, "event_registration"),
        );
        registrar.register_for_change_events(enable).await
    }

    fn start_pump(&self) {
        let reader = FrameReader::new(self.events.clone(), self.config.event_reader());
        let pump = EventPump::start(
            reader,
            self.subscriptions.clone(),
            self.config.event_queue_capacity,
            self.span.clone(),
        );
        *self.pump.lock() = Some(pump);
    }

    async fn stop_pump(&self) {
        let pump = self.pump.lock().take();
        if let Some(pump) = pump {
            pump.stop().await;
        }
    }
}
