use crate::channel::FrameReader;
use crate::error::HeosError;
use crate::protocol::{HeosResult, Vars};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Event names the device pushes once registered for change events
pub mod events {
    pub const SOURCES_CHANGED: &str = "event/sources_changed";
    pub const PLAYERS_CHANGED: &str = "event/players_changed";
    pub const GROUPS_CHANGED: &str = "event/groups_changed";
    pub const PLAYER_STATE_CHANGED: &str = "event/player_state_changed";
    pub const PLAYER_NOW_PLAYING_CHANGED: &str = "event/player_now_playing_changed";
    pub const PLAYER_NOW_PLAYING_PROGRESS: &str = "event/player_now_playing_progress";
    pub const PLAYER_PLAYBACK_ERROR: &str = "event/player_playback_error";
    pub const PLAYER_QUEUE_CHANGED: &str = "event/player_queue_changed";
    pub const PLAYER_VOLUME_CHANGED: &str = "event/player_volume_changed";
    pub const REPEAT_MODE_CHANGED: &str = "event/repeat_mode_changed";
    pub const SHUFFLE_MODE_CHANGED: &str = "event/shuffle_mode_changed";
    pub const GROUP_VOLUME_CHANGED: &str = "event/group_volume_changed";
    pub const USER_CHANGED: &str = "event/user_changed";

    pub const ALL: &[&str] = &[
        SOURCES_CHANGED,
        PLAYERS_CHANGED,
        GROUPS_CHANGED,
        PLAYER_STATE_CHANGED,
        PLAYER_NOW_PLAYING_CHANGED,
        PLAYER_NOW_PLAYING_PROGRESS,
        PLAYER_PLAYBACK_ERROR,
        PLAYER_QUEUE_CHANGED,
        PLAYER_VOLUME_CHANGED,
        REPEAT_MODE_CHANGED,
        SHUFFLE_MODE_CHANGED,
        GROUP_VOLUME_CHANGED,
        USER_CHANGED,
    ];
}

/// A change notification pushed by the device
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name, e.g. `event/player_volume_changed`
    pub command: String,
    pub message: String,
    pub vars: Vars,
    /// The frame as received
    pub raw: String,
}

impl Event {
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

impl From<HeosResult> for Event {
    fn from(result: HeosResult) -> Self {
        Self {
            command: result.header.command,
            message: result.header.message,
            vars: result.header.vars,
            raw: result.raw,
        }
    }
}

/// Type-erased subscriber callback
pub type EventCallback = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// Event name to callbacks, in registration order.
///
/// Cloning shares the same table. Callbacks can be added while events are
/// being dispatched; nothing is ever removed.
#[derive(Clone, Default)]
pub struct Subscriptions {
    table: Arc<RwLock<HashMap<String, Vec<EventCallback>>>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for every event named `event_name`
    pub fn subscribe<F, Fut>(&self, event_name: impl Into<String>, callback: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: EventCallback = Arc::new(move |event| callback(event).boxed());
        self.table
            .write()
            .entry(event_name.into())
            .or_default()
            .push(callback);
    }

    /// Snapshot of the callbacks for `event_name`
    pub fn callbacks_for(&self, event_name: &str) -> Vec<EventCallback> {
        self.table
            .read()
            .get(event_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of callbacks registered for `event_name`
    pub fn count(&self, event_name: &str) -> usize {
        self.table.read().get(event_name).map_or(0, Vec::len)
    }
}

/// Background tasks reading the event channel and running subscribers
pub struct EventPump {
    shutdown: CancellationToken,
    listener: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl EventPump {
    /// Spawn the listener and dispatcher tasks
    pub(crate) fn start(
        reader: FrameReader,
        subscriptions: Subscriptions,
        capacity: usize,
        span: tracing::Span,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let listener = tokio::spawn(
            listen(reader, tx, shutdown.clone())
                .instrument(tracing::debug_span!(parent: &span, "event_listener")),
        );
        let dispatcher = tokio::spawn(
            dispatch(rx, subscriptions, shutdown.clone())
                .instrument(tracing::debug_span!(parent: &span, "event_dispatcher")),
        );

        Self {
            shutdown,
            listener,
            dispatcher,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.listener.is_finished() || !self.dispatcher.is_finished()
    }

    /// Stop both tasks. Callbacks already spawned run to completion.
    pub async fn stop(self) {
        self.shutdown.cancel();
        for handle in [self.listener, self.dispatcher] {
            // Give it a moment to stop gracefully
            if tokio::time::timeout(Duration::from_millis(500), handle)
                .await
                .is_err()
            {
                tracing::warn!("Event task did not stop in time");
            }
        }
    }
}

async fn listen(mut reader: FrameReader, tx: mpsc::Sender<Event>, shutdown: CancellationToken) {
    tracing::debug!("Event listener started");
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = reader.next_frame() => frame,
        };

        match frame {
            Ok(result) => {
                let event = Event::from(result);
                tracing::debug!("Received event: {}", event.command);
                match tx.try_send(event) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(event)) => {
                        tracing::warn!("Event queue full, dropping {}", event.command);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Err(HeosError::Timeout) => continue,
            Err(HeosError::ChannelUnavailable) | Err(HeosError::ConnectionClosed) => {
                tracing::info!("Event channel closed");
                break;
            }
            Err(e) => {
                tracing::warn!("Error reading event: {}", e);
            }
        }
    }
    tracing::debug!("Event listener stopped");
}

async fn dispatch(
    mut rx: mpsc::Receiver<Event>,
    subscriptions: Subscriptions,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        for callback in subscriptions.callbacks_for(&event.command) {
            tracing::trace!("Calling callback for {}", event.command);
            tokio::spawn(callback(event.clone()).in_current_span());
        }
    }
    tracing::debug!("Event dispatcher stopped");
}
