//! # Reconnecting Socket Client
//!
//! One persistent push connection, managed by a single actor task that
//! exclusively owns the connection state machine:
//!
//! ```text
//! Closed --connect()--> Connecting --link open--> Open --link closed--> Closed
//!   ^                                                                     |
//!   +------ after interval * attempt (auto-reconnect, attempt < max) -----+
//! ```
//!
//! [`SocketClient`] handles talk to the actor over a command channel. State
//! is published through a `watch` channel; messages, errors and reconnect
//! decisions are delivered as [`SocketEvent`]s to a single consumer in
//! receipt order.
//!
//! Timers for heartbeat and reconnect are always cleared before a new
//! connect attempt, so there is never more than one of each. The actor stops
//! (closing its transport) once every handle has been dropped.

use std::collections::VecDeque;
use std::future::pending;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

use super::transport::{Connector, Link, LinkEvent};
use crate::configs::SocketConfig;
use crate::model::{heartbeat_frame, InboundMessage};

/// Failures surfaced by the socket client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    /// A send was attempted while the connection was not open.
    #[error("Socket is not connected")]
    NotConnected,

    /// The transport could not be opened.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The client task is gone.
    #[error("Socket client has shut down")]
    Closed,

    /// The socket URL or its handshake headers are malformed.
    #[error("Invalid socket URL: {0}")]
    InvalidUrl(String),
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// A transport is being opened.
    Connecting,
    /// The transport is open.
    Open,
    /// The transport is being torn down.
    Closing,
    /// No transport.
    Closed,
}

/// Foreground visibility of whatever hosts the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// In the foreground.
    Visible,
    /// In the background.
    Hidden,
}

/// Everything the client reports to its consumer.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A frame arrived (raw frames included).
    Message(Arc<InboundMessage>),
    /// A transport or connect failure. The reconnect policy has already been applied.
    Error(String),
    /// A reconnect will be attempted after `delay`.
    ReconnectScheduled {
        /// 1-based attempt number.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// The attempt limit was reached; no further reconnects will be scheduled.
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },
}

enum Command {
    Connect(oneshot::Sender<()>),
    Disconnect(oneshot::Sender<()>),
    Reconnect(oneshot::Sender<()>),
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), SocketError>>,
    },
    SetVisibility(Visibility),
}

/// Last message plus the bounded history ring.
#[derive(Debug)]
struct MessageStore {
    last: Option<Arc<InboundMessage>>,
    history: VecDeque<Arc<InboundMessage>>,
    capacity: usize,
}

impl MessageStore {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            last: None,
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, message: Arc<InboundMessage>) {
        // Raw frames count as the latest message but stay out of history.
        if !message.is_raw() {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(Arc::clone(&message));
        }
        self.last = Some(message);
    }
}

/// Handle to a running socket client. Cheap to clone.
#[derive(Clone)]
pub struct SocketClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    store: Arc<Mutex<MessageStore>>,
}

impl SocketClient {
    /// Starts the client task (in state `Closed`) and returns its handle and
    /// the event receiver. Must be called from within a tokio runtime.
    pub fn spawn(
        config: SocketConfig,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Closed);
        let store = Arc::new(Mutex::new(MessageStore::new(config.history_capacity)));

        let actor = Actor {
            auto_reconnect: config.auto_reconnect,
            config,
            connector,
            commands,
            events,
            state_tx,
            store: Arc::clone(&store),
            started: false,
            attempts: 0,
            link: None,
            pending: None,
            reconnect_at: None,
            heartbeat: None,
        };
        tokio::spawn(actor.run());

        (
            Self {
                commands: commands_tx,
                state,
                store,
            },
            events_rx,
        )
    }

    /// Opens the connection unless it is already open or opening. Returns
    /// once the attempt has started; watch [`SocketClient::state`] for `Open`.
    pub async fn connect(&self) -> Result<(), SocketError> {
        self.ask(Command::Connect).await
    }

    /// Closes the connection, cancels any pending reconnect and disables
    /// auto-reconnect until [`SocketClient::reconnect`] is called.
    pub async fn disconnect(&self) -> Result<(), SocketError> {
        self.ask(Command::Disconnect).await
    }

    /// Re-enables auto-reconnect, resets the attempt counter and starts a
    /// fresh connect cycle.
    pub async fn reconnect(&self) -> Result<(), SocketError> {
        self.ask(Command::Reconnect).await
    }

    /// Sends one text frame. Fails with `NotConnected` unless open.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), SocketError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                text: text.into(),
                reply,
            })
            .map_err(|_| SocketError::Closed)?;
        rx.await.map_err(|_| SocketError::Closed)?
    }

    /// Sends a JSON value as one text frame.
    pub async fn send_json(&self, value: &Value) -> Result<(), SocketError> {
        self.send(value.to_string()).await
    }

    /// Reports a visibility change. Becoming visible while disconnected
    /// (with auto-reconnect enabled) reconnects at once instead of waiting
    /// out the backoff.
    pub fn set_visibility(&self, visibility: Visibility) -> Result<(), SocketError> {
        self.commands
            .send(Command::SetVisibility(visibility))
            .map_err(|_| SocketError::Closed)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Waits until the connection reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), SocketError> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| SocketError::Closed)
    }

    /// The most recent frame, raw or decoded.
    pub fn last_message(&self) -> Option<Arc<InboundMessage>> {
        self.lock_store().last.clone()
    }

    /// Decoded messages, oldest first.
    pub fn history(&self) -> Vec<Arc<InboundMessage>> {
        self.lock_store().history.iter().cloned().collect()
    }

    /// Empties the history and forgets the last message.
    pub fn clear_history(&self) {
        let mut store = self.lock_store();
        store.history.clear();
        store.last = None;
    }

    async fn ask(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) -> Result<(), SocketError> {
        let (ack, rx) = oneshot::channel();
        self.commands.send(make(ack)).map_err(|_| SocketError::Closed)?;
        rx.await.map_err(|_| SocketError::Closed)
    }

    fn lock_store(&self) -> MutexGuard<'_, MessageStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Actor {
    config: SocketConfig,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SocketEvent>,
    state_tx: watch::Sender<ConnectionState>,
    store: Arc<Mutex<MessageStore>>,
    auto_reconnect: bool,
    /// A connect has been requested at least once.
    started: bool,
    /// Consecutive failed reconnects since the last open.
    attempts: u32,
    link: Option<Link>,
    pending: Option<BoxFuture<'static, Result<Link, SocketError>>>,
    reconnect_at: Option<Instant>,
    heartbeat: Option<Interval>,
}

impl Actor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => break,
                },
                result = next_connect(&mut self.pending) => self.on_connect_result(result),
                event = next_link_event(&mut self.link) => self.on_link_event(event),
                _ = next_deadline(self.reconnect_at) => {
                    self.reconnect_at = None;
                    log::info!("Reconnecting to {} (attempt {})", self.config.url, self.attempts);
                    self.start_connect();
                }
                _ = next_tick(&mut self.heartbeat) => self.send_heartbeat(),
            }
        }

        log::debug!("All socket client handles dropped; shutting down");
        self.tear_down();
        self.set_state(ConnectionState::Closed);
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(ack) => {
                self.started = true;
                if self.link.is_none() && self.pending.is_none() {
                    self.start_connect();
                }
                let _ = ack.send(());
            }
            Command::Disconnect(ack) => {
                log::info!("Disconnecting from {}", self.config.url);
                self.auto_reconnect = false;
                if self.link.is_some() || self.pending.is_some() {
                    self.set_state(ConnectionState::Closing);
                }
                self.tear_down();
                self.set_state(ConnectionState::Closed);
                let _ = ack.send(());
            }
            Command::Reconnect(ack) => {
                log::info!("Manual reconnect to {}", self.config.url);
                self.started = true;
                self.auto_reconnect = true;
                self.attempts = 0;
                self.start_connect();
                let _ = ack.send(());
            }
            Command::Send { text, reply } => {
                let state = *self.state_tx.borrow();
                let result = match (&self.link, state) {
                    (Some(link), ConnectionState::Open) => {
                        link.outbound.send(text).map_err(|_| SocketError::NotConnected)
                    }
                    _ => Err(SocketError::NotConnected),
                };
                let _ = reply.send(result);
            }
            Command::SetVisibility(Visibility::Visible) => {
                let idle = self.link.is_none() && self.pending.is_none();
                if idle && self.started && self.auto_reconnect {
                    log::info!("Became visible while disconnected; reconnecting now");
                    self.attempts = 0;
                    self.start_connect();
                }
            }
            Command::SetVisibility(Visibility::Hidden) => {
                log::debug!("Became hidden");
            }
        }
    }

    /// Clears timers, drops any transport and begins a new connect attempt.
    fn start_connect(&mut self) {
        self.tear_down();
        log::info!("Connecting to {}", self.config.url);
        self.set_state(ConnectionState::Connecting);
        self.pending = Some(
            self.connector
                .connect(&self.config.url, &self.config.protocols),
        );
    }

    fn on_connect_result(&mut self, result: Result<Link, SocketError>) {
        self.pending = None;
        match result {
            Ok(link) => {
                log::info!("Connected to {}", self.config.url);
                self.link = Some(link);
                self.attempts = 0;
                self.set_state(ConnectionState::Open);

                let period = self.config.heartbeat_interval;
                if !period.is_zero() {
                    let mut timer = interval_at(Instant::now() + period, period);
                    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.heartbeat = Some(timer);
                }
            }
            Err(e) => {
                log::warn!("Connection to {} failed: {}", self.config.url, e);
                self.emit(SocketEvent::Error(e.to_string()));
                self.set_state(ConnectionState::Closed);
                self.schedule_reconnect();
            }
        }
    }

    fn on_link_event(&mut self, event: Option<LinkEvent>) {
        match event {
            Some(LinkEvent::Text(text)) => {
                let message = Arc::new(InboundMessage::decode(&text));
                log::trace!("Received {} frame", message.message.tag());
                self.store
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(Arc::clone(&message));
                self.emit(SocketEvent::Message(message));
            }
            Some(LinkEvent::Error(e)) => {
                log::warn!("Socket error on {}: {}", self.config.url, e);
                self.emit(SocketEvent::Error(e));
            }
            Some(LinkEvent::Closed { code, reason }) => {
                log::info!("Connection to {} closed ({:?}): {}", self.config.url, code, reason);
                self.on_closed();
            }
            None => {
                log::info!("Transport to {} went away", self.config.url);
                self.on_closed();
            }
        }
    }

    fn on_closed(&mut self) {
        self.tear_down();
        self.set_state(ConnectionState::Closed);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if !self.auto_reconnect {
            return;
        }
        if self.attempts < self.config.max_reconnect_attempts {
            self.attempts += 1;
            let delay = self.config.reconnect_interval * self.attempts;
            log::info!(
                "Reconnect attempt {}/{} in {}ms",
                self.attempts,
                self.config.max_reconnect_attempts,
                delay.as_millis()
            );
            self.reconnect_at = Some(Instant::now() + delay);
            self.emit(SocketEvent::ReconnectScheduled {
                attempt: self.attempts,
                delay,
            });
        } else {
            log::error!(
                "Max reconnection attempts ({}) reached for {}",
                self.config.max_reconnect_attempts,
                self.config.url
            );
            self.emit(SocketEvent::ReconnectExhausted {
                attempts: self.attempts,
            });
        }
    }

    fn send_heartbeat(&mut self) {
        if let Some(link) = &self.link {
            log::trace!("Sending heartbeat");
            if link.outbound.send(heartbeat_frame(Utc::now())).is_err() {
                log::debug!("Heartbeat dropped; transport already gone");
            }
        }
    }

    /// Drops the transport, any in-flight connect and both timers.
    fn tear_down(&mut self) {
        self.reconnect_at = None;
        self.heartbeat = None;
        self.pending = None;
        self.link = None;
    }

    fn set_state(&mut self, state: ConnectionState) {
        if *self.state_tx.borrow() != state {
            log::debug!("Socket state -> {:?}", state);
            self.state_tx.send_replace(state);
            self.emit(SocketEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SocketEvent) {
        // Nobody listening is fine; state and history stay queryable.
        let _ = self.events.send(event);
    }
}

async fn next_connect(
    pending_connect: &mut Option<BoxFuture<'static, Result<Link, SocketError>>>,
) -> Result<Link, SocketError> {
    match pending_connect {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_link_event(link: &mut Option<Link>) -> Option<LinkEvent> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => pending().await,
    }
}

async fn next_deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestors::transport::fake::{FakeConnector, FakeServer};
    use crate::model::SyncMessage;

    fn config(max_attempts: u32) -> SocketConfig {
        SocketConfig {
            url: "ws://fake/ws".to_string(),
            reconnect_interval: Duration::from_secs(3),
            max_reconnect_attempts: max_attempts,
            heartbeat_interval: Duration::from_secs(30),
            history_capacity: 100,
            ..SocketConfig::default()
        }
    }

    async fn next_scheduled(events: &mut mpsc::UnboundedReceiver<SocketEvent>) -> (u32, Duration) {
        loop {
            match events.recv().await {
                Some(SocketEvent::ReconnectScheduled { attempt, delay }) => return (attempt, delay),
                Some(SocketEvent::ReconnectExhausted { attempts }) => {
                    panic!("exhausted after {} attempts", attempts)
                }
                Some(_) => continue,
                None => panic!("event stream ended"),
            }
        }
    }

    async fn open(
        script: Vec<bool>,
        max_attempts: u32,
    ) -> (
        SocketClient,
        mpsc::UnboundedReceiver<SocketEvent>,
        Arc<FakeConnector>,
        mpsc::UnboundedReceiver<FakeServer>,
    ) {
        let (connector, servers) = FakeConnector::new(script);
        let (client, events) = SocketClient::spawn(config(max_attempts), connector.clone());
        client.connect().await.unwrap();
        client.wait_for_state(ConnectionState::Open).await.unwrap();
        (client, events, connector, servers)
    }

    #[tokio::test(start_paused = true)]
    async fn close_schedules_linear_backoff_and_reopens() {
        let (client, mut events, connector, mut servers) = open(vec![true, false, true], 5).await;
        let server = servers.recv().await.unwrap();

        server.close();

        assert_eq!(next_scheduled(&mut events).await, (1, Duration::from_secs(3)));
        // Attempt 1 is refused, so attempt 2 waits twice the interval.
        assert_eq!(next_scheduled(&mut events).await, (2, Duration::from_secs(6)));

        client.wait_for_state(ConnectionState::Open).await.unwrap();
        assert_eq!(connector.attempts(), 3);

        // A successful open resets the counter.
        let second = servers.recv().await.unwrap();
        second.close();
        assert_eq!(next_scheduled(&mut events).await, (1, Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn state_cycles_closed_connecting_open() {
        let (connector, mut servers) = FakeConnector::new([true, true]);
        let (client, mut events) = SocketClient::spawn(config(5), connector);
        client.connect().await.unwrap();
        let server = servers.recv().await.unwrap();
        client.wait_for_state(ConnectionState::Open).await.unwrap();
        server.close();

        let mut seen = Vec::new();
        while seen.len() < 5 {
            if let Some(SocketEvent::StateChanged(s)) = events.recv().await {
                seen.push(s);
            }
        }
        assert_eq!(
            seen,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Open,
                ConnectionState::Closed,
                ConnectionState::Connecting,
                ConnectionState::Open,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_stop_reconnecting() {
        let (client, mut events, connector, mut servers) = open(vec![true], 2).await;
        servers.recv().await.unwrap().close();

        let mut scheduled = Vec::new();
        loop {
            match events.recv().await.unwrap() {
                SocketEvent::ReconnectScheduled { attempt, .. } => scheduled.push(attempt),
                SocketEvent::ReconnectExhausted { attempts } => {
                    assert_eq!(attempts, 2);
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(scheduled, vec![1, 2]);

        // Nothing else is attempted, however long we wait.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempts(), 3);
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn history_keeps_most_recent_capacity() {
        let (client, mut events, _connector, mut servers) = open(vec![true], 5).await;
        let server = servers.recv().await.unwrap();

        for i in 1..=150 {
            server.push(&format!(r#"{{"type":"heartbeat","timestamp":{}}}"#, i));
        }
        let mut received = 0;
        while received < 150 {
            if let Some(SocketEvent::Message(_)) = events.recv().await {
                received += 1;
            }
        }

        let history = client.history();
        assert_eq!(history.len(), 100);
        assert_eq!(history[0].sent_at.as_deref(), Some("51"));
        assert_eq!(history[99].sent_at.as_deref(), Some("150"));
        assert_eq!(client.last_message().unwrap().sent_at.as_deref(), Some("150"));

        client.clear_history();
        assert!(client.history().is_empty());
        assert!(client.last_message().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_kinds_are_kept_in_history() {
        let (client, mut events, _connector, mut servers) = open(vec![true], 5).await;
        let server = servers.recv().await.unwrap();
        server.push(r#"{"type":"weather","data":{"temp":3}}"#);

        let message = loop {
            if let Some(SocketEvent::Message(m)) = events.recv().await {
                break m;
            }
        };
        assert_eq!(message.message.tag(), "unknown");
        let history = client.history();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].message,
            SyncMessage::Unknown {
                kind: "weather".to_string(),
                data: serde_json::json!({ "temp": 3 }),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn raw_frames_are_delivered_but_not_kept() {
        let (client, mut events, _connector, mut servers) = open(vec![true], 5).await;
        let server = servers.recv().await.unwrap();
        server.push("not json");

        let message = loop {
            if let Some(SocketEvent::Message(m)) = events.recv().await {
                break m;
            }
        };
        assert_eq!(message.message, SyncMessage::Raw("not json".to_string()));
        assert!(client.history().is_empty());
        assert!(client.last_message().unwrap().is_raw());
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let (client, mut events, connector, mut servers) = open(vec![true], 5).await;
        servers.recv().await.unwrap().close();
        next_scheduled(&mut events).await;

        client.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(client.state(), ConnectionState::Closed);

        // reconnect() re-enables the policy.
        connector.extend([true]);
        client.reconnect().await.unwrap();
        client.wait_for_state(ConnectionState::Open).await.unwrap();
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn becoming_visible_skips_the_backoff() {
        let (client, mut events, connector, mut servers) = open(vec![true, true], 5).await;
        servers.recv().await.unwrap().close();
        next_scheduled(&mut events).await;

        client.set_visibility(Visibility::Hidden).unwrap();
        client.set_visibility(Visibility::Visible).unwrap();
        client.wait_for_state(ConnectionState::Open).await.unwrap();

        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn becoming_visible_after_exhaustion_restarts_the_policy() {
        let (client, mut events, connector, mut servers) = open(vec![true], 2).await;
        servers.recv().await.unwrap().close();
        loop {
            if let Some(SocketEvent::ReconnectExhausted { .. }) = events.recv().await {
                break;
            }
        }
        assert_eq!(connector.attempts(), 3);

        // The immediate attempt fails; the backoff that follows starts over at 1.
        connector.extend([false, true]);
        client.set_visibility(Visibility::Visible).unwrap();
        assert_eq!(next_scheduled(&mut events).await, (1, Duration::from_secs(3)));

        client.wait_for_state(ConnectionState::Open).await.unwrap();
        assert_eq!(connector.attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn send_requires_open_connection() {
        let (connector, _servers) = FakeConnector::new(std::iter::empty());
        let (client, _events) = SocketClient::spawn(config(0), connector);
        assert_eq!(client.send("hello").await, Err(SocketError::NotConnected));

        let (client, _events, _connector, mut servers) = open(vec![true], 5).await;
        let mut server = servers.recv().await.unwrap();
        client.send_json(&serde_json::json!({"subscribe": "kpis"})).await.unwrap();
        assert_eq!(server.from_client.recv().await.unwrap(), r#"{"subscribe":"kpis"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_is_sent_while_open() {
        let (_client, _events, _connector, mut servers) = open(vec![true], 5).await;
        let mut server = servers.recv().await.unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;
        let frame = server.from_client.recv().await.unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "heartbeat");
        assert!(value["timestamp"].is_i64());
    }
}
