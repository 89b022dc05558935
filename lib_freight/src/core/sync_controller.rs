//! # Data Sync Controller
//!
//! The top-level coordinator of the synchronisation layer. It runs exactly
//! one transport at a time:
//!
//! - **Push**: a [`SocketClient`] whose messages are merged into the state
//!   one slice per message kind.
//! - **Poll**: a fixed-interval timer that replaces the whole payload with a
//!   fresh snapshot from the configured [`SnapshotSource`].
//!
//! Switching modes tears the previous transport down completely (socket
//! closed, reconnects cancelled, timer task joined) before the next one is
//! started. Consumers observe [`SyncState`] through a `watch` channel.
//! Errors never blank the data: only `error`, `is_loading` and the
//! connection status change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::configs::{SocketConfig, SyncConfig};
use crate::ingestors::{
    poll_once, ConnectionState, Connector, SnapshotSource, SocketClient, SocketError, SocketEvent,
    Visibility, WsConnector,
};
use crate::model::{DashboardData, DashboardFilters, FilterUpdate, SyncMessage};
use crate::retrieve::RequestError;

const SOCKET_ERROR_MESSAGE: &str = "WebSocket connection error";
const FEED_LOST_MESSAGE: &str = "Live feed unavailable. Use retry to reconnect.";

/// Operational modes of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Updates are pushed over a persistent socket.
    Push,
    /// Snapshots are fetched on a fixed interval.
    Poll,
}

/// Consumer-facing view of the transport health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Socket open, or poll timer running.
    Connected,
    /// Socket opening.
    Connecting,
    /// Nothing running, or socket closed cleanly.
    Disconnected,
    /// The last socket event was a failure.
    Error,
}

/// The merged application view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Last-known-good payload.
    pub data: DashboardData,
    /// Consumer filters.
    pub filters: DashboardFilters,
    /// When `data` last changed.
    pub last_updated: Option<DateTime<Utc>>,
    /// A snapshot fetch is in flight.
    pub is_loading: bool,
    /// Human-readable description of the latest failure.
    pub error: Option<String>,
    /// Transport health.
    pub connection_status: ConnectionStatus,
    /// Running mode; `None` while stopped.
    pub mode: Option<SyncMode>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            data: DashboardData::default(),
            filters: DashboardFilters::default(),
            last_updated: None,
            is_loading: false,
            error: None,
            connection_status: ConnectionStatus::Disconnected,
            mode: None,
        }
    }
}

/// Failures reported by controller operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Poll mode and refresh need a snapshot source.
    #[error("No snapshot source configured")]
    NoSource,

    /// A snapshot fetch failed.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The socket client refused a command.
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// The operation needs a running transport.
    #[error("Sync controller is not running")]
    NotRunning,
}

struct ActiveTransport {
    mode: SyncMode,
    socket: Option<SocketClient>,
    token: CancellationToken,
    task: JoinHandle<()>,
    /// Cancels the task if the controller is dropped without `stop()`.
    _guard: DropGuard,
}

struct Inner {
    sync: SyncConfig,
    socket: SocketConfig,
    connector: Arc<dyn Connector>,
    source: Option<Arc<dyn SnapshotSource>>,
    state: Arc<watch::Sender<SyncState>>,
    transport: Mutex<Option<ActiveTransport>>,
}

/// Builder for [`SyncController`].
pub struct SyncControllerBuilder {
    sync: SyncConfig,
    socket: SocketConfig,
    connector: Arc<dyn Connector>,
    source: Option<Arc<dyn SnapshotSource>>,
}

impl SyncControllerBuilder {
    /// Replaces the WebSocket connector used in push mode.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Sets the snapshot source used by poll mode and `refresh()`.
    pub fn source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Builds a stopped controller.
    pub fn build(self) -> SyncController {
        let (state, _) = watch::channel(SyncState::default());
        SyncController {
            inner: Arc::new(Inner {
                sync: self.sync,
                socket: self.socket,
                connector: self.connector,
                source: self.source,
                state: Arc::new(state),
                transport: Mutex::new(None),
            }),
        }
    }
}

/// # Sync Controller
///
/// A cheaply cloneable handle; all clones drive the same controller.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

impl SyncController {
    /// Starts building a controller.
    pub fn builder(sync: SyncConfig, socket: SocketConfig) -> SyncControllerBuilder {
        SyncControllerBuilder {
            sync,
            socket,
            connector: Arc::new(WsConnector),
            source: None,
        }
    }

    /// A receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    /// The running mode, if any.
    pub fn mode(&self) -> Option<SyncMode> {
        self.inner.state.borrow().mode
    }

    /// Switches to `mode`, tearing down the previous transport first.
    pub async fn start(&self, mode: SyncMode) -> Result<(), SyncError> {
        if mode == SyncMode::Poll && self.inner.source.is_none() {
            return Err(SyncError::NoSource);
        }

        let mut slot = self.inner.transport.lock().await;
        if let Some(active) = slot.take() {
            log::info!("Transitioning mode: {:?} -> {:?}", active.mode, mode);
            self.tear_down(active).await;
        } else {
            log::info!("Starting sync in {:?} mode", mode);
        }

        let token = CancellationToken::new();
        let active = match mode {
            SyncMode::Push => {
                let (socket, events) =
                    SocketClient::spawn(self.inner.socket.clone(), Arc::clone(&self.inner.connector));
                self.inner.state.send_modify(|s| {
                    s.mode = Some(SyncMode::Push);
                    s.connection_status = ConnectionStatus::Connecting;
                    s.error = None;
                });
                let task = tokio::spawn(run_push_pump(
                    Arc::clone(&self.inner.state),
                    events,
                    token.clone(),
                    self.inner.sync.max_alerts,
                ));
                socket.connect().await?;
                // Frames only carry deltas, so seed the payload once.
                if let Some(source) = self.inner.source.as_deref() {
                    if let Err(e) = fetch_into(&self.inner.state, source).await {
                        log::warn!("Initial snapshot for push mode failed: {}", e);
                    }
                }
                ActiveTransport {
                    mode,
                    socket: Some(socket),
                    _guard: token.clone().drop_guard(),
                    token,
                    task,
                }
            }
            SyncMode::Poll => {
                let source = self.inner.source.clone().ok_or(SyncError::NoSource)?;
                self.inner.state.send_modify(|s| {
                    s.mode = Some(SyncMode::Poll);
                    s.connection_status = ConnectionStatus::Connected;
                    s.error = None;
                });
                let task = tokio::spawn(run_poll_loop(
                    Arc::clone(&self.inner.state),
                    source,
                    self.inner.sync.poll_interval,
                    token.clone(),
                ));
                ActiveTransport {
                    mode,
                    socket: None,
                    _guard: token.clone().drop_guard(),
                    token,
                    task,
                }
            }
        };
        *slot = Some(active);
        Ok(())
    }

    /// Stops the running transport, if any.
    pub async fn stop(&self) {
        let mut slot = self.inner.transport.lock().await;
        if let Some(active) = slot.take() {
            log::info!("Stopping {:?} sync", active.mode);
            self.tear_down(active).await;
        }
        self.inner.state.send_modify(|s| {
            s.mode = None;
            s.connection_status = ConnectionStatus::Disconnected;
        });
    }

    /// Fetches one snapshot now, whatever the mode or timer phase.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let source = self.inner.source.as_deref().ok_or(SyncError::NoSource)?;
        fetch_into(&self.inner.state, source).await?;
        Ok(())
    }

    /// Shallow-merges `update` into the filters. Data is untouched.
    pub fn update_filters(&self, update: FilterUpdate) {
        self.inner.state.send_modify(|s| update.apply(&mut s.filters));
    }

    /// Recovery action: reconnects the socket in push mode, fetches at once
    /// in poll mode.
    pub async fn retry_connection(&self) -> Result<(), SyncError> {
        let (mode, socket) = {
            let slot = self.inner.transport.lock().await;
            match slot.as_ref() {
                Some(active) => (active.mode, active.socket.clone()),
                None => return Err(SyncError::NotRunning),
            }
        };
        self.inner.state.send_modify(|s| s.error = None);

        match (mode, socket) {
            (SyncMode::Push, Some(socket)) => {
                socket.reconnect().await?;
                Ok(())
            }
            _ => self.refresh().await,
        }
    }

    /// Forwards a visibility change to the socket in push mode.
    pub async fn set_visibility(&self, visibility: Visibility) -> Result<(), SyncError> {
        let slot = self.inner.transport.lock().await;
        if let Some(socket) = slot.as_ref().and_then(|a| a.socket.as_ref()) {
            socket.set_visibility(visibility)?;
        }
        Ok(())
    }

    async fn tear_down(&self, active: ActiveTransport) {
        if let Some(socket) = &active.socket {
            if let Err(e) = socket.disconnect().await {
                log::debug!("Socket already gone during teardown: {}", e);
            }
        }
        active.token.cancel();
        if let Err(e) = active.task.await {
            log::error!("Transport task ended abnormally: {}", e);
        }
        self.inner.state.send_modify(|s| s.is_loading = false);
    }
}

/// Fetches a snapshot and replaces the payload, or records the failure.
async fn fetch_into(
    state: &watch::Sender<SyncState>,
    source: &dyn SnapshotSource,
) -> Result<(), RequestError> {
    state.send_modify(|s| {
        s.is_loading = true;
        s.error = None;
    });
    let filters = state.borrow().filters.clone();

    match poll_once(source, &filters).await.data {
        Ok(data) => {
            state.send_modify(|s| {
                s.data = data;
                s.last_updated = Some(Utc::now());
                s.is_loading = false;
                s.error = None;
            });
            Ok(())
        }
        Err(e) => {
            state.send_modify(|s| {
                s.is_loading = false;
                s.error = Some(e.user_message().to_string());
            });
            Err(e)
        }
    }
}

async fn run_poll_loop(
    state: Arc<watch::Sender<SyncState>>,
    source: Arc<dyn SnapshotSource>,
    period: std::time::Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    // Failures are already recorded in the state.
                    _ = fetch_into(&state, source.as_ref()) => {}
                }
            }
        }
    }
    log::debug!("Poll timer stopped");
}

async fn run_push_pump(
    state: Arc<watch::Sender<SyncState>>,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    token: CancellationToken,
    max_alerts: usize,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => apply_socket_event(&state, event, max_alerts),
                None => break,
            },
        }
    }
    log::debug!("Push pump stopped");
}

fn apply_socket_event(state: &watch::Sender<SyncState>, event: SocketEvent, max_alerts: usize) {
    match event {
        SocketEvent::StateChanged(connection) => state.send_modify(|s| {
            s.connection_status = match connection {
                ConnectionState::Open => {
                    s.error = None;
                    ConnectionStatus::Connected
                }
                ConnectionState::Connecting => ConnectionStatus::Connecting,
                ConnectionState::Closing | ConnectionState::Closed => {
                    if s.connection_status == ConnectionStatus::Error {
                        ConnectionStatus::Error
                    } else {
                        ConnectionStatus::Disconnected
                    }
                }
            };
        }),
        SocketEvent::Error(e) => {
            log::warn!("Push feed error: {}", e);
            state.send_modify(|s| {
                s.error = Some(SOCKET_ERROR_MESSAGE.to_string());
                s.connection_status = ConnectionStatus::Error;
            });
        }
        SocketEvent::ReconnectExhausted { .. } => state.send_modify(|s| {
            s.error = Some(FEED_LOST_MESSAGE.to_string());
            s.connection_status = ConnectionStatus::Error;
        }),
        SocketEvent::ReconnectScheduled { .. } => {}
        SocketEvent::Message(message) => {
            state.send_if_modified(|s| merge(s, &message.message, max_alerts));
        }
    }
}

/// Applies one pushed message to its slice. Returns false when nothing changed.
fn merge(state: &mut SyncState, message: &SyncMessage, max_alerts: usize) -> bool {
    match message {
        SyncMessage::KpiUpdate(kpis) => state.data.kpis = Some(kpis.clone()),
        SyncMessage::FlightUpdate(flights) => state.data.flights = flights.clone(),
        SyncMessage::RouteUpdate(routes) => state.data.routes = routes.clone(),
        SyncMessage::ClassifierUpdate(metrics) => state.data.classifier = Some(metrics.clone()),
        SyncMessage::Alert(alert) => state.data.push_alert(alert.clone(), max_alerts),
        SyncMessage::Heartbeat | SyncMessage::Unknown { .. } | SyncMessage::Raw(_) => return false,
    }
    state.last_updated = Some(Utc::now());
    state.error = None;
    true
}
