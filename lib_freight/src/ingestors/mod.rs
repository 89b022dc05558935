//! # Data Ingestors Module
//!
//! The two ways dashboard data enters the system: a persistent push
//! connection and periodic snapshot polling. The controller in `core`
//! picks one of them at a time.
//!
//! ## Contained Modules:
//! - **`transport`**: the `Connector`/`Link` seam and the WebSocket
//!   implementation on `tokio-tungstenite`.
//! - **`socket_client`**: a reconnecting socket client with heartbeat,
//!   linear reconnect backoff, message history and visibility recovery.
//! - **`polling`**: snapshot sources for poll mode.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Snapshot sources used in poll mode.
pub mod polling;
/// The reconnecting push client.
pub mod socket_client;
/// Transport seam and WebSocket connector.
pub mod transport;

// --- Public API Re-exports ---
pub use polling::{poll_once, FnSource, HttpSnapshotSource, PollResult, SnapshotSource};
pub use socket_client::{ConnectionState, SocketClient, SocketError, SocketEvent, Visibility};
pub use transport::{Connector, Link, LinkEvent, WsConnector};
