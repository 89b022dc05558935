//! # Domain Model
//!
//! The data that flows through the synchronisation layer. Nothing here does
//! I/O; these are the payload slices the controller merges and the decoded
//! form of every frame the socket client receives.
//!
//! - **`dashboard`**: KPI block, flights, trade routes, classifier metrics,
//!   alerts and the filter sub-object.
//! - **`messages`**: the closed set of inbound message kinds and the
//!   envelope that timestamps them on receipt.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Dashboard payload slices and filters.
pub mod dashboard;
/// Inbound socket messages and heartbeat frames.
pub mod messages;

pub use dashboard::{
    Alert, AlertKind, AlertSeverity, ClassifierMetrics, DashboardData, DashboardFilters,
    FilterUpdate, FlightData, FlightStatus, KpiData, TimeRange, TradeRoute,
};
pub use messages::{heartbeat_frame, InboundMessage, SyncMessage};
