//! # lib_freight
//!
//! The data synchronisation layer behind the World Freight dashboard.
//!
//! Every folder is gated behind a cargo feature of the same name so that
//! binaries only pull in the stack they need; `full` enables everything.
//!
//! - **`configs`**: typed configuration with the documented defaults.
//! - **`model`**: dashboard payload slices and inbound socket messages.
//! - **`retrieve`**: response cache, sliding-window rate limiter and the
//!   retrying HTTP `RequestClient`.
//! - **`ingestors`**: the reconnecting WebSocket client and poll sources.
//! - **`core`**: the `SyncController` that picks push or poll mode and
//!   merges inbound updates into a single `SyncState`.
//! - **`loggers`**: fern log setup shared by the binaries.

#![forbid(unsafe_code)]

#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "core")]
pub mod core;
#[cfg(feature = "ingestors")]
pub mod ingestors;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "model")]
pub mod model;
#[cfg(feature = "retrieve")]
pub mod retrieve;
