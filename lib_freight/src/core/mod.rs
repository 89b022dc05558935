//! # Core Engine Module
//!
//! The orchestration layer. It owns the choice between push and poll,
//! merges every update into one application view and exposes the
//! consumer-facing operations (refresh, filter updates, connection retry).
//!
//! - **`sync_controller`**: the `SyncController` and its published
//!   `SyncState`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Mode switching, state merging and the consumer API.
pub mod sync_controller;

// --- Public API Re-exports ---
pub use sync_controller::{
    ConnectionStatus, SyncController, SyncControllerBuilder, SyncError, SyncMode, SyncState,
};
