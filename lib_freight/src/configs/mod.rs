//! # Configuration Modules
//!
//! Typed configuration for every component of the synchronisation layer.
//! Binaries layer their own CLI/env handling on top and hand the resulting
//! structs to the library.

// // Statements: Exporting sub-modules to make them accessible via lib_freight::configs
/// Component settings with documented defaults.
pub mod settings;

pub use settings::{ClientConfig, ConfigError, Settings, SocketConfig, SyncConfig};
