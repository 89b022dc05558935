//! # Logger Setup
//!
//! The library itself only logs through the `log` facade. Binaries call
//! [`setup_logging`] once at startup to install a `fern` dispatch that
//! writes timestamped lines to stdout and to a per-run file.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// fern dispatch construction and log-file housekeeping.
pub mod setup;

pub use setup::{build_dispatch, parse_level, prune_old_logs, setup_logging};
