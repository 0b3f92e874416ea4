//! # orbit-core - Core Domain Types
//!
//! Foundation crate for Orbit. Provides domain types, error handling and
//! logging setup shared by the bridge adapter and the orchestrator.
//!
//! This crate has **zero internal dependencies**.
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`Device`], [`DeviceState`], [`Origin`] - Registry records
//! - [`NetworkHost`] - A host found by a network scan
//! - [`LogEntry`], [`Severity`] - User-facing activity log lines
//! - [`PairingState`] - Wireless pairing lifecycle
//!
//! ### Error Handling (`error`)
//! - [`ExecError`], [`ScanError`], [`ConnError`], [`PairingFailure`],
//!   [`LaunchError`], [`QrError`] - Per-component failures
//! - [`Error`] / [`Result`] - Application error and alias
//!
//! ### Utilities
//! - [`RingBuffer`] - Fixed-capacity buffer backing the activity log
//! - [`logging::init()`] - File-based tracing setup
//!
//! ## Prelude
//!
//! ```rust
//! use orbit_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod ring_buffer;
pub mod types;

/// Prelude for common imports used throughout all Orbit crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use error::{
    ConnError, Error, ExecError, LaunchError, PairingFailure, QrError, Result, ScanError,
};
pub use ring_buffer::RingBuffer;
pub use types::{Device, DeviceState, LogEntry, NetworkHost, Origin, PairingState, Severity};
