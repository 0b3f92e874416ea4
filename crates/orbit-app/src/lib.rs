//! orbit-app - Device discovery and connection orchestration for Orbit
//!
//! This crate holds the device registry, network scanner, pairing engine,
//! QR pairing advertiser, connection manager and activity log, and the [`Orchestrator`] that ties
//! them together behind one set of operations. Configuration loading lives
//! here too.

pub mod config;
pub mod connection;
pub mod event_log;
pub mod events;
pub mod orchestrator;
pub mod pairing;
pub mod qr;
pub mod registry;
pub mod scanner;

// Re-export primary types
pub use config::{load_settings, Settings};
pub use connection::{ConnectionManager, DEFAULT_CONNECT_PORT};
pub use event_log::{EventLog, LOG_CAPACITY};
pub use events::OrbitEvent;
pub use orchestrator::{Orchestrator, PollHandle};
pub use pairing::{PairingOutcome, PairingSession};
pub use qr::{
    MdnsAdvertiser, PairingService, QrPairing, QrPairingService, QrSession, ServiceAdvertiser,
};
pub use registry::{DeviceRegistry, RegistryChange};
pub use scanner::{InterfaceLookup, LocalInterface, NetworkScanner, Subnet, SystemInterfaces};

// Re-export bridge types for presentation layers
pub use orbit_bridge::{MdnsService, ProcessExecutor, ServiceKind, ToolAvailability};
