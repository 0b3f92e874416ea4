//! Events broadcast by the orchestrator to its subscribers

use orbit_core::{Device, LogEntry, NetworkHost, PairingState};

/// Capacity of the broadcast channel; slow subscribers see `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State change notifications for presentation layers
#[derive(Debug, Clone)]
pub enum OrbitEvent {
    /// Registry contents changed; carries the new snapshot
    DevicesChanged { devices: Vec<Device> },

    /// A line was appended to the activity log
    LogAppended { entry: LogEntry },

    ScanStarted { subnet: String },

    /// A host responded during a sweep, before MAC enrichment
    HostFound { host: NetworkHost },

    /// A sweep finished; hosts are in ascending IP order
    ScanFinished { hosts: Vec<NetworkHost> },

    PairingStateChanged { session_id: u64, state: PairingState },

    /// The orchestrator is stopping; no further events follow
    Shutdown,
}
