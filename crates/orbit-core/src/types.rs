//! Domain types shared by every Orbit crate

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::PairingFailure;

// ─────────────────────────────────────────────────────────────────
// Devices
// ─────────────────────────────────────────────────────────────────

/// Connection state of a device as seen by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    #[default]
    Offline,
    Unauthorized,
    Online,
    Connecting,
}

impl DeviceState {
    /// Map the state column of `adb devices -l`.
    ///
    /// Anything adb may add in the future is treated as offline.
    pub fn from_bridge_state(state: &str) -> Self {
        match state {
            "device" => DeviceState::Online,
            "unauthorized" => DeviceState::Unauthorized,
            "authorizing" | "connecting" => DeviceState::Connecting,
            _ => DeviceState::Offline,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, DeviceState::Online)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Offline => write!(f, "offline"),
            DeviceState::Unauthorized => write!(f, "unauthorized"),
            DeviceState::Online => write!(f, "online"),
            DeviceState::Connecting => write!(f, "connecting"),
        }
    }
}

/// How a device record was learned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Reported by `adb devices`
    Bridge,
    /// Found by a network scan or a direct connect
    Network,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Bridge => write!(f, "bridge"),
            Origin::Network => write!(f, "network"),
        }
    }
}

/// An Android device known to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Bridge serial, or `ip:port` for network-only entries
    pub serial: String,

    /// Model name reported by the bridge (`model:` field)
    #[serde(default)]
    pub model: Option<String>,

    pub state: DeviceState,

    pub origin: Origin,

    pub last_seen: DateTime<Local>,
}

impl Device {
    /// A device reported by the bridge
    pub fn bridge(serial: impl Into<String>, state: DeviceState) -> Self {
        Self {
            serial: serial.into(),
            model: None,
            state,
            origin: Origin::Bridge,
            last_seen: Local::now(),
        }
    }

    /// A device reached over the network, keyed by `ip:port` until the
    /// bridge reports its serial
    pub fn network(serial: impl Into<String>, state: DeviceState) -> Self {
        Self {
            origin: Origin::Network,
            ..Self::bridge(serial, state)
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Model if known, otherwise the serial
    pub fn display_name(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.serial)
    }

    /// Whether the serial is a network address (`ip:port`)
    pub fn is_network_serial(&self) -> bool {
        self.serial
            .rsplit_once(':')
            .map(|(ip, port)| ip.parse::<Ipv4Addr>().is_ok() && port.parse::<u16>().is_ok())
            .unwrap_or(false)
    }
}

// ─────────────────────────────────────────────────────────────────
// Network scan results
// ─────────────────────────────────────────────────────────────────

/// A host that answered on the local network during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHost {
    pub ip: Ipv4Addr,

    /// Hardware address from the neighbor table
    #[serde(default)]
    pub mac: Option<String>,

    /// Vendor derived from the MAC OUI prefix
    #[serde(default)]
    pub vendor: Option<String>,

    /// Whether the bridge port accepted a connection
    pub bridge_port_open: bool,
}

impl NetworkHost {
    pub fn new(ip: Ipv4Addr, bridge_port_open: bool) -> Self {
        Self {
            ip,
            mac: None,
            vendor: None,
            bridge_port_open,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Activity log
// ─────────────────────────────────────────────────────────────────

/// Severity of a user-facing activity log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Error => "error",
        }
    }
}

/// A single activity log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub severity: Severity,
}

impl LogEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            message: message.into(),
            severity,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// `[HH:MM:SS] message`, the format the activity panel shows
    pub fn formatted(&self) -> String {
        format!("[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

// ─────────────────────────────────────────────────────────────────
// Pairing
// ─────────────────────────────────────────────────────────────────

/// Lifecycle of a wireless pairing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairingState {
    #[default]
    Idle,
    AwaitingCode,
    Exchanging,
    Connecting,
    Paired,
    Failed(PairingFailure),
}

impl PairingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PairingState::Paired | PairingState::Failed(_))
    }

    /// Whether a session in this state blocks a new one
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PairingState::AwaitingCode | PairingState::Exchanging | PairingState::Connecting
        )
    }
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingState::Idle => write!(f, "idle"),
            PairingState::AwaitingCode => write!(f, "awaiting code"),
            PairingState::Exchanging => write!(f, "exchanging"),
            PairingState::Connecting => write!(f, "connecting"),
            PairingState::Paired => write!(f, "paired"),
            PairingState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}
