//! Headless mode - NDJSON event stream
//!
//! `orbit watch` prints one JSON object per line for every orchestrator
//! event, so scripts and other front ends can follow device activity
//! without parsing human-oriented output.
//!
//! # Example Output
//!
//! ```json
//! {"event":"devices_changed","devices":[{"serial":"ABC123","state":"online","origin":"bridge"}],"timestamp":1704700001000}
//! {"event":"log","level":"success","message":"Device ABC123 connected","timestamp":1704700001000}
//! ```

pub mod runner;

use chrono::Utc;
use orbit_app::{MdnsService, OrbitEvent, QrSession};
use orbit_core::{Device, NetworkHost};
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    DevicesChanged {
        devices: Vec<Device>,
        timestamp: i64,
    },

    /// Activity log line
    Log {
        level: String,
        message: String,
        timestamp: i64,
    },

    ScanStarted {
        subnet: String,
        timestamp: i64,
    },

    HostFound {
        host: NetworkHost,
        timestamp: i64,
    },

    ScanFinished {
        hosts: Vec<NetworkHost>,
        timestamp: i64,
    },

    PairingState {
        session_id: u64,
        state: String,
        timestamp: i64,
    },

    /// A command from stdin could not be run
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },

    /// An advertised "Pair device with QR code" service
    QrPairing {
        service_name: String,
        password: String,
        port: u16,
        payload: String,
        svg: String,
        timestamp: i64,
    },

    /// Result of a service discovery request
    Services {
        services: Vec<MdnsService>,
        timestamp: i64,
    },

    Shutdown { timestamp: i64 },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
            timestamp: Self::now(),
        }
    }

    pub fn qr_pairing(session: &QrSession) -> Self {
        Self::QrPairing {
            service_name: session.pairing.service_name.clone(),
            password: session.pairing.password.clone(),
            port: session.port,
            payload: session.payload.clone(),
            svg: session.svg.clone(),
            timestamp: Self::now(),
        }
    }

    pub fn services(services: Vec<MdnsService>) -> Self {
        Self::Services {
            services,
            timestamp: Self::now(),
        }
    }
}

impl From<&OrbitEvent> for HeadlessEvent {
    fn from(event: &OrbitEvent) -> Self {
        let timestamp = Self::now();
        match event {
            OrbitEvent::DevicesChanged { devices } => Self::DevicesChanged {
                devices: devices.clone(),
                timestamp,
            },
            OrbitEvent::LogAppended { entry } => Self::Log {
                level: entry.severity.as_str().to_string(),
                message: entry.message.clone(),
                timestamp: entry.timestamp.timestamp_millis(),
            },
            OrbitEvent::ScanStarted { subnet } => Self::ScanStarted {
                subnet: subnet.clone(),
                timestamp,
            },
            OrbitEvent::HostFound { host } => Self::HostFound {
                host: host.clone(),
                timestamp,
            },
            OrbitEvent::ScanFinished { hosts } => Self::ScanFinished {
                hosts: hosts.clone(),
                timestamp,
            },
            OrbitEvent::PairingStateChanged { session_id, state } => Self::PairingState {
                session_id: *session_id,
                state: state.to_string(),
                timestamp,
            },
            OrbitEvent::Shutdown => Self::Shutdown { timestamp },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_app::QrPairing;
    use orbit_core::{DeviceState, LogEntry, PairingFailure, PairingState};
    use std::net::Ipv4Addr;

    fn to_value(event: &OrbitEvent) -> serde_json::Value {
        let json =
            serde_json::to_string(&HeadlessEvent::from(event)).expect("serialization failed");
        serde_json::from_str(&json).expect("invalid JSON")
    }

    #[test]
    fn test_devices_changed_serialization() {
        let value = to_value(&OrbitEvent::DevicesChanged {
            devices: vec![Device::bridge("ABC123", DeviceState::Online)],
        });

        assert_eq!(value["event"], "devices_changed");
        assert_eq!(value["devices"][0]["serial"], "ABC123");
        assert_eq!(value["devices"][0]["state"], "online");
        assert!(value["timestamp"].is_number());
    }

    #[test]
    fn test_log_serialization() {
        let value = to_value(&OrbitEvent::LogAppended {
            entry: LogEntry::success("Connected to 192.168.1.50:5555"),
        });

        assert_eq!(value["event"], "log");
        assert_eq!(value["level"], "success");
        assert_eq!(value["message"], "Connected to 192.168.1.50:5555");
    }

    #[test]
    fn test_scan_finished_serialization() {
        let value = to_value(&OrbitEvent::ScanFinished {
            hosts: vec![NetworkHost::new(Ipv4Addr::new(192, 168, 1, 20), true)],
        });

        assert_eq!(value["event"], "scan_finished");
        assert_eq!(value["hosts"][0]["ip"], "192.168.1.20");
    }

    #[test]
    fn test_pairing_state_serialization() {
        let value = to_value(&OrbitEvent::PairingStateChanged {
            session_id: 3,
            state: PairingState::Failed(PairingFailure::Rejected),
        });

        assert_eq!(value["event"], "pairing_state");
        assert_eq!(value["session_id"], 3);
        assert!(value["state"].as_str().unwrap().starts_with("failed"));
    }

    #[test]
    fn test_error_serialization() {
        let event = HeadlessEvent::error("Unknown command: foo", false);
        let value = serde_json::to_value(&event).expect("serialization failed");

        assert_eq!(value["event"], "error");
        assert_eq!(value["fatal"], false);
    }

    #[test]
    fn test_qr_pairing_serialization() {
        let pairing = QrPairing {
            service_name: "orbit-pairing-7".to_string(),
            password: "abc123".to_string(),
        };
        let session = QrSession {
            payload: pairing.payload(),
            svg: pairing.svg().unwrap(),
            pairing,
            port: 37001,
        };
        let value = serde_json::to_value(HeadlessEvent::qr_pairing(&session))
            .expect("serialization failed");

        assert_eq!(value["event"], "qr_pairing");
        assert_eq!(value["service_name"], "orbit-pairing-7");
        assert_eq!(value["port"], 37001);
        assert_eq!(value["payload"], "WIFI:T:ADB;S:orbit-pairing-7;P:abc123;;");
        assert!(value["svg"].as_str().unwrap().contains("<svg"));
    }

    #[test]
    fn test_host_found_serialization() {
        let value = to_value(&OrbitEvent::HostFound {
            host: NetworkHost::new(Ipv4Addr::new(192, 168, 1, 20), true),
        });

        assert_eq!(value["event"], "host_found");
        assert_eq!(value["host"]["ip"], "192.168.1.20");
    }

    #[test]
    fn test_shutdown_serialization() {
        let value = to_value(&OrbitEvent::Shutdown);
        assert_eq!(value["event"], "shutdown");
    }
}
