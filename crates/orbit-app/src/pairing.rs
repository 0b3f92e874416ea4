//! Wireless pairing state machine
//!
//! ```text
//! Idle → AwaitingCode → Exchanging → Connecting → Paired
//!                          │
//!                          └──────────→ Failed(reason)
//! ```
//!
//! At most one session exists. A new request replaces any non-terminal
//! session; the replaced call notices after its subprocess returns (session
//! id check) and reports [`PairingOutcome::Superseded`] without touching
//! state, the registry or the log.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use orbit_bridge::{mdns_services, CommandExecutor, MdnsService, ServiceKind};
use orbit_core::prelude::*;
use orbit_core::{Device, ExecError, PairingFailure, PairingState};
use tokio::sync::{broadcast, Mutex};

use crate::connection::ConnectionManager;
use crate::event_log::EventLog;
use crate::events::OrbitEvent;

/// Number of digits in a wireless debugging pairing code
pub const PAIRING_CODE_LEN: usize = 6;

/// The one pairing attempt the engine tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingSession {
    /// Monotonic per engine
    pub id: u64,
    /// `ip:port` of the pairing service
    pub target: String,
    pub code: String,
    pub state: PairingState,
    pub started_at: DateTime<Local>,
    /// Pair exchanges run in this session
    pub attempts: u32,
}

/// Result of [`PairingEngine::start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// Pairing succeeded. `device` is the connected device, or `None` if the
    /// follow-up connect failed.
    Paired {
        target: String,
        device: Option<Device>,
    },
    Failed(PairingFailure),
    /// A newer request replaced this one; its result was discarded
    Superseded,
}

impl PairingOutcome {
    pub fn is_paired(&self) -> bool {
        matches!(self, PairingOutcome::Paired { .. })
    }
}

/// Validated pairing target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingTarget {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// Check a pairing request before anything is executed
pub fn validate_request(
    ip: &str,
    port: &str,
    code: &str,
) -> std::result::Result<PairingTarget, String> {
    let ip = ip
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| format!("invalid address '{}'", ip.trim()))?;

    let port = match port.trim().parse::<u16>() {
        Ok(port) if port != 0 => port,
        _ => return Err(format!("invalid port '{}'", port.trim())),
    };

    if code.len() != PAIRING_CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("expected a {PAIRING_CODE_LEN}-digit pairing code"));
    }

    Ok(PairingTarget { ip, port })
}

#[derive(Debug, Default)]
struct SessionSlot {
    next_id: u64,
    current: Option<PairingSession>,
}

pub struct PairingEngine<E> {
    executor: Arc<E>,
    log: Arc<EventLog>,
    events: broadcast::Sender<OrbitEvent>,
    slot: Mutex<SessionSlot>,
    operation_timeout: Duration,
}

impl<E: CommandExecutor + Sync> PairingEngine<E> {
    pub fn new(
        executor: Arc<E>,
        log: Arc<EventLog>,
        events: broadcast::Sender<OrbitEvent>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            log,
            events,
            slot: Mutex::new(SessionSlot::default()),
            operation_timeout,
        }
    }

    /// Current (or last) session
    pub async fn session(&self) -> Option<PairingSession> {
        self.slot.lock().await.current.clone()
    }

    fn transition(&self, session: &mut PairingSession, state: PairingState) {
        debug!("Pairing session {}: {} -> {}", session.id, session.state, state);
        session.state = state;
        let _ = self.events.send(OrbitEvent::PairingStateChanged {
            session_id: session.id,
            state,
        });
    }

    /// Pair with `ip:port` using `code`, then connect
    ///
    /// The connect goes to `connect_port` when given (wireless debugging uses
    /// a different port for pairing and connecting), else to the pairing
    /// port.
    pub async fn start(
        &self,
        ip: &str,
        port: &str,
        code: &str,
        connect_port: Option<u16>,
        connections: &ConnectionManager<E>,
    ) -> PairingOutcome {
        self.log.info(format!(
            "Starting pairing with {}:{}...",
            ip.trim(),
            port.trim()
        ));

        let target = match validate_request(ip, port, code) {
            Ok(target) => target,
            Err(reason) => {
                self.log.error(format!("Pairing failed: {reason}"));
                return PairingOutcome::Failed(PairingFailure::InvalidCode);
            }
        };
        let address = format!("{}:{}", target.ip, target.port);

        let id = {
            let mut slot = self.slot.lock().await;
            if let Some(previous) = slot.current.as_ref().filter(|s| s.state.is_active()) {
                self.log.info(format!(
                    "Pairing with {} superseded by a new request",
                    previous.target
                ));
            }

            slot.next_id += 1;
            let mut session = PairingSession {
                id: slot.next_id,
                target: address.clone(),
                code: code.to_string(),
                state: PairingState::Idle,
                started_at: Local::now(),
                attempts: 0,
            };

            self.transition(&mut session, PairingState::AwaitingCode);
            session.attempts += 1;
            self.transition(&mut session, PairingState::Exchanging);

            let id = session.id;
            slot.current = Some(session);
            id
        };

        let result =
            orbit_bridge::pair(self.executor.as_ref(), &address, code, self.operation_timeout)
                .await;

        {
            let mut slot = self.slot.lock().await;
            let Some(session) = slot.current.as_mut().filter(|s| s.id == id) else {
                debug!("Pairing session {} was superseded; discarding result", id);
                return PairingOutcome::Superseded;
            };

            match result {
                Ok(_) => {
                    self.log.success(format!("Pairing successful with {address}"));
                    self.transition(session, PairingState::Connecting);
                }
                Err(failure) => {
                    self.log.error(format!("Pairing failed: {failure}"));
                    self.transition(session, PairingState::Failed(failure));
                    return PairingOutcome::Failed(failure);
                }
            }
        }

        let ip = target.ip.to_string();
        let port = connect_port.unwrap_or(target.port);
        let dialed = connections.dial(&ip, port).await;

        // Held until the outcome is recorded
        let mut slot = self.slot.lock().await;
        let Some(session) = slot.current.as_mut().filter(|s| s.id == id) else {
            debug!("Pairing session {} was superseded while connecting", id);
            return PairingOutcome::Superseded;
        };

        let device = match dialed {
            Ok(serial) => Some(connections.register(&serial).await),
            Err(e) => {
                connections.report_failure(&ip, port, &e);
                None
            }
        };
        self.transition(session, PairingState::Paired);

        PairingOutcome::Paired {
            target: address,
            device,
        }
    }

    /// Wireless debugging services advertised on the local network
    pub async fn discover_services(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Vec<MdnsService>, ExecError> {
        self.log.info("Discovering pairing services...");
        match mdns_services(self.executor.as_ref(), timeout).await {
            Ok(services) => {
                let pairing = services
                    .iter()
                    .filter(|s| s.kind == ServiceKind::Pairing)
                    .count();
                self.log.success(format!(
                    "Service discovery complete. Found {} services ({} pairing).",
                    services.len(),
                    pairing
                ));
                Ok(services)
            }
            Err(e) => {
                self.log.error(format!("Service discovery failed: {e}"));
                Err(e)
            }
        }
    }
}
