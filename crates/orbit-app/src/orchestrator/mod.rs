//! # Orchestrator
//!
//! Owns the shared registry and activity log and exposes every user-facing
//! operation. Presentation layers call these methods and subscribe to
//! [`OrbitEvent`]s; nothing else touches the components directly.

mod poll;

pub use poll::{spawn_poll_loop, PollHandle, POLL_MIN_INTERVAL};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use orbit_bridge::{list_bridge_devices, CommandExecutor, MdnsService, ToolAvailability};
use orbit_core::prelude::*;
use orbit_core::{
    ConnError, Device, DeviceState, ExecError, LaunchError, LogEntry, NetworkHost, QrError,
    ScanError,
};
use tokio::sync::{broadcast, RwLock};

use crate::config::Settings;
use crate::connection::ConnectionManager;
use crate::event_log::EventLog;
use crate::events::{OrbitEvent, EVENT_CHANNEL_CAPACITY};
use crate::pairing::{PairingEngine, PairingOutcome, PairingSession};
use crate::qr::{MdnsAdvertiser, QrPairingService, QrSession, ServiceAdvertiser};
use crate::registry::{DeviceRegistry, RegistryChange};
use crate::scanner::{InterfaceLookup, NetworkScanner};

/// Clears the scan flag when a sweep ends, including on early return
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Orchestrator<E> {
    executor: Arc<E>,
    settings: Settings,
    registry: Arc<RwLock<DeviceRegistry>>,
    log: Arc<EventLog>,
    events: broadcast::Sender<OrbitEvent>,
    scanner: NetworkScanner<E>,
    pairing: PairingEngine<E>,
    connections: ConnectionManager<E>,
    qr: QrPairingService,
    scanning: AtomicBool,
    /// Last poll failure, so repeated failures are logged once
    poll_failure: Mutex<Option<String>>,
}

impl<E: CommandExecutor + Sync + 'static> Orchestrator<E> {
    pub fn new(executor: Arc<E>, settings: Settings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let log = Arc::new(EventLog::new(events.clone()));
        let registry = Arc::new(RwLock::new(DeviceRegistry::new(
            settings.bridge.disappear_after_polls,
        )));

        let scanner = NetworkScanner::new(
            Arc::clone(&executor),
            settings.scan.clone(),
            settings.bridge.query_timeout(),
        );
        let pairing = PairingEngine::new(
            Arc::clone(&executor),
            Arc::clone(&log),
            events.clone(),
            settings.bridge.operation_timeout(),
        );
        let connections = ConnectionManager::new(
            Arc::clone(&executor),
            Arc::clone(&registry),
            Arc::clone(&log),
            events.clone(),
            settings.bridge.operation_timeout(),
            settings.mirror.clone(),
        );
        let qr = QrPairingService::new(Arc::new(MdnsAdvertiser::new()), Arc::clone(&log));

        Self {
            executor,
            settings,
            registry,
            log,
            events,
            scanner,
            pairing,
            connections,
            qr,
            scanning: AtomicBool::new(false),
            poll_failure: Mutex::new(None),
        }
    }

    /// Record which external tools were found at startup and log the missing ones
    pub fn with_tool_availability(mut self, availability: &ToolAvailability) -> Self {
        if let Some(message) = availability.bridge_unavailable_message() {
            self.log.error(message);
        }
        if let Some(message) = availability.mirror_unavailable_message() {
            self.log.info(message);
        }
        self.connections
            .set_mirror_available(availability.scrcpy.is_some());
        self
    }

    /// Read local interfaces from `interfaces` instead of the operating system
    pub fn with_interface_lookup(mut self, interfaces: Arc<dyn InterfaceLookup>) -> Self {
        self.scanner.set_interfaces(interfaces);
        self
    }

    /// Publish QR pairing services through `advertiser` instead of mDNS
    pub fn with_advertiser(mut self, advertiser: Arc<dyn ServiceAdvertiser>) -> Self {
        self.qr.set_advertiser(advertiser);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrbitEvent> {
        self.events.subscribe()
    }

    // ─────────────────────────────────────────────────────────────
    // Devices
    // ─────────────────────────────────────────────────────────────

    /// Query the bridge once and reconcile the registry with the result
    ///
    /// Failures leave the registry unchanged. Only the first failure of a
    /// run is logged, and recovery is logged once.
    pub async fn poll_bridge_devices(
        &self,
    ) -> std::result::Result<Vec<RegistryChange>, ExecError> {
        let polled =
            list_bridge_devices(self.executor.as_ref(), self.settings.bridge.query_timeout())
                .await;

        let polled = match polled {
            Ok(devices) => {
                let recovered = self
                    .poll_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .is_some();
                if recovered {
                    self.log.info("Bridge polling recovered");
                }
                devices
            }
            Err(e) => {
                let message = e.to_string();
                let mut last = self
                    .poll_failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if last.as_deref() != Some(message.as_str()) {
                    self.log.error(format!("Bridge polling failed: {message}"));
                    *last = Some(message);
                }
                return Err(e);
            }
        };

        let (changes, snapshot) = {
            let mut registry = self.registry.write().await;
            let changes = registry.reconcile_bridge_list(polled);
            (changes, registry.snapshot())
        };

        if !changes.is_empty() {
            for change in &changes {
                self.log_change(change, &snapshot);
            }
            let _ = self.events.send(OrbitEvent::DevicesChanged { devices: snapshot });
        }

        Ok(changes)
    }

    fn log_change(&self, change: &RegistryChange, snapshot: &[Device]) {
        let label = |serial: &str| {
            snapshot
                .iter()
                .find(|d| d.serial == serial)
                .map(device_label)
                .unwrap_or_else(|| serial.to_string())
        };

        match change {
            RegistryChange::Appeared(device) if device.state.is_online() => {
                self.log
                    .success(format!("Device {} connected", device_label(device)));
            }
            RegistryChange::Appeared(device) => {
                self.log.info(format!(
                    "Device {} detected ({})",
                    device_label(device),
                    device.state
                ));
            }
            RegistryChange::StateChanged { serial, to, .. } => {
                let message = format!("Device {} is now {}", label(serial), to);
                if *to == DeviceState::Online {
                    self.log.success(message);
                } else {
                    self.log.info(message);
                }
            }
            RegistryChange::Missing {
                serial,
                misses,
                threshold,
            } => {
                self.log.info(format!(
                    "Device {} disappeared from bridge ({}/{})",
                    label(serial),
                    misses,
                    threshold
                ));
            }
            RegistryChange::Removed(device) => {
                self.log
                    .info(format!("Device {} disappeared; removed", device_label(device)));
            }
            RegistryChange::Merged { serial } => {
                self.log
                    .info(format!("Device {} is now reported by the bridge", label(serial)));
            }
        }
    }

    /// Poll now and return the resulting registry snapshot
    pub async fn refresh_devices(&self) -> std::result::Result<Vec<Device>, ExecError> {
        self.poll_bridge_devices().await?;
        Ok(self.list_devices().await)
    }

    /// Registry snapshot in insertion order
    pub async fn list_devices(&self) -> Vec<Device> {
        self.registry.read().await.snapshot()
    }

    // ─────────────────────────────────────────────────────────────
    // Network scan
    // ─────────────────────────────────────────────────────────────

    /// Sweep `subnet_hint` (or the local network) for hosts
    ///
    /// At most one sweep runs at a time; a concurrent call fails with
    /// [`ScanError::ScanInProgress`] without touching the running one.
    pub async fn scan_network(
        &self,
        subnet_hint: Option<&str>,
    ) -> std::result::Result<Vec<NetworkHost>, ScanError> {
        if self
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let e = ScanError::ScanInProgress;
            self.log.error(format!("Network scan rejected: {e}"));
            return Err(e);
        }
        let _guard = ScanGuard(&self.scanning);

        self.log.info("Starting network scan...");
        let sweep = match self.scanner.scan(subnet_hint) {
            Ok(sweep) => sweep,
            Err(e) => {
                self.log.error(format!("Network scan failed: {e}"));
                return Err(e);
            }
        };

        let subnet = sweep.subnet().to_string();
        debug!("Scan target resolved to {}", subnet);
        let _ = self.events.send(OrbitEvent::ScanStarted { subnet });

        let hosts = sweep
            .collect_with(|host| {
                let _ = self.events.send(OrbitEvent::HostFound { host: host.clone() });
            })
            .await;
        let open = hosts.iter().filter(|h| h.bridge_port_open).count();
        self.log.success(format!(
            "Network scan complete. Found {} hosts ({} with port {} open).",
            hosts.len(),
            open,
            self.scanner.settings().port
        ));
        let _ = self.events.send(OrbitEvent::ScanFinished {
            hosts: hosts.clone(),
        });

        Ok(hosts)
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    // ─────────────────────────────────────────────────────────────
    // Pairing and connections
    // ─────────────────────────────────────────────────────────────

    /// Pair with `ip:port` and connect on the same port
    pub async fn start_pairing(&self, ip: &str, port: &str, code: &str) -> PairingOutcome {
        self.pairing
            .start(ip, port, code, None, &self.connections)
            .await
    }

    /// Pair with `ip:port`, then connect on `connect_port`
    pub async fn start_pairing_with_connect_port(
        &self,
        ip: &str,
        port: &str,
        code: &str,
        connect_port: u16,
    ) -> PairingOutcome {
        self.pairing
            .start(ip, port, code, Some(connect_port), &self.connections)
            .await
    }

    pub async fn pairing_session(&self) -> Option<PairingSession> {
        self.pairing.session().await
    }

    pub async fn discover_pairing_services(
        &self,
    ) -> std::result::Result<Vec<MdnsService>, ExecError> {
        self.pairing
            .discover_services(self.settings.bridge.query_timeout())
            .await
    }

    pub async fn connect(&self, ip: &str, port: u16) -> std::result::Result<Device, ConnError> {
        self.connections.connect(ip, port).await
    }

    pub async fn launch_mirror(
        &self,
        serial: &str,
        force: bool,
    ) -> std::result::Result<(), LaunchError> {
        self.connections.launch_mirror(serial, force).await
    }

    pub async fn active_mirrors(&self) -> Vec<String> {
        self.connections.active_mirrors().await
    }

    // ─────────────────────────────────────────────────────────────
    // QR pairing
    // ─────────────────────────────────────────────────────────────

    /// Advertise a fresh pairing service and return the QR code for it
    ///
    /// The service is announced on the interface a network scan would use.
    pub async fn start_qr_pairing(&self) -> std::result::Result<QrSession, QrError> {
        let host_ip = self.scanner.local_interface().map(|iface| iface.ip);
        self.qr.start(host_ip).await
    }

    /// Withdraw the QR pairing service; `false` if none was running
    pub async fn stop_qr_pairing(&self) -> bool {
        self.qr.stop().await
    }

    pub async fn qr_pairing(&self) -> Option<QrSession> {
        self.qr.current().await
    }

    // ─────────────────────────────────────────────────────────────
    // Log and lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Activity log, newest first
    pub fn recent_logs(&self) -> Vec<LogEntry> {
        self.log.recent()
    }

    /// Start the background poll loop at the configured interval
    pub fn start_polling(self: &Arc<Self>) -> PollHandle {
        spawn_poll_loop(Arc::clone(self), self.settings.bridge.poll_interval())
    }

    /// Stop `poll` (if running) and any QR advertisement, then notify
    /// subscribers
    pub async fn shutdown(&self, poll: Option<PollHandle>) {
        if let Some(poll) = poll {
            poll.shutdown(self.settings.bridge.shutdown_grace()).await;
        }
        self.qr.shutdown().await;
        info!("Orchestrator shutting down");
        let _ = self.events.send(OrbitEvent::Shutdown);
    }
}

/// `Pixel 7 (ABC123)` when the model is known, else the serial
fn device_label(device: &Device) -> String {
    match &device.model {
        Some(model) => format!("{} ({})", model, device.serial),
        None => device.serial.clone(),
    }
}
