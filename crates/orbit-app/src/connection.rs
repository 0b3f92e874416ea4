//! Connect and mirror requests
//!
//! Both operations validate against the registry first and only touch it
//! again after the external tool reported success.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use orbit_bridge::{launch_mirror, window_title, CommandExecutor, SpawnedProcess};
use orbit_core::prelude::*;
use orbit_core::{ConnError, Device, DeviceState, ExecError, LaunchError};
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::config::MirrorSettings;
use crate::event_log::EventLog;
use crate::events::OrbitEvent;
use crate::registry::DeviceRegistry;

/// Port adb uses for TCP debugging when none is given
pub const DEFAULT_CONNECT_PORT: u16 = 5555;

/// Validate `ip` and `port` and join them as `ip:port`
pub fn connect_target(ip: &str, port: u16) -> std::result::Result<String, ConnError> {
    let ip = ip.trim();
    let addr = ip
        .parse::<Ipv4Addr>()
        .map_err(|_| ConnError::InvalidAddress(ip.to_string()))?;
    if port == 0 {
        return Err(ConnError::InvalidAddress(format!("{addr}:0")));
    }
    Ok(format!("{addr}:{port}"))
}

pub struct ConnectionManager<E> {
    executor: Arc<E>,
    registry: Arc<RwLock<DeviceRegistry>>,
    log: Arc<EventLog>,
    events: broadcast::Sender<OrbitEvent>,
    operation_timeout: Duration,
    mirror: MirrorSettings,
    /// `Some(false)` when the mirror binary is known to be missing
    mirror_available: Option<bool>,
    mirrors: Mutex<HashMap<String, SpawnedProcess>>,
}

impl<E: CommandExecutor + Sync> ConnectionManager<E> {
    pub fn new(
        executor: Arc<E>,
        registry: Arc<RwLock<DeviceRegistry>>,
        log: Arc<EventLog>,
        events: broadcast::Sender<OrbitEvent>,
        operation_timeout: Duration,
        mirror: MirrorSettings,
    ) -> Self {
        Self {
            executor,
            registry,
            log,
            events,
            operation_timeout,
            mirror,
            mirror_available: None,
            mirrors: Mutex::new(HashMap::new()),
        }
    }

    /// Record whether the mirror binary was found at startup
    pub fn set_mirror_available(&mut self, available: bool) {
        self.mirror_available = Some(available);
    }

    /// `adb connect ip:port`
    ///
    /// On success the device is upserted as an online network entry. On
    /// failure the registry is left untouched.
    pub async fn connect(
        &self,
        ip: &str,
        port: u16,
    ) -> std::result::Result<Device, ConnError> {
        match self.dial(ip, port).await {
            Ok(serial) => Ok(self.register(&serial).await),
            Err(e) => {
                self.report_failure(ip, port, &e);
                Err(e)
            }
        }
    }

    /// Run the connect without recording the outcome
    ///
    /// Callers that may discard the result (a superseded pairing) finish with
    /// [`register`](Self::register) or [`report_failure`](Self::report_failure).
    pub(crate) async fn dial(
        &self,
        ip: &str,
        port: u16,
    ) -> std::result::Result<String, ConnError> {
        self.log.info(format!("Connecting to {}:{}...", ip.trim(), port));
        let target = connect_target(ip, port)?;
        orbit_bridge::connect(self.executor.as_ref(), &target, self.operation_timeout).await
    }

    /// Upsert `serial` as an online network device and announce it
    pub(crate) async fn register(&self, serial: &str) -> Device {
        let device = {
            let mut registry = self.registry.write().await;
            registry.upsert(Device::network(serial, DeviceState::Online));
            let _ = self.events.send(OrbitEvent::DevicesChanged {
                devices: registry.snapshot(),
            });
            registry
                .get(serial)
                .cloned()
                .unwrap_or_else(|| Device::network(serial, DeviceState::Online))
        };

        self.log.success(format!("Connected to {serial}"));
        device
    }

    pub(crate) fn report_failure(&self, ip: &str, port: u16, e: &ConnError) {
        let message = match e {
            ConnError::InvalidAddress(_) => format!("Connection failed: {e}"),
            _ => format!("Connection to {}:{} failed: {e}", ip.trim(), port),
        };
        self.log.error(message);
    }

    /// Open a mirroring window for an online device
    ///
    /// A live session for the same serial is an error unless `force` is set,
    /// in which case the old process is killed first.
    pub async fn launch_mirror(
        &self,
        serial: &str,
        force: bool,
    ) -> std::result::Result<(), LaunchError> {
        self.log.info(format!("Starting mirror for {serial}..."));
        let result = self.try_launch_mirror(serial, force).await;
        if let Err(e) = &result {
            self.log.error(format!("Mirror failed: {e}"));
        }
        result
    }

    async fn try_launch_mirror(
        &self,
        serial: &str,
        force: bool,
    ) -> std::result::Result<(), LaunchError> {
        let online = self
            .registry
            .read()
            .await
            .get(serial)
            .map(|d| d.state.is_online())
            .unwrap_or(false);
        if !online {
            return Err(LaunchError::DeviceNotOnline(serial.to_string()));
        }

        if self.mirror_available == Some(false) {
            return Err(LaunchError::ToolMissing);
        }

        let mut mirrors = self.mirrors.lock().await;
        prune_exited(&mut mirrors);
        if let Some(existing) = mirrors.get_mut(serial) {
            if !force {
                return Err(LaunchError::AlreadyRunning(serial.to_string()));
            }
            self.log.info(format!("Restarting mirror for {serial}"));
            existing.kill();
            mirrors.remove(serial);
        }

        let title = window_title(&self.mirror.window_title_prefix, serial);
        let process = launch_mirror(
            self.executor.as_ref(),
            serial,
            &title,
            &self.mirror.extra_args,
        )
        .await
        .map_err(|e| match e {
            ExecError::NotFound { .. } => LaunchError::ToolMissing,
            other => LaunchError::Spawn(other.to_string()),
        })?;

        mirrors.insert(serial.to_string(), process);
        self.log.success(format!("Mirror started for {serial}"));
        Ok(())
    }

    /// Serials with a mirroring process that is still running
    pub async fn active_mirrors(&self) -> Vec<String> {
        let mut mirrors = self.mirrors.lock().await;
        prune_exited(&mut mirrors);
        let mut serials: Vec<String> = mirrors.keys().cloned().collect();
        serials.sort();
        serials
    }
}

/// Drop sessions whose process ended on its own
fn prune_exited(mirrors: &mut HashMap<String, SpawnedProcess>) {
    mirrors.retain(|serial, process| {
        let exited = process.has_exited();
        if exited {
            debug!("Mirror for {} exited", serial);
        }
        !exited
    });
}
