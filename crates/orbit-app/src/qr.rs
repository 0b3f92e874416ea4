//! QR code pairing
//!
//! Android's "Pair device with QR code" screen scans a Wi-Fi style payload
//! naming a pairing service and its password. While a QR pairing is active a
//! TCP port is held open and the service is advertised over mDNS as
//! `_adb-tls-pairing._tcp` under that name, until it is stopped.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, PoisonError};

use mdns_sd::{ServiceDaemon, ServiceInfo};
use orbit_core::prelude::*;
use orbit_core::QrError;
use qrcode::render::{svg, unicode};
use qrcode::QrCode;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::event_log::EventLog;

const PASSWORD_LEN: usize = 6;

/// mDNS service type of a wireless debugging pairing service
pub const PAIRING_SERVICE_TYPE: &str = "_adb-tls-pairing._tcp.local.";

/// Smallest edge of the rendered SVG, in pixels
const SVG_MIN_SIZE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QrPairing {
    pub service_name: String,
    pub password: String,
}

impl QrPairing {
    /// Fresh service name and random alphanumeric password
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let service_name = format!("orbit-pairing-{}", rng.gen::<u16>());
        let password = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LEN)
            .map(char::from)
            .collect();

        Self {
            service_name,
            password,
        }
    }

    /// `WIFI:T:ADB;S:<name>;P:<password>;;`
    pub fn payload(&self) -> String {
        format!("WIFI:T:ADB;S:{};P:{};;", self.service_name, self.password)
    }

    fn code(&self) -> std::result::Result<QrCode, QrError> {
        QrCode::new(self.payload().as_bytes()).map_err(|e| QrError::Render(e.to_string()))
    }

    /// The payload as an SVG document
    pub fn svg(&self) -> std::result::Result<String, QrError> {
        Ok(self
            .code()?
            .render::<svg::Color>()
            .min_dimensions(SVG_MIN_SIZE, SVG_MIN_SIZE)
            .build())
    }

    /// The payload drawn with half-block characters, light on dark
    pub fn terminal(&self) -> std::result::Result<String, QrError> {
        Ok(self
            .code()?
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build())
    }
}

// ─────────────────────────────────────────────────────────────────
// Advertising
// ─────────────────────────────────────────────────────────────────

/// The pairing service a QR code points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingService {
    pub instance_name: String,
    /// Address to announce; `None` lets the advertiser pick its interfaces
    pub ip: Option<Ipv4Addr>,
    pub port: u16,
}

impl PairingService {
    pub fn host_name(&self) -> String {
        format!("{}.local.", self.instance_name)
    }

    /// `<instance>._adb-tls-pairing._tcp.local.`
    pub fn fullname(&self) -> String {
        format!("{}.{}", self.instance_name, PAIRING_SERVICE_TYPE)
    }
}

/// Publishes pairing services on the local network
pub trait ServiceAdvertiser: fmt::Debug + Send + Sync {
    fn register(&self, service: &PairingService) -> std::result::Result<(), QrError>;

    fn unregister(&self, service: &PairingService) -> std::result::Result<(), QrError>;

    /// Release network resources; later registrations start over
    fn shutdown(&self);
}

/// [`ServiceAdvertiser`] backed by an `mdns-sd` daemon, started on first use
#[derive(Default)]
pub struct MdnsAdvertiser {
    daemon: Mutex<Option<ServiceDaemon>>,
}

impl fmt::Debug for MdnsAdvertiser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = self
            .daemon
            .lock()
            .map(|daemon| daemon.is_some())
            .unwrap_or(false);
        f.debug_struct("MdnsAdvertiser")
            .field("running", &running)
            .finish()
    }
}

impl MdnsAdvertiser {
    pub fn new() -> Self {
        Self::default()
    }

    fn daemon(&self) -> std::result::Result<ServiceDaemon, QrError> {
        let mut slot = self.daemon.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(daemon) = slot.as_ref() {
            return Ok(daemon.clone());
        }

        let daemon = ServiceDaemon::new().map_err(|e| QrError::Advertise(e.to_string()))?;
        *slot = Some(daemon.clone());
        Ok(daemon)
    }
}

impl ServiceAdvertiser for MdnsAdvertiser {
    fn register(&self, service: &PairingService) -> std::result::Result<(), QrError> {
        let properties = HashMap::from([("v".to_string(), "1".to_string())]);
        let host_name = service.host_name();

        let info = match service.ip {
            Some(ip) => ServiceInfo::new(
                PAIRING_SERVICE_TYPE,
                &service.instance_name,
                &host_name,
                IpAddr::V4(ip),
                service.port,
                Some(properties),
            ),
            None => ServiceInfo::new(
                PAIRING_SERVICE_TYPE,
                &service.instance_name,
                &host_name,
                "",
                service.port,
                Some(properties),
            )
            .map(ServiceInfo::enable_addr_auto),
        }
        .map_err(|e| QrError::Advertise(e.to_string()))?;

        self.daemon()?
            .register(info)
            .map_err(|e| QrError::Advertise(e.to_string()))
    }

    fn unregister(&self, service: &PairingService) -> std::result::Result<(), QrError> {
        let slot = self.daemon.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(daemon) = slot.as_ref() else {
            return Ok(());
        };
        daemon
            .unregister(&service.fullname())
            .map(|_| ())
            .map_err(|e| QrError::Advertise(e.to_string()))
    }

    fn shutdown(&self) {
        let daemon = self
            .daemon
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(daemon) = daemon {
            if let Err(e) = daemon.shutdown() {
                warn!("Failed to stop mDNS daemon: {}", e);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────

/// An advertised QR pairing, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QrSession {
    #[serde(flatten)]
    pub pairing: QrPairing,
    pub port: u16,
    pub payload: String,
    pub svg: String,
}

struct ActiveQr {
    session: QrSession,
    service: PairingService,
    listener_task: JoinHandle<()>,
}

/// Runs at most one QR pairing advertisement at a time
pub struct QrPairingService {
    advertiser: Arc<dyn ServiceAdvertiser>,
    log: Arc<EventLog>,
    active: tokio::sync::Mutex<Option<ActiveQr>>,
}

impl QrPairingService {
    pub fn new(advertiser: Arc<dyn ServiceAdvertiser>, log: Arc<EventLog>) -> Self {
        Self {
            advertiser,
            log,
            active: tokio::sync::Mutex::new(None),
        }
    }

    pub fn set_advertiser(&mut self, advertiser: Arc<dyn ServiceAdvertiser>) {
        self.advertiser = advertiser;
    }

    /// Open a pairing port, advertise it and return the code to show
    ///
    /// A running advertisement is replaced.
    pub async fn start(
        &self,
        host_ip: Option<Ipv4Addr>,
    ) -> std::result::Result<QrSession, QrError> {
        self.log.info("Starting QR pairing...");
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            debug!("Replacing QR pairing {}", previous.session.pairing.service_name);
            self.teardown(previous);
        }

        match self.advertise(host_ip).await {
            Ok(started) => {
                let session = started.session.clone();
                self.log.success(format!(
                    "QR pairing ready: {} on port {}",
                    session.pairing.service_name, session.port
                ));
                *active = Some(started);
                Ok(session)
            }
            Err(e) => {
                self.log.error(format!("QR pairing failed: {e}"));
                Err(e)
            }
        }
    }

    async fn advertise(
        &self,
        host_ip: Option<Ipv4Addr>,
    ) -> std::result::Result<ActiveQr, QrError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| QrError::Bind(e.to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| QrError::Bind(e.to_string()))?
            .port();

        let pairing = QrPairing::generate();
        let svg = pairing.svg()?;
        let service = PairingService {
            instance_name: pairing.service_name.clone(),
            ip: host_ip,
            port,
        };
        self.advertiser.register(&service)?;

        Ok(ActiveQr {
            session: QrSession {
                payload: pairing.payload(),
                pairing,
                port,
                svg,
            },
            service,
            listener_task: tokio::spawn(accept_loop(listener)),
        })
    }

    /// Withdraw the advertisement and close the port
    ///
    /// Returns `false` when no QR pairing was running.
    pub async fn stop(&self) -> bool {
        let Some(active) = self.active.lock().await.take() else {
            return false;
        };
        let name = active.session.pairing.service_name.clone();
        self.teardown(active);
        self.log.info(format!("QR pairing {name} stopped"));
        true
    }

    pub async fn current(&self) -> Option<QrSession> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| active.session.clone())
    }

    /// Stop any advertisement and release the advertiser
    pub async fn shutdown(&self) {
        self.stop().await;
        self.advertiser.shutdown();
    }

    fn teardown(&self, active: ActiveQr) {
        active.listener_task.abort();
        if let Err(e) = self.advertiser.unregister(&active.service) {
            warn!("Failed to withdraw {}: {}", active.service.fullname(), e);
        }
    }
}

/// Hold the pairing port open; connections are only logged
async fn accept_loop(listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((_stream, peer)) => debug!("Pairing port connection from {}", peer),
            Err(e) => {
                warn!("Pairing port stopped accepting: {}", e);
                break;
            }
        }
    }
}

/// Records registrations instead of touching the network
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingAdvertiser {
    pub registered: Mutex<Vec<PairingService>>,
    pub unregistered: Mutex<Vec<String>>,
    pub fail_with: Option<QrError>,
    pub shutdowns: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl ServiceAdvertiser for RecordingAdvertiser {
    fn register(&self, service: &PairingService) -> std::result::Result<(), QrError> {
        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }
        self.registered.lock().unwrap().push(service.clone());
        Ok(())
    }

    fn unregister(&self, service: &PairingService) -> std::result::Result<(), QrError> {
        self.unregistered.lock().unwrap().push(service.fullname());
        Ok(())
    }

    fn shutdown(&self) {
        self.shutdowns
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}
