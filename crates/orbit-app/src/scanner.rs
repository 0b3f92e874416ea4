//! Active sweep of the local subnet for wireless debugging ports
//!
//! Each host's port is probed with a plain TCP connect under a short timeout,
//! with a bounded number of probes in flight. A host that accepts is reported
//! open, one that actively refuses is reported closed, and silence is
//! excluded.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, StreamExt};
use get_if_addrs::{get_if_addrs, IfAddr};
use orbit_bridge::{neighbor_table, vendor_for_mac, CommandExecutor};
use orbit_core::prelude::*;
use orbit_core::{NetworkHost, ScanError};
use tokio::net::TcpStream;

use crate::config::{ScanSettings, MAX_PREFIX_LEN, MIN_PREFIX_LEN};

/// Prefix assumed for a bare address hint
const DEFAULT_HINT_PREFIX: u8 = 24;

// ─────────────────────────────────────────────────────────────────
// Subnets
// ─────────────────────────────────────────────────────────────────

/// An IPv4 network to sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    /// The network containing `addr`; wide prefixes are narrowed to
    /// [`MIN_PREFIX_LEN`]
    pub fn containing(
        addr: Ipv4Addr,
        prefix_len: u8,
    ) -> std::result::Result<Self, ScanError> {
        if prefix_len > 32 {
            return Err(ScanError::InvalidSubnet(format!("{addr}/{prefix_len}")));
        }

        let prefix_len = if prefix_len < MIN_PREFIX_LEN {
            warn!(
                "Prefix /{} is too wide to sweep, narrowing to /{}",
                prefix_len, MIN_PREFIX_LEN
            );
            MIN_PREFIX_LEN
        } else {
            prefix_len
        };

        let mask = u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0);
        Ok(Self {
            network: Ipv4Addr::from(u32::from(addr) & mask),
            prefix_len,
        })
    }

    /// Parse `a.b.c.d/n`, or a bare address (assumed `/24`)
    pub fn parse(hint: &str) -> std::result::Result<Self, ScanError> {
        let hint = hint.trim();
        let invalid = || ScanError::InvalidSubnet(hint.to_string());

        let (addr, prefix_len) = match hint.split_once('/') {
            Some((addr, prefix)) => (addr, prefix.parse::<u8>().map_err(|_| invalid())?),
            None => (hint, DEFAULT_HINT_PREFIX),
        };
        let addr = addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;

        Self::containing(addr, prefix_len).map_err(|_| invalid())
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Host addresses in ascending order
    ///
    /// Network and broadcast addresses are skipped unless the prefix is
    /// narrower than [`MAX_PREFIX_LEN`], where every address is a host.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let start = u32::from(self.network);
        let size = 1u64 << (32 - u32::from(self.prefix_len));
        let end = (u64::from(start) + size - 1) as u32;

        let (first, last) = if self.prefix_len > MAX_PREFIX_LEN {
            (start, end)
        } else {
            (start + 1, end - 1)
        };
        (first..=last).map(Ipv4Addr::from)
    }

    pub fn host_count(&self) -> usize {
        self.hosts().count()
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

// ─────────────────────────────────────────────────────────────────
// Local interfaces
// ─────────────────────────────────────────────────────────────────

/// An IPv4 address assigned to a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl LocalInterface {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            ip,
            netmask,
        }
    }

    /// Prefix length of the netmask (leading one bits)
    pub fn prefix_len(&self) -> u8 {
        u32::from(self.netmask).leading_ones() as u8
    }

    fn is_candidate(&self) -> bool {
        !self.ip.is_loopback() && !self.ip.is_link_local() && self.ip.is_private()
    }
}

/// Source of the host's IPv4 interface addresses
pub trait InterfaceLookup: fmt::Debug + Send + Sync {
    fn ipv4_interfaces(&self) -> Vec<LocalInterface>;
}

/// Interfaces as reported by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceLookup for SystemInterfaces {
    fn ipv4_interfaces(&self) -> Vec<LocalInterface> {
        let interfaces = match get_if_addrs() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!("Failed to enumerate network interfaces: {}", e);
                return Vec::new();
            }
        };

        interfaces
            .into_iter()
            .filter_map(|iface| match iface.addr {
                IfAddr::V4(v4) => Some(LocalInterface::new(iface.name, v4.ip, v4.netmask)),
                IfAddr::V6(_) => None,
            })
            .collect()
    }
}

/// A fixed interface list
impl InterfaceLookup for Vec<LocalInterface> {
    fn ipv4_interfaces(&self) -> Vec<LocalInterface> {
        self.clone()
    }
}

/// First private, non-loopback, non-link-local interface
pub fn select_interface(interfaces: &dyn InterfaceLookup) -> Option<LocalInterface> {
    interfaces
        .ipv4_interfaces()
        .into_iter()
        .find(LocalInterface::is_candidate)
}

/// Subnet to sweep: the hint if given, else the local interface's network
///
/// The interface netmask decides the range unless `prefix_override` is set.
/// Masks narrower than [`MAX_PREFIX_LEN`] are widened to it.
pub fn resolve_subnet(
    hint: Option<&str>,
    prefix_override: Option<u8>,
    interfaces: &dyn InterfaceLookup,
) -> std::result::Result<Subnet, ScanError> {
    if let Some(hint) = hint {
        return Subnet::parse(hint);
    }

    let iface = select_interface(interfaces).ok_or(ScanError::NoInterface)?;
    let prefix_len = prefix_override.unwrap_or_else(|| iface.prefix_len().min(MAX_PREFIX_LEN));
    debug!(
        "Using {}/{} on {} for network scans",
        iface.ip, prefix_len, iface.name
    );
    Subnet::containing(iface.ip, prefix_len)
}

// ─────────────────────────────────────────────────────────────────
// Probing
// ─────────────────────────────────────────────────────────────────

/// Probe one host's port
///
/// `None` when the host stayed silent or the route failed.
pub async fn probe_host(ip: Ipv4Addr, port: u16, timeout: Duration) -> Option<NetworkHost> {
    match tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await {
        Ok(Ok(_stream)) => {
            debug!("{}:{} accepted", ip, port);
            Some(NetworkHost::new(ip, true))
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            trace!("{}:{} refused", ip, port);
            Some(NetworkHost::new(ip, false))
        }
        Ok(Err(e)) => {
            trace!("{}:{} unreachable: {}", ip, port, e);
            None
        }
        Err(_) => None,
    }
}

/// A single-use sweep over a subnet
///
/// Probes run lazily as the sweep is consumed. Consuming methods take `self`,
/// so a finished sweep cannot be restarted.
pub struct HostSweep {
    subnet: Subnet,
    probes: BoxStream<'static, NetworkHost>,
    neighbors: Option<BoxFuture<'static, HashMap<Ipv4Addr, String>>>,
}

impl fmt::Debug for HostSweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSweep")
            .field("subnet", &self.subnet)
            .field("resolve_mac", &self.neighbors.is_some())
            .finish_non_exhaustive()
    }
}

impl HostSweep {
    pub fn subnet(&self) -> Subnet {
        self.subnet
    }

    /// Next responding host, in completion order, without MAC enrichment
    pub async fn next_host(&mut self) -> Option<NetworkHost> {
        self.probes.next().await
    }

    /// Run every probe and return responding hosts in ascending IP order,
    /// enriched from the neighbor table when enabled
    pub async fn collect(self) -> Vec<NetworkHost> {
        self.collect_with(|_| {}).await
    }

    /// [`collect`](Self::collect), calling `on_host` as each host responds
    pub async fn collect_with<F>(mut self, mut on_host: F) -> Vec<NetworkHost>
    where
        F: FnMut(&NetworkHost),
    {
        let mut hosts = Vec::new();
        while let Some(host) = self.next_host().await {
            on_host(&host);
            hosts.push(host);
        }

        if let Some(neighbors) = self.neighbors {
            let table = neighbors.await;
            for host in &mut hosts {
                if let Some(mac) = table.get(&host.ip) {
                    host.vendor = vendor_for_mac(mac).map(str::to_string);
                    host.mac = Some(mac.clone());
                }
            }
        }

        hosts.sort_by_key(|h| h.ip);
        hosts
    }
}

/// Builds sweeps from [`ScanSettings`]
#[derive(Debug)]
pub struct NetworkScanner<E> {
    executor: Arc<E>,
    settings: ScanSettings,
    query_timeout: Duration,
    interfaces: Arc<dyn InterfaceLookup>,
}

impl<E> NetworkScanner<E>
where
    E: CommandExecutor + Sync + 'static,
{
    pub fn new(executor: Arc<E>, settings: ScanSettings, query_timeout: Duration) -> Self {
        Self {
            executor,
            settings,
            query_timeout,
            interfaces: Arc::new(SystemInterfaces),
        }
    }

    /// Replace where local interfaces are read from
    pub fn set_interfaces(&mut self, interfaces: Arc<dyn InterfaceLookup>) {
        self.interfaces = interfaces;
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Interface a sweep without a hint would use
    pub fn local_interface(&self) -> Option<LocalInterface> {
        select_interface(self.interfaces.as_ref())
    }

    /// Prepare a sweep of `subnet_hint`, or the local network
    pub fn scan(
        &self,
        subnet_hint: Option<&str>,
    ) -> std::result::Result<HostSweep, ScanError> {
        let subnet = resolve_subnet(
            subnet_hint,
            self.settings.prefix_len,
            self.interfaces.as_ref(),
        )?;
        info!(
            "Sweeping {} ({} hosts) on port {}",
            subnet,
            subnet.host_count(),
            self.settings.port
        );

        let port = self.settings.port;
        let timeout = self.settings.probe_timeout();
        let probes = stream::iter(subnet.hosts())
            .map(move |ip| probe_host(ip, port, timeout))
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .filter_map(future::ready)
            .boxed();

        let neighbors = self.settings.resolve_mac.then(|| {
            let executor = Arc::clone(&self.executor);
            let timeout = self.query_timeout;
            async move {
                neighbor_table(executor.as_ref(), timeout)
                    .await
                    .unwrap_or_else(|e| {
                        debug!("Neighbor table unavailable: {}", e);
                        HashMap::new()
                    })
            }
            .boxed()
        });

        Ok(HostSweep {
            subnet,
            probes,
            neighbors,
        })
    }
}
