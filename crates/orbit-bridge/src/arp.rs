//! Neighbor table lookup via `arp -a`
//!
//! Handles the BSD/macOS, Linux net-tools and Windows layouts:
//!
//! ```text
//! ? (192.168.1.20) at a4:91:b1:2c:3d:4e on en0 ifscope [ethernet]
//! ? (192.168.1.20) at a4:91:b1:2c:3d:4e [ether] on eth0
//!   192.168.1.20          a4-91-b1-2c-3d-4e     dynamic
//! ```

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::LazyLock;
use std::time::Duration;

use orbit_core::prelude::*;
use orbit_core::ExecError;
use regex::Regex;

use crate::executor::{CommandExecutor, Tool};

static ARP_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\(?(\d{1,3}(?:\.\d{1,3}){3})\)?\s+(?:at\s+)?([0-9A-Fa-f]{1,2}(?:[:-][0-9A-Fa-f]{1,2}){5})\b",
    )
    .expect("Invalid arp entry regex")
});

/// OUI prefixes of common Android handset makers
const KNOWN_VENDORS: &[(&str, &str)] = &[
    ("3c:5a:b4", "Google"),
    ("54:60:09", "Google"),
    ("f4:f5:d8", "Google"),
    ("00:12:fb", "Samsung"),
    ("00:16:32", "Samsung"),
    ("5c:0a:5b", "Samsung"),
    ("8c:71:f8", "Samsung"),
    ("94:65:2d", "OnePlus"),
    ("c0:ee:fb", "OnePlus"),
    ("28:6c:07", "Xiaomi"),
    ("64:09:80", "Xiaomi"),
    ("f8:a4:5f", "Xiaomi"),
    ("00:18:82", "Huawei"),
    ("00:e0:fc", "Huawei"),
];

/// Read the neighbor table, keyed by IPv4 address
pub async fn neighbor_table<E: CommandExecutor>(
    executor: &E,
    timeout: Duration,
) -> std::result::Result<HashMap<Ipv4Addr, String>, ExecError> {
    let output = executor
        .run(Tool::Arp, &["-a".to_string()], timeout)
        .await?;
    let table = parse_arp_output(&output);
    debug!("Neighbor table has {} entries", table.len());
    Ok(table)
}

/// Parse `arp -a` output into `ip -> mac`
///
/// Incomplete entries are skipped. MACs are normalized to lowercase,
/// colon-separated, two digits per octet.
pub fn parse_arp_output(output: &str) -> HashMap<Ipv4Addr, String> {
    output
        .lines()
        .filter_map(|line| {
            let caps = ARP_ENTRY.captures(line)?;
            let ip = caps.get(1)?.as_str().parse::<Ipv4Addr>().ok()?;
            let mac = normalize_mac(caps.get(2)?.as_str());
            Some((ip, mac))
        })
        .collect()
}

fn normalize_mac(mac: &str) -> String {
    mac.split([':', '-'])
        .map(|octet| format!("{:0>2}", octet.to_lowercase()))
        .collect::<Vec<_>>()
        .join(":")
}

/// Vendor name for a normalized MAC, if its OUI is known
pub fn vendor_for_mac(mac: &str) -> Option<&'static str> {
    let oui = mac.get(..8)?;
    KNOWN_VENDORS
        .iter()
        .find(|(prefix, _)| prefix.eq_ignore_ascii_case(oui))
        .map(|(_, vendor)| *vendor)
}
