//! Wireless debugging commands: `adb pair`, `adb connect`, `adb mdns services`
//!
//! adb's exit codes are unreliable (`adb connect` exits 0 when it fails), so
//! every result is classified from the text it printed. The output format is
//! not a stable contract; matching is case-insensitive and falls back to the
//! most conservative classification.

use std::sync::LazyLock;
use std::time::Duration;

use orbit_core::prelude::*;
use orbit_core::{ConnError, ExecError, PairingFailure};
use regex::Regex;
use serde::Serialize;

use crate::executor::{CommandExecutor, Tool};

static CONNECTED_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:already\s+)?connected to\s+'?([^'\s]+)'?")
        .expect("Invalid connected-to regex")
});

const INVALID_CODE_MARKERS: &[&str] = &[
    "wrong password",
    "invalid pairing code",
    "bad pairing code",
];

const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout", "(10060)"];

const UNREACHABLE_MARKERS: &[&str] = &[
    "connection refused",
    "unable to connect",
    "cannot connect",
    "failed to connect",
    "no route to host",
    "network is unreachable",
    "host is down",
    "unable to start pairing client",
    "cannot resolve host",
];

const AUTH_MARKERS: &[&str] = &["failed to authenticate", "unauthorized"];

fn contains_any(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}

// ─────────────────────────────────────────────────────────────────
// Pairing
// ─────────────────────────────────────────────────────────────────

/// Run `adb pair <target> <code>`
///
/// Returns adb's confirmation line on success.
pub async fn pair<E: CommandExecutor>(
    executor: &E,
    target: &str,
    code: &str,
    timeout: Duration,
) -> std::result::Result<String, PairingFailure> {
    let args = vec!["pair".to_string(), target.to_string(), code.to_string()];
    let result = executor.run(Tool::Bridge, &args, timeout).await;
    classify_pair_result(result)
}

/// Classify the result of `adb pair`
pub fn classify_pair_result(
    result: std::result::Result<String, ExecError>,
) -> std::result::Result<String, PairingFailure> {
    match result {
        Ok(output) => {
            if output.to_lowercase().contains("successfully paired") {
                Ok(output)
            } else {
                Err(classify_pair_text(&output))
            }
        }
        Err(ExecError::Timeout { .. }) => Err(PairingFailure::Timeout),
        Err(ExecError::NonZeroExit { stderr, .. }) => Err(classify_pair_text(&stderr)),
        Err(e) => {
            warn!("adb pair could not run: {}", e);
            Err(PairingFailure::Unreachable)
        }
    }
}

fn classify_pair_text(output: &str) -> PairingFailure {
    let text = output.to_lowercase();
    if contains_any(&text, INVALID_CODE_MARKERS) {
        PairingFailure::InvalidCode
    } else if contains_any(&text, TIMEOUT_MARKERS) {
        PairingFailure::Timeout
    } else if contains_any(&text, UNREACHABLE_MARKERS) {
        PairingFailure::Unreachable
    } else {
        debug!("Unrecognized adb pair output: {}", output);
        PairingFailure::Rejected
    }
}

// ─────────────────────────────────────────────────────────────────
// Connecting
// ─────────────────────────────────────────────────────────────────

/// Run `adb connect <target>` and return the serial adb assigned
pub async fn connect<E: CommandExecutor>(
    executor: &E,
    target: &str,
    timeout: Duration,
) -> std::result::Result<String, ConnError> {
    let args = vec!["connect".to_string(), target.to_string()];
    let result = executor.run(Tool::Bridge, &args, timeout).await;
    classify_connect_result(target, result)
}

/// Classify the result of `adb connect`
pub fn classify_connect_result(
    target: &str,
    result: std::result::Result<String, ExecError>,
) -> std::result::Result<String, ConnError> {
    let output = match result {
        Ok(output) => output,
        Err(ExecError::Timeout { .. }) => return Err(ConnError::Timeout),
        Err(ExecError::NonZeroExit { stderr, .. }) => {
            return Err(classify_connect_failure(target, &stderr))
        }
        Err(e) => return Err(ConnError::Unreachable(e.to_string())),
    };

    let text = output.to_lowercase();
    if !text.contains("failed") && !text.contains("cannot") && !text.contains("unable") {
        if let Some(serial) = CONNECTED_TO.captures(&output).and_then(|c| c.get(1)) {
            return Ok(serial.as_str().to_string());
        }
    }

    Err(classify_connect_failure(target, &output))
}

fn classify_connect_failure(target: &str, output: &str) -> ConnError {
    let text = output.to_lowercase();
    let detail = if output.is_empty() {
        target.to_string()
    } else {
        output.to_string()
    };

    if contains_any(&text, AUTH_MARKERS) {
        ConnError::AuthRequired(detail)
    } else if contains_any(&text, TIMEOUT_MARKERS) {
        ConnError::Timeout
    } else {
        ConnError::Unreachable(detail)
    }
}

// ─────────────────────────────────────────────────────────────────
// mDNS service discovery
// ─────────────────────────────────────────────────────────────────

/// Kind of service a device advertises for wireless debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// `_adb-tls-pairing._tcp`: accepts `adb pair`
    Pairing,
    /// `_adb-tls-connect._tcp`: accepts `adb connect` once paired
    Connect,
    /// `_adb._tcp`: legacy unauthenticated TCP debugging
    Legacy,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceKind::Pairing => write!(f, "pairing"),
            ServiceKind::Connect => write!(f, "connect"),
            ServiceKind::Legacy => write!(f, "legacy"),
        }
    }
}

/// A wireless debugging service discovered by adb's mDNS browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MdnsService {
    pub name: String,
    pub kind: ServiceKind,
    /// `ip:port`
    pub address: String,
}

/// Run `adb mdns services`
pub async fn mdns_services<E: CommandExecutor>(
    executor: &E,
    timeout: Duration,
) -> std::result::Result<Vec<MdnsService>, ExecError> {
    let args = vec!["mdns".to_string(), "services".to_string()];
    let output = executor.run(Tool::Bridge, &args, timeout).await?;
    Ok(parse_mdns_services(&output))
}

/// Parse the output of `adb mdns services`
pub fn parse_mdns_services(output: &str) -> Vec<MdnsService> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let service_type = parts.next()?;
            let address = parts.next()?;

            let kind = if service_type.starts_with("_adb-tls-pairing") {
                ServiceKind::Pairing
            } else if service_type.starts_with("_adb-tls-connect") {
                ServiceKind::Connect
            } else if service_type.starts_with("_adb.") {
                ServiceKind::Legacy
            } else {
                return None;
            };

            Some(MdnsService {
                name: name.to_string(),
                kind,
                address: address.to_string(),
            })
        })
        .collect()
}
