//! Configuration types for Orbit
//!
//! Every section and field has a default, so a partial (or empty) file is a
//! valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use orbit_bridge::ToolPaths;
use serde::{Deserialize, Serialize};

/// Application settings (`config.toml`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub bridge: BridgeSettings,

    #[serde(default)]
    pub tools: ToolSettings,

    #[serde(default)]
    pub scan: ScanSettings,

    #[serde(default)]
    pub mirror: MirrorSettings,
}

/// Bridge polling and subprocess timeouts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BridgeSettings {
    /// Period of the attached-device poll
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive polls a device may be missing before it is removed
    #[serde(default = "default_disappear_after_polls")]
    pub disappear_after_polls: u32,

    /// Timeout for read-only queries (`adb devices`, `arp -a`)
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Timeout for `adb pair` / `adb connect`
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// How long the poll loop gets to stop before it is aborted
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            disappear_after_polls: default_disappear_after_polls(),
            query_timeout_secs: default_query_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl BridgeSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_disappear_after_polls() -> u32 {
    2
}

fn default_query_timeout_secs() -> u64 {
    10
}

fn default_operation_timeout_secs() -> u64 {
    30
}

fn default_shutdown_grace_ms() -> u64 {
    2000
}

/// Explicit tool locations; unset tools are resolved on `PATH`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolSettings {
    #[serde(default)]
    pub adb: Option<PathBuf>,

    #[serde(default)]
    pub scrcpy: Option<PathBuf>,

    #[serde(default)]
    pub arp: Option<PathBuf>,
}

impl ToolSettings {
    /// Configured programs, falling back to bare program names
    pub fn to_tool_paths(&self) -> ToolPaths {
        let defaults = ToolPaths::default();
        ToolPaths {
            adb: self.adb.clone().unwrap_or(defaults.adb),
            scrcpy: self.scrcpy.clone().unwrap_or(defaults.scrcpy),
            arp: self.arp.clone().unwrap_or(defaults.arp),
        }
    }
}

/// Network sweep settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScanSettings {
    /// Port probed on every host
    #[serde(default = "default_scan_port")]
    pub port: u16,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Maximum probes in flight
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Overrides the prefix taken from the local interface's netmask
    #[serde(default)]
    pub prefix_len: Option<u8>,

    /// Enrich results with MAC and vendor from the neighbor table
    #[serde(default = "default_true")]
    pub resolve_mac: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            port: default_scan_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            prefix_len: None,
            resolve_mac: true,
        }
    }
}

impl ScanSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn default_scan_port() -> u16 {
    5555
}

fn default_probe_timeout_ms() -> u64 {
    400
}

fn default_max_concurrency() -> usize {
    48
}

fn default_true() -> bool {
    true
}

/// Screen mirroring settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MirrorSettings {
    /// Window title is `<prefix> - <serial>`
    #[serde(default = "default_window_title_prefix")]
    pub window_title_prefix: String,

    /// Extra arguments passed to scrcpy after the defaults
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            window_title_prefix: default_window_title_prefix(),
            extra_args: Vec::new(),
        }
    }
}

fn default_window_title_prefix() -> String {
    "Orbit".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.bridge.poll_interval(), Duration::from_secs(3));
        assert_eq!(settings.bridge.disappear_after_polls, 2);
        assert_eq!(settings.bridge.query_timeout(), Duration::from_secs(10));
        assert_eq!(settings.bridge.operation_timeout(), Duration::from_secs(30));
        assert_eq!(settings.scan.port, 5555);
        assert_eq!(settings.scan.probe_timeout(), Duration::from_millis(400));
        assert_eq!(settings.scan.max_concurrency, 48);
        assert!(settings.scan.resolve_mac);
        assert_eq!(settings.mirror.window_title_prefix, "Orbit");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[scan]
port = 5556
"#,
        )
        .unwrap();

        assert_eq!(settings.scan.port, 5556);
        assert_eq!(settings.scan.max_concurrency, 48);
        assert_eq!(settings.bridge, BridgeSettings::default());
    }

    #[test]
    fn test_tool_settings_to_paths() {
        let tools = ToolSettings {
            adb: Some(PathBuf::from("/sdk/platform-tools/adb")),
            ..Default::default()
        };
        let paths = tools.to_tool_paths();
        assert_eq!(paths.adb, PathBuf::from("/sdk/platform-tools/adb"));
        assert_eq!(paths.scrcpy, PathBuf::from("scrcpy"));
    }
}
