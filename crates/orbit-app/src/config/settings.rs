//! Settings loader for `config.toml`

use std::path::{Path, PathBuf};

use orbit_core::prelude::*;

use super::types::Settings;

const CONFIG_FILENAME: &str = "config.toml";
const ORBIT_DIR: &str = "orbit";

/// Smallest prefix a sweep may cover (4094 hosts)
pub const MIN_PREFIX_LEN: u8 = 20;

/// Largest prefix that still leaves usable hosts
pub const MAX_PREFIX_LEN: u8 = 30;

/// Default config file location: `<config_dir>/orbit/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(ORBIT_DIR).join(CONFIG_FILENAME))
}

/// Load settings from `path`, or from the default location
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let config_path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => {
            debug!("No config directory on this platform, using defaults");
            return Settings::default();
        }
    };

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str::<Settings>(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings.validated()
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Write a commented default config file at `path` if none exists
pub fn init_config_file(path: &Path) -> Result<()> {
    if path.exists() {
        debug!("Config file {:?} already exists", path);
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::config(format!("Failed to create {:?}: {}", parent, e)))?;
    }

    let default_content = r#"# Orbit Configuration

[bridge]
poll_interval_ms = 3000        # How often attached devices are polled
disappear_after_polls = 2      # Missed polls before a device is dropped
query_timeout_secs = 10        # adb devices / arp -a
operation_timeout_secs = 30    # adb pair / adb connect
shutdown_grace_ms = 2000

[tools]
# Explicit paths; leave unset to search PATH (and ANDROID_HOME for adb)
# adb = "/opt/android-sdk/platform-tools/adb"
# scrcpy = "/usr/local/bin/scrcpy"
# arp = "/usr/sbin/arp"

[scan]
port = 5555                    # Wireless debugging port to probe
probe_timeout_ms = 400
max_concurrency = 48
# prefix_len = 24              # Override the local interface's netmask
resolve_mac = true             # Look up MAC/vendor with arp -a

[mirror]
window_title_prefix = "Orbit"
extra_args = []                # e.g. ["--max-size=1024"]
"#;

    std::fs::write(path, default_content)?;
    info!("Created default config at {:?}", path);
    Ok(())
}

impl Settings {
    /// Clamp values into ranges the orchestrator can work with
    pub fn validated(mut self) -> Self {
        let bridge = &mut self.bridge;
        bridge.poll_interval_ms =
            clamp_logged("poll_interval_ms", bridge.poll_interval_ms, 250, 60_000);
        bridge.disappear_after_polls =
            clamp_logged("disappear_after_polls", bridge.disappear_after_polls, 1, 20);
        bridge.query_timeout_secs =
            clamp_logged("query_timeout_secs", bridge.query_timeout_secs, 1, 120);
        bridge.operation_timeout_secs =
            clamp_logged("operation_timeout_secs", bridge.operation_timeout_secs, 1, 300);
        bridge.shutdown_grace_ms =
            clamp_logged("shutdown_grace_ms", bridge.shutdown_grace_ms, 100, 30_000);

        let scan = &mut self.scan;
        if scan.port == 0 {
            warn!("scan.port 0 is not probeable, using 5555");
            scan.port = 5555;
        }
        scan.probe_timeout_ms =
            clamp_logged("probe_timeout_ms", scan.probe_timeout_ms, 50, 10_000);
        scan.max_concurrency = clamp_logged("max_concurrency", scan.max_concurrency, 1, 512);
        scan.prefix_len = scan
            .prefix_len
            .map(|len| clamp_logged("prefix_len", len, MIN_PREFIX_LEN, MAX_PREFIX_LEN));

        self
    }
}

fn clamp_logged<T>(name: &str, value: T, min: T, max: T) -> T
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let clamped = if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    };
    if clamped != value {
        warn!("{} = {} is out of range, using {}", name, value, clamped);
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_missing_file() {
        let temp = tempdir().unwrap();
        let settings = load_settings(Some(&temp.path().join("config.toml")));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_settings_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[bridge]
poll_interval_ms = 1000

[mirror]
window_title_prefix = "Lab"
extra_args = ["--max-size=1024"]
"#,
        )
        .unwrap();

        let settings = load_settings(Some(&path));
        assert_eq!(settings.bridge.poll_interval_ms, 1000);
        assert_eq!(settings.bridge.disappear_after_polls, 2);
        assert_eq!(settings.mirror.window_title_prefix, "Lab");
        assert_eq!(settings.mirror.extra_args, vec!["--max-size=1024"]);
    }

    #[test]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "not valid toml {{{{").unwrap();

        assert_eq!(load_settings(Some(&path)), Settings::default());
    }

    #[test]
    fn test_load_settings_clamps_values() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[bridge]\ndisappear_after_polls = 0\n[scan]\nprefix_len = 8\nmax_concurrency = 0\nport = 0\n",
        )
        .unwrap();

        let settings = load_settings(Some(&path));
        assert_eq!(settings.bridge.disappear_after_polls, 1);
        assert_eq!(settings.scan.prefix_len, Some(MIN_PREFIX_LEN));
        assert_eq!(settings.scan.max_concurrency, 1);
        assert_eq!(settings.scan.port, 5555);
    }

    #[test]
    fn test_validated_keeps_defaults() {
        assert_eq!(Settings::default().validated(), Settings::default());
    }

    #[test]
    fn test_init_config_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("orbit").join("config.toml");

        init_config_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let settings: Settings =
            toml::from_str(&content).expect("Default config should be valid TOML");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_init_config_file_idempotent() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.toml");

        init_config_file(&path).unwrap();
        std::fs::write(&path, "[scan]\nport = 5556\n").unwrap();
        init_config_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("port = 5556"));
    }
}
