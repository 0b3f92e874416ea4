//! Device discovery using `adb devices -l`

use std::sync::LazyLock;
use std::time::Duration;

use orbit_core::prelude::*;
use orbit_core::{Device, DeviceState, ExecError};
use regex::Regex;

use crate::executor::{CommandExecutor, Tool};

/// `<serial> <state> [key:value ...]`; "no permissions" is the one state with a space
static DEVICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+(no permissions|\S+)(.*)$").expect("Invalid device line regex")
});

static MODEL_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmodel:(\S+)").expect("Invalid model field regex"));

/// List devices currently attached to the bridge
pub async fn list_bridge_devices<E: CommandExecutor>(
    executor: &E,
    timeout: Duration,
) -> std::result::Result<Vec<Device>, ExecError> {
    let args = vec!["devices".to_string(), "-l".to_string()];
    let output = executor.run(Tool::Bridge, &args, timeout).await?;
    let devices = parse_devices_output(&output);
    debug!("adb reported {} devices", devices.len());
    Ok(devices)
}

/// Parse the output of `adb devices -l`
///
/// Header lines, daemon start-up chatter (`* daemon ...`) and anything that
/// doesn't look like a device row are skipped.
pub fn parse_devices_output(output: &str) -> Vec<Device> {
    output.lines().filter_map(parse_device_line).collect()
}

fn parse_device_line(line: &str) -> Option<Device> {
    let line = line.trim();
    if line.is_empty()
        || line.starts_with("List of devices")
        || line.starts_with('*')
        || line.starts_with("adb ")
    {
        return None;
    }

    let caps = DEVICE_LINE.captures(line)?;
    let serial = caps.get(1)?.as_str();
    let state = caps.get(2)?.as_str();
    let rest = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

    let mut device = Device::bridge(serial, DeviceState::from_bridge_state(state));
    if let Some(model) = MODEL_FIELD.captures(rest).and_then(|c| c.get(1)) {
        device = device.with_model(model.as_str());
    }

    Some(device)
}
