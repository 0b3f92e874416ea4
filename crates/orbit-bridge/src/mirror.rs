//! Screen mirroring via scrcpy

use orbit_core::prelude::*;
use orbit_core::ExecError;

use crate::executor::{CommandExecutor, SpawnedProcess, Tool};

/// Window title shown by the mirroring tool: `<prefix> - <serial>`
pub fn window_title(prefix: &str, serial: &str) -> String {
    format!("{prefix} - {serial}")
}

/// Arguments for `scrcpy`, targeting one device
pub fn mirror_args(serial: &str, title: &str, extra_args: &[String]) -> Vec<String> {
    let mut args = vec![
        "-s".to_string(),
        serial.to_string(),
        "--window-title".to_string(),
        title.to_string(),
    ];
    args.extend(extra_args.iter().cloned());
    args
}

/// Start a mirroring window for `serial` in the background
pub async fn launch_mirror<E: CommandExecutor>(
    executor: &E,
    serial: &str,
    title: &str,
    extra_args: &[String],
) -> std::result::Result<SpawnedProcess, ExecError> {
    let args = mirror_args(serial, title, extra_args);
    info!("Launching mirror for {}", serial);
    executor.spawn(Tool::Mirror, &args).await
}
