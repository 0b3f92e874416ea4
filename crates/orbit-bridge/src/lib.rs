//! # orbit-bridge - External Tool Adapters
//!
//! Runs `adb`, `scrcpy` and `arp` as subprocesses and turns their text output
//! into [`orbit_core`] types.
//!
//! ## Public API
//!
//! ### Execution
//! - [`CommandExecutor`] - Seam through which every tool invocation passes
//! - [`ProcessExecutor`] - `tokio::process` implementation
//! - [`SpawnedProcess`] - Handle to a background process (mirroring windows)
//! - [`ToolPaths`], [`ToolAvailability`] - Binary resolution at startup
//!
//! ### Bridge Commands
//! - [`list_bridge_devices()`] - `adb devices -l`
//! - [`pair()`], [`connect()`] - Wireless debugging
//! - [`mdns_services()`] - Devices advertising wireless debugging
//!
//! ### Network
//! - [`neighbor_table()`] - `arp -a`, with [`vendor_for_mac()`]
//!
//! ### Mirroring
//! - [`launch_mirror()`] - Start scrcpy for one device

pub mod adb;
pub mod arp;
pub mod devices;
pub mod executor;
pub mod mirror;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod tools;

pub use adb::{
    classify_connect_result, classify_pair_result, connect, mdns_services, pair,
    parse_mdns_services, MdnsService, ServiceKind,
};
pub use arp::{neighbor_table, parse_arp_output, vendor_for_mac};
pub use devices::{list_bridge_devices, parse_devices_output};
pub use executor::{
    CommandExecutor, LocalCommandExecutor, ProcessExecutor, SpawnedProcess, Tool,
    OPERATION_TIMEOUT, QUERY_TIMEOUT,
};
pub use mirror::{launch_mirror, mirror_args, window_title};
pub use tools::{ToolAvailability, ToolPaths};
