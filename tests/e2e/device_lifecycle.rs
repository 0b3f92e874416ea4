//! Bridge polling, disappearance and network/bridge convergence

use std::time::Duration;

use orbit_bridge::test_utils::devices_output;
use orbit_core::{DeviceState, Origin};

use crate::{log_messages, orchestrator};

#[tokio::test]
async fn test_device_appears_then_disappears_after_two_polls() {
    let (executor, orchestrator) = orchestrator();
    executor.respond_ok(
        "devices",
        "List of devices attached\nABC123         device usb:1-1 product:p model:Pixel7 device:d\n",
    );
    executor.respond_ok("devices", &devices_output(&[]));

    orchestrator.poll_bridge_devices().await.unwrap();

    let devices = orchestrator.list_devices().await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].serial, "ABC123");
    assert_eq!(devices[0].state, DeviceState::Online);
    assert_eq!(devices[0].model.as_deref(), Some("Pixel7"));

    orchestrator.poll_bridge_devices().await.unwrap();
    assert_eq!(orchestrator.list_devices().await.len(), 1);

    orchestrator.poll_bridge_devices().await.unwrap();
    assert!(orchestrator.list_devices().await.is_empty());

    let disappeared = log_messages(&orchestrator)
        .iter()
        .filter(|m| m.contains("disappeared"))
        .count();
    assert_eq!(disappeared, 2);
}

#[tokio::test]
async fn test_device_present_in_alternate_polls_is_retained() {
    let (executor, orchestrator) = orchestrator();
    let present = devices_output(&[("ABC123", "device")]);
    let absent = devices_output(&[]);
    for output in [&present, &absent, &present, &absent, &present] {
        executor.respond_ok("devices", output);
    }

    for _ in 0..5 {
        orchestrator.poll_bridge_devices().await.unwrap();
        assert_eq!(orchestrator.list_devices().await.len(), 1);
    }
}

#[tokio::test]
async fn test_connected_network_device_merges_into_bridge_entry() {
    let (executor, orchestrator) = orchestrator();
    executor.respond_ok("connect", "connected to 192.168.1.50:5555");
    executor.respond_ok(
        "devices",
        &devices_output(&[("192.168.1.50:5555", "device"), ("ABC123", "device")]),
    );

    let device = orchestrator.connect("192.168.1.50", 5555).await.unwrap();
    assert_eq!(device.origin, Origin::Network);

    orchestrator.poll_bridge_devices().await.unwrap();

    let devices = orchestrator.list_devices().await;
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].serial, "192.168.1.50:5555");
    assert_eq!(devices[0].origin, Origin::Bridge);
    assert_eq!(devices[1].serial, "ABC123");
}

#[tokio::test(start_paused = true)]
async fn test_poll_loop_keeps_running_through_failures() {
    let (executor, orchestrator) = orchestrator();
    executor.respond_err(
        "devices",
        orbit_core::ExecError::NotFound {
            tool: "adb".to_string(),
        },
    );
    executor.respond_ok("devices", &devices_output(&[("ABC123", "device")]));

    let poll = orchestrator.start_polling();
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(orchestrator.list_devices().await.len(), 1);
    let messages = log_messages(&orchestrator);
    assert!(messages[0].starts_with("Bridge polling failed"));
    assert!(messages.contains(&"Bridge polling recovered".to_string()));

    orchestrator.shutdown(Some(poll)).await;
}

#[tokio::test]
async fn test_mirror_after_poll() {
    let (executor, orchestrator) = orchestrator();
    executor.respond_ok("devices", &devices_output(&[("ABC123", "device")]));

    orchestrator.poll_bridge_devices().await.unwrap();
    orchestrator.launch_mirror("ABC123", false).await.unwrap();

    assert_eq!(orchestrator.active_mirrors().await, vec!["ABC123"]);
    assert!(log_messages(&orchestrator).contains(&"Mirror started for ABC123".to_string()));
}
