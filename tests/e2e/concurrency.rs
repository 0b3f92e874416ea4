//! Operations running alongside each other and the poll loop

use std::sync::Arc;
use std::time::Duration;

use orbit_app::Settings;
use orbit_bridge::test_utils::devices_output;
use orbit_bridge::Tool;
use orbit_core::ScanError;

use crate::{log_messages, orchestrator, orchestrator_with};

fn loopback_scan_settings() -> Settings {
    let mut settings = Settings::default();
    settings.scan.resolve_mac = true;
    settings.scan.probe_timeout_ms = 200;
    settings
}

#[tokio::test]
async fn test_overlapping_scan_is_rejected() {
    let (executor, orchestrator) = orchestrator_with(loopback_scan_settings());
    executor.respond_ok_for(Tool::Arp, "-a", "");
    executor.delay_for(Tool::Arp, "-a", Duration::from_millis(300));

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.scan_network(Some("127.0.0.1/32")).await })
    };
    while !orchestrator.is_scanning() {
        tokio::task::yield_now().await;
    }

    let second = orchestrator.scan_network(Some("127.0.0.1/32")).await;
    assert_eq!(second, Err(ScanError::ScanInProgress));

    let hosts = first.await.unwrap().unwrap();
    assert!(hosts.len() <= 1);
    assert_eq!(executor.calls_to(Tool::Arp, "-a").len(), 1);

    let completed = log_messages(&orchestrator)
        .iter()
        .filter(|m| m.starts_with("Network scan complete"))
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn test_scan_finds_listening_loopback_host() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut settings = Settings::default();
    settings.scan.port = port;
    settings.scan.resolve_mac = false;
    let (executor, orchestrator) = orchestrator_with(settings);

    let hosts = orchestrator
        .scan_network(Some("127.0.0.1/32"))
        .await
        .unwrap();

    assert_eq!(hosts.len(), 1);
    assert!(hosts[0].bridge_port_open);
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_connect_runs_while_poll_is_slow() {
    let (executor, orchestrator) = orchestrator();
    executor.respond_ok("devices", &devices_output(&[]));
    executor.delay("devices", Duration::from_millis(500));
    executor.respond_ok("connect", "connected to 192.168.1.50:5555");

    let poll = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.poll_bridge_devices().await })
    };
    tokio::task::yield_now().await;

    let connected = tokio::time::timeout(
        Duration::from_millis(250),
        orchestrator.connect("192.168.1.50", 5555),
    )
    .await
    .expect("connect should not wait for the poll");
    assert!(connected.is_ok());

    poll.await.unwrap().unwrap();
    assert_eq!(orchestrator.list_devices().await.len(), 1);
}

#[tokio::test]
async fn test_log_ring_is_bounded() {
    let (executor, orchestrator) = orchestrator();
    executor.respond_ok(
        "connect",
        "failed to connect to '192.168.1.50:5555': Connection refused",
    );

    for _ in 0..30 {
        let _ = orchestrator.connect("192.168.1.50", 5555).await;
    }

    let logs = orchestrator.recent_logs();
    assert_eq!(logs.len(), orbit_app::LOG_CAPACITY);
    assert!(logs[0].message.contains("failed"));
}
