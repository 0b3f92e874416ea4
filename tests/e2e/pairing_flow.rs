//! Pairing and connecting through the orchestrator

use std::time::Duration;

use orbit_app::{OrbitEvent, PairingOutcome};
use orbit_bridge::Tool;
use orbit_core::{DeviceState, Origin, PairingFailure, PairingState};

use crate::{log_messages, orchestrator};

#[tokio::test]
async fn test_pair_then_connect_registers_network_device() {
    let (executor, orchestrator) = orchestrator();
    executor.respond_ok(
        "pair",
        "Successfully paired to 192.168.1.50:40000 [guid=adb-R5CT-abc]",
    );
    executor.respond_ok("connect", "connected to 192.168.1.50:40000");

    let outcome = orchestrator
        .start_pairing("192.168.1.50", "40000", "123456")
        .await;

    assert!(outcome.is_paired());
    let session = orchestrator.pairing_session().await.unwrap();
    assert_eq!(session.state, PairingState::Paired);

    let devices = orchestrator.list_devices().await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].origin, Origin::Network);
    assert_eq!(devices[0].state, DeviceState::Online);

    let messages = log_messages(&orchestrator);
    let paired = messages
        .iter()
        .position(|m| m.starts_with("Pairing successful"))
        .expect("pairing success logged");
    let connected = messages
        .iter()
        .position(|m| m.starts_with("Connected"))
        .expect("connect logged");
    assert!(paired < connected);
}

#[tokio::test]
async fn test_invalid_code_never_reaches_executor() {
    let (executor, orchestrator) = orchestrator();

    for code in ["12345", "1234567", "12345a", ""] {
        let outcome = orchestrator
            .start_pairing("192.168.1.50", "40000", code)
            .await;
        assert_eq!(outcome, PairingOutcome::Failed(PairingFailure::InvalidCode));
    }

    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_pairing_progress_is_observable() {
    let (executor, orchestrator) = orchestrator();
    executor.respond_ok("pair", "Successfully paired to 192.168.1.50:40000");
    executor.respond_ok("connect", "connected to 192.168.1.50:40000");
    let mut events = orchestrator.subscribe();

    orchestrator
        .start_pairing("192.168.1.50", "40000", "123456")
        .await;

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let OrbitEvent::PairingStateChanged { state, .. } = event {
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![
            PairingState::AwaitingCode,
            PairingState::Exchanging,
            PairingState::Connecting,
            PairingState::Paired,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_request_supersedes_first() {
    let (executor, orchestrator) = orchestrator();
    executor.respond_ok("pair", "Successfully paired");
    executor.respond_ok("connect", "connected to 192.168.1.60:40000");
    executor.delay("pair", Duration::from_millis(500));

    let first = {
        let orchestrator = std::sync::Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .start_pairing("192.168.1.50", "40000", "111111")
                .await
        })
    };
    while orchestrator.pairing_session().await.map(|s| s.state)
        != Some(PairingState::Exchanging)
    {
        tokio::task::yield_now().await;
    }

    let second = orchestrator
        .start_pairing("192.168.1.60", "40000", "222222")
        .await;

    assert_eq!(first.await.unwrap(), PairingOutcome::Superseded);
    assert!(second.is_paired());

    let messages = log_messages(&orchestrator);
    assert_eq!(messages.iter().filter(|m| m.contains("superseded")).count(), 1);
    assert_eq!(executor.calls_to(Tool::Bridge, "connect").len(), 1);
    assert_eq!(
        orchestrator.pairing_session().await.unwrap().target,
        "192.168.1.60:40000"
    );
}
