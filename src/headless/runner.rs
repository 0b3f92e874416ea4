//! `orbit watch` - poll loop, NDJSON events and stdin commands
//!
//! Every orchestrator event is printed as it happens. Operations typed on
//! stdin run concurrently, so a long scan does not hold up a connect.

use std::sync::Arc;
use std::time::Duration;

use orbit_app::{Orchestrator, OrbitEvent, PairingOutcome};
use orbit_bridge::CommandExecutor;
use orbit_core::prelude::*;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::HeadlessEvent;
use crate::commands::{parse_command_line, Command};

/// How long the event printer gets to drain after shutdown
const PRINTER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// A line read from stdin
#[derive(Debug)]
enum Input {
    Command(Command),
    Invalid(String),
    Quit,
}

/// Run until stdin closes, `quit` is typed or Ctrl+C is pressed
pub async fn run_headless<E>(orchestrator: Arc<Orchestrator<E>>) -> Result<()>
where
    E: CommandExecutor + Sync + 'static,
{
    info!("═══════════════════════════════════════════════════════");
    info!("Orbit starting in HEADLESS mode");
    info!("═══════════════════════════════════════════════════════");

    let printer = spawn_event_printer(orchestrator.subscribe());
    let poll = orchestrator.start_polling();

    let (input_tx, mut input_rx) = mpsc::channel::<Input>(32);
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(input_tx);
    });

    loop {
        tokio::select! {
            input = input_rx.recv() => match input {
                Some(Input::Command(command)) => {
                    let orchestrator = Arc::clone(&orchestrator);
                    tokio::spawn(async move { dispatch(&orchestrator, command).await });
                }
                Some(Input::Invalid(message)) => HeadlessEvent::error(message, false).emit(),
                Some(Input::Quit) | None => {
                    info!("Input closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received");
                break;
            }
        }
    }

    orchestrator.shutdown(Some(poll)).await;
    if tokio::time::timeout(PRINTER_DRAIN_TIMEOUT, printer)
        .await
        .is_err()
    {
        warn!("Event printer did not drain in time");
    }

    info!("Orbit headless mode exiting");
    Ok(())
}

/// Run one operation; failures already reach the activity log
async fn dispatch<E>(orchestrator: &Orchestrator<E>, command: Command)
where
    E: CommandExecutor + Sync + 'static,
{
    debug!("Headless command: {:?}", command);
    match command {
        Command::Devices => {
            let _ = orchestrator.refresh_devices().await;
        }
        Command::Scan { subnet } => {
            let _ = orchestrator.scan_network(subnet.as_deref()).await;
        }
        Command::Connect { ip, port } => {
            let _ = orchestrator.connect(&ip, port).await;
        }
        Command::Pair {
            ip,
            port,
            code,
            connect_port,
        } => {
            let outcome = match connect_port {
                Some(connect_port) => {
                    orchestrator
                        .start_pairing_with_connect_port(&ip, &port, &code, connect_port)
                        .await
                }
                None => orchestrator.start_pairing(&ip, &port, &code).await,
            };
            if let PairingOutcome::Superseded = outcome {
                debug!("Pairing with {}:{} superseded", ip, port);
            }
        }
        Command::Mirror { serial, force } => {
            let _ = orchestrator.launch_mirror(&serial, force).await;
        }
        Command::Qr { svg } => {
            if let Ok(session) = orchestrator.start_qr_pairing().await {
                if let Some(path) = svg {
                    if let Err(e) = std::fs::write(&path, &session.svg) {
                        HeadlessEvent::error(
                            format!("Failed to write {}: {}", path.display(), e),
                            false,
                        )
                        .emit();
                    }
                }
                HeadlessEvent::qr_pairing(&session).emit();
            }
        }
        Command::QrStop => {
            if !orchestrator.stop_qr_pairing().await {
                HeadlessEvent::error("No QR pairing is active", false).emit();
            }
        }
        Command::Services => {
            if let Ok(services) = orchestrator.discover_pairing_services().await {
                HeadlessEvent::services(services).emit();
            }
        }
    }
}

/// Print events until the orchestrator announces shutdown
fn spawn_event_printer(mut events: broadcast::Receiver<OrbitEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    HeadlessEvent::from(&event).emit();
                    if matches!(event, OrbitEvent::Shutdown) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event printer lagged; {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn parse_input(line: &str) -> Option<Input> {
    match line.trim() {
        "" => None,
        "q" | "quit" | "exit" => Some(Input::Quit),
        trimmed => Some(match parse_command_line(trimmed) {
            Ok(command) => Input::Command(command),
            Err(message) => Input::Invalid(message),
        }),
    }
}

/// Read commands from stdin (blocking; runs on its own thread)
fn spawn_stdin_reader_blocking(input_tx: mpsc::Sender<Input>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        match line {
            Ok(line) => {
                let Some(input) = parse_input(&line) else {
                    continue;
                };
                let quit = matches!(input, Input::Quit);
                if input_tx.blocking_send(input).is_err() || quit {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_app::Settings;
    use orbit_bridge::test_utils::{devices_output, ScriptedExecutor};
    use orbit_bridge::Tool;

    #[test]
    fn test_parse_input() {
        assert!(parse_input("   ").is_none());
        assert!(matches!(parse_input("quit"), Some(Input::Quit)));
        assert!(matches!(
            parse_input("devices"),
            Some(Input::Command(Command::Devices))
        ));
        assert!(matches!(parse_input("frobnicate"), Some(Input::Invalid(_))));
    }

    #[tokio::test]
    async fn test_dispatch_connect_updates_registry() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond_ok("connect", "connected to 192.168.1.50:5555");
        let orchestrator = Orchestrator::new(Arc::clone(&executor), Settings::default());

        dispatch(
            &orchestrator,
            Command::Connect {
                ip: "192.168.1.50".to_string(),
                port: 5555,
            },
        )
        .await;

        assert_eq!(orchestrator.list_devices().await.len(), 1);
        assert_eq!(executor.calls_to(Tool::Bridge, "connect").len(), 1);
    }

    #[tokio::test]
    async fn test_event_printer_stops_on_shutdown() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond_ok("devices", &devices_output(&[]));
        let orchestrator = Orchestrator::new(executor, Settings::default());

        let printer = spawn_event_printer(orchestrator.subscribe());
        orchestrator.shutdown(None).await;

        assert!(tokio::time::timeout(Duration::from_secs(1), printer)
            .await
            .is_ok());
    }
}
