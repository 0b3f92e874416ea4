//! Operations shared by the one-shot CLI and the `watch` stdin reader

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use orbit_app::{Orchestrator, PairingOutcome, DEFAULT_CONNECT_PORT};
use orbit_bridge::CommandExecutor;
use orbit_core::prelude::*;
use orbit_core::{Device, NetworkHost};

/// A single orchestrator operation
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List devices attached to the bridge
    Devices,

    /// Sweep a subnet for hosts with the debugging port open
    Scan {
        /// Subnet to sweep (`192.168.1.0/24`); defaults to the local network
        #[arg(long)]
        subnet: Option<String>,
    },

    /// Connect the bridge to a device over TCP
    Connect {
        ip: String,

        #[arg(default_value_t = DEFAULT_CONNECT_PORT)]
        port: u16,
    },

    /// Pair with a device using the code shown under "Pair device with pairing code"
    Pair {
        ip: String,
        port: String,
        code: String,

        /// Port to connect on after pairing; defaults to the pairing port
        #[arg(long)]
        connect_port: Option<u16>,
    },

    /// Open a screen mirroring window
    Mirror {
        serial: String,

        /// Replace a running session for the same device
        #[arg(long)]
        force: bool,
    },

    /// Show a code for "Pair device with QR code" and advertise its service
    Qr {
        /// Also write the code as an SVG image
        #[arg(long)]
        svg: Option<PathBuf>,
    },

    /// Stop advertising the QR pairing service
    QrStop,

    /// List wireless debugging services advertised on the network
    Services,
}

/// One stdin line in `watch` mode, parsed with the same grammar as the CLI
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct CommandLine {
    #[command(subcommand)]
    command: Command,
}

/// Parse a `watch` stdin line such as `connect 192.168.1.50 5555`
pub fn parse_command_line(line: &str) -> std::result::Result<Command, String> {
    CommandLine::try_parse_from(line.split_whitespace())
        .map(|parsed| parsed.command)
        .map_err(|e| e.to_string().lines().next().unwrap_or_default().to_string())
}

/// Run `command` and print its result for a terminal
pub async fn execute<E>(orchestrator: &Arc<Orchestrator<E>>, command: Command) -> Result<()>
where
    E: CommandExecutor + Sync + 'static,
{
    match command {
        Command::Devices => {
            let devices = orchestrator.refresh_devices().await?;
            print_devices(&devices);
        }
        Command::Scan { subnet } => {
            let hosts = orchestrator.scan_network(subnet.as_deref()).await?;
            print_hosts(&hosts);
        }
        Command::Connect { ip, port } => {
            let device = orchestrator.connect(&ip, port).await?;
            println!("Connected to {}", device.serial);
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
            match outcome {
                PairingOutcome::Paired { target, device } => {
                    println!("Paired with {target}");
                    if let Some(device) = device {
                        println!("Connected to {}", device.serial);
                    }
                }
                PairingOutcome::Failed(failure) => return Err(failure.into()),
                PairingOutcome::Superseded => println!("Pairing superseded by a newer request"),
            }
        }
        Command::Mirror { serial, force } => {
            // The bridge has to know the device before a mirror can start
            orchestrator.refresh_devices().await?;
            orchestrator.launch_mirror(&serial, force).await?;
            println!("Mirroring {serial}");
        }
        Command::Qr { svg } => {
            let session = orchestrator.start_qr_pairing().await?;
            if let Some(path) = svg {
                std::fs::write(&path, &session.svg)?;
                println!("QR code written to {}", path.display());
            }
            println!("{}", session.pairing.terminal()?);
            println!("Service name: {}", session.pairing.service_name);
            println!("Password:     {}", session.pairing.password);
            println!("Port:         {}", session.port);
            println!("Scan the code under \"Pair device with QR code\". Press Ctrl+C to stop.");

            let waited = tokio::signal::ctrl_c().await;
            orchestrator.stop_qr_pairing().await;
            waited?;
        }
        Command::QrStop => {
            if !orchestrator.stop_qr_pairing().await {
                println!("No QR pairing is active");
            }
        }
        Command::Services => {
            let services = orchestrator.discover_pairing_services().await?;
            for service in services {
                println!(
                    "{:<10} {:<40} {}",
                    service.kind.to_string(),
                    service.name,
                    service.address
                );
            }
        }
    }

    Ok(())
}

fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        println!("No devices");
        return;
    }
    for device in devices {
        println!(
            "{:<24} {:<14} {:<8} {}",
            device.serial,
            device.state.to_string(),
            device.origin.to_string(),
            device.model.as_deref().unwrap_or("-")
        );
    }
}

fn print_hosts(hosts: &[NetworkHost]) {
    if hosts.is_empty() {
        println!("No hosts responded");
        return;
    }
    for host in hosts {
        println!(
            "{:<16} {:<7} {:<18} {}",
            host.ip,
            if host.bridge_port_open { "open" } else { "closed" },
            host.mac.as_deref().unwrap_or("-"),
            host.vendor.as_deref().unwrap_or("")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_connect_defaults_port() {
        assert_eq!(
            parse_command_line("connect 192.168.1.50").unwrap(),
            Command::Connect {
                ip: "192.168.1.50".to_string(),
                port: 5555
            }
        );
    }

    #[test]
    fn test_parse_pair_with_connect_port() {
        assert_eq!(
            parse_command_line("pair 192.168.1.50 37123 123456 --connect-port 41234").unwrap(),
            Command::Pair {
                ip: "192.168.1.50".to_string(),
                port: "37123".to_string(),
                code: "123456".to_string(),
                connect_port: Some(41234),
            }
        );
    }

    #[test]
    fn test_parse_scan_and_mirror() {
        assert_eq!(
            parse_command_line("scan --subnet 10.0.0.0/24").unwrap(),
            Command::Scan {
                subnet: Some("10.0.0.0/24".to_string())
            }
        );
        assert_eq!(
            parse_command_line("mirror ABC123 --force").unwrap(),
            Command::Mirror {
                serial: "ABC123".to_string(),
                force: true
            }
        );
    }

    #[test]
    fn test_parse_qr_commands() {
        assert_eq!(
            parse_command_line("qr --svg pair.svg").unwrap(),
            Command::Qr {
                svg: Some(PathBuf::from("pair.svg"))
            }
        );
        assert_eq!(parse_command_line("qr").unwrap(), Command::Qr { svg: None });
        assert_eq!(parse_command_line("qr-stop").unwrap(), Command::QrStop);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(parse_command_line("reboot").is_err());
        assert!(parse_command_line("connect").is_err());
    }
}
