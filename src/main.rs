//! Orbit - Android device discovery, wireless pairing and mirroring
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use orbit::Command;
use orbit_app::config::{default_config_path, init_config_file, load_settings};
use orbit_app::{Orchestrator, ToolAvailability};
use orbit_bridge::ProcessExecutor;

/// Orbit - discover, pair and mirror Android devices
#[derive(Parser, Debug)]
#[command(name = "orbit", version)]
#[command(about = "Discover, pair and mirror Android devices", long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the activity log to stderr after a one-shot command
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cli,
}

#[derive(Subcommand, Debug)]
enum Cli {
    #[command(flatten)]
    Run(Command),

    /// Poll devices and stream events as NDJSON; reads commands from stdin
    Watch,

    /// Write a commented default config file
    InitConfig,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config_path = args.config.or_else(default_config_path);

    let command = match args.command {
        Cli::InitConfig => {
            let Some(path) = config_path else {
                eprintln!("No config directory found; pass --config <PATH>");
                std::process::exit(1);
            };
            init_config_file(&path)?;
            println!("Config file: {}", path.display());
            return Ok(());
        }
        Cli::Watch => None,
        Cli::Run(command) => Some(command),
    };

    orbit_core::logging::init()?;

    let settings = load_settings(config_path.as_deref());
    let tool_paths = settings.tools.to_tool_paths();
    let availability = ToolAvailability::check(&tool_paths);
    let executor = Arc::new(ProcessExecutor::new(availability.paths(&tool_paths)));
    let orchestrator =
        Arc::new(Orchestrator::new(executor, settings).with_tool_availability(&availability));

    let Some(command) = command else {
        orbit::run_headless(orchestrator).await?;
        return Ok(());
    };

    let result = orbit::execute(&orchestrator, command).await;
    if args.verbose {
        for entry in orchestrator.recent_logs().iter().rev() {
            eprintln!("{}", entry.formatted());
        }
    }
    result?;

    Ok(())
}
