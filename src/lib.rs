//! Orbit Library
//!
//! Command-line front end for the Orbit orchestrator: one-shot commands and
//! the `watch` NDJSON event stream.

pub mod commands;
pub mod headless;

// Re-export main entry points
pub use commands::{execute, parse_command_line, Command};
pub use headless::runner::run_headless;
