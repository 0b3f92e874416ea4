//! Configuration file parsing for Orbit
//!
//! Settings live in `<config_dir>/orbit/config.toml` unless a path is given
//! on the command line.

pub mod settings;
pub mod types;

pub use settings::{
    default_config_path, init_config_file, load_settings, MAX_PREFIX_LEN, MIN_PREFIX_LEN,
};
pub use types::*;
