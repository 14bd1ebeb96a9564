//! Command handlers for the markgen CLI.

pub mod generate;
pub mod init;
pub mod plugins;

use crate::cli::Cli;
use markgen_core::config::MarkgenConfig;
use markgen_core::error::Result;

/// Loads the file named by `--config`, or searches for `markgen.toml` from
/// the current directory upwards.
pub fn load_config(cli: &Cli) -> Result<MarkgenConfig> {
    match &cli.config {
        Some(path) => MarkgenConfig::from_path(path),
        None => MarkgenConfig::new(),
    }
}
