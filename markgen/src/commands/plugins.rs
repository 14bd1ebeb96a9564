//! Plugins command - lists registered plugins and manifest selections.

use super::load_config;
use crate::cli::{Cli, PluginsArgs};
use crate::plugin_finder;
use markgen_core::error::Result;
use markgen_core::plugin::registered_plugins;
use tracing::{error, warn};

/// Runs the plugins command.
pub async fn run(cli: &Cli, args: PluginsArgs) -> Result<()> {
    let mut paths = match load_config(cli) {
        Ok(config) => config.plugin_paths,
        Err(e) => {
            warn!("Ignoring configuration: {}", e);
            Vec::new()
        }
    };
    paths.extend(args.plugin_paths);

    let mut finder = plugin_finder();
    for e in finder.load_paths(&paths) {
        error!("{}", e);
    }

    println!("\n=== Registered plugins ===\n");
    for def in registered_plugins() {
        println!("  {:<14} {:>4}  {}", def.name, def.order, def.description);
    }

    if !finder.manifests().is_empty() {
        println!("\n=== Manifests ===\n");
        for manifest in finder.manifests() {
            println!("  {}", manifest.display());
        }
        println!("\nSelected:");
        for def in finder.plugin_types() {
            println!("  {}", def.name);
        }
    }

    Ok(())
}
