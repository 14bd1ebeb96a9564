//! Init command - writes a markgen.toml with the default settings.

use crate::cli::{Cli, InitArgs};
use markgen_core::config::CONFIG_FILE_NAME;
use markgen_core::error::Result;
use std::fs;
use tracing::{error, info};

pub const DEFAULT_CONFIG: &str = r#"# markgen configuration
#
# Paths are relative to this file. ${VAR} and ${VAR:-default} are expanded
# from the environment (and .env) in path values.

# Directory scanned for sources and *.module.json descriptors
input = "."

# Name of the generated directory in each project
generated_name = "generated"

# Module appended to a project's namespace for generated code
generated_namespace = "generated"

# Namespace prefix of the whole input; empty for the crate root
root_namespace = ""

# Project receiving shared output; $Root expands to root_namespace
common_namespace = "$Root::common"

# Treat the whole input as one project
monolithic = false

# nested-directories | central-directory | single-file | single-file-per-project
output_mode = "nested-directories"

# Remove stale files from generated directories
clear_output = false

# Module names that never belong to an enclosing project
independent_namespace_parts = ["editor", "tests"]

# Let a lone editor/ folder become a project of its own
editor_subprojects = true

# Plugin manifests (*.plugin.toml) or directories of them
plugin_paths = []

# Plugins to run; remove to run every available plugin
# plugins = ["flags", "data_object", "parsers", "commands"]

# Options of a plugin that is not loaded are an error
# [plugin_options.parsers]
# terminal_project = "terminal"
"#;

/// Runs the init command.
pub async fn run(_cli: &Cli, args: InitArgs) -> Result<()> {
    let config_path = args.directory.join(CONFIG_FILE_NAME);

    if config_path.exists() && !args.force {
        error!("{} already exists. Use --force to overwrite.", config_path.display());
        return Ok(());
    }

    fs::create_dir_all(&args.directory)?;
    fs::write(&config_path, DEFAULT_CONFIG)?;
    info!("Created {}", config_path.display());

    info!("Next steps:");
    info!("  1. Add a <name>.module.json next to each project's sources");
    info!("  2. Mark items with #[nice_flags], #[data_object], #[parser] or #[command]");
    info!("  3. Run 'markgen generate'");

    Ok(())
}
