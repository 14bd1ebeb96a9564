//! Command-line interface definitions for markgen.

use clap::{Args, Parser, Subcommand, ValueEnum};
use markgen_core::config::{MarkgenConfig, OutputMode};
use std::path::PathBuf;

/// markgen - attribute-driven code generation for multi-project Rust workspaces
#[derive(Parser, Debug)]
#[command(name = "markgen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to markgen.toml configuration file
    #[arg(short, long, global = true, env = "MARKGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output (-v, -vv, -vvv for increasing verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Log filter for `-v`/`-q`, used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the generation pipeline (default)
    Generate(GenerateArgs),

    /// List registered plugins and the manifests found on plugin paths
    Plugins(PluginsArgs),

    /// Initialize a new markgen.toml configuration file
    Init(InitArgs),
}

// ============================================================================
// Generate Arguments
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// Directory to scan for sources and module descriptors
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Plugin manifest or directory of manifests (repeatable)
    #[arg(long = "plugin-path", value_name = "PATH")]
    pub plugin_paths: Vec<PathBuf>,

    /// Comma-separated list of plugins to run (default: all loaded)
    #[arg(long, value_delimiter = ',')]
    pub plugins: Option<Vec<String>>,

    /// Where generated files go
    #[arg(long, value_enum)]
    pub output_mode: Option<OutputModeArg>,

    /// Target of the central output modes
    #[arg(long)]
    pub central_output: Option<PathBuf>,

    /// Namespace prefix of the whole input
    #[arg(long)]
    pub root_namespace: Option<String>,

    /// Namespace of the Common project (`$Root` expands to the root namespace)
    #[arg(long, conflicts_with = "no_common")]
    pub common_namespace: Option<String>,

    /// Generate common files into root
    #[arg(long)]
    pub no_common: bool,

    /// Name of generated directories or files
    #[arg(long)]
    pub generated_name: Option<String>,

    /// Treat the whole input as one project
    #[arg(long)]
    pub monolithic: bool,

    /// Remove stale files from generated directories
    #[arg(long)]
    pub clear_output: bool,

    /// Module name never part of an enclosing project (repeatable)
    #[arg(long = "independent-part", value_name = "NAME")]
    pub independent_parts: Vec<String>,

    /// Plugin option as plugin.key=value; the value is read as TOML, falling back to a string
    #[arg(short = 'O', long = "option", value_name = "PLUGIN.KEY=VALUE", value_parser = parse_plugin_option)]
    pub options: Vec<PluginOption>,
}

impl GenerateArgs {
    /// Applies the flags on top of file configuration.
    pub fn apply(self, mut config: MarkgenConfig) -> MarkgenConfig {
        if let Some(input) = self.input {
            config.input = input;
        }
        config.plugin_paths.extend(self.plugin_paths);
        if let Some(plugins) = self.plugins {
            config.plugins = Some(plugins);
        }
        if let Some(mode) = self.output_mode {
            config.output_mode = mode.into();
        }
        if let Some(path) = self.central_output {
            config.central_output = Some(path);
        }
        if let Some(namespace) = self.root_namespace {
            config.root_namespace = namespace;
        }
        if self.no_common {
            config.common_namespace = None;
        } else if let Some(namespace) = self.common_namespace {
            config.common_namespace = Some(namespace);
        }
        if let Some(name) = self.generated_name {
            config.generated_name = name;
        }
        config.monolithic |= self.monolithic;
        config.clear_output |= self.clear_output;
        config.independent_namespace_parts.extend(self.independent_parts);
        for option in self.options {
            config
                .plugin_options
                .entry(option.plugin)
                .or_default()
                .insert(option.key, option.value);
        }
        config
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputModeArg {
    /// <project>/<generated>/<file>.rs
    Nested,
    /// <central>/<project>/<file>.rs
    Central,
    /// One file for the whole run
    Single,
    /// <project>/<generated>.rs
    PerProject,
}

impl From<OutputModeArg> for OutputMode {
    fn from(mode: OutputModeArg) -> Self {
        match mode {
            OutputModeArg::Nested => OutputMode::NestedDirectories,
            OutputModeArg::Central => OutputMode::CentralDirectory,
            OutputModeArg::Single => OutputMode::SingleFile,
            OutputModeArg::PerProject => OutputMode::SingleFilePerProject,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginOption {
    pub plugin: String,
    pub key: String,
    pub value: toml::Value,
}

/// Parses `plugin.key=value`.
pub fn parse_plugin_option(raw: &str) -> Result<PluginOption, String> {
    let (path, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected plugin.key=value, got '{raw}'"))?;
    let (plugin, key) = path
        .split_once('.')
        .filter(|(plugin, key)| !plugin.is_empty() && !key.is_empty())
        .ok_or_else(|| format!("expected plugin.key before '=', got '{path}'"))?;

    let value = toml::from_str::<toml::Table>(&format!("value = {value}"))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or_else(|| toml::Value::String(value.to_string()));

    Ok(PluginOption {
        plugin: plugin.to_string(),
        key: key.to_string(),
        value,
    })
}

// ============================================================================
// Plugins Arguments
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct PluginsArgs {
    /// Plugin manifest or directory of manifests to inspect (repeatable)
    #[arg(long = "plugin-path", value_name = "PATH")]
    pub plugin_paths: Vec<PathBuf>,
}

// ============================================================================
// Init Arguments
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct InitArgs {
    /// Overwrite existing markgen.toml if present
    #[arg(short, long)]
    pub force: bool,

    /// Directory to create markgen.toml in
    #[arg(long, default_value = ".")]
    pub directory: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ==================== Parsing Tests ====================

    #[test]
    fn test_defaults_to_no_subcommand() {
        let cli = Cli::parse_from(["markgen"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log_filter(), "info");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(Cli::parse_from(["markgen", "-v"]).log_filter(), "debug");
        assert_eq!(Cli::parse_from(["markgen", "-vvv"]).log_filter(), "trace");
        assert_eq!(Cli::parse_from(["markgen", "-q", "-v"]).log_filter(), "error");
    }

    #[test]
    fn test_generate_flags_override_config() {
        let cli = Cli::parse_from([
            "markgen",
            "generate",
            "--input",
            "src",
            "--plugins",
            "flags,commands",
            "--output-mode",
            "per-project",
            "--no-common",
            "--independent-part",
            "benches",
            "-O",
            "flags.bits_type=\"u8\"",
        ]);
        let Some(Commands::Generate(args)) = cli.command else {
            panic!("expected generate");
        };
        let config = args.apply(MarkgenConfig::default());

        assert_eq!(config.input, PathBuf::from("src"));
        assert_eq!(config.plugins, Some(vec!["flags".to_string(), "commands".to_string()]));
        assert_eq!(config.output_mode, OutputMode::SingleFilePerProject);
        assert_eq!(config.common_namespace, None);
        assert!(config.independent_namespace_parts.contains("benches"));
        assert!(config.independent_namespace_parts.contains("editor"));
        assert_eq!(
            config.plugin_options["flags"]["bits_type"],
            toml::Value::String("u8".into())
        );
    }

    #[test]
    fn test_common_flags_conflict() {
        let result = Cli::try_parse_from(["markgen", "generate", "--no-common", "--common-namespace", "shared"]);
        assert!(result.is_err());
    }

    // ==================== Plugin Option Tests ====================

    #[test]
    fn test_plugin_option_values() {
        let number = parse_plugin_option("parsers.limit=3").unwrap();
        assert_eq!(number.plugin, "parsers");
        assert_eq!(number.key, "limit");
        assert_eq!(number.value, toml::Value::Integer(3));

        let bare = parse_plugin_option("parsers.terminal_project=console").unwrap();
        assert_eq!(bare.value, toml::Value::String("console".into()));

        let flag = parse_plugin_option("flags.enabled=true").unwrap();
        assert_eq!(flag.value, toml::Value::Boolean(true));
    }

    #[test]
    fn test_plugin_option_rejects_malformed() {
        assert!(parse_plugin_option("parsers").is_err());
        assert!(parse_plugin_option("parsers=1").is_err());
        assert!(parse_plugin_option(".key=1").is_err());
    }
}
