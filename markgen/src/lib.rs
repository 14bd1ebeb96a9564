pub mod cli;
pub mod commands;

pub use markgen_core::{config, error, plugin, writer};
pub use markgen_core::{
    Analyzer, Analyzers, CodeBuilder, CodeFragment, Environment, InitContext, MarkgenConfig, Orchestrator, PLUGINS,
    Plugin, PluginDef, Project, Result, RunStatus,
};
pub use markgen_derive::{command, data_object, nice_flags, parser};
pub use linkme;

use markgen_core::plugin::PluginFinder;
use tracing::debug;

/// A finder over every linked plugin. Naming the built-in set keeps
/// `markgen_plugins` linked, so its registrations are present.
pub fn plugin_finder() -> PluginFinder {
    let builtin = markgen_plugins::builtin_plugins();
    debug!("{} built-in plugins linked", builtin.len());
    PluginFinder::new()
}
