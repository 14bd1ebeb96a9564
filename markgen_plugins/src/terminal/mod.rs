//! Terminal commands.
//!
//! `parsers` turns `#[parser]` functions into a shared registry keyed by the
//! parsed type and emits the runtime the command adapters call into.
//! `commands` turns `#[command]` functions into adapters taking string
//! arguments, resolving each argument's parser once all parsers are known.
//! Both put their shared output into one terminal project.

pub mod commands;
pub mod parsers;

pub use commands::CommandsPlugin;
pub use parsers::ParsersPlugin;

use crate::path_from;
use markgen_core::{Environment, ProjectId};
use serde::Deserialize;

/// Resource key of the terminal project slot.
pub const TERMINAL_TARGET: &str = "terminal";

/// Resource key of the parser registry.
pub const PARSERS_REGISTRY: &str = "parsers";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TerminalOptions {
    /// Name of the project receiving the terminal runtime.
    pub terminal_project: String,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            terminal_project: "terminal".to_string(),
        }
    }
}

/// The project the terminal runtime goes to, resolved once per run. Falls
/// back to root when no project is named `name`.
pub fn terminal_project(env: &Environment, name: &str) -> ProjectId {
    env.resources().target_project(TERMINAL_TARGET, || match env.find_project_by_name(name) {
        Some(id) => id,
        None => {
            env.logger("terminal").warning(format!(
                "No terminal project {}. The terminal files will be generated into root",
                name
            ));
            env.root_id()
        }
    })
}

/// Namespace holding the terminal runtime.
pub(crate) fn runtime_namespace(env: &Environment, terminal: ProjectId) -> String {
    env.project_data(terminal)
        .unwrap_or_else(|| env.root())
        .generated_namespace
        .clone()
}

/// `full_name` as written from project `from`. The pseudo root is not a
/// crate, so its paths stay absolute.
pub(crate) fn path_in(env: &Environment, from: ProjectId, full_name: &str) -> String {
    match (from, env.project_data(from)) {
        (ProjectId::Index(_), Some(data)) => path_from(data, full_name),
        _ => full_name.to_string(),
    }
}
