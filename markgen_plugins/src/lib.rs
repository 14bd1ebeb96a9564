//! Built-in markgen plugins.
//!
//! Each plugin registers itself in [`markgen_core::PLUGINS`] at link time:
//!
//! | name          | marker                         | output                              |
//! |---------------|--------------------------------|-------------------------------------|
//! | `flags`       | `#[nice_flags]` on enums       | `bits`, `has`, `has_any` helpers    |
//! | `data_object` | `#[data_object]` on structs    | `with_<field>` builders             |
//! | `parsers`     | `#[parser]` on functions       | argument parsers for commands       |
//! | `commands`    | `#[command]` on functions      | command adapters and registration   |
//!
//! Binaries that want these plugins must link this crate, e.g. by calling
//! [`builtin_plugins`].

pub mod data_object;
pub mod flags;
pub mod terminal;

pub use data_object::DataObjectPlugin;
pub use flags::FlagsPlugin;
pub use terminal::{CommandsPlugin, ParsersPlugin};

use markgen_core::symbols::{relative_namespace, render_tokens};
use markgen_core::{MarkgenError, PluginDef, ProjectData, Result};
use serde::de::DeserializeOwned;

/// Definitions of the plugins shipped in this crate, in run order.
pub fn builtin_plugins() -> Vec<&'static PluginDef> {
    vec![
        &flags::FLAGS_PLUGIN,
        &data_object::DATA_OBJECT_PLUGIN,
        &terminal::parsers::PARSERS_PLUGIN,
        &terminal::commands::COMMANDS_PLUGIN,
    ]
}

/// Reads a plugin's options table into `T`.
pub(crate) fn parse_options<T: DeserializeOwned>(plugin: &str, options: &toml::Table) -> Result<T> {
    toml::Value::Table(options.clone())
        .try_into()
        .map_err(|e: toml::de::Error| MarkgenError::plugin_option(plugin, e.message().to_string()))
}

/// Path to `full_name` as written from inside `project`: items of the
/// project itself go through `crate::`, everything else stays absolute.
pub(crate) fn path_from(project: &ProjectData, full_name: &str) -> String {
    match relative_namespace(full_name, &project.namespace) {
        Some(relative) if !relative.is_empty() => format!("crate::{relative}"),
        _ => full_name.to_string(),
    }
}

/// Normalized spelling of a type used to match parsers with arguments.
///
/// Paths are reduced to their last segment (`game::Vec2` and `Vec2` match),
/// references and `Option`/`Result` wrappers are left as written.
pub(crate) fn type_key(ty: &str) -> String {
    match syn::parse_str::<syn::Type>(ty) {
        Ok(syn::Type::Path(path)) if path.qself.is_none() => path
            .path
            .segments
            .last()
            .map(render_tokens)
            .unwrap_or_else(|| ty.to_string()),
        Ok(other) => render_tokens(&other),
        Err(_) => ty.trim().to_string(),
    }
}

/// The `T` of a parser returning `Option<T>` or `Result<T, E>`.
pub(crate) fn parsed_type(return_type: &str) -> Option<String> {
    let syn::Type::Path(path) = syn::parse_str::<syn::Type>(return_type).ok()? else {
        return None;
    };
    let last = path.path.segments.last()?;
    if last.ident != "Option" && last.ident != "Result" {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        syn::GenericArgument::Type(ty) => Some(type_key(&render_tokens(ty))),
        _ => None,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use markgen_core::plugin::PluginFinder;
    use markgen_core::writer::strip_envelope;
    use markgen_core::{Diagnostics, MarkgenConfig, Orchestrator, RunStatus};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    pub fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn read(root: &Path, relative: &str) -> String {
        fs::read_to_string(root.join(relative)).unwrap()
    }

    /// The generated payload of `relative`, without header and footer.
    pub fn payload(root: &Path, relative: &str) -> String {
        let bytes = fs::read(root.join(relative)).unwrap();
        String::from_utf8(strip_envelope(&bytes).unwrap().to_vec()).unwrap()
    }

    /// Runs the named built-in plugins over `dir`. Workspaces without a
    /// `common/` directory generate common files into root.
    pub async fn run(
        dir: &TempDir,
        plugins: &[&str],
        options: &[(&str, &str, toml::Value)],
    ) -> (RunStatus, Arc<Diagnostics>) {
        let mut builder = MarkgenConfig::builder()
            .input(dir.path())
            .plugins(plugins.iter().copied());
        if !dir.path().join("common").exists() {
            builder = builder.common_namespace(None);
        }
        for (plugin, key, value) in options {
            builder = builder.plugin_option(plugin, key, value.clone());
        }
        let orchestrator = Orchestrator::new(builder.build(), CancellationToken::new())
            .with_finder(PluginFinder::from_definitions(super::builtin_plugins()));
        let diagnostics = orchestrator.diagnostics().clone();
        let status = orchestrator.run().await;
        (status, diagnostics)
    }
}
