use super::Plugin;
use super::registry::{PluginDef, registered_plugins};
use crate::error::{MarkgenError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MANIFEST_API_VERSION: u32 = 1;
pub const MANIFEST_EXTENSION: &str = ".plugin.toml";

/// A `*.plugin.toml` file selecting registered plugins.
///
/// ```toml
/// api_version = 1
/// plugins = ["flags", "commands"]
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    pub api_version: u32,
    #[serde(default)]
    pub plugins: Vec<String>,
}

/// Resolves which plugin types are available for a run.
///
/// Without any loaded manifest every registered plugin is available.
/// Once a manifest loads, only the plugins named by manifests are.
#[derive(Debug)]
pub struct PluginFinder {
    registered: Vec<&'static PluginDef>,
    loaded: Vec<&'static PluginDef>,
    manifests: Vec<PathBuf>,
}

impl Default for PluginFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginFinder {
    pub fn new() -> Self {
        Self::from_definitions(registered_plugins())
    }

    /// A finder over an explicit set of definitions instead of the linked registry.
    pub fn from_definitions(mut registered: Vec<&'static PluginDef>) -> Self {
        registered.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(b.name)));
        Self {
            registered,
            loaded: Vec::new(),
            manifests: Vec::new(),
        }
    }

    pub fn manifests(&self) -> &[PathBuf] {
        &self.manifests
    }

    /// Loads one manifest. Returns the number of plugins it names.
    pub fn load_plugin(&mut self, path: &Path) -> Result<usize> {
        let contents = fs::read_to_string(path)?;
        let manifest: PluginManifest = toml::from_str(&contents)?;
        if manifest.api_version != MANIFEST_API_VERSION {
            return Err(MarkgenError::config(format!(
                "Unsupported plugin api_version {} (expected {})",
                manifest.api_version, MANIFEST_API_VERSION
            )));
        }

        let mut resolved = Vec::with_capacity(manifest.plugins.len());
        let mut unknown = Vec::new();
        for name in &manifest.plugins {
            match self.registered.iter().find(|def| def.matches(name)) {
                Some(def) => resolved.push(*def),
                None => unknown.push(name.as_str()),
            }
        }
        if !unknown.is_empty() {
            return Err(MarkgenError::UnknownPlugin(unknown.join(", ")));
        }

        for def in resolved {
            if !self.loaded.iter().any(|d| d.name == def.name) {
                debug!("Manifest {:?} enables plugin {}", path, def.name);
                self.loaded.push(def);
            }
        }
        self.manifests.push(path.to_path_buf());
        Ok(manifest.plugins.len())
    }

    /// Loads every `*.plugin.toml` directly inside `path`, in file name order.
    pub fn load_plugins_directory(&mut self, path: &Path) -> Result<usize> {
        let mut manifests = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file = entry.path();
            let is_manifest = file
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(MANIFEST_EXTENSION));
            if is_manifest && file.is_file() {
                manifests.push(file);
            }
        }
        manifests.sort();

        let mut count = 0;
        for manifest in &manifests {
            count += self.load_plugin(manifest)?;
        }
        Ok(count)
    }

    /// Loads each path as a manifest or a directory of manifests.
    /// Failures are returned per path; the remaining paths still load.
    pub fn load_paths(&mut self, paths: &[PathBuf]) -> Vec<MarkgenError> {
        let mut errors = Vec::new();
        for (index, path) in paths.iter().enumerate() {
            let loaded = if path.is_dir() {
                self.load_plugins_directory(path)
            } else if path.is_file() {
                self.load_plugin(path)
            } else {
                Err(MarkgenError::InvalidPath { path: path.clone() })
            };
            match loaded {
                Ok(count) => info!("Loaded {} plugin(s) from {:?}", count, path),
                Err(e) => errors.push(MarkgenError::plugin_load(index, path, e.to_string())),
            }
        }
        errors
    }

    /// Plugin types available for selection, in initialization order.
    pub fn plugin_types(&self) -> Vec<&'static PluginDef> {
        if self.manifests.is_empty() {
            return self.registered.clone();
        }
        let mut defs = self.loaded.clone();
        defs.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(b.name)));
        defs
    }

    /// Instantiates every available plugin matching one of `names`.
    /// Matched names are removed, so what remains in `names` was not found.
    pub fn add_plugins(&self, plugins: &mut Vec<Box<dyn Plugin>>, names: &mut HashSet<String>) {
        for def in self.plugin_types() {
            let before = names.len();
            names.retain(|name| !def.matches(name));
            if names.len() != before && !plugins.iter().any(|p| p.name() == def.name) {
                plugins.push((def.create)());
            }
        }
    }

    pub fn add_all_plugins(&self, plugins: &mut Vec<Box<dyn Plugin>>) {
        for def in self.plugin_types() {
            if !plugins.iter().any(|p| p.name() == def.name) {
                plugins.push((def.create)());
            }
        }
    }
}
