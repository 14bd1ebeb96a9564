use super::Plugin;
use linkme::distributed_slice;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Registry entry for a plugin linked into the binary.
#[derive(Clone, Copy)]
pub struct PluginDef {
    /// Name used in configuration and on the command line.
    pub name: &'static str,
    /// Rust type name, also accepted when selecting plugins.
    pub type_name: &'static str,
    pub description: &'static str,
    /// Position in the plugin list. Lower runs first during initialization.
    pub order: i32,
    pub create: fn() -> Box<dyn Plugin>,
}

impl PluginDef {
    /// Accepts the plugin name, the type name, or the type name without
    /// its `Plugin` suffix.
    pub fn matches(&self, requested: &str) -> bool {
        requested == self.name
            || requested == self.type_name
            || self.type_name.strip_suffix("Plugin") == Some(requested)
    }
}

impl std::fmt::Debug for PluginDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDef")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("order", &self.order)
            .finish()
    }
}

/// Distributed slice that collects plugin definitions from all crates
#[distributed_slice]
pub static PLUGINS: [PluginDef] = [..];

/// Runtime-accessible plugin registry
static PLUGIN_REGISTRY: Lazy<HashMap<&'static str, &'static PluginDef>> =
    Lazy::new(|| PLUGINS.iter().map(|def| (def.name, def)).collect());

/// Every linked plugin, sorted by `(order, name)`.
pub fn registered_plugins() -> Vec<&'static PluginDef> {
    let mut defs: Vec<&'static PluginDef> = PLUGINS.iter().collect();
    defs.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(b.name)));
    defs
}

pub fn find_plugin(name: &str) -> Option<&'static PluginDef> {
    PLUGIN_REGISTRY
        .get(name)
        .copied()
        .or_else(|| PLUGINS.iter().find(|def| def.matches(name)))
}
