//! Shared state that plugins create lazily and look up by name.
//!
//! Each resource kind has its own map. Creation happens under the map's lock,
//! so the first caller initializes a slot and every later caller (from any
//! plugin or thread) receives the same value.

use crate::error::{MarkgenError, Result};
use crate::project::ProjectId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct Resources {
    target_projects: Mutex<BTreeMap<String, ProjectId>>,
    registries: Mutex<BTreeMap<String, Arc<Registry>>>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// The project chosen for `name`, resolved by `init` on first request.
    pub fn target_project(&self, name: &str, init: impl FnOnce() -> ProjectId) -> ProjectId {
        *self
            .target_projects
            .lock()
            .entry(name.to_string())
            .or_insert_with(init)
    }

    pub fn registry(&self, name: &str, init: impl FnOnce() -> Registry) -> Arc<Registry> {
        Arc::clone(
            self.registries
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(init())),
        )
    }

    pub fn existing_registry(&self, name: &str) -> Option<Arc<Registry>> {
        self.registries.lock().get(name).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    /// Path the generated code calls, e.g. `game::parsers::parse_vec2`.
    pub target: String,
    pub project: ProjectId,
    /// Where the entry was declared, for diagnostics.
    pub origin: String,
}

impl RegistryEntry {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        project: ProjectId,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            project,
            origin: origin.into(),
        }
    }
}

/// A cross-project table of named entries grouped by key.
///
/// Analyzers of different projects register concurrently during collection.
/// Entries stay sorted by `(project, name)`, so the result does not depend on
/// which project registered first.
#[derive(Debug)]
pub struct Registry {
    name: String,
    defaults: BTreeMap<String, RegistryEntry>,
    entries: Mutex<BTreeMap<String, Vec<RegistryEntry>>>,
    sealed: AtomicBool,
}

impl Registry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: BTreeMap::new(),
            entries: Mutex::new(BTreeMap::new()),
            sealed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a built-in entry, preferred by unnamed lookups.
    pub fn with_default(mut self, key: impl Into<String>, entry: RegistryEntry) -> Self {
        self.defaults.insert(key.into(), entry);
        self
    }

    pub fn register(&self, key: &str, entry: RegistryEntry) -> Result<()> {
        if self.is_sealed() {
            return Err(MarkgenError::RegistrySealed(self.name.clone()));
        }

        let mut entries = self.entries.lock();
        let list = entries.entry(key.to_string()).or_default();
        if let Some(existing) = list.iter().find(|e| e.name == entry.name) {
            return Err(MarkgenError::duplicate_definition(format!(
                "{} '{}' for {} is declared at {} and {}",
                self.name, entry.name, key, existing.origin, entry.origin
            )));
        }
        let position = list
            .binary_search_by(|e| (e.project, e.name.as_str()).cmp(&(entry.project, entry.name.as_str())))
            .unwrap_or_else(|p| p);
        list.insert(position, entry);
        Ok(())
    }

    /// Looks up an entry for `key`. With a name, only registered entries
    /// match; without one, the built-in default wins, then the first entry.
    pub fn lookup(&self, key: &str, name: Option<&str>) -> Option<RegistryEntry> {
        let entries = self.entries.lock();
        match name {
            Some(name) => entries
                .get(key)
                .and_then(|list| list.iter().find(|e| e.name == name))
                .cloned(),
            None => self
                .defaults
                .get(key)
                .cloned()
                .or_else(|| entries.get(key).and_then(|list| list.first()).cloned()),
        }
    }

    pub fn entries(&self, key: &str) -> Vec<RegistryEntry> {
        self.entries.lock().get(key).cloned().unwrap_or_default()
    }

    pub fn defaults(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> {
        self.defaults.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rejects further registrations.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }
}
