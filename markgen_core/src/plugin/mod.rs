//! The plugin contract.
//!
//! A plugin implements one generation concern across all projects. It keeps
//! one [`Analyzer`] per project (same index order as
//! [`Environment::projects`]) and is driven by the orchestrator through the
//! phases below:
//!
//! 1. [`Plugin::configure`] with its `[plugin_options.<name>]` table
//! 2. [`Plugin::initialize`], sequentially in plugin order
//! 3. [`Plugin::collect`], after every project's symbol cache is filled
//! 4. [`Plugin::run_callback`] for each declared callback, in priority order
//! 5. [`Plugin::generate`], pushing fragments into projects

pub mod finder;
pub mod registry;

pub use finder::{MANIFEST_API_VERSION, MANIFEST_EXTENSION, PluginFinder, PluginManifest};
pub use registry::{PLUGINS, PluginDef, find_plugin, registered_plugins};

use crate::callbacks::CallbackInfo;
use crate::environment::Environment;
use crate::error::Result;
use crate::fragment::CodeFragment;
use crate::project::Project;
use rayon::prelude::*;
use std::any::Any;

pub trait Plugin: Any + Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Rust source declaring the items this plugin's markers and generated
    /// code rely on. Added to the compilation before project discovery.
    fn annotations(&self) -> Option<&'static str> {
        None
    }

    fn configure(&mut self, _options: &toml::Table) -> Result<()> {
        Ok(())
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()>;

    fn collect(&mut self, env: &Environment);

    fn callbacks(&self) -> Vec<CallbackInfo> {
        Vec::new()
    }

    fn run_callback(&mut self, _id: usize, _env: &Environment) {}

    fn generate(&self, env: &Environment);

    fn as_any(&self) -> &dyn Any;
}

/// What a plugin sees while initializing.
pub struct InitContext<'a> {
    env: &'a Environment,
    initialized: &'a [Box<dyn Plugin>],
}

impl<'a> InitContext<'a> {
    pub fn new(env: &'a Environment, initialized: &'a [Box<dyn Plugin>]) -> Self {
        Self { env, initialized }
    }

    pub fn env(&self) -> &'a Environment {
        self.env
    }

    /// An already initialized plugin of type `T`, if it is loaded and
    /// ordered before the caller.
    pub fn find<T: Plugin>(&self) -> Option<&'a T> {
        self.initialized
            .iter()
            .find_map(|plugin| plugin.as_any().downcast_ref::<T>())
    }
}

/// Per-project worker of a plugin.
pub trait Analyzer: Send + Sync {
    fn collect_symbols(&mut self, project: &Project);

    fn generate_code(&self, _project: &Project) -> Option<CodeFragment> {
        None
    }
}

/// One analyzer per project, index-aligned with [`Environment::projects`].
#[derive(Debug)]
pub struct Analyzers<A> {
    analyzers: Vec<A>,
}

impl<A> Default for Analyzers<A> {
    fn default() -> Self {
        Self {
            analyzers: Vec::new(),
        }
    }
}

impl<A: Analyzer> Analyzers<A> {
    pub fn new(env: &Environment, make: impl FnMut(&Project) -> A) -> Self {
        Self {
            analyzers: env.projects().iter().map(make).collect(),
        }
    }

    /// Runs every analyzer's collection in parallel.
    pub fn collect(&mut self, env: &Environment) {
        self.analyzers
            .par_iter_mut()
            .zip(env.projects().par_iter())
            .for_each(|(analyzer, project)| {
                if env.is_cancelled() {
                    return;
                }
                analyzer.collect_symbols(project);
            });
    }

    /// Runs every analyzer's generation in parallel and stores the fragments
    /// in the matching projects.
    pub fn generate(&self, env: &Environment) {
        self.analyzers
            .par_iter()
            .zip(env.projects().par_iter())
            .for_each(|(analyzer, project)| {
                if env.is_cancelled() {
                    return;
                }
                if let Some(fragment) = analyzer.generate_code(project) {
                    project.add_fragment(fragment);
                }
            });
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&A> {
        self.analyzers.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, A> {
        self.analyzers.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, A> {
        self.analyzers.iter_mut()
    }

    /// Analyzers paired with their projects.
    pub fn with_projects<'e>(&'e self, env: &'e Environment) -> impl Iterator<Item = (&'e A, &'e Project)> {
        self.analyzers.iter().zip(env.projects())
    }
}
