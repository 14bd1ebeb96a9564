//! Drives one generation run through its phases.
//!
//! ```text
//! discover ─> configure ─> initialize ─> collect ─> callbacks ─> generate ─> write
//! ```
//!
//! Between phases the run stops when any error diagnostic was reported or the
//! cancellation token fired.

use crate::callbacks::schedule_callbacks;
use crate::config::MarkgenConfig;
use crate::diagnostics::{Diagnostics, NamedLogger};
use crate::discovery::discover_projects;
use crate::environment::Environment;
use crate::error::{MarkgenError, Result};
use crate::plugin::{InitContext, Plugin, PluginFinder};
use crate::symbols::{Compilation, SourceScanner, join_namespace};
use crate::writer::{FragmentWriter, WriteReport};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Succeeded => 0,
            RunStatus::Failed | RunStatus::Cancelled => 1,
        }
    }

    pub fn is_success(self) -> bool {
        self == RunStatus::Succeeded
    }
}

pub struct Orchestrator {
    config: Arc<MarkgenConfig>,
    cancel: CancellationToken,
    diagnostics: Arc<Diagnostics>,
    logger: NamedLogger,
    finder: Option<PluginFinder>,
    plugins: Vec<Box<dyn Plugin>>,
}

impl Orchestrator {
    pub fn new(config: MarkgenConfig, cancel: CancellationToken) -> Self {
        let diagnostics = Diagnostics::new();
        Self {
            logger: diagnostics.logger("markgen"),
            config: Arc::new(config),
            cancel,
            diagnostics,
            finder: None,
            plugins: Vec::new(),
        }
    }

    /// Uses `finder` instead of one over every linked plugin.
    pub fn with_finder(mut self, finder: PluginFinder) -> Self {
        self.finder = Some(finder);
        self
    }

    /// Adds a plugin ahead of the ones selected from the finder.
    pub fn add_plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn config(&self) -> &MarkgenConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    pub fn plugins(&self) -> &[Box<dyn Plugin>] {
        &self.plugins
    }

    pub async fn run(mut self) -> RunStatus {
        let outcome = self.execute().await;
        self.status(outcome)
    }

    fn status(&self, outcome: Result<WriteReport>) -> RunStatus {
        match outcome {
            Err(MarkgenError::Cancelled) => {
                warn!("Generation cancelled");
                RunStatus::Cancelled
            }
            _ if self.cancel.is_cancelled() => {
                warn!("Generation cancelled");
                RunStatus::Cancelled
            }
            Err(MarkgenError::Aborted { phase }) => {
                info!(
                    "Stopped after {} with {} error(s)",
                    phase,
                    self.diagnostics.error_count()
                );
                RunStatus::Failed
            }
            Err(e) => {
                self.logger.error(e.to_string());
                RunStatus::Failed
            }
            Ok(_) if self.diagnostics.has_errors() => RunStatus::Failed,
            Ok(_) => {
                info!(
                    "Generation finished with {} warning(s)",
                    self.diagnostics.warning_count()
                );
                RunStatus::Succeeded
            }
        }
    }

    fn checkpoint(&self, phase: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MarkgenError::Cancelled);
        }
        if self.diagnostics.has_errors() {
            return Err(MarkgenError::Aborted {
                phase: phase.to_string(),
            });
        }
        debug!("Phase {} complete", phase);
        Ok(())
    }

    /// Runs every phase and returns what the writer did.
    pub async fn execute(&mut self) -> Result<WriteReport> {
        self.config.validate()?;

        let compilation = self.load().await?;
        self.checkpoint("plugin loading")?;

        self.configure_plugins();
        self.checkpoint("configure")?;

        let env = self.discover(compilation).await?;
        self.checkpoint("discover")?;

        self.initialize(&env);
        self.checkpoint("initialize")?;

        self.collect(&env);
        self.checkpoint("collect")?;

        self.run_callbacks(&env);
        self.checkpoint("callbacks")?;

        self.generate(&env);
        self.checkpoint("generate")?;

        let report = self.write(&env).await?;
        self.checkpoint("write")?;
        Ok(report)
    }

    /// Scans sources and loads plugin manifests concurrently, then selects
    /// the plugins for this run.
    async fn load(&mut self) -> Result<Compilation> {
        let scanner = SourceScanner::new(&self.config.input)
            .with_root_namespace(&self.config.root_namespace)
            .skip_generated(&self.config.generated_name);
        let scan_logger = self.diagnostics.logger("scanner");
        let scan_cancel = self.cancel.clone();
        let scan = tokio::task::spawn_blocking(move || scan_logger.measure("scan", || scanner.scan(&scan_logger, &scan_cancel)));

        let mut finder = self.finder.take().unwrap_or_default();
        let paths = self.config.plugin_paths.clone();
        let manifests = tokio::task::spawn_blocking(move || {
            let errors = finder.load_paths(&paths);
            (finder, errors)
        });

        let (scanned, loaded) = tokio::join!(scan, manifests);
        let (finder, errors) = loaded?;
        for error in errors {
            self.logger.error(error.to_string());
        }
        let compilation = scanned??;

        self.select_plugins(&finder);
        Ok(compilation)
    }

    fn select_plugins(&mut self, finder: &PluginFinder) {
        match &self.config.plugins {
            Some(requested) => {
                let mut names: HashSet<String> = requested.iter().cloned().collect();
                names.retain(|name| !self.plugins.iter().any(|p| p.name() == name.as_str()));
                finder.add_plugins(&mut self.plugins, &mut names);
                if !names.is_empty() {
                    let mut missing: Vec<String> = names.into_iter().collect();
                    missing.sort();
                    self.logger
                        .error(MarkgenError::UnknownPlugin(missing.join(", ")).to_string());
                }
            }
            None => finder.add_all_plugins(&mut self.plugins),
        }
        info!(
            "Using plugins: {}",
            self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
        );
    }

    fn configure_plugins(&mut self) {
        for name in self.config.plugin_options.keys() {
            if !self.plugins.iter().any(|p| p.name() == name.as_str()) {
                self.logger.error(
                    MarkgenError::plugin_option(name, "options given for a plugin that is not loaded").to_string(),
                );
            }
        }

        let empty = toml::Table::new();
        for plugin in &mut self.plugins {
            let options = self.config.plugin_options.get(plugin.name()).unwrap_or(&empty);
            if let Err(e) = plugin.configure(options) {
                self.logger
                    .error(MarkgenError::plugin_option(plugin.name(), e.to_string()).to_string());
            }
        }
    }

    /// Adds plugin annotations to the compilation and discovers projects.
    async fn discover(&self, mut compilation: Compilation) -> Result<Environment> {
        let annotations_namespace = join_namespace(&self.config.root_namespace, &self.config.generated_namespace);
        for plugin in &self.plugins {
            if let Some(source) = plugin.annotations() {
                let label = format!("<{} annotations>", plugin.name());
                if let Err(e) = compilation.add_source(&annotations_namespace, &label, source) {
                    self.logger.error(e.to_string());
                }
            }
        }
        compilation.finish();

        if !compilation.has_namespace(&self.config.root_namespace) {
            self.logger.error(
                MarkgenError::NamespaceNotFound(self.config.root_namespace.clone()).to_string(),
            );
        }

        let compilation = Arc::new(compilation);
        let config = Arc::clone(&self.config);
        let diagnostics = Arc::clone(&self.diagnostics);
        let shared = Arc::clone(&compilation);
        let layout =
            tokio::task::spawn_blocking(move || discover_projects(&config, &shared, &diagnostics)).await?;

        info!("Discovered {} project(s)", layout.projects.len());
        Ok(Environment::new(
            Arc::clone(&self.config),
            compilation,
            layout,
            Arc::clone(&self.diagnostics),
            self.cancel.clone(),
        ))
    }

    /// Initializes plugins one at a time in list order. Each plugin sees the
    /// ones initialized before it.
    fn initialize(&mut self, env: &Environment) {
        for i in 0..self.plugins.len() {
            if env.is_cancelled() {
                return;
            }
            let (done, rest) = self.plugins.split_at_mut(i);
            let plugin = &mut rest[0];
            let ctx = InitContext::new(env, done);
            debug!("Initializing plugin {}", plugin.name());
            if let Err(e) = plugin.initialize(&ctx) {
                self.logger
                    .error(format!("Failed to initialize plugin {}: {}", plugin.name(), e));
            }
        }
    }

    /// Fills every project's symbol cache, then lets plugins collect.
    ///
    /// The project pass completes before any plugin runs, so analyzers only
    /// ever see finished caches.
    fn collect(&mut self, env: &Environment) {
        self.logger.measure("collect symbols", || {
            env.projects().par_iter().for_each(|project| {
                if !env.is_cancelled() {
                    project.collect_symbols();
                }
            });
        });
        if env.is_cancelled() {
            return;
        }
        self.logger.measure("plugin collect", || {
            self.plugins.par_iter_mut().for_each(|plugin| {
                if !env.is_cancelled() {
                    plugin.collect(env);
                }
            });
        });
    }

    fn run_callbacks(&mut self, env: &Environment) {
        let scheduled = schedule_callbacks(
            self.plugins
                .iter()
                .enumerate()
                .map(|(i, plugin)| (i, plugin.callbacks())),
        );
        for callback in scheduled {
            if env.is_cancelled() {
                return;
            }
            let plugin = &mut self.plugins[callback.plugin];
            debug!(
                "Running callback {} of {} (priority {})",
                callback.info.name,
                plugin.name(),
                callback.info.priority
            );
            plugin.run_callback(callback.info.id, env);
        }
    }

    fn generate(&self, env: &Environment) {
        self.logger.measure("generate", || {
            self.plugins.par_iter().for_each(|plugin| {
                if !env.is_cancelled() {
                    plugin.generate(env);
                }
            });
        });
    }

    async fn write(&self, env: &Environment) -> Result<WriteReport> {
        let writer = FragmentWriter::new(&self.config, self.logger.child("writer"), self.cancel.clone());
        let report = writer.write(env.batches()).await?;
        info!(
            "{} file(s) written, {} unchanged, {} removed",
            report.written.len(),
            report.unchanged.len(),
            report.removed.len()
        );
        Ok(report)
    }
}
