// markgen - attribute-driven Rust code generation across multi-project workspaces

// Front-end
pub mod config;
pub mod error;
pub mod symbols;

// Projects and shared state
pub mod diagnostics;
pub mod discovery;
pub mod environment;
pub mod project;
pub mod resources;

// Plugins
pub mod callbacks;
pub mod codegen;
pub mod plugin;

// Output
pub mod fragment;
pub mod orchestrator;
pub mod writer;

// Re-export commonly used items for convenience
pub use callbacks::CallbackInfo;
pub use codegen::CodeBuilder;
pub use config::{MarkgenConfig, OutputMode};
pub use diagnostics::{Diagnostics, NamedLogger, Severity};
pub use environment::Environment;
pub use error::{MarkgenError, Result};
pub use fragment::CodeFragment;
pub use orchestrator::{Orchestrator, RunStatus};
pub use plugin::{Analyzer, Analyzers, InitContext, PLUGINS, Plugin, PluginDef};
pub use project::{Project, ProjectData, ProjectId};
pub use resources::{Registry, RegistryEntry, Resources};

// Used by plugin registrations in downstream crates
pub use linkme;
