use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkgenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in file {file}: {message}")]
    ParseError { file: PathBuf, message: String },

    #[error("Syn parse error: {0}")]
    SynParse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidConfigValue { key: String, value: String },

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Invalid path: {path}")]
    InvalidPath { path: PathBuf },

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Invalid module descriptor {path}: {message}")]
    ModuleDescriptor { path: PathBuf, message: String },

    #[error("Plugin path #{index} ({path}): {message}")]
    PluginLoad {
        index: usize,
        path: PathBuf,
        message: String,
    },

    #[error("Invalid plugin name(s): {0}")]
    UnknownPlugin(String),

    #[error("Plugin option error in {plugin}: {message}")]
    PluginOption { plugin: String, message: String },

    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("Duplicate definition: {0}")]
    DuplicateDefinition(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Registry {0} is sealed")]
    RegistrySealed(String),

    #[error("Directory walk error: {0}")]
    Walk(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Invalid regex pattern: {0}")]
    Regex(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Stopped after {phase}: errors were reported")]
    Aborted { phase: String },
}

impl From<syn::Error> for MarkgenError {
    fn from(err: syn::Error) -> Self {
        MarkgenError::SynParse(err.to_string())
    }
}

impl From<regex::Error> for MarkgenError {
    fn from(err: regex::Error) -> Self {
        MarkgenError::Regex(err.to_string())
    }
}

impl From<walkdir::Error> for MarkgenError {
    fn from(err: walkdir::Error) -> Self {
        MarkgenError::Walk(err.to_string())
    }
}

impl From<tokio::task::JoinError> for MarkgenError {
    fn from(err: tokio::task::JoinError) -> Self {
        MarkgenError::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarkgenError>;

impl MarkgenError {
    pub fn parse_error(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MarkgenError::ParseError {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        MarkgenError::Config(message.into())
    }

    pub fn module_descriptor(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MarkgenError::ModuleDescriptor {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn plugin_load(index: usize, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MarkgenError::PluginLoad {
            index,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn plugin_option(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        MarkgenError::PluginOption {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn invalid_attribute(message: impl Into<String>) -> Self {
        MarkgenError::InvalidAttribute(message.into())
    }

    pub fn duplicate_definition(message: impl Into<String>) -> Self {
        MarkgenError::DuplicateDefinition(message.into())
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        MarkgenError::MissingField(field.into())
    }
}
