use crate::error::{MarkgenError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::{env, fs};
use tracing::{debug, error, info, trace, warn};

pub const CONFIG_FILE_NAME: &str = "markgen.toml";

/// Placeholder replaced by the root namespace in `common_namespace`.
pub const ROOT_PLACEHOLDER: &str = "$Root";

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
        .expect("Invalid regex for environment variable substitution")
});

/// Where generated fragments are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// `<project dir>/<generated_name>/<file>.rs`
    #[default]
    NestedDirectories,
    /// `<central output>/<project name>/<file>.rs`
    CentralDirectory,
    /// One file for the whole run.
    SingleFile,
    /// `<project dir>/<generated_name>.rs`
    SingleFilePerProject,
}

impl OutputMode {
    pub fn is_central(self) -> bool {
        matches!(self, OutputMode::CentralDirectory | OutputMode::SingleFile)
    }
}

/// Configuration for one markgen run.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MarkgenConfig {
    /// Directory scanned for sources and module descriptors.
    pub input: PathBuf,

    /// Name of generated directories (or single files, without extension).
    pub generated_name: String,

    /// Module appended to a project namespace to form its generated namespace.
    pub generated_namespace: String,

    /// Namespace prefix of the whole input. Empty means the crate root.
    pub root_namespace: String,

    /// Namespace of the Common project. `$Root` expands to `root_namespace`.
    pub common_namespace: Option<String>,

    /// Skip project discovery and treat the input as one project.
    pub monolithic: bool,

    pub output_mode: OutputMode,

    /// Target of the central output modes. Defaults to `<input>/<generated_name>`.
    pub central_output: Option<PathBuf>,

    /// Delete every `.rs` file in generated directories that was not produced by this run.
    pub clear_output: bool,

    /// Module names excluded from the owning project's symbol caches.
    pub independent_namespace_parts: BTreeSet<String>,

    /// Let a lone `editor` folder become a project of its own.
    pub editor_subprojects: bool,

    /// Suffix identifying module descriptor files.
    pub marker_extension: String,

    /// Plugin manifests or directories of manifests.
    pub plugin_paths: Vec<PathBuf>,

    /// Plugins to enable. `None` enables every available plugin.
    pub plugins: Option<Vec<String>>,

    /// Per-plugin option tables, keyed by plugin name.
    pub plugin_options: BTreeMap<String, toml::Table>,
}

impl Default for MarkgenConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("."),
            generated_name: "generated".to_string(),
            generated_namespace: "generated".to_string(),
            root_namespace: String::new(),
            common_namespace: Some(format!("{ROOT_PLACEHOLDER}::common")),
            monolithic: false,
            output_mode: OutputMode::default(),
            central_output: None,
            clear_output: false,
            independent_namespace_parts: ["editor", "tests"].iter().map(|s| s.to_string()).collect(),
            editor_subprojects: true,
            marker_extension: ".module.json".to_string(),
            plugin_paths: Vec::new(),
            plugins: None,
            plugin_options: BTreeMap::new(),
        }
    }
}

impl MarkgenConfig {
    /// Loads `markgen.toml` from the current directory or the nearest ancestor.
    /// Falls back to defaults when no file exists.
    pub fn new() -> Result<MarkgenConfig> {
        info!("Loading markgen configuration");
        dotenv::dotenv().ok();

        let current_dir = env::current_dir()?;
        match Self::find_config_file(&current_dir) {
            Some(path) => Self::from_path(&path),
            None => {
                info!("No {} found, using defaults", CONFIG_FILE_NAME);
                Ok(MarkgenConfig::default())
            }
        }
    }

    pub fn builder() -> MarkgenConfigBuilder {
        MarkgenConfigBuilder::default()
    }

    /// Loads a configuration file. Relative paths inside it resolve against
    /// the file's directory.
    pub fn from_path(path: &Path) -> Result<MarkgenConfig> {
        info!("Found configuration file at: {:?}", path);
        let contents = fs::read_to_string(path).map_err(|e| {
            error!("Failed to read configuration file: {}", e);
            MarkgenError::from(e)
        })?;
        debug!("Configuration file size: {} bytes", contents.len());

        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<MarkgenConfig> {
        let mut config: MarkgenConfig = toml::from_str(contents).map_err(|e| {
            error!("Failed to parse TOML configuration: {}", e);
            MarkgenError::config(e.to_string())
        })?;
        config.substitute_paths()?;
        Ok(config)
    }

    /// Searches for `markgen.toml` from `start` up to the filesystem root.
    pub fn find_config_file(start: &Path) -> Option<PathBuf> {
        debug!("Starting config file search from: {:?}", start);
        for dir in start.ancestors() {
            let candidate = dir.join(CONFIG_FILE_NAME);
            trace!("Checking for config at: {:?}", candidate);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn substitute_paths(&mut self) -> Result<()> {
        self.input = substitute_path(&self.input)?;
        if let Some(central) = &self.central_output {
            self.central_output = Some(substitute_path(central)?);
        }
        self.plugin_paths = self
            .plugin_paths
            .iter()
            .map(|p| substitute_path(p))
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn rebase(&mut self, base: &Path) {
        let rebase = |p: &Path| if p.is_relative() { base.join(p) } else { p.to_path_buf() };
        self.input = rebase(&self.input);
        self.central_output = self.central_output.as_deref().map(rebase);
        self.plugin_paths = self.plugin_paths.iter().map(|p| rebase(p)).collect();
    }

    /// The common namespace with `$Root` expanded, if one is configured.
    pub fn resolved_common_namespace(&self) -> Option<String> {
        let raw = self.common_namespace.as_deref()?;
        let expanded = if self.root_namespace.is_empty() {
            raw.replace(&format!("{ROOT_PLACEHOLDER}::"), "")
                .replace(ROOT_PLACEHOLDER, "")
        } else {
            raw.replace(ROOT_PLACEHOLDER, &self.root_namespace)
        };
        Some(expanded)
    }

    pub fn central_output_path(&self) -> PathBuf {
        match &self.central_output {
            Some(path) => path.clone(),
            None => self.input.join(&self.generated_name),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.generated_name.trim().is_empty() {
            return Err(MarkgenError::InvalidConfigValue {
                key: "generated_name".to_string(),
                value: self.generated_name.clone(),
            });
        }
        if self.generated_name.contains(['/', '\\']) {
            return Err(MarkgenError::InvalidConfigValue {
                key: "generated_name".to_string(),
                value: self.generated_name.clone(),
            });
        }
        if syn::parse_str::<syn::Ident>(&self.generated_namespace).is_err() {
            return Err(MarkgenError::InvalidConfigValue {
                key: "generated_namespace".to_string(),
                value: self.generated_namespace.clone(),
            });
        }
        for part in &self.independent_namespace_parts {
            if syn::parse_str::<syn::Ident>(part).is_err() {
                return Err(MarkgenError::InvalidConfigValue {
                    key: "independent_namespace_parts".to_string(),
                    value: part.clone(),
                });
            }
        }
        if self.marker_extension.is_empty() {
            return Err(MarkgenError::InvalidConfigValue {
                key: "marker_extension".to_string(),
                value: String::new(),
            });
        }
        if self.output_mode.is_central() && self.central_output.is_none() {
            warn!(
                "No central_output set, using {:?}",
                self.central_output_path()
            );
        }
        Ok(())
    }
}

fn substitute_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    if !raw.contains("${") {
        return Ok(path.to_path_buf());
    }
    Ok(PathBuf::from(substitute_env_vars(&raw)?))
}

/// Substitutes `${VAR}` and `${VAR:-default}` references.
pub fn substitute_env_vars(value: &str) -> Result<String> {
    trace!("Substituting environment variables in: {}", value);
    let mut result = value.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(value) {
        let var_name = &cap[1];
        let default_value = cap.get(2).map(|m| m.as_str());

        let replacement = match env::var(var_name) {
            Ok(val) => {
                debug!("Resolved environment variable: {}", var_name);
                val
            }
            Err(_) => match default_value {
                Some(default) => {
                    warn!(
                        "Environment variable {} not set, using default: {}",
                        var_name, default
                    );
                    default.to_string()
                }
                None => {
                    error!(
                        "Environment variable {} not set and no default provided",
                        var_name
                    );
                    return Err(MarkgenError::EnvVarNotSet(var_name.to_string()));
                }
            },
        };

        result = result.replace(&cap[0], &replacement);
    }

    Ok(result)
}

#[derive(Debug, Default)]
pub struct MarkgenConfigBuilder {
    config: MarkgenConfig,
}

impl MarkgenConfigBuilder {
    pub fn input(mut self, input: impl Into<PathBuf>) -> Self {
        self.config.input = input.into();
        self
    }

    pub fn generated_name(mut self, name: impl Into<String>) -> Self {
        self.config.generated_name = name.into();
        self
    }

    pub fn root_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.root_namespace = namespace.into();
        self
    }

    pub fn common_namespace(mut self, namespace: Option<String>) -> Self {
        self.config.common_namespace = namespace;
        self
    }

    pub fn monolithic(mut self, monolithic: bool) -> Self {
        self.config.monolithic = monolithic;
        self
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    pub fn central_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.central_output = Some(path.into());
        self
    }

    pub fn clear_output(mut self, clear: bool) -> Self {
        self.config.clear_output = clear;
        self
    }

    pub fn independent_namespace_parts<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.independent_namespace_parts = parts.into_iter().map(Into::into).collect();
        self
    }

    pub fn plugin_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.plugin_paths.push(path.into());
        self
    }

    pub fn plugins<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.plugins = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn plugin_option(mut self, plugin: &str, key: &str, value: toml::Value) -> Self {
        self.config
            .plugin_options
            .entry(plugin.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> MarkgenConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    // ==================== Default Tests ====================

    #[test]
    fn test_default_config() {
        let config = MarkgenConfig::default();
        assert_eq!(config.generated_name, "generated");
        assert_eq!(config.output_mode, OutputMode::NestedDirectories);
        assert!(config.independent_namespace_parts.contains("editor"));
        assert!(config.independent_namespace_parts.contains("tests"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolved_common_namespace_with_empty_root() {
        let config = MarkgenConfig::default();
        assert_eq!(config.resolved_common_namespace().as_deref(), Some("common"));
    }

    #[test]
    fn test_resolved_common_namespace_with_root() {
        let config = MarkgenConfig::builder().root_namespace("game").build();
        assert_eq!(
            config.resolved_common_namespace().as_deref(),
            Some("game::common")
        );
    }

    #[test]
    fn test_resolved_common_namespace_disabled() {
        let config = MarkgenConfig::builder().common_namespace(None).build();
        assert_eq!(config.resolved_common_namespace(), None);
    }

    // ==================== TOML Tests ====================

    #[test]
    fn test_from_toml_str() {
        let config = MarkgenConfig::from_toml_str(
            r#"
            generated_name = "gen"
            output_mode = "single-file-per-project"
            independent_namespace_parts = ["editor"]
            plugins = ["flags"]

            [plugin_options.commands]
            terminal_project = "shell"
            "#,
        )
        .unwrap();

        assert_eq!(config.generated_name, "gen");
        assert_eq!(config.output_mode, OutputMode::SingleFilePerProject);
        assert_eq!(config.plugins, Some(vec!["flags".to_string()]));
        assert_eq!(
            config.plugin_options["commands"]["terminal_project"].as_str(),
            Some("shell")
        );
        assert!(!config.independent_namespace_parts.contains("tests"));
    }

    #[test]
    fn test_from_toml_str_invalid() {
        assert!(MarkgenConfig::from_toml_str("output_mode = \"sideways\"").is_err());
    }

    #[test]
    fn test_from_path_rebases_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "input = \"src\"\nplugin_paths = [\"plugins\"]\n").unwrap();

        let config = MarkgenConfig::from_path(&path).unwrap();
        assert_eq!(config.input, dir.path().join("src"));
        assert_eq!(config.plugin_paths, vec![dir.path().join("plugins")]);
    }

    #[test]
    fn test_find_config_file_in_ancestor() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "").unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            MarkgenConfig::find_config_file(&nested),
            Some(dir.path().join(CONFIG_FILE_NAME))
        );
    }

    // ==================== Env Substitution Tests ====================

    #[test]
    fn test_substitute_env_vars_with_value() {
        temp_env::with_var("MARKGEN_TEST_OUT", Some("/tmp/out"), || {
            assert_eq!(
                substitute_env_vars("${MARKGEN_TEST_OUT}/gen").unwrap(),
                "/tmp/out/gen"
            );
        });
    }

    #[test]
    fn test_substitute_env_vars_with_default() {
        temp_env::with_var_unset("MARKGEN_TEST_MISSING", || {
            assert_eq!(
                substitute_env_vars("${MARKGEN_TEST_MISSING:-fallback}").unwrap(),
                "fallback"
            );
        });
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        temp_env::with_var_unset("MARKGEN_TEST_MISSING", || {
            assert!(matches!(
                substitute_env_vars("${MARKGEN_TEST_MISSING}"),
                Err(MarkgenError::EnvVarNotSet(_))
            ));
        });
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_validate_rejects_empty_generated_name() {
        let config = MarkgenConfig::builder().generated_name("").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_invalid_independent_part() {
        let config = MarkgenConfig::builder()
            .independent_namespace_parts(["not valid"])
            .build();
        assert!(matches!(
            config.validate(),
            Err(MarkgenError::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_builder_plugin_option() {
        let config = MarkgenConfig::builder()
            .plugin_option("commands", "terminal_project", toml::Value::from("shell"))
            .build();
        assert_eq!(
            config.plugin_options["commands"]["terminal_project"].as_str(),
            Some("shell")
        );
    }
}
