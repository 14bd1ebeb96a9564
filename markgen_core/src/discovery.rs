//! Project discovery from module descriptor files.
//!
//! Each `*.module.json` file marks its directory as a project. The project's
//! namespace comes from the descriptor (`rootNamespace`, then `name`, then the
//! file stem) and must exist in the compilation. Discovery never fails the
//! whole call: bad descriptors are reported as error diagnostics and skipped,
//! so the run stops at the next phase boundary.

use crate::config::MarkgenConfig;
use crate::diagnostics::{Diagnostics, NamedLogger};
use crate::environment::{ProjectLayout, RootProject};
use crate::error::{MarkgenError, Result};
use crate::project::{Project, ProjectData, ProjectId};
use crate::symbols::{Compilation, join_namespace, relative_namespace};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Subfolder name that may form a project of its own.
pub const EDITOR_FOLDER: &str = "editor";

const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// The JSON module descriptor.
///
/// `rootNamespace` distinguishes an absent key (fall back to `name`) from an
/// explicit `null` (an error).
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub root_namespace: Option<Option<String>>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl ModuleDescriptor {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| MarkgenError::module_descriptor(path, e.to_string()))
    }

    /// The namespace this descriptor declares, `.` separators normalized to `::`.
    pub fn namespace(&self, file_stem: &str) -> Result<String> {
        let raw = match &self.root_namespace {
            Some(Some(namespace)) => namespace.as_str(),
            Some(None) => return Err(MarkgenError::config("rootNamespace is null")),
            None => self.name.as_deref().unwrap_or(file_stem),
        };
        let namespace = raw.trim().replace('.', "::");
        if namespace.is_empty() {
            return Err(MarkgenError::config("the namespace is empty"));
        }
        Ok(namespace)
    }
}

/// A project accepted by discovery, before it is bound to the compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredProject {
    pub name: String,
    pub directory: PathBuf,
    pub namespace: String,
    pub marker: PathBuf,
}

pub struct ProjectDiscovery<'a> {
    config: &'a MarkgenConfig,
    compilation: &'a Compilation,
    logger: NamedLogger,
}

impl<'a> ProjectDiscovery<'a> {
    pub fn new(config: &'a MarkgenConfig, compilation: &'a Compilation, diagnostics: &Arc<Diagnostics>) -> Self {
        Self {
            config,
            compilation,
            logger: diagnostics.logger("discovery"),
        }
    }

    fn should_descend(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        !name.starts_with('.')
            && !SKIPPED_DIRS.contains(&name.as_ref())
            && name != self.config.generated_name.as_str()
    }

    fn marker_stem<'p>(&self, path: &'p Path) -> Option<&'p str> {
        path.file_name()?
            .to_str()?
            .strip_suffix(self.config.marker_extension.as_str())
    }

    /// Module descriptor paths below the input root, in sorted walk order.
    pub fn find_markers(&self) -> Vec<PathBuf> {
        let walker = WalkDir::new(&self.config.input)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_descend(e));

        let mut markers = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() && self.marker_stem(entry.path()).is_some() => {
                    debug!("Found module descriptor {:?}", entry.path());
                    markers.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => self.logger.warning(format!("Skipping unreadable entry: {}", e)),
            }
        }
        markers
    }

    fn has_marker(&self, directory: &Path) -> bool {
        fs::read_dir(directory)
            .map(|entries| {
                entries
                    .flatten()
                    .any(|e| self.marker_stem(&e.path()).is_some() && e.path().is_file())
            })
            .unwrap_or(false)
    }

    /// A marker directory is a project when it has a top-level `.rs` file or
    /// any subdirectory besides `editor` and the generated output.
    fn is_project_directory(&self, directory: &Path) -> bool {
        let Ok(entries) = fs::read_dir(directory) else {
            return false;
        };
        entries.flatten().any(|entry| {
            let path = entry.path();
            if path.is_dir() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name != EDITOR_FOLDER && name != self.config.generated_name.as_str()
            } else {
                path.extension().is_some_and(|e| e == "rs")
            }
        })
    }

    fn resolve(&self, marker: &Path) -> Result<Vec<DiscoveredProject>> {
        let descriptor = ModuleDescriptor::from_path(marker)?;
        let stem = self.marker_stem(marker).unwrap_or_default();
        let namespace = descriptor
            .namespace(stem)
            .map_err(|e| MarkgenError::module_descriptor(marker, e.to_string()))?;
        let namespace = join_namespace(&self.config.root_namespace, &namespace);

        if !self.compilation.has_namespace(&namespace) {
            return Err(MarkgenError::module_descriptor(
                marker,
                format!("the namespace {} could not be found in the compilation", namespace),
            ));
        }

        let directory = marker.parent().map(Path::to_path_buf).unwrap_or_default();
        let name = descriptor.name.clone().unwrap_or_else(|| namespace.clone());

        if self.is_project_directory(&directory) {
            return Ok(vec![DiscoveredProject {
                name,
                directory,
                namespace,
                marker: marker.to_path_buf(),
            }]);
        }

        let editor_directory = directory.join(EDITOR_FOLDER);
        let editor_namespace = join_namespace(&namespace, EDITOR_FOLDER);
        if self.config.editor_subprojects
            && editor_directory.is_dir()
            && self.compilation.has_namespace(&editor_namespace)
            && !self.has_marker(&editor_directory)
        {
            debug!("Using {:?} as an independent editor project", editor_directory);
            return Ok(vec![DiscoveredProject {
                name: join_namespace(&name, EDITOR_FOLDER),
                directory: editor_directory,
                namespace: editor_namespace,
                marker: marker.to_path_buf(),
            }]);
        }

        debug!("{:?} marks no sources, skipping", marker);
        Ok(Vec::new())
    }

    /// Resolves every marker, reporting bad and duplicate ones as errors.
    pub fn discover(&self) -> Vec<DiscoveredProject> {
        let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut projects = Vec::new();

        for marker in self.find_markers() {
            let resolved = match self.resolve(&marker) {
                Ok(resolved) => resolved,
                Err(e) => {
                    self.logger.error(e.to_string());
                    continue;
                }
            };
            for project in resolved {
                if let Some(first) = seen.get(&project.namespace) {
                    self.logger.error(format!(
                        "Duplicate project namespace {} in {:?} (first declared in {:?})",
                        project.namespace, project.marker, first
                    ));
                    continue;
                }
                info!("Adding project {} ({})", project.name, project.namespace);
                seen.insert(project.namespace.clone(), project.marker.clone());
                projects.push(project);
            }
        }
        projects
    }
}

/// Discovers projects and selects Root and Common.
///
/// Zero projects, or a monolithic configuration, produce one real Root
/// project spanning the root namespace. Otherwise Root is a pseudo project at
/// the input directory that owns no symbols.
pub fn discover_projects(
    config: &MarkgenConfig,
    compilation: &Arc<Compilation>,
    diagnostics: &Arc<Diagnostics>,
) -> ProjectLayout {
    let logger = diagnostics.logger("discovery");
    let independent_parts: Arc<BTreeSet<String>> = Arc::new(config.independent_namespace_parts.clone());

    let discovered = if config.monolithic {
        Vec::new()
    } else {
        ProjectDiscovery::new(config, compilation, diagnostics).discover()
    };

    let make_data = |name: &str, directory: &Path, namespace: &str| {
        ProjectData::new(
            name,
            directory,
            namespace,
            &config.generated_namespace,
            diagnostics.logger(name),
        )
    };

    let (projects, root) = if discovered.is_empty() {
        info!("No projects found, treating {:?} as a single project", config.input);
        let data = make_data("root", &config.input, &config.root_namespace);
        let project = Project::new(data, Arc::clone(compilation), Arc::clone(&independent_parts));
        (vec![project], RootProject::Real(0))
    } else {
        let mut projects: Vec<Project> = discovered
            .iter()
            .map(|p| {
                let data = make_data(&p.name, &p.directory, &p.namespace);
                Project::new(data, Arc::clone(compilation), Arc::clone(&independent_parts))
            })
            .collect();
        exclude_nested(&mut projects);
        match projects.iter().position(|p| same_directory(&p.directory, &config.input)) {
            Some(i) => {
                info!("Project {} sits at the input root and acts as root", projects[i].name);
                (projects, RootProject::Real(i))
            }
            None => {
                let root = make_data("root", &config.input, &config.root_namespace);
                (projects, RootProject::Pseudo(root))
            }
        }
    };

    let root_id = match root {
        RootProject::Real(i) => ProjectId::Index(i),
        RootProject::Pseudo(_) => ProjectId::Root,
    };
    let common = select_common(config, &projects, root_id, &logger);

    ProjectLayout {
        projects,
        root,
        common,
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Keeps nested projects' namespaces out of their enclosing projects.
fn exclude_nested(projects: &mut [Project]) {
    let namespaces: Vec<String> = projects.iter().map(|p| p.namespace.clone()).collect();
    for project in projects.iter_mut() {
        let own = project.namespace.clone();
        for other in &namespaces {
            if *other != own && relative_namespace(other, &own).is_some() {
                project.exclude_namespace(other.clone());
            }
        }
    }
}

fn select_common(config: &MarkgenConfig, projects: &[Project], root: ProjectId, logger: &NamedLogger) -> ProjectId {
    if config.monolithic {
        return root;
    }
    let Some(common) = config.resolved_common_namespace() else {
        return root;
    };
    if common.is_empty() {
        logger.error("The common namespace cannot be empty. Use `monolithic = true` to treat the input as one project");
        return root;
    }
    match projects.iter().position(|p| p.namespace == common) {
        Some(i) => {
            info!("Found the common project {}", common);
            ProjectId::Index(i)
        }
        None => {
            logger.warning(format!(
                "No common project {}. The common files will be generated into root",
                common
            ));
            root
        }
    }
}
