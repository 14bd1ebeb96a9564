//! The run context handed to every plugin.

use crate::config::MarkgenConfig;
use crate::diagnostics::{Diagnostics, NamedLogger};
use crate::project::{Project, ProjectData, ProjectId};
use crate::resources::Resources;
use crate::symbols::Compilation;
use crate::writer::ProjectBatch;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum RootProject {
    /// Root is one of the discovered projects (monolithic or no markers).
    Real(usize),
    /// Root only receives fragments; it owns no symbols.
    Pseudo(ProjectData),
}

/// Projects found by discovery plus the Root and Common selection.
#[derive(Debug)]
pub struct ProjectLayout {
    pub projects: Vec<Project>,
    pub root: RootProject,
    pub common: ProjectId,
}

#[derive(Debug)]
pub struct Environment {
    config: Arc<MarkgenConfig>,
    compilation: Arc<Compilation>,
    projects: Vec<Project>,
    root: RootProject,
    common: ProjectId,
    resources: Resources,
    diagnostics: Arc<Diagnostics>,
    cancel: CancellationToken,
}

impl Environment {
    pub fn new(
        config: Arc<MarkgenConfig>,
        compilation: Arc<Compilation>,
        layout: ProjectLayout,
        diagnostics: Arc<Diagnostics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            compilation,
            projects: layout.projects,
            root: layout.root,
            common: layout.common,
            resources: Resources::new(),
            diagnostics,
            cancel,
        }
    }

    pub fn config(&self) -> &MarkgenConfig {
        &self.config
    }

    pub fn compilation(&self) -> &Compilation {
        &self.compilation
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project_data(&self, id: ProjectId) -> Option<&ProjectData> {
        match id {
            ProjectId::Index(i) => self.projects.get(i).map(Project::data),
            ProjectId::Root => Some(self.root()),
        }
    }

    /// The Root project's id. A real root is addressed by its index.
    pub fn root_id(&self) -> ProjectId {
        match self.root {
            RootProject::Real(i) => ProjectId::Index(i),
            RootProject::Pseudo(_) => ProjectId::Root,
        }
    }

    pub fn root(&self) -> &ProjectData {
        match &self.root {
            RootProject::Real(i) => self.projects[*i].data(),
            RootProject::Pseudo(data) => data,
        }
    }

    pub fn common_id(&self) -> ProjectId {
        self.common
    }

    pub fn common(&self) -> &ProjectData {
        self.project_data(self.common).unwrap_or_else(|| self.root())
    }

    /// Every project's data, the pseudo root last.
    pub fn all_project_data(&self) -> impl Iterator<Item = (ProjectId, &ProjectData)> {
        self.projects
            .iter()
            .enumerate()
            .map(|(i, p)| (ProjectId::Index(i), p.data()))
            .chain(match &self.root {
                RootProject::Pseudo(data) => Some((ProjectId::Root, data)),
                RootProject::Real(_) => None,
            })
    }

    pub fn find_project_by_name(&self, name: &str) -> Option<ProjectId> {
        self.all_project_data()
            .find(|(_, data)| data.name == name)
            .map(|(id, _)| id)
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    pub fn logger(&self, name: &str) -> NamedLogger {
        self.diagnostics.logger(name)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drains every project's fragments into writer batches.
    pub fn batches(&self) -> Vec<ProjectBatch> {
        self.all_project_data()
            .map(|(_, data)| ProjectBatch {
                name: data.name.clone(),
                directory: data.directory.clone(),
                fragments: data.take_fragments(),
            })
            .collect()
    }
}
