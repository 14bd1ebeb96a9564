//! Projects: namespace-scoped partitions of the compilation.

use crate::diagnostics::NamedLogger;
use crate::fragment::CodeFragment;
use crate::resources::Resources;
use crate::symbols::{Compilation, MethodSymbol, TypeSymbol, join_namespace, relative_namespace};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProjectId {
    /// A discovered (or monolithic) project, by position.
    Index(usize),
    /// The root pseudo project used when real projects exist.
    Root,
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectId::Index(i) => write!(f, "#{i}"),
            ProjectId::Root => f.write_str("root"),
        }
    }
}

/// The part of a project every plugin may touch: identity, output buffer
/// and resource slots.
#[derive(Debug)]
pub struct ProjectData {
    pub name: String,
    pub directory: PathBuf,
    pub namespace: String,
    pub generated_namespace: String,
    logger: NamedLogger,
    fragments: Mutex<Vec<CodeFragment>>,
    resources: Resources,
}

impl ProjectData {
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
        namespace: impl Into<String>,
        generated_suffix: &str,
        logger: NamedLogger,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            name: name.into(),
            directory: directory.into(),
            generated_namespace: join_namespace(&namespace, generated_suffix),
            namespace,
            logger,
            fragments: Mutex::new(Vec::new()),
            resources: Resources::new(),
        }
    }

    pub fn logger(&self) -> &NamedLogger {
        &self.logger
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn add_fragment(&self, fragment: CodeFragment) {
        self.fragments.lock().push(fragment);
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.lock().len()
    }

    /// Removes and returns the buffered fragments in deterministic order.
    pub fn take_fragments(&self) -> Vec<CodeFragment> {
        let mut fragments = std::mem::take(&mut *self.fragments.lock());
        fragments.sort();
        fragments
    }
}

/// Reference to a method: either a free function or a method of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodRef {
    Free(usize),
    OfType(usize, usize),
}

#[derive(Debug, Default)]
struct SymbolCache {
    all_types: Vec<usize>,
    types_with_attributes: Vec<usize>,
    methods_with_attributes: Vec<MethodRef>,
}

/// A discovered project. Its symbol cache is published once, atomically.
#[derive(Debug)]
pub struct Project {
    data: ProjectData,
    compilation: Arc<Compilation>,
    /// Namespaces below this project that belong to other projects.
    excluded: BTreeSet<String>,
    /// Module names that are never part of an enclosing project.
    independent_parts: Arc<BTreeSet<String>>,
    cache: OnceLock<SymbolCache>,
}

impl Deref for Project {
    type Target = ProjectData;

    fn deref(&self) -> &ProjectData {
        &self.data
    }
}

impl Project {
    pub fn new(
        data: ProjectData,
        compilation: Arc<Compilation>,
        independent_parts: Arc<BTreeSet<String>>,
    ) -> Self {
        Self {
            data,
            compilation,
            excluded: BTreeSet::new(),
            independent_parts,
            cache: OnceLock::new(),
        }
    }

    pub fn data(&self) -> &ProjectData {
        &self.data
    }

    pub fn compilation(&self) -> &Compilation {
        &self.compilation
    }

    pub(crate) fn exclude_namespace(&mut self, namespace: String) {
        self.excluded.insert(namespace);
    }

    /// True when `namespace` belongs to this project.
    pub fn owns_namespace(&self, namespace: &str) -> bool {
        let Some(relative) = relative_namespace(namespace, &self.data.namespace) else {
            return false;
        };
        if relative
            .split("::")
            .any(|part| self.independent_parts.contains(part))
        {
            return false;
        }
        !self
            .excluded
            .iter()
            .any(|other| relative_namespace(namespace, other).is_some())
    }

    /// Fills the symbol caches. Only the first call does any work.
    pub fn collect_symbols(&self) {
        self.cache.get_or_init(|| {
            let mut cache = SymbolCache::default();
            for (i, ty) in self.compilation.types().iter().enumerate() {
                if !self.owns_namespace(&ty.namespace) {
                    continue;
                }
                cache.all_types.push(i);
                if !ty.attributes.is_empty() {
                    cache.types_with_attributes.push(i);
                }
                for (m, method) in ty.methods.iter().enumerate() {
                    if !method.attributes.is_empty() {
                        cache.methods_with_attributes.push(MethodRef::OfType(i, m));
                    }
                }
            }
            for (i, function) in self.compilation.functions().iter().enumerate() {
                if self.owns_namespace(&function.namespace) && !function.attributes.is_empty() {
                    cache.methods_with_attributes.push(MethodRef::Free(i));
                }
            }
            debug!(
                "Project {} owns {} types ({} with attributes), {} methods with attributes",
                self.data.name,
                cache.all_types.len(),
                cache.types_with_attributes.len(),
                cache.methods_with_attributes.len()
            );
            cache
        });
    }

    pub fn is_collected(&self) -> bool {
        self.cache.get().is_some()
    }

    /// Types declared in this project. Empty before collection.
    pub fn all_types(&self) -> Vec<&TypeSymbol> {
        self.cache
            .get()
            .map(|c| c.all_types.iter().map(|&i| &self.compilation.types()[i]).collect())
            .unwrap_or_default()
    }

    pub fn types_with_attributes(&self) -> Vec<&TypeSymbol> {
        self.cache
            .get()
            .map(|c| {
                c.types_with_attributes
                    .iter()
                    .map(|&i| &self.compilation.types()[i])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Free functions and type methods carrying at least one attribute.
    pub fn methods_with_attributes(&self) -> Vec<&MethodSymbol> {
        self.cache
            .get()
            .map(|c| {
                c.methods_with_attributes
                    .iter()
                    .map(|r| match *r {
                        MethodRef::Free(i) => &self.compilation.functions()[i],
                        MethodRef::OfType(t, m) => &self.compilation.types()[t].methods[m],
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
