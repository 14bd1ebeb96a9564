//! Walks a source tree and builds a [`Compilation`].

use super::{AttributeData, Compilation, FieldSymbol, Location, MethodSymbol, ParameterSymbol, render_tokens};
use crate::diagnostics::NamedLogger;
use crate::error::{MarkgenError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use walkdir::{DirEntry, WalkDir};

/// Directory names never scanned.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules"];

/// Derives the module path of `file` relative to `root`.
///
/// `src` directories are transparent, `mod.rs`, `lib.rs` and `main.rs` stand
/// for their directory and `-` becomes `_`.
pub fn module_path_for(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut parts: Vec<String> = Vec::new();

    if let Some(parent) = relative.parent() {
        for component in parent.components() {
            let name = component.as_os_str().to_string_lossy();
            if name == "src" || name == "." {
                continue;
            }
            parts.push(name.replace('-', "_"));
        }
    }

    if let Some(stem) = relative.file_stem().map(|s| s.to_string_lossy()) {
        if !matches!(stem.as_ref(), "mod" | "lib" | "main") {
            parts.push(stem.replace('-', "_"));
        }
    }

    parts.join("::")
}

#[derive(Debug, Clone)]
pub struct SourceScanner {
    root: PathBuf,
    root_namespace: String,
    /// Directory and file stems produced by markgen itself.
    generated_name: String,
}

impl SourceScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            root_namespace: String::new(),
            generated_name: String::new(),
        }
    }

    pub fn with_root_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.root_namespace = namespace.into();
        self
    }

    /// Skips generated output so it never feeds back into the next run.
    pub fn skip_generated(mut self, generated_name: impl Into<String>) -> Self {
        self.generated_name = generated_name.into();
        self
    }

    fn should_descend(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir() {
            return !name.starts_with('.')
                && !SKIPPED_DIRS.contains(&name.as_ref())
                && name != self.generated_name.as_str();
        }
        true
    }

    fn is_source(&self, entry: &DirEntry) -> bool {
        let path = entry.path();
        entry.file_type().is_file()
            && path.extension().is_some_and(|e| e == "rs")
            && path
                .file_stem()
                .is_none_or(|stem| stem.to_string_lossy() != self.generated_name)
    }

    /// Parses every `.rs` file below the root. Files that fail to parse are
    /// reported as warnings and skipped.
    pub fn scan(&self, logger: &NamedLogger, cancel: &CancellationToken) -> Result<Compilation> {
        info!("Scanning sources in {:?}", self.root);
        if !self.root.is_dir() {
            return Err(MarkgenError::InvalidPath {
                path: self.root.clone(),
            });
        }

        let mut compilation = Compilation::new();
        let mut parsed = 0usize;

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_descend(e));

        for entry in walker {
            if cancel.is_cancelled() {
                return Err(MarkgenError::Cancelled);
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    logger.warning(format!("Skipping unreadable entry: {}", e));
                    continue;
                }
            };
            if !self.is_source(&entry) {
                continue;
            }

            let path = entry.path();
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    logger.warning(format!("Failed to read {:?}: {}", path, e));
                    continue;
                }
            };
            let file = match syn::parse_file(&content) {
                Ok(file) => file,
                Err(e) => {
                    logger.warning(format!("Failed to parse {:?}: {}", path, e));
                    continue;
                }
            };

            let namespace = super::join_namespace(&self.root_namespace, &module_path_for(&self.root, path));
            trace!("Parsed {:?} as '{}'", path, namespace);
            compilation.add_file(&namespace, path, &file);
            parsed += 1;
        }

        compilation.add_namespace(&self.root_namespace);
        compilation.finish();
        debug!(
            "Parsed {} files: {} types, {} free functions",
            parsed,
            compilation.types().len(),
            compilation.functions().len()
        );
        Ok(compilation)
    }
}

pub(crate) fn is_public(vis: &syn::Visibility) -> bool {
    matches!(vis, syn::Visibility::Public(_))
}

pub(crate) fn location(path: &Path, ident: &syn::Ident) -> Location {
    Location {
        file: path.to_path_buf(),
        line: ident.span().start().line,
    }
}

pub(crate) fn generics_of(generics: &syn::Generics) -> Vec<String> {
    generics
        .params
        .iter()
        .map(|p| match p {
            syn::GenericParam::Type(t) => t.ident.to_string(),
            syn::GenericParam::Lifetime(l) => l.lifetime.to_string(),
            syn::GenericParam::Const(c) => c.ident.to_string(),
        })
        .collect()
}

pub(crate) fn fields_of(fields: &syn::Fields) -> Vec<FieldSymbol> {
    fields
        .iter()
        .enumerate()
        .map(|(i, f)| FieldSymbol {
            name: f
                .ident
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| i.to_string()),
            ty: render_tokens(&f.ty),
            is_public: is_public(&f.vis),
            attributes: AttributeData::from_syn_list(&f.attrs),
        })
        .collect()
}

pub(crate) fn named_fields(fields: &syn::FieldsNamed) -> Vec<FieldSymbol> {
    fields_of(&syn::Fields::Named(fields.clone()))
}

/// Name of the type an impl block targets, ignoring generics.
pub(crate) fn impl_self_name(ty: &syn::Type) -> Option<String> {
    match ty {
        syn::Type::Path(path) if path.qself.is_none() => {
            path.path.segments.last().map(|s| s.ident.to_string())
        }
        _ => None,
    }
}

pub(crate) fn method_of(
    namespace: &str,
    owner: Option<String>,
    sig: &syn::Signature,
    attrs: &[syn::Attribute],
    is_public: bool,
    path: &Path,
) -> MethodSymbol {
    let mut has_receiver = false;
    let parameters = sig
        .inputs
        .iter()
        .filter_map(|input| match input {
            syn::FnArg::Receiver(_) => {
                has_receiver = true;
                None
            }
            syn::FnArg::Typed(pat) => Some(ParameterSymbol {
                name: render_tokens(&pat.pat),
                ty: render_tokens(&pat.ty),
                attributes: AttributeData::from_syn_list(&pat.attrs),
            }),
        })
        .collect();

    let return_type = match &sig.output {
        syn::ReturnType::Default => None,
        syn::ReturnType::Type(_, ty) => Some(render_tokens(ty)),
    };

    MethodSymbol {
        name: sig.ident.to_string(),
        namespace: namespace.to_string(),
        owner,
        parameters,
        return_type,
        has_receiver,
        is_public,
        attributes: AttributeData::from_syn_list(attrs),
        location: location(path, &sig.ident),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    // ==================== Module Path Tests ====================

    #[test]
    fn test_module_path_for_lib_is_root() {
        let root = Path::new("/ws");
        assert_eq!(module_path_for(root, Path::new("/ws/src/lib.rs")), "");
    }

    #[test]
    fn test_module_path_for_nested_file() {
        let root = Path::new("/ws");
        assert_eq!(
            module_path_for(root, Path::new("/ws/src/game/ui/console.rs")),
            "game::ui::console"
        );
    }

    #[test]
    fn test_module_path_for_mod_rs_and_dashes() {
        let root = Path::new("/ws");
        assert_eq!(
            module_path_for(root, Path::new("/ws/my-crate/src/net/mod.rs")),
            "my_crate::net"
        );
    }

    // ==================== Scan Tests ====================

    #[test]
    fn test_scan_collects_types_and_skips_generated() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "game/src/lib.rs", "pub struct World;");
        write(dir.path(), "game/src/generated/flags.rs", "pub struct Ignored;");
        write(dir.path(), "target/debug/build.rs", "pub struct AlsoIgnored;");
        write(dir.path(), ".hidden/x.rs", "pub struct Hidden;");

        let diagnostics = Diagnostics::new();
        let compilation = SourceScanner::new(dir.path())
            .skip_generated("generated")
            .scan(&diagnostics.logger("scan"), &CancellationToken::new())
            .unwrap();

        let names: Vec<String> = compilation.types().iter().map(|t| t.full_name()).collect();
        assert_eq!(names, vec!["game::World".to_string()]);
        assert!(compilation.has_namespace("game"));
    }

    #[test]
    fn test_scan_warns_on_parse_error_and_continues() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.rs", "pub struct Good;");
        write(dir.path(), "b.rs", "pub struct {");

        let diagnostics = Diagnostics::new();
        let compilation = SourceScanner::new(dir.path())
            .scan(&diagnostics.logger("scan"), &CancellationToken::new())
            .unwrap();

        assert_eq!(compilation.types().len(), 1);
        assert_eq!(diagnostics.warning_count(), 1);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_scan_applies_root_namespace() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ui.rs", "pub enum Mode { A }");

        let diagnostics = Diagnostics::new();
        let compilation = SourceScanner::new(dir.path())
            .with_root_namespace("app")
            .scan(&diagnostics.logger("scan"), &CancellationToken::new())
            .unwrap();

        assert_eq!(compilation.types()[0].full_name(), "app::ui::Mode");
        assert!(compilation.has_namespace("app"));
    }

    #[test]
    fn test_scan_stops_when_cancelled() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.rs", "pub struct A;");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let diagnostics = Diagnostics::new();
        let result = SourceScanner::new(dir.path()).scan(&diagnostics.logger("scan"), &cancel);
        assert!(matches!(result, Err(MarkgenError::Cancelled)));
    }

    #[test]
    fn test_scan_missing_root() {
        let diagnostics = Diagnostics::new();
        let result = SourceScanner::new("/definitely/not/here")
            .scan(&diagnostics.logger("scan"), &CancellationToken::new());
        assert!(matches!(result, Err(MarkgenError::InvalidPath { .. })));
    }
}
