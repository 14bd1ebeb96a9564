//! Declarations extracted from Rust sources.
//!
//! A [`Compilation`] is a flat, thread-safe view over every type and function
//! found under the input root. Namespaces are module paths (`a::b`), with the
//! empty string standing for the crate root. Only what plugins need is kept:
//! names, signatures rendered as text and marker attributes.

pub mod attributes;
pub mod scanner;

pub use attributes::{AttrValue, AttributeArg, AttributeData, AttributeSchema, FieldSpec, ParsedAttribute, ValueKind};
pub use scanner::{SourceScanner, module_path_for};

use crate::error::{MarkgenError, Result};
use once_cell::sync::Lazy;
use quote::ToTokens;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::trace;

static TOKEN_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(<|>|::|\(|\))\s*").expect("Invalid token spacing regex"));

/// Joins two namespace paths, treating empty parts as the crate root.
pub fn join_namespace(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{parent}::{child}"),
    }
}

/// Returns the part of `namespace` below `ancestor`, or `None` when
/// `namespace` is not inside it. The namespace itself yields `Some("")`.
pub fn relative_namespace<'a>(namespace: &'a str, ancestor: &str) -> Option<&'a str> {
    if ancestor.is_empty() {
        return Some(namespace);
    }
    if namespace == ancestor {
        return Some("");
    }
    namespace
        .strip_prefix(ancestor)
        .and_then(|rest| rest.strip_prefix("::"))
}

/// Renders tokens as compact Rust source (`Vec<u8>`, `Option<&str>`).
pub fn render_tokens(tokens: &impl ToTokens) -> String {
    let raw = tokens.to_token_stream().to_string();
    let compact = TOKEN_SPACING.replace_all(&raw, "$1").into_owned();
    compact.replace("& ", "&").replace(" ,", ",")
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub file: PathBuf,
    pub line: usize,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Struct,
    Enum,
    Union,
    Trait,
    Alias,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSymbol {
    /// Field name, or its index for tuple structs.
    pub name: String,
    pub ty: String,
    pub is_public: bool,
    pub attributes: Vec<AttributeData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantSymbol {
    pub name: String,
    pub discriminant: Option<String>,
    pub attributes: Vec<AttributeData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSymbol {
    pub name: String,
    pub ty: String,
    pub attributes: Vec<AttributeData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSymbol {
    pub name: String,
    pub namespace: String,
    /// Owning type for methods declared in impl blocks.
    pub owner: Option<String>,
    pub parameters: Vec<ParameterSymbol>,
    pub return_type: Option<String>,
    /// Has a `self` receiver.
    pub has_receiver: bool,
    pub is_public: bool,
    pub attributes: Vec<AttributeData>,
    pub location: Location,
}

impl MethodSymbol {
    pub fn is_static(&self) -> bool {
        !self.has_receiver
    }

    /// Path usable from the crate root, e.g. `ui::Console::clear`.
    pub fn full_name(&self) -> String {
        let owner = match &self.owner {
            Some(owner) => join_namespace(&self.namespace, owner),
            None => self.namespace.clone(),
        };
        join_namespace(&owner, &self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeData> {
        self.attributes.iter().find(|a| a.is(name))
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSymbol {
    pub name: String,
    pub namespace: String,
    pub kind: TypeKind,
    pub generics: Vec<String>,
    pub fields: Vec<FieldSymbol>,
    pub variants: Vec<VariantSymbol>,
    pub methods: Vec<MethodSymbol>,
    pub is_public: bool,
    pub attributes: Vec<AttributeData>,
    pub location: Location,
}

impl TypeSymbol {
    pub fn full_name(&self) -> String {
        join_namespace(&self.namespace, &self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeData> {
        self.attributes.iter().find(|a| a.is(name))
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
}

/// Methods found in an impl block whose type has not been seen yet.
#[derive(Debug, Clone)]
struct PendingImpl {
    namespace: String,
    self_type: String,
    methods: Vec<MethodSymbol>,
}

#[derive(Debug, Default)]
pub struct Compilation {
    namespaces: BTreeSet<String>,
    types: Vec<TypeSymbol>,
    functions: Vec<MethodSymbol>,
    files: Vec<PathBuf>,
    pending: Vec<PendingImpl>,
}

impl Compilation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &[TypeSymbol] {
        &self.types
    }

    /// Free functions.
    pub fn functions(&self) -> &[MethodSymbol] {
        &self.functions
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }

    /// The crate root always exists.
    pub fn has_namespace(&self, namespace: &str) -> bool {
        namespace.is_empty() || self.namespaces.contains(namespace)
    }

    pub fn find_type(&self, full_name: &str) -> Option<&TypeSymbol> {
        self.types.iter().find(|t| t.full_name() == full_name)
    }

    pub fn add_namespace(&mut self, namespace: &str) {
        let mut current = String::new();
        for part in namespace.split("::").filter(|p| !p.is_empty()) {
            current = join_namespace(&current, part);
            self.namespaces.insert(current.clone());
        }
    }

    /// Adds one parsed file whose items live in `namespace`.
    pub fn add_file(&mut self, namespace: &str, path: &Path, file: &syn::File) {
        trace!("Adding {:?} as namespace '{}'", path, namespace);
        self.files.push(path.to_path_buf());
        self.add_namespace(namespace);
        self.add_items(namespace, path, &file.items);
    }

    /// Parses `text` and adds it under `namespace`. `label` names the source
    /// in locations and errors.
    pub fn add_source(&mut self, namespace: &str, label: &str, text: &str) -> Result<()> {
        let file = syn::parse_file(text)
            .map_err(|e| MarkgenError::parse_error(label, e.to_string()))?;
        self.add_file(namespace, Path::new(label), &file);
        Ok(())
    }

    fn add_items(&mut self, namespace: &str, path: &Path, items: &[syn::Item]) {
        for item in items {
            match item {
                syn::Item::Struct(item) => {
                    let fields = scanner::fields_of(&item.fields);
                    self.push_type(namespace, path, TypeSymbol {
                        name: item.ident.to_string(),
                        namespace: namespace.to_string(),
                        kind: TypeKind::Struct,
                        generics: scanner::generics_of(&item.generics),
                        fields,
                        variants: Vec::new(),
                        methods: Vec::new(),
                        is_public: scanner::is_public(&item.vis),
                        attributes: AttributeData::from_syn_list(&item.attrs),
                        location: scanner::location(path, &item.ident),
                    });
                }
                syn::Item::Enum(item) => {
                    let variants = item
                        .variants
                        .iter()
                        .map(|v| VariantSymbol {
                            name: v.ident.to_string(),
                            discriminant: v.discriminant.as_ref().map(|(_, e)| render_tokens(e)),
                            attributes: AttributeData::from_syn_list(&v.attrs),
                        })
                        .collect();
                    self.push_type(namespace, path, TypeSymbol {
                        name: item.ident.to_string(),
                        namespace: namespace.to_string(),
                        kind: TypeKind::Enum,
                        generics: scanner::generics_of(&item.generics),
                        fields: Vec::new(),
                        variants,
                        methods: Vec::new(),
                        is_public: scanner::is_public(&item.vis),
                        attributes: AttributeData::from_syn_list(&item.attrs),
                        location: scanner::location(path, &item.ident),
                    });
                }
                syn::Item::Union(item) => {
                    self.push_type(namespace, path, TypeSymbol {
                        name: item.ident.to_string(),
                        namespace: namespace.to_string(),
                        kind: TypeKind::Union,
                        generics: scanner::generics_of(&item.generics),
                        fields: scanner::named_fields(&item.fields),
                        variants: Vec::new(),
                        methods: Vec::new(),
                        is_public: scanner::is_public(&item.vis),
                        attributes: AttributeData::from_syn_list(&item.attrs),
                        location: scanner::location(path, &item.ident),
                    });
                }
                syn::Item::Trait(item) => {
                    let methods = item
                        .items
                        .iter()
                        .filter_map(|i| match i {
                            syn::TraitItem::Fn(f) => Some(scanner::method_of(
                                namespace,
                                Some(item.ident.to_string()),
                                &f.sig,
                                &f.attrs,
                                true,
                                path,
                            )),
                            _ => None,
                        })
                        .collect();
                    self.push_type(namespace, path, TypeSymbol {
                        name: item.ident.to_string(),
                        namespace: namespace.to_string(),
                        kind: TypeKind::Trait,
                        generics: scanner::generics_of(&item.generics),
                        fields: Vec::new(),
                        variants: Vec::new(),
                        methods,
                        is_public: scanner::is_public(&item.vis),
                        attributes: AttributeData::from_syn_list(&item.attrs),
                        location: scanner::location(path, &item.ident),
                    });
                }
                syn::Item::Type(item) => {
                    self.push_type(namespace, path, TypeSymbol {
                        name: item.ident.to_string(),
                        namespace: namespace.to_string(),
                        kind: TypeKind::Alias,
                        generics: scanner::generics_of(&item.generics),
                        fields: Vec::new(),
                        variants: Vec::new(),
                        methods: Vec::new(),
                        is_public: scanner::is_public(&item.vis),
                        attributes: AttributeData::from_syn_list(&item.attrs),
                        location: scanner::location(path, &item.ident),
                    });
                }
                syn::Item::Fn(item) => {
                    let is_public = scanner::is_public(&item.vis);
                    self.functions.push(scanner::method_of(
                        namespace, None, &item.sig, &item.attrs, is_public, path,
                    ));
                }
                syn::Item::Impl(item) => {
                    let Some(self_type) = scanner::impl_self_name(&item.self_ty) else {
                        continue;
                    };
                    let methods = item
                        .items
                        .iter()
                        .filter_map(|i| match i {
                            syn::ImplItem::Fn(f) => Some(scanner::method_of(
                                namespace,
                                Some(self_type.clone()),
                                &f.sig,
                                &f.attrs,
                                item.trait_.is_some() || scanner::is_public(&f.vis),
                                path,
                            )),
                            _ => None,
                        })
                        .collect();
                    self.pending.push(PendingImpl {
                        namespace: namespace.to_string(),
                        self_type,
                        methods,
                    });
                }
                syn::Item::Mod(item) => {
                    if let Some((_, nested)) = &item.content {
                        let child = join_namespace(namespace, &item.ident.to_string());
                        self.add_namespace(&child);
                        self.add_items(&child, path, nested);
                    }
                }
                _ => {}
            }
        }
    }

    fn push_type(&mut self, namespace: &str, path: &Path, symbol: TypeSymbol) {
        trace!("Found {:?} {} in {:?}", symbol.kind, join_namespace(namespace, &symbol.name), path);
        self.types.push(symbol);
    }

    /// Attaches impl-block methods to their types. Impls of types declared
    /// elsewhere (foreign types, other namespaces) are dropped.
    pub fn finish(&mut self) {
        let index: HashMap<(String, String), usize> = self
            .types
            .iter()
            .enumerate()
            .map(|(i, t)| ((t.namespace.clone(), t.name.clone()), i))
            .collect();

        for pending in std::mem::take(&mut self.pending) {
            match index.get(&(pending.namespace.clone(), pending.self_type.clone())) {
                Some(&i) => self.types[i].methods.extend(pending.methods),
                None => trace!(
                    "Dropping impl of unknown type {} in '{}'",
                    pending.self_type, pending.namespace
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compile(namespace: &str, source: &str) -> Compilation {
        let mut compilation = Compilation::new();
        compilation.add_source(namespace, "test.rs", source).unwrap();
        compilation.finish();
        compilation
    }

    // ==================== Namespace Tests ====================

    #[test]
    fn test_join_namespace() {
        assert_eq!(join_namespace("", "a"), "a");
        assert_eq!(join_namespace("a", ""), "a");
        assert_eq!(join_namespace("a", "b"), "a::b");
    }

    #[test]
    fn test_relative_namespace() {
        assert_eq!(relative_namespace("game::ui", "game"), Some("ui"));
        assert_eq!(relative_namespace("game", "game"), Some(""));
        assert_eq!(relative_namespace("gameplay", "game"), None);
        assert_eq!(relative_namespace("game", ""), Some("game"));
    }

    #[test]
    fn test_add_namespace_registers_ancestors() {
        let mut compilation = Compilation::new();
        compilation.add_namespace("a::b::c");
        assert!(compilation.has_namespace("a"));
        assert!(compilation.has_namespace("a::b"));
        assert!(compilation.has_namespace("a::b::c"));
        assert!(compilation.has_namespace(""));
        assert!(!compilation.has_namespace("b"));
    }

    // ==================== Item Tests ====================

    #[test]
    fn test_struct_with_fields_and_attributes() {
        let compilation = compile(
            "game",
            r#"
            #[data_object]
            pub struct Player { pub name: String, health: Option<u32> }
            "#,
        );
        let player = &compilation.types()[0];
        assert_eq!(player.full_name(), "game::Player");
        assert_eq!(player.kind, TypeKind::Struct);
        assert!(player.has_attribute("data_object"));
        assert_eq!(player.fields.len(), 2);
        assert_eq!(player.fields[1].ty, "Option<u32>");
        assert!(!player.fields[1].is_public);
    }

    #[test]
    fn test_enum_variants_with_discriminants() {
        let compilation = compile("", "#[nice_flags] enum Mask { A = 1, B = 2, C }");
        let mask = &compilation.types()[0];
        assert_eq!(mask.variants.len(), 3);
        assert_eq!(mask.variants[0].discriminant.as_deref(), Some("1"));
        assert_eq!(mask.variants[2].discriminant, None);
    }

    #[test]
    fn test_impl_methods_attach_to_type() {
        let compilation = compile(
            "ui",
            r#"
            pub struct Console;
            impl Console {
                #[command]
                pub fn clear(&self) {}
                pub fn create() -> Self { Console }
            }
            "#,
        );
        let console = &compilation.types()[0];
        assert_eq!(console.methods.len(), 2);
        assert!(console.methods[0].has_receiver);
        assert!(console.methods[1].is_static());
        assert_eq!(console.methods[0].full_name(), "ui::Console::clear");
    }

    #[test]
    fn test_free_function_parameters() {
        let compilation = compile(
            "cmd",
            "#[parser] pub fn parse_vec(input: &str, #[argument(parser = \"hex\")] radix: u32) -> Option<Vec<u8>> { None }",
        );
        let function = &compilation.functions()[0];
        assert_eq!(function.full_name(), "cmd::parse_vec");
        assert_eq!(function.parameters[0].ty, "&str");
        assert!(function.parameters[1].attributes[0].is("argument"));
        assert_eq!(function.return_type.as_deref(), Some("Option<Vec<u8>>"));
    }

    #[test]
    fn test_inline_modules_nest_namespaces() {
        let compilation = compile("game", "mod inner { pub struct Deep; }");
        assert!(compilation.has_namespace("game::inner"));
        assert_eq!(compilation.types()[0].full_name(), "game::inner::Deep");
    }

    #[test]
    fn test_add_source_reports_parse_errors() {
        let mut compilation = Compilation::new();
        let err = compilation.add_source("", "broken.rs", "struct {").unwrap_err();
        assert!(matches!(err, MarkgenError::ParseError { .. }));
    }

    #[test]
    fn test_render_tokens_compacts_generics() {
        let ty: syn::Type = syn::parse_str("std :: collections :: HashMap < String , Vec < u8 > >").unwrap();
        assert_eq!(render_tokens(&ty), "std::collections::HashMap<String, Vec<u8>>");
    }
}
