//! Owned attribute data and schema-driven parsing of marker attributes.

use super::render_tokens;
use crate::error::{MarkgenError, Result};
use std::collections::BTreeMap;
use syn::parse::ParseStream;
use syn::punctuated::Punctuated;
use syn::{Expr, Lit, Meta, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// A bare path such as `Case::Snake`.
    Path(String),
    List(Vec<AttrValue>),
}

impl AttrValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            AttrValue::Str(_) => ValueKind::Str,
            AttrValue::Int(_) => ValueKind::Int,
            AttrValue::Bool(_) => ValueKind::Bool,
            AttrValue::Path(_) => ValueKind::Path,
            AttrValue::List(_) => ValueKind::List,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) | AttrValue::Path(s) => Some(s),
            _ => None,
        }
    }

    fn from_expr(expr: &Expr) -> AttrValue {
        match expr {
            Expr::Lit(lit) => match &lit.lit {
                Lit::Str(s) => AttrValue::Str(s.value()),
                Lit::Int(i) => i
                    .base10_parse::<i64>()
                    .map(AttrValue::Int)
                    .unwrap_or_else(|_| AttrValue::Str(i.to_string())),
                Lit::Bool(b) => AttrValue::Bool(b.value),
                Lit::Char(c) => AttrValue::Str(c.value().to_string()),
                other => AttrValue::Str(render_tokens(other)),
            },
            Expr::Unary(unary) if matches!(unary.op, syn::UnOp::Neg(_)) => {
                match AttrValue::from_expr(&unary.expr) {
                    AttrValue::Int(i) => AttrValue::Int(-i),
                    _ => AttrValue::Str(render_tokens(expr)),
                }
            }
            Expr::Path(path) => AttrValue::Path(render_tokens(&path.path)),
            Expr::Array(array) => {
                AttrValue::List(array.elems.iter().map(AttrValue::from_expr).collect())
            }
            other => AttrValue::Str(render_tokens(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeArg {
    /// `#[attr(flag)]`
    Flag(String),
    /// `#[attr(key = value)]` or `#[attr(key(a, b))]`
    Named(String, AttrValue),
    /// `#[attr("value")]`
    Positional(AttrValue),
}

/// One attribute as written on a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeData {
    /// Last path segment, e.g. `command` for `#[markgen::command]`.
    pub name: String,
    pub path: String,
    pub args: Vec<AttributeArg>,
}

impl AttributeData {
    pub fn is(&self, name: &str) -> bool {
        self.name == name || self.path == name
    }

    pub fn named(&self, key: &str) -> Option<&AttrValue> {
        self.args.iter().find_map(|arg| match arg {
            AttributeArg::Named(k, v) if k == key => Some(v),
            _ => None,
        })
    }

    pub fn positional(&self, index: usize) -> Option<&AttrValue> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                AttributeArg::Positional(v) => Some(v),
                _ => None,
            })
            .nth(index)
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.args
            .iter()
            .any(|arg| matches!(arg, AttributeArg::Flag(k) if k == key))
    }

    /// Converts attributes, skipping doc comments.
    pub fn from_syn_list(attrs: &[syn::Attribute]) -> Vec<AttributeData> {
        attrs
            .iter()
            .filter(|a| !a.path().is_ident("doc"))
            .map(AttributeData::from_syn)
            .collect()
    }

    pub fn from_syn(attr: &syn::Attribute) -> AttributeData {
        let path = render_tokens(attr.path());
        let name = attr
            .path()
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .unwrap_or_else(|| path.clone());

        let args = match &attr.meta {
            Meta::Path(_) => Vec::new(),
            Meta::NameValue(nv) => vec![AttributeArg::Positional(AttrValue::from_expr(&nv.value))],
            Meta::List(list) => list
                .parse_args_with(|input: ParseStream| {
                    Punctuated::<AttributeArg, Token![,]>::parse_terminated_with(input, parse_arg)
                })
                .map(|args| args.into_iter().collect())
                .unwrap_or_else(|_| {
                    vec![AttributeArg::Positional(AttrValue::Str(render_tokens(&list.tokens)))]
                }),
        };

        AttributeData { name, path, args }
    }
}

fn parse_arg(input: ParseStream) -> syn::Result<AttributeArg> {
    if input.peek(Lit) || input.peek(Token![-]) || input.peek(syn::token::Bracket) {
        let expr: Expr = input.parse()?;
        return Ok(AttributeArg::Positional(AttrValue::from_expr(&expr)));
    }
    let meta: Meta = input.parse()?;
    Ok(arg_from_meta(&meta))
}

fn arg_from_meta(meta: &Meta) -> AttributeArg {
    match meta {
        Meta::Path(path) => AttributeArg::Flag(render_tokens(path)),
        Meta::NameValue(nv) => {
            AttributeArg::Named(render_tokens(&nv.path), AttrValue::from_expr(&nv.value))
        }
        Meta::List(list) => {
            let values = list
                .parse_args_with(Punctuated::<Expr, Token![,]>::parse_terminated)
                .map(|exprs| exprs.iter().map(AttrValue::from_expr).collect())
                .unwrap_or_else(|_| vec![AttrValue::Str(render_tokens(&list.tokens))]);
            AttributeArg::Named(render_tokens(&list.path), AttrValue::List(values))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Int,
    Bool,
    Path,
    List,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: ValueKind,
    pub required: bool,
    /// Position accepted as an unnamed argument.
    pub positional: Option<usize>,
}

impl FieldSpec {
    pub const fn optional(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind, required: false, positional: None }
    }

    pub const fn required(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind, required: true, positional: None }
    }

    pub const fn at(mut self, position: usize) -> Self {
        self.positional = Some(position);
        self
    }
}

/// The accepted arguments of one marker attribute.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSchema {
    pub attribute: &'static str,
    pub fields: &'static [FieldSpec],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAttribute {
    values: BTreeMap<&'static str, AttrValue>,
}

impl ParsedAttribute {
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttrValue::as_str)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(AttrValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(AttrValue::Int(i)) => Some(*i),
            _ => None,
        }
    }
}

impl AttributeSchema {
    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validates `attr` against the schema. Bare flags are read as `true`
    /// for boolean fields.
    pub fn parse(&self, attr: &AttributeData) -> Result<ParsedAttribute> {
        let mut parsed = ParsedAttribute::default();
        let mut position = 0;

        for arg in &attr.args {
            let (spec, value) = match arg {
                AttributeArg::Named(key, value) => (self.lookup(key)?, value.clone()),
                AttributeArg::Flag(key) => (self.lookup(key)?, AttrValue::Bool(true)),
                AttributeArg::Positional(value) => {
                    let spec = self
                        .fields
                        .iter()
                        .find(|f| f.positional == Some(position))
                        .ok_or_else(|| {
                            MarkgenError::invalid_attribute(format!(
                                "#[{}] takes no argument at position {}",
                                self.attribute, position
                            ))
                        })?;
                    position += 1;
                    (spec, value.clone())
                }
            };

            if value.kind() != spec.kind && !(spec.kind == ValueKind::Str && value.kind() == ValueKind::Path) {
                return Err(MarkgenError::invalid_attribute(format!(
                    "#[{}] field `{}` expects {:?}, found {:?}",
                    self.attribute,
                    spec.name,
                    spec.kind,
                    value.kind()
                )));
            }
            if parsed.values.insert(spec.name, value).is_some() {
                return Err(MarkgenError::invalid_attribute(format!(
                    "#[{}] field `{}` given twice",
                    self.attribute, spec.name
                )));
            }
        }

        if let Some(missing) = self
            .fields
            .iter()
            .find(|f| f.required && !parsed.values.contains_key(f.name))
        {
            return Err(MarkgenError::missing_field(format!(
                "#[{}] requires `{}`",
                self.attribute, missing.name
            )));
        }

        Ok(parsed)
    }

    fn lookup(&self, key: &str) -> Result<&FieldSpec> {
        self.field(key).ok_or_else(|| {
            MarkgenError::invalid_attribute(format!(
                "#[{}] has no field `{}`",
                self.attribute, key
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn attribute(source: &str) -> AttributeData {
        let item: syn::ItemStruct = syn::parse_str(&format!("{source} struct S;")).unwrap();
        AttributeData::from_syn(&item.attrs[0])
    }

    const COMMAND: AttributeSchema = AttributeSchema {
        attribute: "command",
        fields: &[
            FieldSpec::optional("name", ValueKind::Str).at(0),
            FieldSpec::optional("help", ValueKind::Str),
            FieldSpec::optional("hidden", ValueKind::Bool),
        ],
    };

    const ARGUMENT: AttributeSchema = AttributeSchema {
        attribute: "argument",
        fields: &[FieldSpec::required("parser", ValueKind::Str)],
    };

    // ==================== Conversion Tests ====================

    #[test]
    fn test_path_attribute_has_no_args() {
        let attr = attribute("#[nice_flags]");
        assert_eq!(attr.name, "nice_flags");
        assert!(attr.args.is_empty());
    }

    #[test]
    fn test_qualified_path_uses_last_segment() {
        let attr = attribute("#[markgen::command]");
        assert_eq!(attr.name, "command");
        assert_eq!(attr.path, "markgen::command");
        assert!(attr.is("command"));
    }

    #[test]
    fn test_named_and_flag_args() {
        let attr = attribute("#[command(name = \"quit\", hidden, priority = -3)]");
        assert_eq!(attr.named("name"), Some(&AttrValue::Str("quit".to_string())));
        assert_eq!(attr.named("priority"), Some(&AttrValue::Int(-3)));
        assert!(attr.has_flag("hidden"));
    }

    #[test]
    fn test_positional_literal_args() {
        let attr = attribute("#[command(\"quit\", 2)]");
        assert_eq!(attr.positional(0), Some(&AttrValue::Str("quit".to_string())));
        assert_eq!(attr.positional(1), Some(&AttrValue::Int(2)));
    }

    #[test]
    fn test_nested_list_arg() {
        let attr = attribute("#[derive_extra(aliases(\"q\", \"exit\"))]");
        assert_eq!(
            attr.named("aliases"),
            Some(&AttrValue::List(vec![
                AttrValue::Str("q".to_string()),
                AttrValue::Str("exit".to_string())
            ]))
        );
    }

    #[test]
    fn test_doc_comments_are_skipped() {
        let item: syn::ItemStruct = syn::parse_str("/// Docs\n#[data_object] struct S;").unwrap();
        let attrs = AttributeData::from_syn_list(&item.attrs);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name, "data_object");
    }

    // ==================== Schema Tests ====================

    #[test]
    fn test_schema_parses_named_and_positional() {
        let parsed = COMMAND.parse(&attribute("#[command(\"quit\", help = \"Exit\", hidden)]")).unwrap();
        assert_eq!(parsed.str("name"), Some("quit"));
        assert_eq!(parsed.str("help"), Some("Exit"));
        assert_eq!(parsed.bool("hidden"), Some(true));
    }

    #[test]
    fn test_schema_rejects_unknown_field() {
        let err = COMMAND.parse(&attribute("#[command(colour = \"red\")]")).unwrap_err();
        assert!(matches!(err, MarkgenError::InvalidAttribute(_)));
    }

    #[test]
    fn test_schema_rejects_wrong_kind() {
        let err = COMMAND.parse(&attribute("#[command(name = 4)]")).unwrap_err();
        assert!(err.to_string().contains("expects Str"));
    }

    #[test]
    fn test_schema_rejects_duplicate_field() {
        let err = COMMAND
            .parse(&attribute("#[command(\"a\", name = \"b\")]"))
            .unwrap_err();
        assert!(err.to_string().contains("given twice"));
    }

    #[test]
    fn test_schema_reports_missing_required_field() {
        let err = ARGUMENT.parse(&attribute("#[argument]")).unwrap_err();
        assert!(matches!(err, MarkgenError::MissingField(_)));
    }
}
