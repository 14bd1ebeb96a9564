use crate::{parse_options, path_from};
use linkme::distributed_slice;
use markgen_core::symbols::{TypeKind, TypeSymbol};
use markgen_core::{
    Analyzer, Analyzers, CodeBuilder, CodeFragment, Environment, InitContext, PLUGINS, Plugin, PluginDef, Project,
    Result,
};
use serde::Deserialize;
use std::any::Any;
use tracing::debug;

pub const DATA_OBJECT: &str = "data_object";

const ANNOTATIONS: &str = "pub use markgen_derive::data_object;\n";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DataObjectOptions {
    /// Prefix of the generated copy methods.
    pub method_prefix: String,
}

impl Default for DataObjectOptions {
    fn default() -> Self {
        Self {
            method_prefix: "with_".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DataObject {
    path: String,
    fields: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct DataObjectAnalyzer {
    method_prefix: String,
    objects: Vec<DataObject>,
}

impl DataObjectAnalyzer {
    fn accept(&mut self, project: &Project, ty: &TypeSymbol) {
        let logger = project.logger();
        if ty.kind != TypeKind::Struct {
            logger.error(format!("#[{}] on {} at {}: expected a struct", DATA_OBJECT, ty.name, ty.location));
            return;
        }
        if ty.fields.iter().any(|f| f.name.parse::<usize>().is_ok()) {
            logger.error(format!("Data object {} at {} must have named fields", ty.name, ty.location));
            return;
        }
        if !ty.generics.is_empty() {
            logger.warning(format!("Skipping generic data object {} at {}", ty.name, ty.location));
            return;
        }

        let hidden: Vec<&str> = ty
            .fields
            .iter()
            .filter(|f| !f.is_public)
            .map(|f| f.name.as_str())
            .collect();
        if !hidden.is_empty() {
            logger.warning(format!(
                "Data object {} has fields generated code cannot reach, make them pub: {}",
                ty.name,
                hidden.join(", ")
            ));
        }

        let fields: Vec<(String, String)> = ty
            .fields
            .iter()
            .filter(|f| f.is_public)
            .map(|f| (f.name.clone(), f.ty.clone()))
            .collect();
        if fields.is_empty() {
            logger.debug(format!("Data object {} has no public fields", ty.name));
            return;
        }

        self.objects.push(DataObject {
            path: path_from(project, &ty.full_name()),
            fields,
        });
    }

    fn write_object(&self, builder: &mut CodeBuilder, object: &DataObject) {
        builder.open_block(format!("impl {}", object.path));
        for (i, (name, ty)) in object.fields.iter().enumerate() {
            if i > 0 {
                builder.blank();
            }
            let method = format!("{}{}", self.method_prefix, name.trim_start_matches("r#"));
            builder
                .line("#[must_use]")
                .open_block(format!("pub fn {method}(mut self, {name}: {ty}) -> Self"))
                .line(format!("self.{name} = {name};"))
                .line("self")
                .close_block();
        }
        builder.close_block();
    }
}

impl Analyzer for DataObjectAnalyzer {
    fn collect_symbols(&mut self, project: &Project) {
        for ty in project.types_with_attributes() {
            if ty.has_attribute(DATA_OBJECT) {
                self.accept(project, ty);
            }
        }
        debug!("Project {} has {} data objects", project.name, self.objects.len());
    }

    fn generate_code(&self, project: &Project) -> Option<CodeFragment> {
        if self.objects.is_empty() {
            return None;
        }
        let mut builder = CodeBuilder::new();
        for (i, object) in self.objects.iter().enumerate() {
            if i > 0 {
                builder.blank();
            }
            self.write_object(&mut builder, object);
        }
        Some(builder.into_fragment("data_objects", project.name.clone()))
    }
}

/// Generates `with_<field>` methods for `#[data_object]` structs and puts
/// the marker re-export into the common project.
#[derive(Default)]
pub struct DataObjectPlugin {
    options: DataObjectOptions,
    analyzers: Analyzers<DataObjectAnalyzer>,
}

impl Plugin for DataObjectPlugin {
    fn name(&self) -> &'static str {
        "data_object"
    }

    fn description(&self) -> &'static str {
        "Copy-with methods for #[data_object] structs"
    }

    fn annotations(&self) -> Option<&'static str> {
        Some(ANNOTATIONS)
    }

    fn configure(&mut self, options: &toml::Table) -> Result<()> {
        self.options = parse_options(self.name(), options)?;
        Ok(())
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        let prefix = self.options.method_prefix.clone();
        self.analyzers = Analyzers::new(ctx.env(), |_| DataObjectAnalyzer {
            method_prefix: prefix.clone(),
            objects: Vec::new(),
        });
        Ok(())
    }

    fn collect(&mut self, env: &Environment) {
        self.analyzers.collect(env);
    }

    fn generate(&self, env: &Environment) {
        self.analyzers.generate(env);
        env.common()
            .add_fragment(CodeFragment::new("data_object_annotations", self.name(), ANNOTATIONS));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn create() -> Box<dyn Plugin> {
    Box::new(DataObjectPlugin::default())
}

#[distributed_slice(PLUGINS)]
pub static DATA_OBJECT_PLUGIN: PluginDef = PluginDef {
    name: "data_object",
    type_name: "DataObjectPlugin",
    description: "Copy-with methods for #[data_object] structs",
    order: 5,
    create,
};
