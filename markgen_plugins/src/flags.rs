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

pub const NICE_FLAGS: &str = "nice_flags";

const ANNOTATIONS: &str = "pub use markgen_derive::nice_flags;\n";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FlagsOptions {
    /// Integer type the flag values are read as.
    pub bits_type: String,
}

impl Default for FlagsOptions {
    fn default() -> Self {
        Self {
            bits_type: "u32".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FlagsEnum {
    path: String,
    variants: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FlagsAnalyzer {
    bits_type: String,
    enums: Vec<FlagsEnum>,
}

impl FlagsAnalyzer {
    fn accept(&mut self, project: &Project, ty: &TypeSymbol) {
        let logger = project.logger();
        if ty.kind != TypeKind::Enum {
            logger.error(format!("#[{}] on {} at {}: expected an enum", NICE_FLAGS, ty.name, ty.location));
            return;
        }
        if !ty.generics.is_empty() {
            logger.error(format!("Flags enum {} at {} must not be generic", ty.name, ty.location));
            return;
        }
        if ty.variants.is_empty() {
            logger.warning(format!("Flags enum {} has no variants", ty.name));
            return;
        }

        let implicit: Vec<&str> = ty
            .variants
            .iter()
            .filter(|v| v.discriminant.is_none())
            .map(|v| v.name.as_str())
            .collect();
        if !implicit.is_empty() {
            logger.warning(format!(
                "Flags enum {} has variants without explicit values: {}",
                ty.name,
                implicit.join(", ")
            ));
        }

        self.enums.push(FlagsEnum {
            path: path_from(project, &ty.full_name()),
            variants: ty.variants.iter().map(|v| v.name.clone()).collect(),
        });
    }

    fn write_enum(&self, builder: &mut CodeBuilder, flags: &FlagsEnum) {
        let bits = &self.bits_type;
        let all: Vec<String> = flags.variants.iter().map(|v| format!("Self::{v}")).collect();

        builder.open_block(format!("impl {}", flags.path));
        builder.line(format!("pub const ALL: &'static [Self] = &[{}];", all.join(", ")));
        builder.blank();
        builder
            .open_block(format!("pub const fn bits(self) -> {bits}"))
            .line(format!("self as {bits}"))
            .close_block();
        builder.blank();
        builder
            .line("/// True when every bit of `self` is set in `bits`.")
            .open_block(format!("pub const fn has(self, bits: {bits}) -> bool"))
            .line(format!("let flag = self as {bits};"))
            .line("bits & flag == flag")
            .close_block();
        builder.blank();
        builder
            .open_block(format!("pub const fn has_any(self, bits: {bits}) -> bool"))
            .line(format!("bits & (self as {bits}) != 0"))
            .close_block();
        builder.blank();
        builder.open_block(format!("pub fn flag_names(bits: {bits}) -> Vec<&'static str>"));
        builder.line("let mut names = Vec::new();");
        for variant in &flags.variants {
            builder
                .open_block(format!("if bits & (Self::{variant} as {bits}) != 0"))
                .line(format!("names.push({variant:?});"))
                .close_block();
        }
        builder.line("names");
        builder.close_block();
        builder.close_block();
    }
}

impl Analyzer for FlagsAnalyzer {
    fn collect_symbols(&mut self, project: &Project) {
        for ty in project.types_with_attributes() {
            if ty.has_attribute(NICE_FLAGS) {
                self.accept(project, ty);
            }
        }
        debug!("Project {} has {} flags enums", project.name, self.enums.len());
    }

    fn generate_code(&self, project: &Project) -> Option<CodeFragment> {
        if self.enums.is_empty() {
            return None;
        }
        let mut builder = CodeBuilder::new();
        for (i, flags) in self.enums.iter().enumerate() {
            if i > 0 {
                builder.blank();
            }
            self.write_enum(&mut builder, flags);
        }
        Some(builder.into_fragment("flags", project.name.clone()))
    }
}

/// Generates bit helpers for `#[nice_flags]` enums.
#[derive(Default)]
pub struct FlagsPlugin {
    options: FlagsOptions,
    analyzers: Analyzers<FlagsAnalyzer>,
}

impl Plugin for FlagsPlugin {
    fn name(&self) -> &'static str {
        "flags"
    }

    fn description(&self) -> &'static str {
        "Bit helpers for #[nice_flags] enums"
    }

    fn annotations(&self) -> Option<&'static str> {
        Some(ANNOTATIONS)
    }

    fn configure(&mut self, options: &toml::Table) -> Result<()> {
        self.options = parse_options(self.name(), options)?;
        Ok(())
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        let bits_type = self.options.bits_type.clone();
        self.analyzers = Analyzers::new(ctx.env(), |_| FlagsAnalyzer {
            bits_type: bits_type.clone(),
            enums: Vec::new(),
        });
        Ok(())
    }

    fn collect(&mut self, env: &Environment) {
        self.analyzers.collect(env);
    }

    fn generate(&self, env: &Environment) {
        self.analyzers.generate(env);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn create() -> Box<dyn Plugin> {
    Box::new(FlagsPlugin::default())
}

#[distributed_slice(PLUGINS)]
pub static FLAGS_PLUGIN: PluginDef = PluginDef {
    name: "flags",
    type_name: "FlagsPlugin",
    description: "Bit helpers for #[nice_flags] enums",
    order: 0,
    create,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{payload, read, run, write};
    use markgen_core::{RunStatus, Severity};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const LAYER: &str = "#[nice_flags]\npub enum Layer { Ground = 1, Water = 2 }\n";

    // ==================== Options Tests ====================

    #[test]
    fn test_options_default_to_u32() {
        let options: FlagsOptions = parse_options("flags", &toml::Table::new()).unwrap();
        assert_eq!(options.bits_type, "u32");
    }

    #[test]
    fn test_unknown_option_rejected() {
        let mut table = toml::Table::new();
        table.insert("width".into(), toml::Value::Integer(8));
        let mut plugin = FlagsPlugin::default();
        assert!(plugin.configure(&table).is_err());
    }

    // ==================== Generation Tests ====================

    #[tokio::test]
    async fn test_generates_helpers_per_project() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "game/game.module.json", "{}");
        write(dir.path(), "game/src/lib.rs", LAYER);

        let (status, diagnostics) = run(&dir, &["flags"], &[]).await;
        assert_eq!(status, RunStatus::Succeeded);
        assert_eq!(diagnostics.warning_count(), 0);

        let payload = payload(dir.path(), "game/generated/flags.rs");
        assert_eq!(
            payload,
            "impl crate::Layer {\n    \
             pub const ALL: &'static [Self] = &[Self::Ground, Self::Water];\n\n    \
             pub const fn bits(self) -> u32 {\n        self as u32\n    }\n\n    \
             /// True when every bit of `self` is set in `bits`.\n    \
             pub const fn has(self, bits: u32) -> bool {\n        let flag = self as u32;\n        bits & flag == flag\n    }\n\n    \
             pub const fn has_any(self, bits: u32) -> bool {\n        bits & (self as u32) != 0\n    }\n\n    \
             pub fn flag_names(bits: u32) -> Vec<&'static str> {\n        \
             let mut names = Vec::new();\n        \
             if bits & (Self::Ground as u32) != 0 {\n            names.push(\"Ground\");\n        }\n        \
             if bits & (Self::Water as u32) != 0 {\n            names.push(\"Water\");\n        }\n        \
             names\n    }\n}\n"
        );
    }

    #[tokio::test]
    async fn test_bits_type_option() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "game/game.module.json", "{}");
        write(dir.path(), "game/src/lib.rs", LAYER);

        let options = [("flags", "bits_type", toml::Value::String("u8".into()))];
        let (status, _) = run(&dir, &["flags"], &options).await;
        assert_eq!(status, RunStatus::Succeeded);
        assert!(read(dir.path(), "game/generated/flags.rs").contains("pub const fn bits(self) -> u8"));
    }

    #[tokio::test]
    async fn test_flags_on_struct_is_an_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "game/game.module.json", "{}");
        write(dir.path(), "game/src/lib.rs", "#[nice_flags]\npub struct Layer;\n");

        let (status, diagnostics) = run(&dir, &["flags"], &[]).await;
        assert_eq!(status, RunStatus::Failed);
        assert_eq!(diagnostics.error_count(), 1);
        assert!(!dir.path().join("game/generated").exists());
    }

    #[tokio::test]
    async fn test_implicit_values_warn() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "game/game.module.json", "{}");
        write(dir.path(), "game/src/lib.rs", "#[nice_flags]\npub enum Layer { Ground, Water = 2 }\n");

        let (status, diagnostics) = run(&dir, &["flags"], &[]).await;
        assert_eq!(status, RunStatus::Succeeded);
        assert_eq!(diagnostics.warning_count(), 1);
        let warning = diagnostics
            .snapshot()
            .into_iter()
            .find(|d| d.severity == Severity::Warning)
            .unwrap();
        assert!(warning.message.contains("Ground"));
    }
}
