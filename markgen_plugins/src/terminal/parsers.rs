use super::{PARSERS_REGISTRY, TerminalOptions, runtime_namespace, terminal_project};
use crate::{parse_options, parsed_type};
use linkme::distributed_slice;
use markgen_core::symbols::{AttributeSchema, FieldSpec, MethodSymbol, ValueKind, join_namespace};
use markgen_core::{
    Analyzer, Analyzers, CallbackInfo, CodeBuilder, CodeFragment, Environment, InitContext, PLUGINS, Plugin,
    PluginDef, Project, ProjectId, Registry, RegistryEntry, Result,
};
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

pub const PARSER: &str = "parser";

/// Parsers are final once this callback has run.
pub const PARSERS_CHECK_PRIORITY: i32 = 1;

const CHECK_PARSERS: usize = 0;

static PARSER_SCHEMA: AttributeSchema = AttributeSchema {
    attribute: PARSER,
    fields: &[FieldSpec::optional("name", ValueKind::Str).at(0)],
};

const NUMBERS: &[&str] = &[
    "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize", "f32", "f64",
];

/// Built-in parser for `ty` and the body of its function.
fn builtin_body(ty: &str) -> &'static [&'static str] {
    match ty {
        "bool" => &[
            "match input.trim().to_ascii_lowercase().as_str() {",
            "    \"true\" | \"yes\" | \"on\" | \"1\" => Some(true),",
            "    \"false\" | \"no\" | \"off\" | \"0\" => Some(false),",
            "    _ => None,",
            "}",
        ],
        "char" => &[
            "let mut chars = input.chars();",
            "match (chars.next(), chars.next()) {",
            "    (Some(c), None) => Some(c),",
            "    _ => None,",
            "}",
        ],
        "String" => &["Some(input.to_string())"],
        _ => &["input.trim().parse().ok()"],
    }
}

fn builtin_types() -> impl Iterator<Item = &'static str> {
    NUMBERS.iter().copied().chain(["bool", "char", "String"])
}

fn builtin_function(ty: &str) -> String {
    format!("parse_{}", ty.to_ascii_lowercase())
}

/// The parser registry with every built-in parser as a default.
pub fn builtin_registry(runtime: &str, terminal: ProjectId) -> Registry {
    builtin_types().fold(Registry::new(PARSERS_REGISTRY), |registry, ty| {
        let target = join_namespace(runtime, &builtin_function(ty));
        registry.with_default(ty, RegistryEntry::new(ty, target, terminal, "<builtin>"))
    })
}

#[derive(Debug, Clone, PartialEq)]
struct CustomParser {
    key: String,
    name: String,
}

#[derive(Debug)]
pub struct ParsersAnalyzer {
    project: ProjectId,
    registry: Arc<Registry>,
    parsers: Vec<CustomParser>,
}

impl ParsersAnalyzer {
    fn accept(&mut self, project: &Project, method: &MethodSymbol) -> Result<()> {
        let attribute = method.attribute(PARSER).map(|a| PARSER_SCHEMA.parse(a)).transpose()?;
        let name = attribute
            .as_ref()
            .and_then(|a| a.str("name"))
            .unwrap_or(method.name.as_str())
            .to_string();

        let logger = project.logger();
        if method.has_receiver {
            logger.error(format!("Parser {} at {} must not take self", method.name, method.location));
            return Ok(());
        }
        if method.parameters.len() != 1 {
            logger.error(format!(
                "Parser {} at {} must take exactly one &str argument",
                method.name, method.location
            ));
            return Ok(());
        }
        let Some(key) = method.return_type.as_deref().and_then(parsed_type) else {
            logger.error(format!(
                "Parser {} at {} must return Option<T> or Result<T, E>",
                method.name, method.location
            ));
            return Ok(());
        };

        let entry = RegistryEntry::new(&name, method.full_name(), self.project, method.location.to_string());
        self.registry.register(&key, entry)?;
        self.parsers.push(CustomParser { key, name });
        Ok(())
    }
}

impl Analyzer for ParsersAnalyzer {
    fn collect_symbols(&mut self, project: &Project) {
        for method in project.methods_with_attributes() {
            if !method.has_attribute(PARSER) {
                continue;
            }
            if let Err(e) = self.accept(project, method) {
                project.logger().error(format!("{} ({})", e, method.location));
            }
        }
        debug!("Project {} declares {} parsers", project.name, self.parsers.len());
    }

    fn generate_code(&self, project: &Project) -> Option<CodeFragment> {
        if self.parsers.is_empty() {
            return None;
        }
        let mut builder = CodeBuilder::new();
        builder
            .line("/// Parsers declared in this project, as (parsed type, parser name).")
            .open_block("pub const PARSERS: &[(&str, &str)] = &[");
        for parser in &self.parsers {
            builder.line(format!("({:?}, {:?}),", parser.key, parser.name));
        }
        builder.close_block_with("];");
        Some(builder.into_fragment("parsers", project.name.clone()))
    }
}

/// Collects `#[parser]` functions into the shared parser registry and
/// writes the parsing runtime into the terminal project.
#[derive(Default)]
pub struct ParsersPlugin {
    options: TerminalOptions,
    terminal: Option<ProjectId>,
    registry: Option<Arc<Registry>>,
    analyzers: Analyzers<ParsersAnalyzer>,
}

impl ParsersPlugin {
    pub fn terminal(&self) -> Option<ProjectId> {
        self.terminal
    }

    pub fn registry(&self) -> Option<&Arc<Registry>> {
        self.registry.as_ref()
    }

    fn runtime(&self) -> CodeFragment {
        let mut builder = CodeBuilder::new();
        builder
            .line("/// Return values a parser may have.")
            .open_block("pub trait Parsed<T>")
            .line("fn parsed(self) -> Option<T>;")
            .close_block()
            .blank()
            .open_block("impl<T> Parsed<T> for Option<T>")
            .open_block("fn parsed(self) -> Option<T>")
            .line("self")
            .close_block()
            .close_block()
            .blank()
            .open_block("impl<T, E> Parsed<T> for Result<T, E>")
            .open_block("fn parsed(self) -> Option<T>")
            .line("self.ok()")
            .close_block()
            .close_block();

        for ty in builtin_types() {
            builder
                .blank()
                .open_block(format!("pub fn {}(input: &str) -> Option<{}>", builtin_function(ty), ty));
            for line in builtin_body(ty) {
                builder.line(line);
            }
            builder.close_block();
        }
        builder.into_fragment("parsers_runtime", self.name())
    }
}

impl Plugin for ParsersPlugin {
    fn name(&self) -> &'static str {
        "parsers"
    }

    fn description(&self) -> &'static str {
        "Argument parsers for terminal commands"
    }

    fn configure(&mut self, options: &toml::Table) -> Result<()> {
        self.options = parse_options(self.name(), options)?;
        Ok(())
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        let env = ctx.env();
        let terminal = terminal_project(env, &self.options.terminal_project);
        let runtime = runtime_namespace(env, terminal);
        let registry = env
            .resources()
            .registry(PARSERS_REGISTRY, || builtin_registry(&runtime, terminal));

        let mut index = 0;
        self.analyzers = Analyzers::new(env, |_| {
            let analyzer = ParsersAnalyzer {
                project: ProjectId::Index(index),
                registry: Arc::clone(&registry),
                parsers: Vec::new(),
            };
            index += 1;
            analyzer
        });
        self.terminal = Some(terminal);
        self.registry = Some(registry);
        Ok(())
    }

    fn collect(&mut self, env: &Environment) {
        self.analyzers.collect(env);
    }

    fn callbacks(&self) -> Vec<CallbackInfo> {
        vec![CallbackInfo::new(PARSERS_CHECK_PRIORITY, CHECK_PARSERS, "check parsers")]
    }

    fn run_callback(&mut self, id: usize, env: &Environment) {
        if id != CHECK_PARSERS {
            return;
        }
        if let Some(registry) = &self.registry {
            registry.seal();
            env.logger(self.name())
                .info(format!("{} custom parsers registered", registry.len()));
        }
    }

    fn generate(&self, env: &Environment) {
        self.analyzers.generate(env);
        if let Some(terminal) = self.terminal.and_then(|id| env.project_data(id)) {
            terminal.add_fragment(self.runtime());
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn create() -> Box<dyn Plugin> {
    Box::new(ParsersPlugin::default())
}

#[distributed_slice(PLUGINS)]
pub static PARSERS_PLUGIN: PluginDef = PluginDef {
    name: "parsers",
    type_name: "ParsersPlugin",
    description: "Argument parsers for terminal commands",
    order: 10,
    create,
};
