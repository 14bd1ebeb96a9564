use super::parsers::{PARSERS_CHECK_PRIORITY, ParsersPlugin};
use super::{path_in, runtime_namespace};
use crate::{path_from, type_key};
use convert_case::{Case, Casing};
use linkme::distributed_slice;
use markgen_core::symbols::{AttributeSchema, FieldSpec, MethodSymbol, ParameterSymbol, ValueKind};
use markgen_core::{
    Analyzer, Analyzers, CallbackInfo, CodeBuilder, CodeFragment, Environment, InitContext, MarkgenError, PLUGINS,
    Plugin, PluginDef, Project, ProjectId, Registry, Result,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const COMMAND: &str = "command";
pub const ARGUMENT: &str = "argument";

/// Runs right after the parser registry is sealed.
pub const RESOLVE_PARSERS_PRIORITY: i32 = PARSERS_CHECK_PRIORITY + 1;

const RESOLVE_PARSERS: usize = 0;

static COMMAND_SCHEMA: AttributeSchema = AttributeSchema {
    attribute: COMMAND,
    fields: &[
        FieldSpec::optional("name", ValueKind::Str).at(0),
        FieldSpec::optional("help", ValueKind::Str),
    ],
};

static ARGUMENT_SCHEMA: AttributeSchema = AttributeSchema {
    attribute: ARGUMENT,
    fields: &[
        FieldSpec::optional("parser", ValueKind::Str).at(0),
        FieldSpec::optional("help", ValueKind::Str),
    ],
};

#[derive(Debug, Clone, PartialEq)]
struct ArgumentInfo {
    name: String,
    ty: String,
    key: String,
    parser: Option<String>,
    help: Option<String>,
    /// Full path of the parser, once resolved.
    resolved: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct CommandInfo {
    name: String,
    help: String,
    target: String,
    arguments: Vec<ArgumentInfo>,
    returns_value: bool,
    location: String,
}

impl CommandInfo {
    fn function_name(&self) -> String {
        format!("{}_command", self.name.replace('.', "_").to_case(Case::Snake))
    }

    fn usage(&self) -> String {
        let mut usage = self.name.clone();
        for argument in &self.arguments {
            usage.push_str(&format!(" <{}: {}>", argument.name, argument.ty));
        }
        usage
    }
}

fn argument_info(parameter: &ParameterSymbol) -> Result<ArgumentInfo> {
    let attribute = parameter
        .attributes
        .iter()
        .find(|a| a.is(ARGUMENT))
        .map(|a| ARGUMENT_SCHEMA.parse(a))
        .transpose()?;
    Ok(ArgumentInfo {
        name: parameter.name.clone(),
        ty: parameter.ty.clone(),
        key: type_key(&parameter.ty),
        parser: attribute.as_ref().and_then(|a| a.str("parser")).map(str::to_string),
        help: attribute.as_ref().and_then(|a| a.str("help")).map(str::to_string),
        resolved: None,
    })
}

#[derive(Debug)]
pub struct CommandsAnalyzer {
    project: ProjectId,
    runtime: String,
    commands: Vec<CommandInfo>,
}

impl CommandsAnalyzer {
    fn accept(&mut self, project: &Project, method: &MethodSymbol) -> Result<()> {
        if method.has_receiver {
            return Err(MarkgenError::invalid_attribute(format!(
                "Command {} must not take self",
                method.name
            )));
        }
        let attribute = method.attribute(COMMAND).map(|a| COMMAND_SCHEMA.parse(a)).transpose()?;
        let name = attribute
            .as_ref()
            .and_then(|a| a.str("name"))
            .unwrap_or(method.name.as_str())
            .to_string();

        if let Some(existing) = self.commands.iter().find(|c| c.name.eq_ignore_ascii_case(&name)) {
            return Err(MarkgenError::duplicate_definition(format!(
                "command '{}' is declared at {} and {}",
                name, existing.location, method.location
            )));
        }

        let arguments = method
            .parameters
            .iter()
            .map(argument_info)
            .collect::<Result<Vec<_>>>()?;
        let help = attribute
            .as_ref()
            .and_then(|a| a.str("help"))
            .unwrap_or_default()
            .to_string();

        let command = CommandInfo {
            target: path_from(project, &method.full_name()),
            name,
            help,
            arguments,
            returns_value: method.return_type.is_some(),
            location: method.location.to_string(),
        };
        let function = command.function_name();
        if let Some(existing) = self.commands.iter().find(|c| c.function_name() == function) {
            return Err(MarkgenError::duplicate_definition(format!(
                "commands '{}' ({}) and '{}' ({}) both generate {}",
                existing.name, existing.location, command.name, command.location, function
            )));
        }
        self.commands.push(command);
        Ok(())
    }

    /// Attaches a parser to every argument. Returns one message per
    /// argument left without a parser.
    fn resolve(&mut self, env: &Environment, registry: &Registry) -> Vec<String> {
        let mut missing = Vec::new();
        for command in &mut self.commands {
            for argument in &mut command.arguments {
                match registry.lookup(&argument.key, argument.parser.as_deref()) {
                    Some(entry) => argument.resolved = Some(path_in(env, self.project, &entry.target)),
                    None => missing.push(match &argument.parser {
                        Some(parser) => format!(
                            "No such parser '{}' for {} (argument {} of command {} at {})",
                            parser, argument.ty, argument.name, command.name, command.location
                        ),
                        None => format!(
                            "Found no parsers for {} (argument {} of command {} at {})",
                            argument.ty, argument.name, command.name, command.location
                        ),
                    }),
                }
            }
        }
        missing
    }

    fn write_command(&self, builder: &mut CodeBuilder, command: &CommandInfo) {
        let runtime = &self.runtime;
        if !command.help.is_empty() {
            builder.line(format!("/// {}", command.help));
        }
        for argument in &command.arguments {
            if let Some(help) = &argument.help {
                builder.line(format!("/// - `{}`: {}", argument.name, help));
            }
        }
        builder.open_block(format!(
            "pub fn {}(arguments: &[&str]) -> Result<String, String>",
            command.function_name()
        ));
        builder.line(format!(
            "{}::expect_arguments(arguments, {}, {:?})?;",
            runtime,
            command.arguments.len(),
            command.usage()
        ));

        let mut names = Vec::new();
        for (index, argument) in command.arguments.iter().enumerate() {
            let parser = argument.resolved.as_deref().unwrap_or_default();
            let local = format!("arg_{}", argument.name.trim_start_matches("r#"));
            builder.line(format!(
                "let {local} = {runtime}::argument(arguments, {index}, {:?}, |s| {runtime}::Parsed::parsed({parser}(s)))?;",
                argument.name
            ));
            names.push(local);
        }

        let call = format!("{}({})", command.target, names.join(", "));
        if command.returns_value {
            builder.line(format!("Ok({call}.to_string())"));
        } else {
            builder.line(format!("{call};")).line("Ok(String::new())");
        }
        builder.close_block();
    }
}

impl Analyzer for CommandsAnalyzer {
    fn collect_symbols(&mut self, project: &Project) {
        for method in project.methods_with_attributes() {
            if !method.has_attribute(COMMAND) {
                continue;
            }
            if let Err(e) = self.accept(project, method) {
                project.logger().error(format!("{} ({})", e, method.location));
            }
        }
        debug!("Project {} declares {} commands", project.name, self.commands.len());
    }

    fn generate_code(&self, project: &Project) -> Option<CodeFragment> {
        if self.commands.is_empty() {
            return None;
        }
        let mut builder = CodeBuilder::new();
        for command in &self.commands {
            self.write_command(&mut builder, command);
            builder.blank();
        }

        builder.open_block(format!("pub const COMMANDS: &[{}::CommandInfo] = &[", self.runtime));
        for command in &self.commands {
            builder
                .open_block(format!("{}::CommandInfo", self.runtime))
                .line(format!("name: {:?},", command.name))
                .line(format!("help: {:?},", command.help))
                .line(format!("usage: {:?},", command.usage()))
                .line(format!("run: {},", command.function_name()))
                .close_block_with("},");
        }
        builder.close_block_with("];");
        Some(builder.into_fragment("commands", project.name.clone()))
    }
}

/// Turns `#[command]` functions into string-argument adapters. Needs the
/// parsers plugin for argument parsing.
#[derive(Default)]
pub struct CommandsPlugin {
    terminal: Option<ProjectId>,
    registry: Option<Arc<Registry>>,
    analyzers: Analyzers<CommandsAnalyzer>,
}

impl CommandsPlugin {
    fn check_names(&self, env: &Environment) {
        let logger = env.logger(self.name());
        let mut seen: HashMap<String, &str> = HashMap::new();
        for (analyzer, project) in self.analyzers.with_projects(env) {
            for command in &analyzer.commands {
                if let Some(other) = seen.insert(command.name.to_ascii_lowercase(), project.name.as_str()) {
                    if other != project.name {
                        logger.error(format!(
                            "Command '{}' is declared in both {} and {}",
                            command.name, other, project.name
                        ));
                    }
                }
            }
        }
    }

    fn runtime(&self) -> CodeFragment {
        let mut builder = CodeBuilder::new();
        builder
            .line("#[derive(Clone, Copy)]")
            .open_block("pub struct CommandInfo")
            .line("pub name: &'static str,")
            .line("pub help: &'static str,")
            .line("pub usage: &'static str,")
            .line("pub run: fn(&[&str]) -> Result<String, String>,")
            .close_block()
            .blank()
            .open_block("pub fn expect_arguments(arguments: &[&str], count: usize, usage: &str) -> Result<(), String>")
            .open_block("if arguments.len() == count")
            .line("Ok(())")
            .close_block()
            .open_block("else")
            .line("Err(format!(\"expected {} argument(s), usage: {}\", count, usage))")
            .close_block()
            .close_block()
            .blank()
            .open_block("pub fn argument<T>(arguments: &[&str], index: usize, name: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, String>")
            .line("let raw = arguments.get(index).ok_or_else(|| format!(\"missing argument {}\", name))?;")
            .line("parse(raw).ok_or_else(|| format!(\"invalid value '{}' for argument {}\", raw, name))")
            .close_block();
        builder.into_fragment("commands_runtime", self.name())
    }

    /// Every project's `COMMANDS`, chained, written into root.
    fn registration(&self, env: &Environment, runtime: &str) -> Option<CodeFragment> {
        let projects: Vec<&Project> = self
            .analyzers
            .with_projects(env)
            .filter(|(analyzer, _)| !analyzer.commands.is_empty())
            .map(|(_, project)| project)
            .collect();
        if projects.is_empty() {
            return None;
        }

        let root = env.root_id();
        let mut builder = CodeBuilder::new();
        builder
            .line("/// Every generated command, in project order.")
            .open_block(format!(
                "pub fn all_commands() -> Vec<{}::CommandInfo>",
                path_in(env, root, runtime)
            ))
            .line("let mut commands = Vec::new();");
        for project in projects {
            let generated = path_in(env, root, &project.generated_namespace);
            builder.line(format!("commands.extend_from_slice({generated}::COMMANDS);"));
        }
        builder.line("commands").close_block();
        Some(builder.into_fragment("commands_registration", self.name()))
    }
}

impl Plugin for CommandsPlugin {
    fn name(&self) -> &'static str {
        "commands"
    }

    fn description(&self) -> &'static str {
        "Terminal command adapters for #[command] functions"
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        let parsers = ctx.find::<ParsersPlugin>().ok_or_else(|| {
            MarkgenError::config("The commands plugin needs the parsers plugin to be loaded before it")
        })?;
        let (Some(terminal), Some(registry)) = (parsers.terminal(), parsers.registry()) else {
            return Err(MarkgenError::config("The parsers plugin was not initialized"));
        };

        let env = ctx.env();
        let runtime = runtime_namespace(env, terminal);
        let mut index = 0;
        self.analyzers = Analyzers::new(env, |_| {
            let project = ProjectId::Index(index);
            index += 1;
            CommandsAnalyzer {
                project,
                runtime: path_in(env, project, &runtime),
                commands: Vec::new(),
            }
        });
        self.terminal = Some(terminal);
        self.registry = Some(Arc::clone(registry));
        Ok(())
    }

    fn collect(&mut self, env: &Environment) {
        self.analyzers.collect(env);
    }

    fn callbacks(&self) -> Vec<CallbackInfo> {
        vec![CallbackInfo::new(RESOLVE_PARSERS_PRIORITY, RESOLVE_PARSERS, "resolve command parsers")]
    }

    fn run_callback(&mut self, id: usize, env: &Environment) {
        if id != RESOLVE_PARSERS {
            return;
        }
        self.check_names(env);
        let Some(registry) = self.registry.clone() else {
            return;
        };
        for (analyzer, project) in self.analyzers.iter_mut().zip(env.projects()) {
            for message in analyzer.resolve(env, &registry) {
                project.logger().error(message);
            }
        }
    }

    fn generate(&self, env: &Environment) {
        self.analyzers.generate(env);

        let Some(terminal) = self.terminal else {
            return;
        };
        if let Some(data) = env.project_data(terminal) {
            data.add_fragment(self.runtime());
        }
        if let Some(fragment) = self.registration(env, &runtime_namespace(env, terminal)) {
            env.root().add_fragment(fragment);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn create() -> Box<dyn Plugin> {
    Box::new(CommandsPlugin::default())
}

#[distributed_slice(PLUGINS)]
pub static COMMANDS_PLUGIN: PluginDef = PluginDef {
    name: "commands",
    type_name: "CommandsPlugin",
    description: "Terminal command adapters for #[command] functions",
    order: 20,
    create,
};
