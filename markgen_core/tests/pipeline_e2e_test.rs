//! End-to-end tests for the generation pipeline.
//!
//! These tests verify that:
//! 1. Repeated runs over the same workspace produce identical output
//! 2. Callbacks run in ascending priority order across the whole run
//! 3. Analyzers only ever see fully collected project caches
//! 4. Root and Common fall back as documented, and a project at the input
//!    root becomes Root instead of sharing its output directory
//! 5. Errors and cancellation stop the run before anything is written

use markgen_core::callbacks::CallbackInfo;
use markgen_core::plugin::{Analyzer, Analyzers, InitContext, Plugin, PluginFinder};
use markgen_core::writer::strip_envelope;
use markgen_core::{
    CodeBuilder, CodeFragment, Environment, MarkgenConfig, Orchestrator, Project, Result, RunStatus,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::any::Any;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ==================== Test Plugins ====================

/// Lists every `#[tracked]` type of a project, plus a summary in Common.
#[derive(Default)]
struct TrackedAnalyzer {
    tracked: Vec<String>,
    observed_counts: Vec<usize>,
}

impl Analyzer for TrackedAnalyzer {
    fn collect_symbols(&mut self, project: &Project) {
        self.observed_counts.push(project.all_types().len());
        self.tracked = project
            .types_with_attributes()
            .iter()
            .filter(|t| t.has_attribute("tracked"))
            .map(|t| t.name.clone())
            .collect();
    }

    fn generate_code(&self, project: &Project) -> Option<CodeFragment> {
        if self.tracked.is_empty() {
            return None;
        }
        let quoted: Vec<String> = self.tracked.iter().map(|name| format!("{name:?}")).collect();
        let mut builder = CodeBuilder::new();
        builder
            .open_block("pub fn tracked() -> &'static [&'static str]")
            .line(format!("&[{}]", quoted.join(", ")))
            .close_block();
        Some(builder.into_fragment("tracked", project.name.clone()))
    }
}

#[derive(Default)]
struct TrackedPlugin {
    analyzers: Analyzers<TrackedAnalyzer>,
    expected_counts: Vec<usize>,
    mismatches: Arc<AtomicUsize>,
}

impl Plugin for TrackedPlugin {
    fn name(&self) -> &'static str {
        "tracked"
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        self.analyzers = Analyzers::new(ctx.env(), |_| TrackedAnalyzer::default());
        Ok(())
    }

    fn collect(&mut self, env: &Environment) {
        self.expected_counts = env.projects().iter().map(|p| p.all_types().len()).collect();
        self.analyzers.collect(env);
        for (analyzer, expected) in self.analyzers.iter().zip(&self.expected_counts) {
            if analyzer.observed_counts.iter().any(|c| c != expected) {
                self.mismatches.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn generate(&self, env: &Environment) {
        self.analyzers.generate(env);

        let mut builder = CodeBuilder::new();
        for (analyzer, project) in self.analyzers.with_projects(env) {
            builder.line(format!("// {}: {}", project.name, analyzer.tracked.len()));
        }
        env.common().add_fragment(builder.into_fragment("summary", "tracked"));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records the order its callbacks run in.
struct OrderPlugin {
    ran: Arc<Mutex<Vec<&'static str>>>,
}

impl Plugin for OrderPlugin {
    fn name(&self) -> &'static str {
        "order"
    }

    fn initialize(&mut self, _ctx: &InitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn collect(&mut self, _env: &Environment) {}

    fn callbacks(&self) -> Vec<CallbackInfo> {
        vec![
            CallbackInfo::new(5, 0, "5a"),
            CallbackInfo::new(1, 1, "1"),
            CallbackInfo::new(5, 2, "5b"),
            CallbackInfo::new(3, 3, "3"),
        ]
    }

    fn run_callback(&mut self, id: usize, _env: &Environment) {
        let name = self.callbacks()[id].name;
        self.ran.lock().push(name);
    }

    fn generate(&self, _env: &Environment) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Misbehaves in one phase.
enum Fault {
    ErrorOnInitialize,
    CancelOnCollect(CancellationToken),
    CollidingFragments,
}

struct FaultPlugin(Fault);

impl Plugin for FaultPlugin {
    fn name(&self) -> &'static str {
        "fault"
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<()> {
        if let Fault::ErrorOnInitialize = self.0 {
            ctx.env().logger("fault").error("broken on purpose");
        }
        Ok(())
    }

    fn collect(&mut self, _env: &Environment) {
        if let Fault::CancelOnCollect(token) = &self.0 {
            token.cancel();
        }
    }

    fn generate(&self, env: &Environment) {
        if let Fault::CollidingFragments = self.0 {
            for body in ["// a\n", "// b\n", "// c\n"] {
                env.root().add_fragment(CodeFragment::new("dup", "same", body));
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Adds one fragment to every project and one to Root.
struct StampPlugin;

impl Plugin for StampPlugin {
    fn name(&self) -> &'static str {
        "stamp"
    }

    fn initialize(&mut self, _ctx: &InitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn collect(&mut self, _env: &Environment) {}

    fn generate(&self, env: &Environment) {
        for (_, data) in env.all_project_data() {
            let body = format!("// {}\n", data.name);
            data.add_fragment(CodeFragment::new("out", data.name.clone(), body));
        }
        env.root().add_fragment(CodeFragment::new("root_out", "stamp", "// root\n"));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ==================== Helpers ====================

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "common/common.module.json", "{}");
    write(dir.path(), "common/src/lib.rs", "#[tracked] pub struct Settings;");
    write(dir.path(), "game/game.module.json", r#"{"name": "game"}"#);
    write(
        dir.path(),
        "game/src/lib.rs",
        "#[tracked] pub struct Player;\n#[tracked] pub struct Enemy;\npub struct Plain;",
    );
    write(dir.path(), "game/src/editor.rs", "#[tracked] pub struct Gizmo;");
    write(dir.path(), "ui/ui.module.json", "{}");
    write(dir.path(), "ui/src/lib.rs", "#[tracked] pub enum Mode { Light, Dark }");
    dir
}

fn config(dir: &TempDir) -> MarkgenConfig {
    MarkgenConfig::builder().input(dir.path()).build()
}

fn orchestrator(config: MarkgenConfig) -> Orchestrator {
    Orchestrator::new(config, CancellationToken::new()).with_finder(PluginFinder::from_definitions(Vec::new()))
}

/// Every file under a `generated` directory, keyed by path relative to `root`.
fn generated_files(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().components().any(|c| c.as_os_str() == "generated"))
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_path_buf();
            (relative, fs::read(e.path()).unwrap())
        })
        .collect()
}

fn payload(root: &Path, relative: &str) -> String {
    let bytes = fs::read(root.join(relative)).unwrap();
    String::from_utf8(strip_envelope(&bytes).unwrap().to_vec()).unwrap()
}

// ==================== Pipeline Tests ====================

#[tokio::test]
async fn test_generates_per_project_and_common_output() {
    let dir = workspace();
    let status = orchestrator(config(&dir))
        .add_plugin(Box::<TrackedPlugin>::default())
        .run()
        .await;
    assert_eq!(status, RunStatus::Succeeded);

    assert_eq!(
        payload(dir.path(), "game/generated/tracked.rs"),
        "pub fn tracked() -> &'static [&'static str] {\n    &[\"Player\", \"Enemy\"]\n}\n"
    );
    assert_eq!(
        payload(dir.path(), "common/generated/summary.rs"),
        "// common: 1\n// game: 2\n// ui: 1\n"
    );
    assert!(dir.path().join("ui/generated/.gitignore").exists());
    // editor modules are independent of the enclosing project
    assert!(!payload(dir.path(), "game/generated/tracked.rs").contains("Gizmo"));
}

#[tokio::test]
async fn test_repeated_runs_are_identical() {
    let dir = workspace();

    let mut first = orchestrator(config(&dir)).add_plugin(Box::<TrackedPlugin>::default());
    let report = first.execute().await.unwrap();
    assert!(!report.written.is_empty());
    let first_output = generated_files(dir.path());

    let mut second = orchestrator(config(&dir)).add_plugin(Box::<TrackedPlugin>::default());
    let report = second.execute().await.unwrap();
    assert!(report.written.is_empty());
    assert_eq!(generated_files(dir.path()), first_output);

    for project in ["common", "game", "ui"] {
        fs::remove_dir_all(dir.path().join(project).join("generated")).unwrap();
    }
    let mut third = orchestrator(config(&dir)).add_plugin(Box::<TrackedPlugin>::default());
    third.execute().await.unwrap();
    assert_eq!(generated_files(dir.path()), first_output);
}

#[tokio::test]
async fn test_callbacks_run_in_priority_order() {
    let dir = workspace();
    let ran = Arc::new(Mutex::new(Vec::new()));
    let status = orchestrator(config(&dir))
        .add_plugin(Box::new(OrderPlugin { ran: Arc::clone(&ran) }))
        .run()
        .await;

    assert_eq!(status, RunStatus::Succeeded);
    assert_eq!(*ran.lock(), vec!["1", "3", "5a", "5b"]);
}

#[tokio::test]
async fn test_analyzers_never_see_partial_caches() {
    let dir = TempDir::new().unwrap();
    for i in 0..48 {
        let name = format!("p{i:02}");
        write(dir.path(), &format!("{name}/{name}.module.json"), "{}");
        let types: String = (0..i % 7 + 1).map(|t| format!("#[tracked] pub struct T{t};\n")).collect();
        write(dir.path(), &format!("{name}/src/lib.rs"), &types);
    }

    let mismatches = Arc::new(AtomicUsize::new(0));
    let plugin = TrackedPlugin {
        mismatches: Arc::clone(&mismatches),
        ..Default::default()
    };
    let mut config = config(&dir);
    config.common_namespace = None;
    let status = orchestrator(config).add_plugin(Box::new(plugin)).run().await;

    assert_eq!(status, RunStatus::Succeeded);
    assert_eq!(mismatches.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cache_reads_are_empty_or_complete_under_contention() {
    let mut compilation = markgen_core::symbols::Compilation::new();
    let source: String = (0..200).map(|t| format!("pub struct T{t};\n")).collect();
    compilation.add_source("game", "game.rs", &source).unwrap();
    compilation.finish();

    let diagnostics = markgen_core::Diagnostics::new();
    let data = markgen_core::ProjectData::new("game", "/ws", "game", "generated", diagnostics.logger("game"));
    let project = Project::new(data, Arc::new(compilation), Arc::new(Default::default()));

    std::thread::scope(|scope| {
        let readers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    let mut seen = Vec::new();
                    for _ in 0..500 {
                        seen.push(project.all_types().len());
                    }
                    seen
                })
            })
            .collect();
        scope.spawn(|| project.collect_symbols());

        for reader in readers {
            for count in reader.join().unwrap() {
                assert!(count == 0 || count == 200, "observed partial cache of {count}");
            }
        }
    });
}

// ==================== Root and Common Tests ====================

#[tokio::test]
async fn test_zero_markers_generate_into_root() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/lib.rs", "#[tracked] pub struct Only;");
    write(dir.path(), "src/tests.rs", "#[tracked] pub struct Fixture;");

    let orchestrator = orchestrator(config(&dir)).add_plugin(Box::<TrackedPlugin>::default());
    let diagnostics = Arc::clone(orchestrator.diagnostics());
    assert_eq!(orchestrator.run().await, RunStatus::Succeeded);

    assert_eq!(
        payload(dir.path(), "generated/tracked.rs"),
        "pub fn tracked() -> &'static [&'static str] {\n    &[\"Only\"]\n}\n"
    );
    // no `common` project exists, so the summary lands in root with a warning
    assert_eq!(payload(dir.path(), "generated/summary.rs"), "// root: 1\n");
    assert_eq!(diagnostics.warning_count(), 1);
}

#[tokio::test]
async fn test_project_at_input_root_keeps_its_output() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app.module.json", r#"{"name": "app"}"#);
    write(dir.path(), "app.rs", "pub struct App;");
    write(dir.path(), "game/game.module.json", "{}");
    write(dir.path(), "game/lib.rs", "pub struct Player;");

    for _ in 0..3 {
        let config = MarkgenConfig::builder().input(dir.path()).common_namespace(None).build();
        let orchestrator = orchestrator(config).add_plugin(Box::new(StampPlugin));
        let diagnostics = Arc::clone(orchestrator.diagnostics());
        assert_eq!(orchestrator.run().await, RunStatus::Succeeded);
        assert_eq!(diagnostics.warning_count(), 0);

        assert_eq!(payload(dir.path(), "generated/out.rs"), "// app\n");
        assert_eq!(payload(dir.path(), "generated/root_out.rs"), "// root\n");
        assert_eq!(payload(dir.path(), "game/generated/out.rs"), "// game\n");
    }
}

#[tokio::test]
async fn test_common_match_emits_no_warning() {
    let dir = workspace();
    let orchestrator = orchestrator(config(&dir)).add_plugin(Box::<TrackedPlugin>::default());
    let diagnostics = Arc::clone(orchestrator.diagnostics());

    assert_eq!(orchestrator.run().await, RunStatus::Succeeded);
    assert_eq!(diagnostics.warning_count(), 0);
    assert!(!dir.path().join("generated").exists());
}

// ==================== Failure Tests ====================

#[tokio::test]
async fn test_error_stops_before_writing() {
    let dir = workspace();
    let status = orchestrator(config(&dir))
        .add_plugin(Box::new(FaultPlugin(Fault::ErrorOnInitialize)))
        .add_plugin(Box::<TrackedPlugin>::default())
        .run()
        .await;

    assert_eq!(status, RunStatus::Failed);
    assert_eq!(status.exit_code(), 1);
    assert!(generated_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_cancellation_is_reported_distinctly() {
    let dir = workspace();
    let cancel = CancellationToken::new();
    let status = Orchestrator::new(config(&dir), cancel.clone())
        .with_finder(PluginFinder::from_definitions(Vec::new()))
        .add_plugin(Box::new(FaultPlugin(Fault::CancelOnCollect(cancel))))
        .add_plugin(Box::<TrackedPlugin>::default())
        .run()
        .await;

    assert_eq!(status, RunStatus::Cancelled);
    assert_eq!(status.exit_code(), 1);
    assert!(generated_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_name_collisions_warn_but_succeed() {
    let dir = workspace();
    let orchestrator = orchestrator(config(&dir)).add_plugin(Box::new(FaultPlugin(Fault::CollidingFragments)));
    let diagnostics = Arc::clone(orchestrator.diagnostics());

    assert_eq!(orchestrator.run().await, RunStatus::Succeeded);
    assert_eq!(diagnostics.warning_count(), 2);
    assert!(!diagnostics.has_errors());

    let names: Vec<String> = fs::read_dir(dir.path().join("generated"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".rs"))
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&"dup__same.rs".to_string()));
    assert_eq!(names.iter().filter(|n| n.starts_with("dup__same__")).count(), 2);
}
