use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use kt_build::bundler::{BuildOutput, BundleBackend, BundleConfig, BundleError, WatchHandle};
use kt_build::{BuildStage, Builder, Invocation};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Build(PathBuf),
    Watch(PathBuf),
}

/// Records every request instead of bundling
#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<(Call, BundleConfig)>>,
    fail_builds: bool,
}

impl RecordingBackend {
    fn failing() -> Self {
        Self {
            fail_builds: true,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(call, _)| call.clone()).collect()
    }

    fn configs(&self) -> Vec<BundleConfig> {
        self.calls.lock().unwrap().iter().map(|(_, config)| config.clone()).collect()
    }
}

#[async_trait]
impl BundleBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn build(&self, config: &BundleConfig) -> Result<BuildOutput, BundleError> {
        self.calls
            .lock()
            .unwrap()
            .push((Call::Build(config.output.clone()), config.clone()));

        if self.fail_builds {
            return Err(BundleError::EntryNotFound(config.entry.display().to_string()));
        }
        Ok(BuildOutput {
            output_path: config.output.clone(),
            size: 0,
            modules: 1,
            hash: String::new(),
            sourcemap_path: None,
        })
    }

    async fn watch(&self, config: &BundleConfig) -> Result<WatchHandle, BundleError> {
        self.calls
            .lock()
            .unwrap()
            .push((Call::Watch(config.output.clone()), config.clone()));
        Ok(WatchHandle::finished(config.output.display().to_string()))
    }
}

fn invocation(args: &[&str]) -> Invocation {
    let argv = std::iter::once("kt-build").chain(args.iter().copied());
    Invocation::try_parse_from(argv).unwrap()
}

async fn run(root: &Path, args: &[&str], backend: Arc<RecordingBackend>) -> anyhow::Result<()> {
    let mut builder = Builder::new(invocation(args), root, backend);
    let result = builder.run().await;
    assert_eq!(builder.stage(), BuildStage::Idle);
    result
}

#[tokio::test]
async fn commands_run_in_command_line_order() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::default());

    run(dir.path(), &["test", "build"], backend.clone()).await.unwrap();

    assert_eq!(
        backend.calls(),
        vec![
            Call::Build(dir.path().join("dist.test/index.test.js")),
            Call::Build(dir.path().join("dist/index.js")),
        ]
    );
}

#[tokio::test]
async fn options_do_not_leak_between_commands() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::default());

    run(dir.path(), &["minify", "build"], backend.clone()).await.unwrap();

    let configs = backend.configs();
    assert_eq!(configs.len(), 2);
    assert!(configs[0].minify);
    assert!(!configs[1].minify);
}

#[tokio::test]
async fn flags_apply_to_every_command() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::default());

    run(dir.path(), &["build", "test", "--uglify"], backend.clone()).await.unwrap();

    assert!(backend.configs().iter().all(|config| config.uglify));
}

#[tokio::test]
async fn no_command_runs_a_single_default_pass() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::default());

    run(dir.path(), &["not-a-command"], backend.clone()).await.unwrap();

    assert_eq!(backend.calls(), vec![Call::Build(dir.path().join("dist/index.js"))]);
}

#[tokio::test]
async fn watch_command_starts_a_watcher() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::default());

    run(dir.path(), &["watch"], backend.clone()).await.unwrap();

    assert_eq!(backend.calls(), vec![Call::Watch(dir.path().join("dist/index.js"))]);
}

#[tokio::test]
async fn config_entries_become_commands() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("kt.config.json"),
        r#"{ "photoshop": { "input": "src/ps.ts", "output": "dist/ps.js" } }"#,
    )
    .unwrap();
    let backend = Arc::new(RecordingBackend::default());

    run(dir.path(), &["photoshop"], backend.clone()).await.unwrap();

    let configs = backend.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].entry, dir.path().join("src/ps.ts"));
    assert_eq!(configs[0].output, dir.path().join("dist/ps.js"));
}

#[tokio::test]
async fn config_priority_keeps_cli_only_keys_for_commands() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("kt.config.json"), r#"{ "my-preset": { "input": "src/a.ts" } }"#)
        .unwrap();
    let backend = Arc::new(RecordingBackend::default());

    let args = ["my-preset", "--priority", "config", "--output", "dist/b.js"];
    run(dir.path(), &args, backend.clone()).await.unwrap();

    let configs = backend.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].entry, dir.path().join("src/a.ts"));
    assert_eq!(configs[0].output, dir.path().join("dist/b.js"));
}

#[tokio::test]
async fn config_priority_lets_the_command_win_collisions() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("kt.config.json"),
        r#"{ "my-preset": { "input": "src/a.ts", "output": "dist/preset.js" } }"#,
    )
    .unwrap();
    let backend = Arc::new(RecordingBackend::default());

    let config_first = ["my-preset", "--priority", "config", "--output", "dist/b.js"];
    run(dir.path(), &config_first, backend.clone()).await.unwrap();
    let cli_first = ["my-preset", "--output", "dist/b.js"];
    run(dir.path(), &cli_first, backend.clone()).await.unwrap();

    let configs = backend.configs();
    assert_eq!(configs[0].output, dir.path().join("dist/preset.js"));
    assert_eq!(configs[1].output, dir.path().join("dist/b.js"));
}

#[tokio::test]
async fn clean_before_runs_only_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("dist/stale.js");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "old").unwrap();

    run(dir.path(), &["build"], Arc::new(RecordingBackend::default())).await.unwrap();
    assert!(stale.exists());

    run(dir.path(), &["build", "--clean=before"], Arc::new(RecordingBackend::default()))
        .await
        .unwrap();
    assert!(!stale.exists());
}

#[tokio::test]
async fn false_stage_disables_cleaning() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("dist/stale.js");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "old").unwrap();

    run(
        dir.path(),
        &["build", "--clean=both,false"],
        Arc::new(RecordingBackend::default()),
    )
    .await
    .unwrap();

    assert!(stale.exists());
}

#[tokio::test]
async fn clean_only_never_builds() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("dist/stale.js");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "old").unwrap();
    let backend = Arc::new(RecordingBackend::default());

    run(dir.path(), &["clean-only"], backend.clone()).await.unwrap();

    assert!(backend.calls().is_empty());
    assert!(!stale.exists());
    assert!(dir.path().join("dist").is_dir());
}

#[tokio::test]
async fn a_failing_command_stops_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(RecordingBackend::failing());

    let result = run(dir.path(), &["build", "test"], backend.clone()).await;

    assert!(result.is_err());
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test]
async fn builtins_win_over_config_entries() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("kt.config.json"),
        r#"{ "build": { "output": "dist/hijacked.js" } }"#,
    )
    .unwrap();
    let backend = Arc::new(RecordingBackend::default());

    let builder = Builder::new(invocation(&["build"]), dir.path(), backend.clone());
    assert_eq!(
        builder
            .registry()
            .get_command("build")
            .and_then(|c| c.patch.output.as_deref()),
        Some("dist/index.js")
    );
}
