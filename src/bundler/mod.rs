//! Bundling
//!
//! The builder hands every resolved build to a [`BundleBackend`]. The default
//! backend, [`ExtendScriptBundler`], walks the module graph from the entry,
//! flattens the modules into one IIFE for the ExtendScript host and writes a
//! single output file.

mod graph;
mod ponyfill;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use colored::Colorize;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{ConfigError, TsconfigLoader};
use crate::options::{BuildOptions, Mode};
use crate::resolver::ImportResolver;
use crate::transform::{self, Transformer};
use crate::utils;

pub use graph::{Module, ModuleGraph, ModuleId, ModuleType};
pub use ponyfill::{base_ponyfills, Ponyfill, PonyfillCollector};

/// Extensions tried when resolving extension-less imports
pub const EXTENSIONS: [&str; 3] = [".js", ".ts", ".tsx"];

/// Name under which the bundle's namespace is published on the host
pub const GLOBAL_NAME: &str = "KT";

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Missing required option '{0}'")]
    MissingOption(&'static str),
    #[error("Entry file not found: {0}")]
    EntryNotFound(String),
    #[error("Failed to read module {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to load the TypeScript configuration: {0}")]
    Tsconfig(#[from] ConfigError),
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Everything a backend needs for one bundle
#[derive(Debug, Clone)]
pub struct BundleConfig {
    pub entry: PathBuf,
    pub output: PathBuf,
    pub extensions: Vec<String>,
    /// Effective tsconfig document
    pub target: Value,
    pub ponyfills: Vec<Ponyfill>,
    pub minify: bool,
    pub uglify: bool,
    pub global_name: String,
    pub sourcemap: bool,
}

impl BundleConfig {
    /// Build the bundle configuration for resolved options.
    ///
    /// Relative paths are taken from `root`.
    pub fn from_options(options: &BuildOptions, root: &Path) -> Result<Self, BundleError> {
        let input = options
            .input
            .as_deref()
            .ok_or(BundleError::MissingOption("input"))?;
        let output = options
            .output
            .as_deref()
            .ok_or(BundleError::MissingOption("output"))?;

        let target = TsconfigLoader::new(root).load(options)?;
        let ponyfill_files = options.ponyfills.as_deref().unwrap_or_default();

        Ok(Self {
            entry: root.join(input),
            output: root.join(output),
            extensions: EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            target,
            ponyfills: PonyfillCollector::new(root).collect(ponyfill_files),
            minify: options.minify.unwrap_or(false),
            uglify: options.uglify.unwrap_or(false),
            global_name: GLOBAL_NAME.to_string(),
            sourcemap: options.mode == Some(Mode::Development),
        })
    }

    /// `compilerOptions.target` of the tsconfig, if set
    pub fn target_name(&self) -> Option<&str> {
        self.target
            .get("compilerOptions")
            .and_then(|c| c.get("target"))
            .and_then(Value::as_str)
    }

    /// Directory whose changes trigger a rebuild in watch mode
    pub fn watch_root(&self) -> PathBuf {
        self.entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn sourcemap_path(&self) -> PathBuf {
        let mut path = self.output.clone().into_os_string();
        path.push(".map");
        PathBuf::from(path)
    }
}

/// Information about a written bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    pub output_path: PathBuf,
    /// Bundle size in bytes
    pub size: usize,
    pub modules: usize,
    /// Short content hash of the bundle
    pub hash: String,
    pub sourcemap_path: Option<PathBuf>,
}

/// A running watcher.
///
/// Awaiting it blocks until the watcher stops, which for file watchers means
/// until the process is interrupted.
#[derive(Debug)]
pub struct WatchHandle {
    label: String,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn new(label: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            label: label.into(),
            task: Some(task),
        }
    }

    /// A handle with nothing left to wait for
    pub fn finished(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            task: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub async fn wait(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                error!("Watcher for {} stopped: {}", self.label, e);
            }
        }
    }
}

/// The bundling tool the builder drives
#[async_trait]
pub trait BundleBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Produce the bundle once
    async fn build(&self, config: &BundleConfig) -> Result<BuildOutput, BundleError>;

    /// Build, then keep rebuilding on source changes
    async fn watch(&self, config: &BundleConfig) -> Result<WatchHandle, BundleError>;
}

/// Default backend producing ExtendScript bundles
#[derive(Debug, Clone)]
pub struct ExtendScriptBundler {
    debounce: Duration,
}

impl ExtendScriptBundler {
    pub fn new() -> Self {
        Self {
            debounce: Duration::from_millis(100),
        }
    }

    /// Bundle `config.entry` into `config.output`
    pub fn bundle(&self, config: &BundleConfig) -> Result<BuildOutput, BundleError> {
        let start = Instant::now();
        if let Some(target) = config.target_name() {
            debug!("Compiling for {}", target);
        }

        info!("Building module graph...");
        let (graph, entry) = self.build_module_graph(config)?;
        let order = graph.bundle_order(entry);

        info!("Transforming {} modules...", order.len());
        let transformer = Transformer::new(config.ponyfills.clone());
        let root = fs::canonicalize(config.watch_root()).unwrap_or_else(|_| config.watch_root());
        let mut body = String::new();
        let mut sources = Vec::new();

        for id in &order {
            let Some(module) = graph.get_module(*id) else {
                continue;
            };
            let name = utils::relative_path(&root, &module.path)
                .unwrap_or_else(|| module.path.display().to_string());
            let code = transformer.transform(&module.source, &module.path, module.module_type);

            body.push_str(&format!("// Module: {}\n", name));
            body.push_str(code.trim_end());
            body.push('\n');
            sources.push((name, module.source.as_str()));
        }

        let mut code = transformer.wrap(&body, &config.global_name);
        if config.minify || config.uglify {
            code = transform::minify(&code, config.uglify);
        }

        let sourcemap_path = if config.sourcemap {
            let path = config.sourcemap_path();
            code.push_str(&format!("//# sourceMappingURL={}\n", file_name(&path)));
            Some(path)
        } else {
            None
        };

        write_file(&config.output, &code)?;
        if let Some(path) = &sourcemap_path {
            write_file(path, &sourcemap(config, &sources).to_string())?;
        }

        debug!("Bundled in {:?}", start.elapsed());

        Ok(BuildOutput {
            output_path: config.output.clone(),
            size: code.len(),
            modules: order.len(),
            hash: utils::hash_content(code.as_bytes()),
            sourcemap_path,
        })
    }

    /// Build the module graph by following imports from the entry
    fn build_module_graph(&self, config: &BundleConfig) -> Result<(ModuleGraph, ModuleId), BundleError> {
        let entry = fs::canonicalize(&config.entry)
            .map_err(|_| BundleError::EntryNotFound(config.entry.display().to_string()))?;

        let resolver = ImportResolver::new(&config.extensions);
        let mut graph = ModuleGraph::new();
        let entry_id = self.process_module(&resolver, &mut graph, &entry, true)?;

        Ok((graph, entry_id))
    }

    /// Add a module and, recursively, its dependencies
    fn process_module(
        &self,
        resolver: &ImportResolver,
        graph: &mut ModuleGraph,
        path: &Path,
        is_entry: bool,
    ) -> Result<ModuleId, BundleError> {
        if let Some(id) = graph.get_module_id(path) {
            return Ok(id);
        }

        let source = fs::read_to_string(path).map_err(|source| BundleError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let dependencies = resolver.extract_dependencies(&source);

        let module_id = graph.add_module(Module {
            path: path.to_path_buf(),
            source,
            module_type: ModuleType::detect(path),
            is_entry,
        });

        for dep in dependencies {
            match resolver.resolve(&dep, path) {
                Some(resolved) => {
                    let resolved = fs::canonicalize(&resolved).unwrap_or(resolved);
                    let dep_id = self.process_module(resolver, graph, &resolved, false)?;
                    graph.add_dependency(module_id, dep_id);
                }
                None => debug!("Unresolved import '{}' in {}", dep, path.display()),
            }
        }

        Ok(module_id)
    }
}

impl Default for ExtendScriptBundler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BundleBackend for ExtendScriptBundler {
    fn name(&self) -> &str {
        "extendscript"
    }

    async fn build(&self, config: &BundleConfig) -> Result<BuildOutput, BundleError> {
        let output = self.bundle(config)?;
        report(&output);
        Ok(output)
    }

    async fn watch(&self, config: &BundleConfig) -> Result<WatchHandle, BundleError> {
        self.build(config).await?;

        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(self.debounce, tx)?;
        let watch_root = config.watch_root();
        debouncer
            .watcher()
            .watch(&watch_root, RecursiveMode::Recursive)?;

        info!("Watching {} for changes", watch_root.display());

        let bundler = self.clone();
        let config = config.clone();
        let label = config.output.display().to_string();

        // The debouncer is moved into the task to keep it alive
        let task = tokio::task::spawn_blocking(move || {
            let _debouncer = debouncer;

            loop {
                match rx.recv() {
                    Ok(Ok(events)) => {
                        let changed = events.iter().any(|event| is_source_change(&config, &event.path));
                        if !changed {
                            continue;
                        }
                        eprintln!("  {} Rebuilding {}", "↻".yellow(), config.entry.display());
                        match bundler.bundle(&config) {
                            Ok(output) => report(&output),
                            Err(e) => error!("Rebuild failed: {}", e),
                        }
                    }
                    Ok(Err(e)) => {
                        error!("Watch error: {:?}", e);
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(WatchHandle::new(label, task))
    }
}

/// Whether a changed path is a source the bundle could depend on
fn is_source_change(config: &BundleConfig, path: &Path) -> bool {
    if path == config.output || path == config.sourcemap_path() {
        return false;
    }
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    config
        .extensions
        .iter()
        .any(|ext| ext.trim_start_matches('.') == extension)
}

fn report(output: &BuildOutput) {
    eprintln!(
        "  {} {} {} {}",
        "✓".green(),
        output.output_path.display(),
        utils::format_size(output.size).dimmed(),
        format!("[{}]", output.hash).dimmed()
    );
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn write_file(path: &Path, content: &str) -> Result<(), BundleError> {
    let write_error = |source| BundleError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, content).map_err(write_error)
}

/// Source map listing the bundled sources and their content
fn sourcemap(config: &BundleConfig, sources: &[(String, &str)]) -> Value {
    json!({
        "version": 3,
        "file": file_name(&config.output),
        "sources": sources.iter().map(|(name, _)| name).collect::<Vec<_>>(),
        "sourcesContent": sources.iter().map(|(_, content)| content).collect::<Vec<_>>(),
        "names": [],
        "mappings": "",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(input: &str, output: &str) -> BuildOptions {
        BuildOptions {
            input: Some(input.into()),
            output: Some(output.into()),
            tsconfig_template: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_input_is_reported() {
        let err = BundleConfig::from_options(&BuildOptions::default(), Path::new("/p")).unwrap_err();
        assert!(matches!(err, BundleError::MissingOption("input")));
    }

    #[test]
    fn test_config_from_options() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options("src/index.ts", "dist/index.js");
        opts.mode = Some(Mode::Development);
        opts.uglify = Some(true);

        let config = BundleConfig::from_options(&opts, dir.path()).unwrap();

        assert_eq!(config.entry, dir.path().join("src/index.ts"));
        assert_eq!(config.target_name(), Some("ES3"));
        assert!(config.sourcemap);
        assert!(config.uglify && !config.minify);
        assert_eq!(config.ponyfills, base_ponyfills());
        assert_eq!(config.sourcemap_path(), dir.path().join("dist/index.js.map"));
    }

    #[test]
    fn test_bundles_dependencies_before_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join("index.ts"),
            "import { greet } from './greet';\nexport const KT = { greet: greet };\n",
        )
        .unwrap();
        fs::write(
            src.join("greet.ts"),
            "export function greet(name: string): string {\n  return Object.assign({}, { name: name }).name;\n}\n",
        )
        .unwrap();

        let config = BundleConfig::from_options(&options("src/index.ts", "dist/index.js"), dir.path()).unwrap();
        let output = ExtendScriptBundler::new().bundle(&config).unwrap();
        let code = fs::read_to_string(dir.path().join("dist/index.js")).unwrap();

        assert_eq!(output.modules, 2);
        assert_eq!(output.size, code.len());
        assert!(output.sourcemap_path.is_none());
        assert!(code.starts_with("(function (thisObj) {\nfunction __objectAssign"));
        let greet = code.find("function greet(name) {").unwrap();
        let kt = code.find("var KT = { greet: greet };").unwrap();
        assert!(greet < kt);
        assert!(code.contains("return __objectAssign({}, { name: name }).name;"));
        assert!(!code.contains("import"));
        assert!(code.ends_with("thisObj.KT = KT;\n})(this);\n"));
    }

    #[test]
    fn test_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = BundleConfig::from_options(&options("src/none.ts", "dist/index.js"), dir.path()).unwrap();
        let err = ExtendScriptBundler::new().bundle(&config).unwrap_err();
        assert!(matches!(err, BundleError::EntryNotFound(_)));
    }

    #[test]
    fn test_development_builds_write_a_sourcemap() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.js"), "var KT = {};\n").unwrap();

        let mut opts = options("src/index.js", "dist/index.js");
        opts.mode = Some(Mode::Development);
        let config = BundleConfig::from_options(&opts, dir.path()).unwrap();
        let output = ExtendScriptBundler::new().bundle(&config).unwrap();

        let map: Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("dist/index.js.map")).unwrap(),
        )
        .unwrap();
        assert_eq!(output.sourcemap_path, Some(dir.path().join("dist/index.js.map")));
        assert_eq!(map["sources"], json!(["index.js"]));
        assert_eq!(map["file"], json!("index.js"));
    }
}
