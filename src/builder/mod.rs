//! Build orchestration
//!
//! The builder turns an invocation into one or more build cycles. Each
//! positional command runs its own cycle with freshly resolved options;
//! without commands a single cycle runs with the options of `--preset`.
//!
//! A cycle moves through [`BuildStage`]s strictly in order: configure the
//! options, clean before, build or watch, clean after.

pub mod cleaner;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::bundler::{BundleBackend, BundleConfig, WatchHandle};
use crate::cli::Invocation;
use crate::commands::{CommandAction, CommandGenerator, CommandRegistry};
use crate::options::{BuildOptions, CleanStage, OptionsResolver, PresetTable};
use crate::utils;

pub use cleaner::{CleanOutcome, CleanReport, Cleaner};

/// Where the builder is in its current cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildStage {
    #[default]
    Idle,
    ConfiguringOptions,
    CleaningBefore,
    Building,
    Watching,
    CleaningAfter,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Idle => "idle",
            BuildStage::ConfiguringOptions => "configuring options",
            BuildStage::CleaningBefore => "cleaning before build",
            BuildStage::Building => "building",
            BuildStage::Watching => "watching",
            BuildStage::CleaningAfter => "cleaning after build",
        };
        f.write_str(name)
    }
}

/// Whether `stage` has to be cleaned for these options.
///
/// A `false` tag anywhere in the list disables cleaning entirely.
pub fn should_clean(options: &BuildOptions, stage: CleanStage) -> bool {
    let stages = options.clean_stages();
    if stages.contains(&CleanStage::False) {
        return false;
    }
    stages.contains(&CleanStage::Both) || stages.contains(&stage)
}

/// Runs build cycles for one invocation
pub struct Builder {
    invocation: Invocation,
    root: PathBuf,
    resolver: OptionsResolver,
    registry: CommandRegistry,
    cleaner: Cleaner,
    backend: Arc<dyn BundleBackend>,
    stage: BuildStage,
    watchers: Vec<WatchHandle>,
}

impl Builder {
    /// Create a builder; every command is registered before the first run
    pub fn new(invocation: Invocation, root: impl Into<PathBuf>, backend: Arc<dyn BundleBackend>) -> Self {
        let root = root.into();
        let resolver = OptionsResolver::new(&invocation, &root);

        let mut presets = PresetTable::new();
        presets.load_user_presets(&root, invocation.options.config_file.as_deref());

        let mut registry = CommandRegistry::with_builtins();
        CommandGenerator::register_all(&mut registry, &presets);

        Self {
            invocation,
            cleaner: Cleaner::new(&root),
            root,
            resolver,
            registry,
            backend,
            stage: BuildStage::Idle,
            watchers: Vec::new(),
        }
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Run every requested command in order, then wait for live watchers.
    ///
    /// The first failing command stops the chain and its error is returned.
    pub async fn run(&mut self) -> Result<()> {
        let commands = self.extract_commands();

        if commands.is_empty() {
            let options = self.resolver.resolve(None);
            let name = self
                .invocation
                .options
                .preset
                .clone()
                .unwrap_or_else(|| "default".to_string());
            self.run_logged(&name, CommandAction::Build, options).await?;
        } else {
            for name in commands {
                let Some(action) = self.registry.get_command(&name).map(|c| c.action) else {
                    continue;
                };
                let patch = self.registry.execute_command(&name, &BuildOptions::default());
                let options = self.resolver.resolve_with_patch(&patch);
                self.run_logged(&name, action, options).await?;
            }
        }

        self.wait_for_watchers().await;
        Ok(())
    }

    /// Positional names that match a registered command
    fn extract_commands(&self) -> Vec<String> {
        self.invocation
            .commands
            .iter()
            .filter(|name| {
                let known = self.registry.has_command(name);
                if !known {
                    warn!("Command \"{}\" not found, ignoring it", name);
                }
                known
            })
            .cloned()
            .collect()
    }

    async fn run_logged(&mut self, name: &str, action: CommandAction, options: BuildOptions) -> Result<()> {
        let result = self.run_cycle(name, action, options).await;
        self.set_stage(BuildStage::Idle);

        if let Err(e) = &result {
            error!("Command '{}' failed: {:#}", name, e);
        }
        result
    }

    /// One full cycle for resolved options
    pub async fn run_cycle(&mut self, name: &str, action: CommandAction, options: BuildOptions) -> Result<()> {
        let start = Instant::now();
        self.set_stage(BuildStage::ConfiguringOptions);
        info!("Running '{}'", name);
        debug!("Options for '{}': {:?}", name, options.to_map());

        if should_clean(&options, CleanStage::Before) {
            self.set_stage(BuildStage::CleaningBefore);
            self.clean(&options);
        }

        if action == CommandAction::CleanOnly {
            debug!("'{}' only cleans, skipping the build", name);
        } else {
            self.bundle(name, &options).await?;
        }

        if should_clean(&options, CleanStage::After) {
            self.set_stage(BuildStage::CleaningAfter);
            self.clean(&options);
        }

        info!("Finished '{}' in {}", name, utils::format_duration(start.elapsed()));
        Ok(())
    }

    async fn bundle(&mut self, name: &str, options: &BuildOptions) -> Result<()> {
        let config = BundleConfig::from_options(options, &self.root)
            .with_context(|| format!("Failed to configure the bundle for '{}'", name))?;

        if options.is_watch() {
            self.set_stage(BuildStage::Watching);
            let handle = self
                .backend
                .watch(&config)
                .await
                .with_context(|| format!("{} failed to start watching", self.backend.name()))?;
            info!("Watching {}", handle.label());
            self.watchers.push(handle);
        } else {
            self.set_stage(BuildStage::Building);
            let output = self
                .backend
                .build(&config)
                .await
                .with_context(|| format!("{} failed to build", self.backend.name()))?;
            info!(
                "Built {} ({} modules, {})",
                output.output_path.display(),
                output.modules,
                utils::format_size(output.size)
            );
        }

        Ok(())
    }

    fn clean(&self, options: &BuildOptions) -> CleanOutcome {
        let outcome = self.cleaner.clean_dist(options);
        debug!("Clean outcome: {:?}", outcome);
        outcome
    }

    fn set_stage(&mut self, stage: BuildStage) {
        if self.stage != stage {
            debug!("Stage: {} -> {}", self.stage, stage);
            self.stage = stage;
        }
    }

    async fn wait_for_watchers(&mut self) {
        if self.watchers.is_empty() {
            return;
        }
        info!("Waiting for {} watcher(s); press Ctrl+C to stop", self.watchers.len());
        for handle in self.watchers.drain(..) {
            handle.wait().await;
        }
    }
}
