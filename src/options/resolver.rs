//! Option resolution
//!
//! Combines every option source into the final build options:
//! - catalog defaults
//! - the `default` configuration entry
//! - the named preset or configuration entry, or a command patch
//! - command-line flags
//!
//! The `priority` option decides whether command-line flags or the named
//! preset win on conflicting keys. The rule engine runs last.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::presets::DEFAULT_PRESET;
use super::{catalog, BuildOptions, PresetTable, Priority, RuleEngine};
use crate::cli::Invocation;
use crate::config::{AdobeCatalog, ConfigLoader};

/// Resolves build options for one invocation
#[derive(Debug)]
pub struct OptionsResolver {
    cli: BuildOptions,
    root: PathBuf,
    rules: RuleEngine,
    config: ConfigLoader,
    presets: PresetTable,
}

impl OptionsResolver {
    /// Create a resolver; the Adobe catalog is discovered under `root`
    pub fn new(invocation: &Invocation, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let adobe = AdobeCatalog::discover(&root);
        Self::with_rules(invocation, root, RuleEngine::new(adobe))
    }

    /// Create a resolver with an explicit rule engine
    pub fn with_rules(invocation: &Invocation, root: impl Into<PathBuf>, rules: RuleEngine) -> Self {
        let root = root.into();
        Self {
            cli: invocation.options.clone(),
            config: ConfigLoader::new(&root),
            presets: PresetTable::new(),
            root,
            rules,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn presets(&self) -> &PresetTable {
        &self.presets
    }

    /// The config file named on the command line, if any
    pub fn config_file(&self) -> Option<&str> {
        self.cli.config_file.as_deref()
    }

    /// Resolve the options for a preset or configuration name.
    ///
    /// Without a name the command-line `--preset` is used; without either the
    /// result is the catalog defaults, the `default` configuration entry and
    /// the command-line flags.
    pub fn resolve(&mut self, name: Option<&str>) -> BuildOptions {
        self.load_config();

        let name = name.or(self.cli.preset.as_deref()).map(str::to_string);
        let user_preset = match name.as_deref() {
            Some(name) => self.lookup(name),
            None => BuildOptions::default(),
        };

        self.merge(&user_preset)
    }

    /// Resolve the options for an explicit patch, such as a command's
    pub fn resolve_with_patch(&mut self, patch: &BuildOptions) -> BuildOptions {
        self.load_config();
        self.merge(patch)
    }

    fn load_config(&mut self) {
        let path = self.cli.config_file.clone();
        self.config.load(path.as_deref());
    }

    /// Named entry from the config file, then from the built-in presets
    fn lookup(&self, name: &str) -> BuildOptions {
        if let Some(options) = self.config.find(name) {
            info!("Using configuration '{}'", name);
            return options;
        }
        if let Some(preset) = self.presets.get(name) {
            info!("Using preset '{}'", name);
            return preset.clone();
        }
        warn!("No configuration or preset named '{}'", name);
        BuildOptions::default()
    }

    fn merge(&self, user_preset: &BuildOptions) -> BuildOptions {
        let default_preset = self.config.find(DEFAULT_PRESET).unwrap_or_default();
        let base = catalog::defaults().overlay(&default_preset);

        let priority = self
            .cli
            .priority
            .or(base.priority)
            .unwrap_or_default();

        let merged = match priority {
            Priority::Cli => base.overlay(user_preset).overlay(&self.cli),
            Priority::Config => base.overlay(&self.cli).overlay(user_preset),
        };
        debug!("Merged options with {:?} priority: {:?}", priority, merged);

        let resolved = self.rules.resolve(merged);
        info!("Resolved build options");
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Mode;
    use std::fs;

    fn invocation(args: &[&str]) -> Invocation {
        let argv = std::iter::once("kt-build").chain(args.iter().copied());
        Invocation::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_zero_arguments_is_defaults_plus_rules() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = OptionsResolver::new(&invocation(&[]), dir.path());

        let expected = resolver.rules.resolve(catalog::defaults());
        assert_eq!(resolver.resolve(None), expected);
        assert_eq!(expected.mode, Some(Mode::Production));
        assert_eq!(expected.watch, Some(false));
    }

    #[test]
    fn test_default_entry_feeds_the_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("kt.config.json"),
            r#"{ "default": { "output": "build/main.js", "minify": true } }"#,
        )
        .unwrap();

        let mut resolver = OptionsResolver::new(&invocation(&[]), dir.path());
        let resolved = resolver.resolve(None);
        assert_eq!(resolved.output.as_deref(), Some("build/main.js"));
        assert_eq!(resolved.minify, Some(true));
    }

    #[test]
    fn test_builtin_preset_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = OptionsResolver::new(&invocation(&["--preset", "test"]), dir.path());
        let resolved = resolver.resolve(None);
        assert_eq!(resolved.input.as_deref(), Some("src/tests/index.test.ts"));
        assert_eq!(resolved.test, Some(true));
    }
}
