//! Preset table
//!
//! Named partial option sets. The built-in table always carries a `default`
//! entry, so preset resolution never fails.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use super::{BuildOptions, Mode};
use crate::config::ConfigLoader;

/// Name of the preset used when nothing else matches
pub const DEFAULT_PRESET: &str = "default";

/// Collection of named presets
#[derive(Debug, Clone)]
pub struct PresetTable {
    presets: BTreeMap<String, BuildOptions>,
}

/// Production build of `src/index.ts` into `dist/index.js`
pub fn build_preset() -> BuildOptions {
    BuildOptions {
        input: Some("src/index.ts".into()),
        output: Some("dist/index.js".into()),
        test: Some(false),
        tsconfig_template: Some(true),
        ..Default::default()
    }
}

/// Same paths as `build`, rebuilding on change.
///
/// Sets development mode as well; the mode rule would otherwise switch the
/// watcher off again under the production default.
pub fn watch_preset() -> BuildOptions {
    BuildOptions {
        mode: Some(Mode::Development),
        watch: Some(true),
        ..build_preset()
    }
}

/// Development build without a watcher
pub fn dev_preset() -> BuildOptions {
    BuildOptions {
        mode: Some(Mode::Development),
        watch: Some(false),
        ..build_preset()
    }
}

/// Test bundle built from `src/tests`
pub fn test_preset() -> BuildOptions {
    BuildOptions {
        input: Some("src/tests/index.test.ts".into()),
        output: Some("dist.test/index.test.js".into()),
        tsconfig_template: Some(true),
        test: Some(true),
        ..Default::default()
    }
}

impl PresetTable {
    /// Create the table with the built-in presets
    pub fn new() -> Self {
        let mut presets = BTreeMap::new();
        presets.insert("build".to_string(), build_preset());
        presets.insert("watch".to_string(), watch_preset());
        presets.insert("dev".to_string(), dev_preset());
        presets.insert("test".to_string(), test_preset());
        presets.insert(DEFAULT_PRESET.to_string(), build_preset());

        Self { presets }
    }

    /// The named preset, or the `default` preset if there is none by that name
    pub fn resolve_preset(&self, name: &str) -> BuildOptions {
        match self.presets.get(name) {
            Some(preset) => preset.clone(),
            None => {
                debug!("Preset '{}' not found, using '{}'", name, DEFAULT_PRESET);
                self.presets
                    .get(DEFAULT_PRESET)
                    .cloned()
                    .unwrap_or_else(build_preset)
            }
        }
    }

    /// Exact lookup, without the default fallback
    pub fn get(&self, name: &str) -> Option<&BuildOptions> {
        self.presets.get(name)
    }

    /// Add the entries of a user config file.
    ///
    /// A missing or unreadable file is not an error. Built-in presets keep
    /// their definition when a user entry has the same name; entries whose
    /// filtered form is empty are still registered.
    pub fn load_user_presets(&mut self, project_root: &Path, path: Option<&str>) {
        let mut loader = ConfigLoader::new(project_root);
        loader.load(path);

        for (name, preset) in loader.entries() {
            if self.presets.contains_key(&name) {
                info!("Preset '{}' is built in, ignoring the user definition", name);
                continue;
            }
            info!("Registered user preset '{}'", name);
            self.presets.insert(name, preset);
        }
    }

    /// Every preset name, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    /// Every preset, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BuildOptions)> {
        self.presets.iter().map(|(name, preset)| (name.as_str(), preset))
    }
}

impl Default for PresetTable {
    fn default() -> Self {
        Self::new()
    }
}
