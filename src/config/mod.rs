//! Configuration handling for KT Build
//!
//! Loads `kt.config.json` files: a JSON object whose keys are configuration
//! names and whose values are partial build options.

pub mod adobe;
pub mod tsconfig;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::options::BuildOptions;

pub use adobe::AdobeCatalog;
pub use tsconfig::TsconfigLoader;

/// Conventional config file name, relative to the project root
pub const DEFAULT_CONFIG_FILE: &str = "kt.config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Expected a JSON object at the top level of {0}")]
    NotAnObject(String),
}

/// Read and parse a JSON file
pub fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(ConfigError::NotFound(display));
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

/// Loader for named configurations.
///
/// Entries accumulate across [`ConfigLoader::load`] calls on the same
/// instance; a later file overwrites same-named entries of an earlier one.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    root: PathBuf,
    entries: Map<String, Value>,
}

impl ConfigLoader {
    /// Create a loader resolving relative paths against `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Map::new(),
        }
    }

    /// Load a config file and return every entry loaded so far.
    ///
    /// Missing files and invalid JSON are reported as warnings; the entries
    /// already loaded are left untouched.
    pub fn load(&mut self, path: Option<&str>) -> &Map<String, Value> {
        let path = path.unwrap_or(DEFAULT_CONFIG_FILE);
        let full_path = self.root.join(path);

        match read_json(&full_path) {
            Ok(Value::Object(configs)) => {
                let mut count = 0;
                for (name, entry) in configs {
                    if entry.is_object() {
                        self.entries.insert(name, entry);
                        count += 1;
                    } else {
                        warn!("Skipping configuration '{}' in {}: not an object", name, path);
                    }
                }
                info!("Loaded {} configuration(s) from {}", count, path);
            }
            Ok(_) => warn!("{}", ConfigError::NotAnObject(path.to_string())),
            Err(ConfigError::NotFound(_)) => {
                warn!("Config file {} not found, continuing without it", path)
            }
            Err(e) => warn!("{}, continuing without it", e),
        }

        &self.entries
    }

    /// The filtered entry for `name`, or empty options when there is none
    pub fn get_config(&self, name: &str) -> BuildOptions {
        match self.find(name) {
            Some(options) => options,
            None => {
                warn!("Configuration '{}' not found", name);
                BuildOptions::default()
            }
        }
    }

    /// Like [`ConfigLoader::get_config`] but silent on a miss
    pub fn find(&self, name: &str) -> Option<BuildOptions> {
        self.entries
            .get(name)
            .and_then(Value::as_object)
            .map(BuildOptions::from_map)
    }

    pub fn has_config(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Every entry in file order, filtered through the option catalog
    pub fn entries(&self) -> Vec<(String, BuildOptions)> {
        self.entries
            .iter()
            .filter_map(|(name, entry)| {
                let map = entry.as_object()?;
                debug!("Reading configuration '{}'", name);
                Some((name.clone(), BuildOptions::from_map(map)))
            })
            .collect()
    }

    /// The raw, unfiltered entries
    pub fn raw(&self) -> &Map<String, Value> {
        &self.entries
    }
}
