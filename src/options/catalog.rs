//! Option catalog
//!
//! Static registry of every option the builder understands. The command-line
//! parser, the config-file filter and the default layer are all derived from
//! this table.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::BuildOptions;

/// Shape of an option's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Boolean,
    StringArray,
    /// A boolean switch or a list of clean stage tags
    Stages,
}

/// Logical grouping, used for help output only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionGroup {
    Build,
    Compiler,
    Processing,
    Preprocessing,
    Postprocessing,
    ConfigSource,
    Target,
}

impl OptionGroup {
    pub fn heading(&self) -> &'static str {
        match self {
            OptionGroup::Build => "Build paths",
            OptionGroup::Compiler => "Compiler settings",
            OptionGroup::Processing => "Processing",
            OptionGroup::Preprocessing => "Preprocessing",
            OptionGroup::Postprocessing => "Postprocessing",
            OptionGroup::ConfigSource => "Configuration sources",
            OptionGroup::Target => "Target application",
        }
    }
}

/// A single recognised option
#[derive(Debug, Clone, Copy)]
pub struct OptionDescriptor {
    /// Canonical key, as used on the command line and in config files
    pub name: &'static str,
    /// Single-character aliases become short flags, longer ones long aliases
    pub aliases: &'static [&'static str],
    pub value_type: ValueType,
    pub default: Option<&'static str>,
    /// Allowed values; empty means unrestricted
    pub choices: &'static [&'static str],
    pub group: OptionGroup,
    pub description: &'static str,
}

const fn option(
    name: &'static str,
    aliases: &'static [&'static str],
    value_type: ValueType,
    group: OptionGroup,
    description: &'static str,
) -> OptionDescriptor {
    OptionDescriptor {
        name,
        aliases,
        value_type,
        default: None,
        choices: &[],
        group,
        description,
    }
}

impl OptionDescriptor {
    const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    const fn with_choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }

    /// Check a JSON value against the declared type and choices
    pub fn accepts(&self, value: &Value) -> bool {
        let allowed = |s: &str| self.choices.is_empty() || self.choices.contains(&s);

        match self.value_type {
            ValueType::String => value.as_str().is_some_and(allowed),
            ValueType::Boolean => value.is_boolean(),
            ValueType::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            ValueType::Stages => match value {
                Value::Bool(_) => true,
                Value::String(s) => allowed(s),
                Value::Array(items) => items.iter().all(|v| v.as_str().is_some_and(allowed)),
                _ => false,
            },
        }
    }
}

/// Clean stage tags accepted by the `clean` option
pub const CLEAN_STAGES: &[&str] = &["before", "after", "both", "false"];

/// Every recognised option, in help order
pub static OPTION_CATALOG: &[OptionDescriptor] = &[
    // Build paths
    option("input", &["i"], ValueType::String, OptionGroup::Build, "Input file")
        .with_default("src/index.ts"),
    option("output", &["o"], ValueType::String, OptionGroup::Build, "Output file path")
        .with_default("dist/index.js"),
    // Compiler settings
    option("tsconfig", &["t"], ValueType::String, OptionGroup::Compiler, "Path to tsconfig file"),
    option(
        "tsconfig-test-path",
        &["tt"],
        ValueType::String,
        OptionGroup::Compiler,
        "Path to tsconfig test file",
    ),
    option(
        "tsconfig-template",
        &["u"],
        ValueType::Boolean,
        OptionGroup::Compiler,
        "Use template tsconfig instead of custom",
    ),
    // Processing
    option("test", &[], ValueType::Boolean, OptionGroup::Processing, "Build test files"),
    option("watch", &["w"], ValueType::Boolean, OptionGroup::Processing, "Enable watch mode"),
    option(
        "mode",
        &["m"],
        ValueType::String,
        OptionGroup::Processing,
        "Build mode (production or development)",
    )
    .with_default("production")
    .with_choices(&["production", "development"]),
    option("minify", &[], ValueType::Boolean, OptionGroup::Processing, "Minify the bundle"),
    option("uglify", &[], ValueType::Boolean, OptionGroup::Processing, "Uglify the bundle"),
    // Preprocessing
    option(
        "ponyfills",
        &["p"],
        ValueType::StringArray,
        OptionGroup::Preprocessing,
        "Custom ponyfills file paths",
    ),
    // Postprocessing
    option(
        "clean",
        &["c"],
        ValueType::Stages,
        OptionGroup::Postprocessing,
        "Clean output directory (before, after, both, false)",
    )
    .with_choices(CLEAN_STAGES),
    // Configuration sources
    option("config-file", &["f"], ValueType::String, OptionGroup::ConfigSource, "Path to config file")
        .with_default("kt.config.json"),
    option(
        "priority",
        &["pr"],
        ValueType::String,
        OptionGroup::ConfigSource,
        "Priority of the configuration source",
    )
    .with_default("cli")
    .with_choices(&["CLI", "cli", "config"]),
    option("preset", &["s"], ValueType::String, OptionGroup::ConfigSource, "Configuration preset"),
    // Target application
    option(
        "dest-app",
        &["d"],
        ValueType::String,
        OptionGroup::Target,
        "Adobe application for deployment",
    ),
    option(
        "app-version",
        &["v"],
        ValueType::String,
        OptionGroup::Target,
        "Adobe application version",
    ),
];

/// Look up a descriptor by canonical name
pub fn descriptor(name: &str) -> Option<&'static OptionDescriptor> {
    OPTION_CATALOG.iter().find(|d| d.name == name)
}

/// Keep only the recognised, correctly-typed keys of `candidate`.
///
/// Unknown keys are dropped silently; known keys carrying a value of the wrong
/// shape are dropped with a warning.
pub fn filter(candidate: &Map<String, Value>) -> Map<String, Value> {
    let mut filtered = Map::new();

    for (key, value) in candidate {
        match descriptor(key) {
            Some(d) if d.accepts(value) => {
                filtered.insert(key.clone(), value.clone());
            }
            Some(_) => warn!("Ignoring option '{}': unexpected value {}", key, value),
            None => debug!("Ignoring unknown option '{}'", key),
        }
    }

    filtered
}

/// The declared defaults, and nothing else
pub fn defaults() -> BuildOptions {
    let map: Map<String, Value> = OPTION_CATALOG
        .iter()
        .filter_map(|d| d.default.map(|v| (d.name.to_string(), Value::String(v.to_string()))))
        .collect();

    BuildOptions::from_map(&map)
}
