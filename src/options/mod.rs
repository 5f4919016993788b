//! Build options
//!
//! The typed option record shared by every layer of the resolution pipeline,
//! together with the catalog that declares it, the preset table, the rule
//! engine and the resolver that merges them.

pub mod catalog;
pub mod presets;
pub mod resolver;
pub mod rules;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

pub use catalog::{OptionDescriptor, OptionGroup, ValueType, OPTION_CATALOG};
pub use presets::PresetTable;
pub use resolver::OptionsResolver;
pub use rules::{Rule, RuleContext, RuleEngine};

/// Build mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Production,
    Development,
}

/// Which source wins when the command line and a preset set the same key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    #[serde(alias = "CLI")]
    Cli,
    Config,
}

/// Stage tag used by the `clean` option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanStage {
    Before,
    After,
    Both,
    False,
}

impl CleanStage {
    /// Parse a stage tag as written on the command line or in a config file
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            "both" => Some(Self::Both),
            "false" => Some(Self::False),
            _ => None,
        }
    }
}

/// The `clean` option: a plain switch, a single stage, or a list of stages.
///
/// The rule engine normalizes every shape to [`Clean::Stages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Clean {
    Flag(bool),
    Stage(CleanStage),
    Stages(Vec<CleanStage>),
}

/// Build options, one optional field per catalog entry.
///
/// Every layer of the pipeline (catalog defaults, presets, config entries,
/// command patches, command-line flags) is a partial `BuildOptions`; layers
/// are combined with [`BuildOptions::overlay`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BuildOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsconfig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsconfig_test_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsconfig_template: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uglify: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ponyfills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean: Option<Clean>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

macro_rules! overlay_fields {
    ($base:expr, $top:expr, { $($field:ident),* $(,)? }) => {
        BuildOptions {
            $($field: $top.$field.clone().or_else(|| $base.$field.clone()),)*
        }
    };
}

impl BuildOptions {
    /// Build options from an untrusted JSON object.
    ///
    /// Keys are filtered through the option catalog first, so unknown keys and
    /// wrongly-typed values never reach the typed record.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let filtered = catalog::filter(map);
        match serde_json::from_value(Value::Object(filtered)) {
            Ok(options) => options,
            Err(e) => {
                warn!("Discarding options that do not match the catalog: {}", e);
                Self::default()
            }
        }
    }

    /// JSON view of the set keys, using the catalog's hyphenated names
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Merge `top` over `self`: every key set in `top` wins.
    pub fn overlay(&self, top: &BuildOptions) -> BuildOptions {
        overlay_fields!(self, top, {
            input,
            output,
            tsconfig,
            tsconfig_test_path,
            tsconfig_template,
            test,
            watch,
            mode,
            minify,
            uglify,
            ponyfills,
            clean,
            config_file,
            priority,
            preset,
            dest_app,
            app_version,
        })
    }

    /// True when no key is set
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// The clean stages after normalization.
    ///
    /// Only meaningful once the rule engine has run; before that a raw switch
    /// or single stage is reported as a one-element list.
    pub fn clean_stages(&self) -> Vec<CleanStage> {
        match &self.clean {
            Some(Clean::Stages(stages)) => stages.clone(),
            Some(Clean::Stage(stage)) => vec![*stage],
            Some(Clean::Flag(true)) => vec![CleanStage::Both],
            Some(Clean::Flag(false)) | None => vec![CleanStage::False],
        }
    }

    pub fn is_watch(&self) -> bool {
        self.watch.unwrap_or(false)
    }

    pub fn is_test(&self) -> bool {
        self.test.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_from_map_reads_hyphenated_keys() {
        let options = BuildOptions::from_map(&map(json!({
            "input": "src/a.ts",
            "tsconfig-template": true,
            "dest-app": "Photoshop",
            "mode": "development",
            "priority": "CLI"
        })));

        assert_eq!(options.input.as_deref(), Some("src/a.ts"));
        assert_eq!(options.tsconfig_template, Some(true));
        assert_eq!(options.dest_app.as_deref(), Some("Photoshop"));
        assert_eq!(options.mode, Some(Mode::Development));
        assert_eq!(options.priority, Some(Priority::Cli));
    }

    #[test]
    fn test_from_map_drops_unknown_and_mistyped_keys() {
        let options = BuildOptions::from_map(&map(json!({
            "output": "dist/x.js",
            "watch": "yes",
            "bogus": 1
        })));

        assert_eq!(options.output.as_deref(), Some("dist/x.js"));
        assert_eq!(options.watch, None);
    }

    #[test]
    fn test_overlay_top_wins_and_base_fills_gaps() {
        let base = BuildOptions {
            input: Some("src/index.ts".into()),
            mode: Some(Mode::Production),
            ..Default::default()
        };
        let top = BuildOptions {
            mode: Some(Mode::Development),
            minify: Some(true),
            ..Default::default()
        };

        let merged = base.overlay(&top);
        assert_eq!(merged.input.as_deref(), Some("src/index.ts"));
        assert_eq!(merged.mode, Some(Mode::Development));
        assert_eq!(merged.minify, Some(true));
    }

    #[test]
    fn test_clean_accepts_every_shape() {
        let flag = BuildOptions::from_map(&map(json!({ "clean": true })));
        let single = BuildOptions::from_map(&map(json!({ "clean": "after" })));
        let list = BuildOptions::from_map(&map(json!({ "clean": ["before", "after"] })));

        assert_eq!(flag.clean, Some(Clean::Flag(true)));
        assert_eq!(single.clean, Some(Clean::Stage(CleanStage::After)));
        assert_eq!(
            list.clean,
            Some(Clean::Stages(vec![CleanStage::Before, CleanStage::After]))
        );
    }

    #[test]
    fn test_to_map_only_contains_set_keys() {
        let options = BuildOptions {
            app_version: Some("23.0".into()),
            ..Default::default()
        };
        let map = options.to_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("app-version"), Some(&json!("23.0")));
    }
}
