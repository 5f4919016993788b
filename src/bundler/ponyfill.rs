//! Ponyfills
//!
//! A ponyfill replaces every occurrence of a modern API (`find`) with a local
//! helper (`replace`) whose definition (`inject`) is added once at the top of
//! the bundle.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::read_json;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ponyfill {
    pub find: String,
    pub replace: String,
    pub inject: String,
}

impl Ponyfill {
    pub fn new(find: &str, replace: &str, inject: &str) -> Self {
        Self {
            find: find.to_string(),
            replace: replace.to_string(),
            inject: inject.to_string(),
        }
    }

    /// Build a ponyfill from a JSON item; all three fields must be non-empty strings
    pub fn from_value(value: &Value) -> Option<Self> {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        };

        Some(Self::new(field("find")?, field("replace")?, field("inject")?))
    }
}

/// Helpers for the `Object` statics missing from ExtendScript
pub fn base_ponyfills() -> Vec<Ponyfill> {
    vec![
        Ponyfill::new(
            "Object.create",
            "__objectCreate",
            "function __objectCreate(proto) { function F() {} F.prototype = proto; return new F(); }",
        ),
        Ponyfill::new(
            "Object.assign",
            "__objectAssign",
            "function __objectAssign(target) { for (var i = 1; i < arguments.length; i++) { var source = arguments[i]; for (var key in source) { if (source.hasOwnProperty(key)) { target[key] = source[key]; } } } return target; }",
        ),
        Ponyfill::new(
            "Object.defineProperty",
            "__defineProperty",
            "function __defineProperty(obj, prop, descriptor) { if (descriptor && descriptor.value !== undefined) { obj[prop] = descriptor.value; } return obj; }",
        ),
    ]
}

/// Gathers the base ponyfills and the user's ponyfill files
#[derive(Debug, Clone)]
pub struct PonyfillCollector {
    root: PathBuf,
}

impl PonyfillCollector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Base ponyfills followed by the valid items of each file.
    ///
    /// A path naming a directory is searched recursively for ponyfill files.
    /// Unreadable files and invalid items are skipped with a warning. When two
    /// ponyfills share a `find`, the first one wins.
    pub fn collect(&self, paths: &[String]) -> Vec<Ponyfill> {
        let mut ponyfills = base_ponyfills();

        let files = paths.iter().flat_map(|path| {
            let full_path = self.resolve(path);
            if full_path.is_dir() {
                self.search(&full_path)
            } else {
                vec![full_path]
            }
        });

        for file in files {
            for ponyfill in self.load_file(&file) {
                if ponyfills.iter().any(|p| p.find == ponyfill.find) {
                    debug!("Ponyfill for '{}' already defined, skipping", ponyfill.find);
                    continue;
                }
                ponyfills.push(ponyfill);
            }
        }

        ponyfills
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// JSON files below `dir` whose name contains "ponyfill", in path order
    pub fn search(&self, dir: &Path) -> Vec<PathBuf> {
        let found: Vec<PathBuf> = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Cannot search for ponyfills: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_ponyfill_file(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        debug!("Found {} ponyfill files in {}", found.len(), dir.display());
        found
    }

    fn load_file(&self, full_path: &Path) -> Vec<Ponyfill> {
        let value = match read_json(full_path) {
            Ok(value) => value,
            Err(e) => {
                warn!("Error loading ponyfills: {}", e);
                return Vec::new();
            }
        };

        let Some(items) = ponyfill_items(&value) else {
            warn!(
                "No ponyfill list found in {} (expected a JSON array)",
                full_path.display()
            );
            return Vec::new();
        };

        let valid: Vec<Ponyfill> = items
            .iter()
            .filter_map(|item| {
                let ponyfill = Ponyfill::from_value(item);
                if ponyfill.is_none() {
                    warn!("Invalid ponyfill found, it must have find, replace and inject");
                }
                ponyfill
            })
            .collect();

        info!("Loaded {} custom ponyfills from {}", valid.len(), full_path.display());
        valid
    }
}

fn is_ponyfill_file(path: &Path) -> bool {
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let named = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.to_lowercase().contains("ponyfill"));
    is_json && named
}

/// The array holding the ponyfills: the document itself, its `default` or
/// `ponyfills` key, or else its first array-valued key
fn ponyfill_items(value: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = value.as_array() {
        return Some(items);
    }

    let object = value.as_object()?;
    for key in ["default", "ponyfills"] {
        if let Some(items) = object.get(key).and_then(Value::as_array) {
            return Some(items);
        }
    }

    object.iter().find_map(|(key, value)| {
        let items = value.as_array()?;
        debug!("Using the '{}' list of the ponyfill file", key);
        Some(items)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_base_only_without_files() {
        let collector = PonyfillCollector::new("/nowhere");
        assert_eq!(collector.collect(&[]), base_ponyfills());
        assert_eq!(
            collector.collect(&["missing.json".to_string()]),
            base_ponyfills()
        );
    }

    #[test]
    fn test_invalid_items_are_dropped_and_first_find_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("ponyfills.json"),
            r#"{
                "ponyfills": [
                    { "find": "Array.isArray", "replace": "__isArray", "inject": "function __isArray(a) {}" },
                    { "find": "Object.create", "replace": "__mine", "inject": "function __mine() {}" },
                    { "find": "JSON.parse", "replace": "" , "inject": "x" },
                    { "find": "String.trim" }
                ]
            }"#,
        )
        .unwrap();

        let ponyfills = PonyfillCollector::new(dir.path()).collect(&["ponyfills.json".to_string()]);

        assert_eq!(ponyfills.len(), base_ponyfills().len() + 1);
        assert_eq!(ponyfills.last().map(|p| p.replace.as_str()), Some("__isArray"));
        assert!(ponyfills
            .iter()
            .filter(|p| p.find == "Object.create")
            .all(|p| p.replace == "__objectCreate"));
    }

    #[test]
    fn test_directories_are_searched() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("polyfills/array");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            nested.join("array-ponyfills.json"),
            r#"[{ "find": "Array.isArray", "replace": "__isArray", "inject": "function __isArray(a) {}" }]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("polyfills/StringPonyfill.json"),
            r#"[{ "find": "String.trim", "replace": "__trim", "inject": "function __trim(s) {}" }]"#,
        )
        .unwrap();
        fs::write(dir.path().join("polyfills/other.json"), r#"[{ "find": "x", "replace": "y", "inject": "z" }]"#)
            .unwrap();
        fs::write(dir.path().join("polyfills/ponyfills.txt"), "not json").unwrap();

        let collector = PonyfillCollector::new(dir.path());
        assert_eq!(collector.search(&dir.path().join("polyfills")).len(), 2);

        let ponyfills = collector.collect(&["polyfills".to_string()]);
        let custom: Vec<&str> = ponyfills[base_ponyfills().len()..]
            .iter()
            .map(|p| p.find.as_str())
            .collect();
        assert_eq!(custom, ["String.trim", "Array.isArray"]);
    }

    #[test]
    fn test_first_array_property_is_used() {
        let value: Value = serde_json::from_str(
            r#"{ "name": "x", "myPonyfills": [ { "find": "a", "replace": "b", "inject": "c" } ] }"#,
        )
        .unwrap();
        assert_eq!(ponyfill_items(&value).map(Vec::len), Some(1));
        assert!(ponyfill_items(&Value::from("nope")).is_none());
    }
}
