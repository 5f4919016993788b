//! Module resolution
//!
//! Handles resolving import specifiers to actual file paths.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Regex patterns for extracting imports
static IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:import|export)\s+(?:type\s+)?(?:(?:\{[^}]*\}|\*\s+as\s+\w+|\*|\w+(?:\s*,\s*\{[^}]*\})?)\s+from\s+)?["']([^"']+)["']|require\s*\(\s*["']([^"']+)["']\s*\)"#)
        .expect("valid import regex")
});

static TYPE_ONLY_IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:import|export)\s+type\s"#).expect("valid type import regex")
});

/// Resolves import specifiers against the file system.
///
/// Relative specifiers are tried as written, then with each configured
/// extension, then as a directory index. Bare specifiers are looked up in
/// the `node_modules` directories above the importing file.
#[derive(Debug, Clone)]
pub struct ImportResolver {
    /// Extensions to try, with their leading dot
    extensions: Vec<String>,
}

impl ImportResolver {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions.to_vec(),
        }
    }

    /// Extract import/require specifiers from source code, in source order.
    ///
    /// Type-only imports are skipped; they vanish with the type annotations.
    pub fn extract_dependencies(&self, source: &str) -> Vec<String> {
        let mut dependencies = Vec::new();

        for cap in IMPORT_REGEX.captures_iter(source) {
            if let Some(whole) = cap.get(0) {
                if TYPE_ONLY_IMPORT_REGEX.is_match(whole.as_str()) {
                    continue;
                }
            }
            if let Some(specifier) = cap.get(1).or_else(|| cap.get(2)) {
                let spec = specifier.as_str().to_string();
                if !dependencies.contains(&spec) {
                    dependencies.push(spec);
                }
            }
        }

        debug!("Found {} dependencies", dependencies.len());
        dependencies
    }

    /// Resolve an import specifier to a file path
    pub fn resolve(&self, specifier: &str, from: &Path) -> Option<PathBuf> {
        debug!("Resolving '{}' from '{}'", specifier, from.display());

        let base_dir = from.parent().unwrap_or(Path::new("."));
        let resolved = if specifier.starts_with('.') || specifier.starts_with('/') {
            self.resolve_relative(specifier, base_dir)
        } else {
            self.resolve_bare(specifier, base_dir)
        };

        debug!("Resolved to: {:?}", resolved);
        resolved
    }

    /// Resolve a relative import
    fn resolve_relative(&self, specifier: &str, base_dir: &Path) -> Option<PathBuf> {
        let target = base_dir.join(specifier);

        if target.is_file() {
            return Some(target);
        }

        for ext in &self.extensions {
            let mut with_ext = target.clone().into_os_string();
            with_ext.push(ext);
            let with_ext = PathBuf::from(with_ext);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }

        if target.is_dir() {
            for ext in &self.extensions {
                let index = target.join(format!("index{}", ext));
                if index.is_file() {
                    return Some(index);
                }
            }
        }

        None
    }

    /// Resolve a bare import (from node_modules)
    fn resolve_bare(&self, specifier: &str, from: &Path) -> Option<PathBuf> {
        let mut current = from.to_path_buf();

        loop {
            let node_modules = current.join("node_modules");
            if node_modules.is_dir() {
                if let Some(resolved) = self.resolve_in_node_modules(&node_modules, specifier) {
                    return Some(resolved);
                }
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    /// Resolve a module within a node_modules directory
    fn resolve_in_node_modules(&self, node_modules: &Path, specifier: &str) -> Option<PathBuf> {
        let (package_name, subpath) = if specifier.starts_with('@') {
            // @scope/name or @scope/name/subpath
            let parts: Vec<&str> = specifier.splitn(3, '/').collect();
            if parts.len() < 2 {
                return None;
            }
            (format!("{}/{}", parts[0], parts[1]), parts.get(2).map(|s| s.to_string()))
        } else {
            let mut parts = specifier.splitn(2, '/');
            let name = parts.next().unwrap_or_default().to_string();
            (name, parts.next().map(str::to_string))
        };

        let package_dir = node_modules.join(&package_name);
        if !package_dir.is_dir() {
            return None;
        }

        if let Some(sub) = subpath {
            return self.resolve_relative(&sub, &package_dir);
        }

        let package_json = package_dir.join("package.json");
        if let Some(main) = read_entry_field(&package_json) {
            if let Some(resolved) = self.resolve_relative(&main, &package_dir) {
                return Some(resolved);
            }
        }

        self.resolve_relative("index", &package_dir)
            .or_else(|| self.resolve_relative("index.js", &package_dir))
    }
}

/// The `module` or `main` entry of a package manifest
fn read_entry_field(package_json: &Path) -> Option<String> {
    let content = fs::read_to_string(package_json).ok()?;
    let pkg: serde_json::Value = match serde_json::from_str(&content) {
        Ok(pkg) => pkg,
        Err(e) => {
            debug!("Ignoring unreadable {}: {}", package_json.display(), e);
            return None;
        }
    };

    ["module", "main"]
        .iter()
        .find_map(|field| pkg.get(field).and_then(|v| v.as_str()))
        .map(str::to_string)
}
