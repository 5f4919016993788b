//! Adobe application version catalog
//!
//! Known versions per host application, discovered from the directory layout
//! of the `Types-for-Adobe` package.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

/// Applications the builder can target
pub const ADOBE_APPS: &[&str] = &[
    "AfterEffects",
    "Animate",
    "Audition",
    "Illustrator",
    "InDesign",
    "Photoshop",
    "Premiere",
];

const TYPES_PACKAGE: &str = "node_modules/Types-for-Adobe";

/// Application name to sorted version list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdobeCatalog {
    apps: BTreeMap<String, Vec<String>>,
}

impl AdobeCatalog {
    /// Scan `<root>/node_modules/Types-for-Adobe`.
    ///
    /// A missing package gives an empty catalog.
    pub fn discover(root: &Path) -> Self {
        let package = root.join(TYPES_PACKAGE);
        let mut apps = BTreeMap::new();

        for app in subdirectories(&package) {
            if !ADOBE_APPS.contains(&app.as_str()) {
                continue;
            }
            let mut versions = subdirectories(&package.join(&app));
            versions.sort();
            apps.insert(app, versions);
        }

        debug!("Discovered {} Adobe application(s)", apps.len());
        Self { apps }
    }

    /// Build a catalog from explicit entries; versions are sorted
    pub fn from_entries<I, A, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (A, Vec<V>)>,
        A: Into<String>,
        V: Into<String>,
    {
        let apps = entries
            .into_iter()
            .map(|(app, versions)| {
                let mut versions: Vec<String> = versions.into_iter().map(Into::into).collect();
                versions.sort();
                (app.into(), versions)
            })
            .collect();

        Self { apps }
    }

    pub fn versions(&self, app: &str) -> Option<&[String]> {
        self.apps.get(app).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

fn subdirectories(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        debug!("{} not readable, skipping", dir.display());
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect()
}
