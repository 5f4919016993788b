//! Safety-gated removal of build output

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::options::BuildOptions;

/// Directory names that are never cleaned, at any depth
pub const PROTECTED_DIRS: [&str; 3] = ["src", "node_modules", "test"];

/// What a clean request ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanOutcome {
    /// Nothing to clean
    Skipped(String),
    /// The target failed a safety check; nothing was touched
    Rejected(String),
    Cleaned(CleanReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
    /// Protected directories left in place
    pub skipped: Vec<PathBuf>,
}

pub fn is_protected(name: &OsStr) -> bool {
    name.to_str().is_some_and(|name| PROTECTED_DIRS.contains(&name))
}

/// Removes build output below a project root
#[derive(Debug, Clone)]
pub struct Cleaner {
    root: PathBuf,
}

impl Cleaner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Clean the location of `options.output`.
    ///
    /// An existing output file is deleted on its own. An output directory, or
    /// the parent of an output file that does not exist yet, has its contents
    /// removed, skipping protected directories. Deletion errors are logged and
    /// do not fail the clean.
    pub fn clean_dist(&self, options: &BuildOptions) -> CleanOutcome {
        let Some(output) = options.output.as_deref() else {
            warn!("No output configured. Skipping dist clean");
            return CleanOutcome::Skipped("no output option".into());
        };

        let output_path = self.root.join(output);
        let (target, file) = if output_path.is_file() {
            match output_path.parent() {
                Some(parent) => (parent.to_path_buf(), Some(output_path.clone())),
                None => return CleanOutcome::Rejected(format!("{} has no parent", output)),
            }
        } else if output_path.is_dir() {
            (output_path.clone(), None)
        } else {
            let parent = output_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root.clone());
            (parent, None)
        };

        if !target.exists() {
            warn!("{} does not exist. Skipping dist clean", target.display());
            return CleanOutcome::Skipped(format!("{} does not exist", target.display()));
        }

        let target = match self.check_target(&target) {
            Ok(target) => target,
            Err(reason) => {
                error!("Refusing to clean {}: {}", target.display(), reason);
                return CleanOutcome::Rejected(reason);
            }
        };

        let report = match file {
            Some(file) => {
                let mut report = CleanReport::default();
                match fs::remove_file(&file) {
                    Ok(()) => {
                        info!("Removed {}", file.display());
                        report.removed_files = 1;
                    }
                    Err(e) => error!("Failed to remove {}: {}", file.display(), e),
                }
                report
            }
            None => self.remove_contents(&target),
        };

        CleanOutcome::Cleaned(report)
    }

    /// Canonical target, if it is strictly inside the root and not protected
    fn check_target(&self, target: &Path) -> Result<PathBuf, String> {
        let root = fs::canonicalize(&self.root)
            .map_err(|e| format!("cannot resolve project root {}: {}", self.root.display(), e))?;
        let target = fs::canonicalize(target)
            .map_err(|e| format!("cannot resolve {}: {}", target.display(), e))?;

        if target == root {
            return Err("target is the project root".into());
        }
        if !target.starts_with(&root) {
            return Err(format!("target is outside the project root {}", root.display()));
        }

        let relative = pathdiff::diff_paths(&target, &root).unwrap_or_default();
        let protected = relative.components().find_map(|component| match component {
            Component::Normal(name) if is_protected(name) => Some(name.to_string_lossy().to_string()),
            _ => None,
        });
        if let Some(name) = protected {
            return Err(format!("'{}' is a protected directory", name));
        }

        Ok(target)
    }

    fn remove_contents(&self, target: &Path) -> CleanReport {
        let mut report = CleanReport::default();
        let mut skipped = Vec::new();

        let is_empty = fs::read_dir(target)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            info!("{} is already empty", target.display());
            return report;
        }

        let mut dirs = Vec::new();
        let walker = WalkDir::new(target)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| {
                let protected = entry.file_type().is_dir() && is_protected(entry.file_name());
                if protected {
                    warn!("Skipping protected directory {}", entry.path().display());
                    skipped.push(entry.path().to_path_buf());
                }
                !protected
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read {}", e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => report.removed_files += 1,
                Err(e) => error!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }

        // deepest first; directories still holding protected content stay
        for dir in dirs.iter().rev() {
            match fs::remove_dir(dir) {
                Ok(()) => report.removed_dirs += 1,
                Err(e) => debug!("Keeping {}: {}", dir.display(), e),
            }
        }

        report.skipped = skipped;
        info!(
            "Cleaned {}: {} files, {} directories removed",
            target.display(),
            report.removed_files,
            report.removed_dirs
        );
        report
    }
}
