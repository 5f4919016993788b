//! Module graph data structures

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Unique identifier for a module
pub type ModuleId = usize;

/// Types of modules the bundler can handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    JavaScript,
    TypeScript,
    Tsx,
    Unknown,
}

impl ModuleType {
    /// Determine module type from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "jsx" | "mjs" | "cjs" => ModuleType::JavaScript,
            "ts" | "mts" | "cts" => ModuleType::TypeScript,
            "tsx" => ModuleType::Tsx,
            _ => ModuleType::Unknown,
        }
    }

    /// Determine module type from a path
    pub fn detect(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(ModuleType::from_extension)
            .unwrap_or(ModuleType::Unknown)
    }

    /// Whether type annotations have to be stripped
    pub fn is_typescript(&self) -> bool {
        matches!(self, ModuleType::TypeScript | ModuleType::Tsx)
    }
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Absolute path to the module
    pub path: PathBuf,

    /// Original source code
    pub source: String,

    pub module_type: ModuleType,

    pub is_entry: bool,
}

/// The module dependency graph
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,

    path_to_id: HashMap<PathBuf, ModuleId>,

    /// Dependency edges, in import order
    edges: HashMap<ModuleId, Vec<ModuleId>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, or return the id of the module already at that path
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.path_to_id.get(&module.path) {
            return id;
        }

        let id = self.modules.len();
        self.path_to_id.insert(module.path.clone(), id);
        self.modules.push(module);
        self.edges.insert(id, Vec::new());

        id
    }

    /// Add a dependency edge between modules
    pub fn add_dependency(&mut self, from: ModuleId, to: ModuleId) {
        if let Some(deps) = self.edges.get_mut(&from) {
            if !deps.contains(&to) {
                deps.push(to);
            }
        }
    }

    pub fn get_module_id(&self, path: &Path) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Modules reachable from `entry`, every dependency before its importers.
    ///
    /// Cycles are broken at the first revisit.
    pub fn bundle_order(&self, entry: ModuleId) -> Vec<ModuleId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.visit(entry, &mut visited, &mut order);
        order
    }

    fn visit(&self, id: ModuleId, visited: &mut HashSet<ModuleId>, order: &mut Vec<ModuleId>) {
        if !visited.insert(id) {
            return;
        }
        for &dep in self.edges.get(&id).into_iter().flatten() {
            self.visit(dep, visited, order);
        }
        order.push(id);
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(path: &str) -> Module {
        Module {
            path: PathBuf::from(path),
            source: String::new(),
            module_type: ModuleType::detect(Path::new(path)),
            is_entry: false,
        }
    }

    #[test]
    fn test_module_type_detection() {
        assert_eq!(ModuleType::from_extension("js"), ModuleType::JavaScript);
        assert_eq!(ModuleType::from_extension("ts"), ModuleType::TypeScript);
        assert_eq!(ModuleType::from_extension("tsx"), ModuleType::Tsx);
        assert_eq!(ModuleType::from_extension("css"), ModuleType::Unknown);
    }

    #[test]
    fn test_same_path_is_added_once() {
        let mut graph = ModuleGraph::new();
        let a = graph.add_module(module("/p/a.ts"));
        let again = graph.add_module(module("/p/a.ts"));

        assert_eq!(a, again);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get_module_id(Path::new("/p/a.ts")), Some(a));
    }

    #[test]
    fn test_dependencies_come_first() {
        let mut graph = ModuleGraph::new();
        let entry = graph.add_module(module("/p/index.ts"));
        let util = graph.add_module(module("/p/util.ts"));
        let shared = graph.add_module(module("/p/shared.ts"));
        graph.add_dependency(entry, util);
        graph.add_dependency(entry, shared);
        graph.add_dependency(util, shared);
        graph.add_dependency(shared, entry);

        assert_eq!(graph.bundle_order(entry), vec![shared, util, entry]);
    }
}
