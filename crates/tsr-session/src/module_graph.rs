//! Module Dependency Graph
//!
//! Import edges between the modules of a session. The session uses it to
//! find import cycles (Tarjan's SCC) before any worker starts waiting on
//! another module's exports, and to pick a dependency-first order when
//! checking sequentially.

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};

/// Unique identifier for a module in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

impl ModuleId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Information about a module in the dependency graph
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub name: String,
    /// Modules this module imports from, in import order
    pub dependencies: Vec<ModuleId>,
    /// Modules that import this module
    pub dependents: Vec<ModuleId>,
    /// Import names that match no module in the graph
    pub unresolved_imports: Vec<String>,
}

/// Modules forming one import cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircularDependency {
    /// Members in discovery order
    pub cycle: Vec<ModuleId>,
    /// Member names for display
    pub names: Vec<String>,
}

impl CircularDependency {
    /// `a -> b -> a`
    pub fn describe(&self) -> String {
        let mut parts = self.names.clone();
        if let Some(first) = self.names.first() {
            parts.push(first.clone());
        }
        parts.join(" -> ")
    }
}

/// Module dependency graph
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<ModuleInfo>,
    name_to_id: IndexMap<String, ModuleId, FxBuildHasher>,
    circular_dependencies: Vec<CircularDependency>,
    /// Cycle index for every module that sits in one
    cycle_of: FxHashMap<ModuleId, usize>,
}

/// Per-walk bookkeeping for Tarjan's algorithm
struct TarjanState {
    index_counter: u32,
    stack: Vec<ModuleId>,
    on_stack: FxHashSet<ModuleId>,
    indices: FxHashMap<ModuleId, u32>,
    lowlinks: FxHashMap<ModuleId, u32>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(name, imports)` pairs. Every name becomes a
    /// module first, so imports may point forward.
    pub fn from_imports<S: AsRef<str>>(modules: &[(&str, &[S])]) -> Self {
        let mut graph = ModuleGraph::new();
        for &(name, _) in modules {
            graph.add_module(name);
        }
        for &(name, imports) in modules {
            let Some(from) = graph.module_id(name) else {
                continue;
            };
            for import in imports {
                let import = import.as_ref();
                match graph.module_id(import) {
                    Some(to) => graph.add_dependency(from, to),
                    None => graph.modules[from.index()]
                        .unresolved_imports
                        .push(import.to_string()),
                }
            }
        }
        graph
    }

    /// Add or get a module by name
    pub fn add_module(&mut self, name: &str) -> ModuleId {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleInfo {
            id,
            name: name.to_string(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            unresolved_imports: Vec::new(),
        });
        self.name_to_id.insert(name.to_string(), id);
        id
    }

    pub fn add_dependency(&mut self, from: ModuleId, to: ModuleId) {
        let Some(from_module) = self.modules.get_mut(from.index()) else {
            return;
        };
        if from_module.dependencies.contains(&to) {
            return;
        }
        from_module.dependencies.push(to);
        if let Some(to_module) = self.modules.get_mut(to.index()) {
            to_module.dependents.push(from);
        }
    }

    pub fn module_id(&self, name: &str) -> Option<ModuleId> {
        self.name_to_id.get(name).copied()
    }

    pub fn module(&self, id: ModuleId) -> Option<&ModuleInfo> {
        self.modules.get(id.index())
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn dependencies(&self, id: ModuleId) -> &[ModuleId] {
        self.module(id).map_or(&[], |m| m.dependencies.as_slice())
    }

    /// Detect circular dependencies using Tarjan's algorithm
    pub fn detect_circular_dependencies(&mut self) -> &[CircularDependency] {
        self.circular_dependencies.clear();
        self.cycle_of.clear();

        let mut state = TarjanState {
            index_counter: 0,
            stack: Vec::new(),
            on_stack: FxHashSet::default(),
            indices: FxHashMap::default(),
            lowlinks: FxHashMap::default(),
        };
        for index in 0..self.modules.len() {
            let id = ModuleId(index as u32);
            if !state.indices.contains_key(&id) {
                self.strongconnect(id, &mut state);
            }
        }

        for (cycle_index, cycle) in self.circular_dependencies.iter().enumerate() {
            for &member in &cycle.cycle {
                self.cycle_of.insert(member, cycle_index);
            }
        }
        &self.circular_dependencies
    }

    /// Tarjan's strongconnect helper
    fn strongconnect(&mut self, v: ModuleId, state: &mut TarjanState) {
        state.indices.insert(v, state.index_counter);
        state.lowlinks.insert(v, state.index_counter);
        state.index_counter += 1;
        state.stack.push(v);
        state.on_stack.insert(v);

        let deps = self.dependencies(v).to_vec();
        for w in deps {
            if !state.indices.contains_key(&w) {
                self.strongconnect(w, state);
                let w_lowlink = state.lowlinks.get(&w).copied().unwrap_or(u32::MAX);
                if let Some(v_lowlink) = state.lowlinks.get_mut(&v) {
                    *v_lowlink = (*v_lowlink).min(w_lowlink);
                }
            } else if state.on_stack.contains(&w) {
                let w_index = state.indices.get(&w).copied().unwrap_or(u32::MAX);
                if let Some(v_lowlink) = state.lowlinks.get_mut(&v) {
                    *v_lowlink = (*v_lowlink).min(w_index);
                }
            }
        }

        // Root of SCC
        if state.lowlinks.get(&v) != state.indices.get(&v) {
            return;
        }
        let mut scc = Vec::new();
        while let Some(w) = state.stack.pop() {
            state.on_stack.remove(&w);
            scc.push(w);
            if w == v {
                break;
            }
        }

        // Only cycles: more than one member, or a module importing itself
        let is_cycle = scc.len() > 1 || self.dependencies(v).contains(&v);
        if is_cycle {
            scc.reverse();
            let names = scc
                .iter()
                .filter_map(|id| self.module(*id).map(|m| m.name.clone()))
                .collect();
            self.circular_dependencies.push(CircularDependency { cycle: scc, names });
        }
    }

    /// Cycles found by the last `detect_circular_dependencies` call
    pub fn circular_dependencies(&self) -> &[CircularDependency] {
        &self.circular_dependencies
    }

    /// The cycle `id` belongs to, if any
    pub fn cycle_of(&self, id: ModuleId) -> Option<&CircularDependency> {
        self.cycle_of
            .get(&id)
            .and_then(|&index| self.circular_dependencies.get(index))
    }

    /// Whether `from` and `to` sit in the same import cycle
    pub fn in_same_cycle(&self, from: ModuleId, to: ModuleId) -> bool {
        match (self.cycle_of.get(&from), self.cycle_of.get(&to)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Dependency-first order. Back edges of cycles are ignored, so every
    /// module appears exactly once.
    pub fn topological_order(&self) -> Vec<ModuleId> {
        let mut result = Vec::with_capacity(self.modules.len());
        let mut visited = FxHashSet::default();
        for index in 0..self.modules.len() {
            self.visit_post_order(ModuleId(index as u32), &mut visited, &mut result);
        }
        result
    }

    /// DFS helper for topological order
    fn visit_post_order(
        &self,
        id: ModuleId,
        visited: &mut FxHashSet<ModuleId>,
        result: &mut Vec<ModuleId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        for &dep in self.dependencies(id) {
            self.visit_post_order(dep, visited, result);
        }
        result.push(id);
    }
}

#[cfg(test)]
#[path = "tests/module_graph_tests.rs"]
mod tests;
