//! Plugin dependency graph with deterministic topological ordering.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::plugin::{ErrorCode, PluginError, PluginResult};

/// Directed "must start before" graph keyed by plugin id.
///
/// Edges point from a dependency to its dependents. Nodes referenced only as
/// dependencies still exist as nodes so that later registrations close edges
/// onto them.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// dependency -> dependents
    forward: HashMap<String, BTreeSet<String>>,
    /// dependent -> dependencies
    reverse: HashMap<String, BTreeSet<String>>,
    in_degree: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.in_degree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_degree.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.in_degree.contains_key(id)
    }

    /// All node ids in lexicographic order.
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.in_degree.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
        self.in_degree.clear();
    }

    fn ensure_node(&mut self, id: &str) {
        if !self.in_degree.contains_key(id) {
            self.forward.insert(id.to_string(), BTreeSet::new());
            self.reverse.insert(id.to_string(), BTreeSet::new());
            self.in_degree.insert(id.to_string(), 0);
        }
    }

    /// Adds `id` and an edge from every dependency to it.
    ///
    /// Repeated calls are additive; an edge that already exists is not
    /// counted twice.
    pub fn add_plugin<S: AsRef<str>>(&mut self, id: &str, dependencies: &[S]) {
        self.ensure_node(id);

        for dependency in dependencies {
            let dependency = dependency.as_ref();
            self.ensure_node(dependency);

            let added = self
                .forward
                .get_mut(dependency)
                .map(|dependents| dependents.insert(id.to_string()))
                .unwrap_or(false);
            if !added {
                continue;
            }
            if let Some(deps) = self.reverse.get_mut(id) {
                deps.insert(dependency.to_string());
            }
            if let Some(degree) = self.in_degree.get_mut(id) {
                *degree += 1;
            }
        }
    }

    /// Removes `id` and every edge touching it. No-op for unknown ids.
    pub fn remove_plugin(&mut self, id: &str) {
        if !self.contains(id) {
            return;
        }

        if let Some(dependents) = self.forward.remove(id) {
            for dependent in dependents {
                if let Some(degree) = self.in_degree.get_mut(&dependent) {
                    *degree = degree.saturating_sub(1);
                }
                if let Some(deps) = self.reverse.get_mut(&dependent) {
                    deps.remove(id);
                }
            }
        }

        if let Some(dependencies) = self.reverse.remove(id) {
            for dependency in dependencies {
                if let Some(dependents) = self.forward.get_mut(&dependency) {
                    dependents.remove(id);
                }
            }
        }

        self.in_degree.remove(id);
    }

    /// Topological order, dependencies first.
    ///
    /// Ties are broken lexicographically so the result only depends on the
    /// edge set, never on insertion order.
    pub fn load_order(&self) -> PluginResult<Vec<String>> {
        let mut in_degree = self.in_degree.clone();
        let mut ready: BTreeSet<String> = in_degree
            .iter()
            .filter(|&(_, degree)| *degree == 0)
            .map(|(id, _)| id.clone())
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(node) = ready.pop_first() {
            if let Some(dependents) = self.forward.get(&node) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.insert(dependent.clone());
                        }
                    }
                }
            }
            order.push(node);
        }

        if order.len() < self.in_degree.len() {
            let reached: HashSet<&String> = order.iter().collect();
            let mut unresolved: Vec<String> = self
                .in_degree
                .keys()
                .filter(|id| !reached.contains(id))
                .cloned()
                .collect();
            unresolved.sort();

            let first = unresolved.first().cloned().unwrap_or_default();
            return Err(PluginError::dependency(
                first,
                ErrorCode::CircularDependency,
                format!(
                    "circular dependency detected among plugins: {}",
                    unresolved.join(", ")
                ),
            )
            .with_context(serde_json::json!({ "unresolved": unresolved })));
        }

        Ok(order)
    }

    /// True when a dependency cycle is reachable from `id`.
    pub fn has_circular_dependency(&self, id: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        self.detect_cycle(id, &mut visited, &mut stack)
    }

    fn detect_cycle<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
    ) -> bool {
        if stack.contains(id) {
            return true;
        }
        if !visited.insert(id) {
            return false;
        }
        stack.insert(id);

        if let Some(dependencies) = self.reverse.get(id) {
            for dependency in dependencies {
                if self.detect_cycle(dependency, visited, stack) {
                    return true;
                }
            }
        }

        stack.remove(id);
        false
    }

    /// Direct dependencies of `id`.
    pub fn dependencies(&self, id: &str) -> Vec<String> {
        self.reverse
            .get(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct dependents of `id`.
    pub fn dependents(&self, id: &str) -> Vec<String> {
        self.forward
            .get(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Transitive dependencies of `id`, sorted.
    pub fn all_dependencies(&self, id: &str) -> Vec<String> {
        Self::closure(&self.reverse, id)
    }

    /// Transitive dependents of `id`, sorted.
    pub fn all_dependents(&self, id: &str) -> Vec<String> {
        Self::closure(&self.forward, id)
    }

    fn closure(edges: &HashMap<String, BTreeSet<String>>, id: &str) -> Vec<String> {
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut pending: Vec<&str> = edges
            .get(id)
            .map(|next| next.iter().map(String::as_str).collect())
            .unwrap_or_default();

        while let Some(node) = pending.pop() {
            if !visited.insert(node.to_string()) {
                continue;
            }
            if let Some(next) = edges.get(node) {
                pending.extend(next.iter().map(String::as_str));
            }
        }

        visited.remove(id);
        visited.into_iter().collect()
    }

    /// First dependency chain found from `from` down to `to`.
    pub fn dependency_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.find_path(from, to, &mut path, &mut visited) {
            Some(path)
        } else {
            None
        }
    }

    fn find_path<'a>(
        &'a self,
        current: &'a str,
        target: &str,
        path: &mut Vec<String>,
        visited: &mut HashSet<&'a str>,
    ) -> bool {
        if !visited.insert(current) {
            return false;
        }
        path.push(current.to_string());
        if current == target {
            return true;
        }

        if let Some(dependencies) = self.reverse.get(current) {
            for dependency in dependencies {
                if self.find_path(dependency, target, path, visited) {
                    return true;
                }
            }
        }

        path.pop();
        false
    }

    /// dependent -> direct dependencies, for every node.
    pub fn adjacency(&self) -> BTreeMap<String, Vec<String>> {
        self.reverse
            .iter()
            .map(|(id, deps)| (id.clone(), deps.iter().cloned().collect()))
            .collect()
    }

    pub fn in_degree(&self, id: &str) -> Option<usize> {
        self.in_degree.get(id).copied()
    }
}
