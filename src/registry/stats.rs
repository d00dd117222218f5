use std::collections::BTreeMap;

use serde::Serialize;

/// Point-in-time summary of a registry, suitable for export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub by_state: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    /// Registered ids, dependencies first. Empty if the graph has a cycle.
    pub load_order: Vec<String>,
    /// Each plugin mapped to its direct dependencies.
    pub dependencies: BTreeMap<String, Vec<String>>,
    pub health: HealthSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
}

impl RegistryStats {
    pub fn count_in_state(&self, state: &str) -> usize {
        self.by_state.get(state).copied().unwrap_or(0)
    }
}
