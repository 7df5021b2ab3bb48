//! In-memory map of agent id to runtime state

use crate::types::{AgentRuntimeState, AgentStatus};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Thread-safe runtime state table
///
/// Records are replaced whole, never patched in place, so readers always see
/// a complete record. Only the supervisor writes.
#[derive(Default)]
pub struct ProcessRegistry {
    states: RwLock<HashMap<String, AgentRuntimeState>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn upsert(&self, id: &str, state: AgentRuntimeState) {
        self.states.write().insert(id.to_string(), state);
    }

    pub(crate) fn remove(&self, id: &str) -> Option<AgentRuntimeState> {
        self.states.write().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<AgentRuntimeState> {
        self.states.read().get(id).cloned()
    }

    pub fn status(&self, id: &str) -> Option<AgentStatus> {
        self.states.read().get(id).map(|s| s.status)
    }

    /// Copy of every record, sorted by agent id
    pub fn all(&self) -> Vec<AgentRuntimeState> {
        let mut states: Vec<AgentRuntimeState> = self.states.read().values().cloned().collect();
        states.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        states
    }

    pub fn contains(&self, id: &str) -> bool {
        self.states.read().contains_key(id)
    }

    pub fn running(&self) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|s| s.status.is_live())
            .map(|s| s.agent_id)
            .collect()
    }
}
