use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Counters of one status entry
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusEntry {
    pub active: u64,
    pub total: u64,
    pub failed: u64,
}

/// Complete status snapshot
///
/// `urls` is keyed by the normalized URL key, `methods` by `<url key>#<method>`.
/// The aggregate counters sum over `urls`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub active_calls: u64,
    pub total_calls: u64,
    pub failed_calls: u64,
    pub urls: HashMap<String, StatusEntry>,
    pub methods: HashMap<String, StatusEntry>,
}
