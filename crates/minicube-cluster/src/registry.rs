//! Shard registry: cluster-wide node address to cube id map
//!
//! Each node is the only writer of its own entry.

use dashmap::DashMap;
use tracing::debug;

use minicube_common::types::NodeAddress;

/// Who owns what, keyed by node address
pub trait ShardRegistry: Send + Sync {
    /// Current cube id string of `node`
    fn get(&self, node: &str) -> Option<String>;

    /// Publish `cube_id` for `node`, returning the previous entry
    fn put(&self, node: &str, cube_id: String) -> Option<String>;

    /// Every entry, in no particular order
    fn entries(&self) -> Vec<(NodeAddress, String)>;
}

/// Registry kept in process memory, shared by every node of a local cluster
#[derive(Debug, Default)]
pub struct MemoryShardRegistry {
    entries: DashMap<NodeAddress, String>,
}

impl MemoryShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ShardRegistry for MemoryShardRegistry {
    fn get(&self, node: &str) -> Option<String> {
        self.entries.get(node).map(|e| e.value().clone())
    }

    fn put(&self, node: &str, cube_id: String) -> Option<String> {
        debug!("Registry {} -> {}", node, cube_id);
        self.entries.insert(node.to_string(), cube_id)
    }

    fn entries(&self) -> Vec<(NodeAddress, String)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}
