//! Derived-data caches for the node graph
//!
//! Sockets are computed from descriptors and runtime type overrides, and the
//! "which connection feeds this input" lookup is needed on every resolve. Both
//! are cached here and invalidated by the graph whenever it mutates.

use super::node::NodeId;
use super::port::Socket;
use std::cell::RefCell;
use std::collections::HashMap;

/// Key of the input-connection index: (input node, input socket)
pub type InputKey = (NodeId, String);

/// Pattern for matching cache entries during invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKeyPattern {
    /// All cached sockets of a node
    Node(NodeId),
    /// Every entry
    All,
}

impl CacheKeyPattern {
    pub fn matches(&self, node_id: NodeId) -> bool {
        match self {
            CacheKeyPattern::Node(id) => *id == node_id,
            CacheKeyPattern::All => true,
        }
    }
}

/// Statistics about cache usage
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatistics {
    /// Nodes with cached sockets
    pub socket_entries: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Socket entries dropped by invalidation
    pub cache_invalidations: usize,
    /// Times the input-connection index was rebuilt
    pub index_rebuilds: usize,
}

impl CacheStatistics {
    /// Calculate cache hit ratio
    pub fn hit_ratio(&self) -> f32 {
        let total_accesses = self.cache_hits + self.cache_misses;
        if total_accesses == 0 {
            0.0
        } else {
            self.cache_hits as f32 / total_accesses as f32
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    sockets: HashMap<NodeId, Vec<Socket>>,
    input_index: Option<HashMap<InputKey, usize>>,
    stats: CacheStatistics,
}

/// Socket cache plus input-connection index
///
/// Lookups take `&self` so read-only graph queries can fill the cache.
#[derive(Debug, Default)]
pub struct GraphCache {
    state: RefCell<CacheState>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached sockets of a node, computing them on a miss
    pub fn sockets_or_insert_with(&self, node_id: NodeId, compute: impl FnOnce() -> Vec<Socket>) -> Vec<Socket> {
        let mut state = self.state.borrow_mut();
        if let Some(sockets) = state.sockets.get(&node_id) {
            let sockets = sockets.clone();
            state.stats.cache_hits += 1;
            return sockets;
        }

        state.stats.cache_misses += 1;
        let sockets = compute();
        state.sockets.insert(node_id, sockets.clone());
        state.stats.socket_entries = state.sockets.len();
        sockets
    }

    /// Position of the connection feeding an input, rebuilding the index if needed
    pub fn input_connection(
        &self,
        key: &InputKey,
        rebuild: impl FnOnce() -> HashMap<InputKey, usize>,
    ) -> Option<usize> {
        let mut state = self.state.borrow_mut();
        if state.input_index.is_none() {
            state.stats.index_rebuilds += 1;
            state.input_index = Some(rebuild());
        }
        state.input_index.as_ref().and_then(|index| index.get(key).copied())
    }

    /// Drops cached sockets matching a pattern
    pub fn invalidate(&self, pattern: &CacheKeyPattern) -> usize {
        let mut state = self.state.borrow_mut();
        let before = state.sockets.len();
        state.sockets.retain(|node_id, _| !pattern.matches(*node_id));
        let removed = before - state.sockets.len();
        state.stats.cache_invalidations += removed;
        state.stats.socket_entries = state.sockets.len();
        removed
    }

    /// Marks the input-connection index stale
    pub fn invalidate_connections(&self) {
        self.state.borrow_mut().input_index = None;
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        self.invalidate(&CacheKeyPattern::All);
        self.invalidate_connections();
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.state.borrow().stats.clone()
    }
}
