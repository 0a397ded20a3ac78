use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::node::Node;

/// The manifest for one recovery point: every captured node, keyed by
/// relative path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Index {
    pub backup_directory_id: String,
    pub recovery_point_id: String,
    pub items: HashMap<String, Node>,
    pub total_files: u64,
}

impl Index {
    pub fn new(backup_directory_id: impl Into<String>, recovery_point_id: impl Into<String>) -> Self {
        Self {
            backup_directory_id: backup_directory_id.into(),
            recovery_point_id: recovery_point_id.into(),
            items: HashMap::new(),
            total_files: 0,
        }
    }

    pub fn insert(&mut self, relative_path: String, node: Node) {
        if matches!(node.node_type, crate::node::NodeType::File) {
            self.total_files += 1;
        }
        self.items.insert(relative_path, node);
    }
}

/// Per-recovery-point multiset of referenced chunk keys, used for lineage
/// and deletion bookkeeping by the control plane.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkManifest {
    pub chunks: HashMap<String, u64>,
}

impl ChunkManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one occurrence of `key`. Called at least once per file that
    /// references the chunk; duplicates across files accumulate the count.
    pub fn record(&mut self, key: &str) {
        *self.chunks.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &ChunkManifest) {
        for (key, count) in &other.chunks {
            *self.chunks.entry(key.clone()).or_insert(0) += count;
        }
    }
}
