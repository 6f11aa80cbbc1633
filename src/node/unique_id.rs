use std::sync::atomic::{AtomicU64, Ordering};

use super::NodeName;

/// Cluster-unique ids of the form `<node>_<n>`.
///
/// Node names are unique in the cluster and `n` never repeats on a node,
/// so no coordination is needed.
#[derive(Debug)]
pub struct UniqueIds {
    node_id: NodeName,
    next: AtomicU64,
}

impl UniqueIds {
    pub fn new(node_id: NodeName) -> Self {
        Self {
            node_id,
            next: AtomicU64::new(1),
        }
    }

    pub fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", self.node_id, n)
    }
}
