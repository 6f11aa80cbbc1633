//! Fixed fan-out topology.
//!
//! The suggested adjacency from the cluster is ignored. All node ids are
//! sorted and cut into consecutive groups of `group_size`; the first node
//! of each group is that group's local hub and every other member links
//! only to it. Optionally the local hubs are also linked to each other,
//! otherwise groups have no path between them.
use std::collections::{BTreeMap, BTreeSet};

use crate::node::{NodeName, TopologyHint};

/// Neighbor rows for every node in the cluster
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    rows: BTreeMap<NodeName, BTreeSet<NodeName>>,
}

impl Topology {
    pub fn neighbors(&self, node: &NodeName) -> Vec<NodeName> {
        self.rows
            .get(node)
            .map(|row| row.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeName> {
        self.rows.keys()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn link(&mut self, a: &NodeName, b: &NodeName) {
        self.rows.entry(a.clone()).or_default().insert(b.clone());
        self.rows.entry(b.clone()).or_default().insert(a.clone());
    }
}

#[derive(Clone, Debug)]
pub struct TopologyBuilder {
    group_size: usize,
    link_group_hubs: bool,
}

impl TopologyBuilder {
    pub fn new(group_size: usize, link_group_hubs: bool) -> Self {
        Self {
            group_size: group_size.max(1),
            link_group_hubs,
        }
    }

    /// Build the partitioned topology. Pure: equal hints give equal results
    /// on every node.
    pub fn build(&self, hint: &TopologyHint) -> Topology {
        let nodes: BTreeSet<&NodeName> = hint
            .iter()
            .flat_map(|(node, suggested)| std::iter::once(node).chain(suggested))
            .collect();
        let nodes: Vec<&NodeName> = nodes.into_iter().collect();

        let mut topology = Topology::default();
        for node in &nodes {
            topology.rows.insert((*node).clone(), BTreeSet::new());
        }

        let mut local_hubs = Vec::new();
        for group in nodes.chunks(self.group_size) {
            let hub = group[0];
            local_hubs.push(hub);
            for member in &group[1..] {
                topology.link(hub, member);
            }
        }

        if self.link_group_hubs {
            for (i, a) in local_hubs.iter().enumerate() {
                for b in &local_hubs[i + 1..] {
                    topology.link(a, b);
                }
            }
        }
        topology
    }
}
