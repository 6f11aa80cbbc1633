use std::collections::{BTreeSet, HashSet, VecDeque};
use std::time::Duration;

use proptest::prelude::*;
use tidings::broadcast::{MessageStore, RetryTracker, TopologyBuilder};
use tidings::node::{NodeName, TopologyHint};

fn names(count: usize) -> Vec<NodeName> {
    (0..count).map(|i| NodeName::from(format!("n{}", i))).collect()
}

fn bare_hint(nodes: &[NodeName]) -> TopologyHint {
    nodes.iter().map(|n| (n.clone(), Vec::new())).collect()
}

proptest! {
    #[test]
    fn test_store_keeps_first_occurrence_order_property(
        values in prop::collection::vec(-50i64..50, 0..200)
    ) {
        let store = MessageStore::new();
        for v in &values {
            store.record_if_new(*v).unwrap();
        }
        // replaying everything changes nothing
        for v in &values {
            prop_assert!(!store.record_if_new(*v).unwrap());
        }

        let mut seen = HashSet::new();
        let expected: Vec<i64> = values.iter().copied().filter(|v| seen.insert(*v)).collect();
        prop_assert_eq!(store.snapshot().unwrap(), expected);
        prop_assert_eq!(store.len(), seen.len());
    }

    #[test]
    fn test_topology_ignores_suggested_edges_property(
        count in 1usize..80,
        group_size in 1usize..30,
        link_group_hubs in any::<bool>(),
        edges in prop::collection::vec((0usize..80, 0usize..80), 0..200)
    ) {
        let nodes = names(count);
        let mut suggested = bare_hint(&nodes);
        for (a, b) in edges {
            let (a, b) = (a % count, b % count);
            if let Some(row) = suggested.get_mut(&nodes[a]) {
                row.push(nodes[b].clone());
            }
        }

        let builder = TopologyBuilder::new(group_size, link_group_hubs);
        prop_assert_eq!(builder.build(&bare_hint(&nodes)), builder.build(&suggested));
    }

    #[test]
    fn test_topology_is_symmetric_and_bounded_property(
        count in 1usize..80,
        group_size in 1usize..30,
        link_group_hubs in any::<bool>()
    ) {
        let nodes = names(count);
        let topology = TopologyBuilder::new(group_size, link_group_hubs).build(&bare_hint(&nodes));
        prop_assert_eq!(topology.len(), count);

        let group_count = count.div_ceil(group_size);
        for node in &nodes {
            let row = topology.neighbors(node);
            prop_assert!(!row.contains(node));
            for neighbor in &row {
                prop_assert!(topology.neighbors(neighbor).contains(node));
            }
            // a leaf sees its group hub only; a hub sees its group plus the other hubs
            prop_assert!(row.len() < group_size + group_count);
        }
    }

    #[test]
    fn test_linked_topology_is_connected_property(
        count in 1usize..80,
        group_size in 1usize..30
    ) {
        let nodes = names(count);
        let topology = TopologyBuilder::new(group_size, true).build(&bare_hint(&nodes));

        let mut reached = BTreeSet::new();
        let mut queue = VecDeque::from([nodes[0].clone()]);
        while let Some(node) = queue.pop_front() {
            if !reached.insert(node.clone()) {
                continue;
            }
            queue.extend(topology.neighbors(&node));
        }
        prop_assert_eq!(reached.len(), count);
    }

    #[test]
    fn test_retry_is_due_only_after_interval_property(
        sent_at in 0u64..10_000,
        age in 0u64..5_000,
        interval_ms in 1u64..3_000
    ) {
        let tracker = RetryTracker::new();
        let neighbor = NodeName::from("n1");
        tracker.track(&neighbor, 10, sent_at).unwrap();

        let due = tracker
            .due_for_retry(&neighbor, sent_at + age, Duration::from_millis(interval_ms))
            .unwrap();
        if age >= interval_ms {
            prop_assert_eq!(due, vec![10]);
            prop_assert_eq!(tracker.pending_for(&neighbor).unwrap()[0].last_sent, sent_at + age);
        } else {
            prop_assert!(due.is_empty());
            prop_assert_eq!(tracker.pending_for(&neighbor).unwrap()[0].last_sent, sent_at);
        }
    }
}
