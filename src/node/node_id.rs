use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Unique identifier for cluster nodes, e.g. `n3` or `c12`
///
/// Ordering is natural rather than lexicographic: the alphabetic prefix
/// is compared first, then the numeric suffix by value, so `n2 < n10`.
/// Every node sorts membership with this same order when it builds the
/// topology.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, Option<u64>) {
        let digits_at = self
            .0
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i);
        match digits_at {
            Some(i) => (&self.0[..i], self.0[i..].parse().ok()),
            None => (&self.0, None),
        }
    }
}

impl Ord for NodeName {
    fn cmp(&self, other: &Self) -> Ordering {
        let (prefix, number) = self.split();
        let (other_prefix, other_number) = other.split();
        prefix
            .cmp(other_prefix)
            .then(number.cmp(&other_number))
            // keeps `n01` and `n1` distinct and the order total
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for NodeName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for NodeName {
    fn from(id: &str) -> Self {
        NodeName::new(id.to_string())
    }
}

impl From<String> for NodeName {
    fn from(id: String) -> Self {
        NodeName::new(id)
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
