use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::concurrency_error;
use crate::error::Result;
use crate::node::{NodeName, Value};

/// Milliseconds on the engine's monotonic clock
pub type Millis = u64;

/// Identifies the relay an acknowledgment belongs to. Travels with the
/// outbound request and comes back unchanged with its reply.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RelayContext {
    pub neighbor: NodeName,
    pub value: Value,
}

/// A relay the neighbor has not acknowledged yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingDelivery {
    pub value: Value,
    pub last_sent: Millis,
}

/// Per-neighbor queues of unacknowledged relays.
///
/// Each entry is `Sent(last_sent)` until the neighbor acknowledges the
/// value, at which point it is removed. Acks match by value, so an ack for
/// the original send and an ack for a resend collapse into one removal.
#[derive(Debug, Default)]
pub struct RetryTracker {
    pending: RwLock<HashMap<NodeName, Vec<PendingDelivery>>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first send of `value` to `neighbor`
    pub fn track(&self, neighbor: &NodeName, value: Value, now: Millis) -> Result<()> {
        let mut pending = self
            .pending
            .write()
            .map_err(|e| concurrency_error!("retry tracker lock poisoned: {}", e))?;
        pending
            .entry(neighbor.clone())
            .or_default()
            .push(PendingDelivery {
                value,
                last_sent: now,
            });
        Ok(())
    }

    /// Drop every pending entry for this pair; returns how many were removed
    pub fn ack(&self, neighbor: &NodeName, value: Value) -> Result<usize> {
        let mut pending = self
            .pending
            .write()
            .map_err(|e| concurrency_error!("retry tracker lock poisoned: {}", e))?;
        let Some(entries) = pending.get_mut(neighbor) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|entry| entry.value != value);
        let removed = before - entries.len();
        if entries.is_empty() {
            pending.remove(neighbor);
        }
        Ok(removed)
    }

    /// Restamp and return every entry for `neighbor` at least `min_interval`
    /// old. Younger entries are left as they are.
    pub fn due_for_retry(
        &self,
        neighbor: &NodeName,
        now: Millis,
        min_interval: Duration,
    ) -> Result<Vec<Value>> {
        let min_interval = min_interval.as_millis() as Millis;
        let mut pending = self
            .pending
            .write()
            .map_err(|e| concurrency_error!("retry tracker lock poisoned: {}", e))?;
        let Some(entries) = pending.get_mut(neighbor) else {
            return Ok(Vec::new());
        };
        let mut due = Vec::new();
        for entry in entries.iter_mut() {
            if now.saturating_sub(entry.last_sent) < min_interval {
                continue;
            }
            entry.last_sent = now;
            due.push(entry.value);
        }
        Ok(due)
    }

    pub fn has_pending(&self, neighbor: &NodeName) -> Result<bool> {
        self.pending
            .read()
            .map(|pending| pending.get(neighbor).is_some_and(|e| !e.is_empty()))
            .map_err(|e| concurrency_error!("retry tracker lock poisoned: {}", e))
    }

    /// Neighbors that currently have at least one pending entry
    pub fn neighbors_with_pending(&self) -> Result<Vec<NodeName>> {
        self.pending
            .read()
            .map(|pending| {
                pending
                    .iter()
                    .filter(|(_, entries)| !entries.is_empty())
                    .map(|(neighbor, _)| neighbor.clone())
                    .collect()
            })
            .map_err(|e| concurrency_error!("retry tracker lock poisoned: {}", e))
    }

    pub fn pending_for(&self, neighbor: &NodeName) -> Result<Vec<PendingDelivery>> {
        self.pending
            .read()
            .map(|pending| pending.get(neighbor).cloned().unwrap_or_default())
            .map_err(|e| concurrency_error!("retry tracker lock poisoned: {}", e))
    }
}
