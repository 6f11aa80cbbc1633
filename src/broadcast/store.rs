use std::collections::HashSet;
use std::sync::RwLock;

use crate::concurrency_error;
use crate::error::Result;
use crate::node::Value;

/// Every value this node has seen, once each, in arrival order.
///
/// The order only makes reads deterministic. `values` and `seen` always
/// hold the same members; both are only touched under the write lock.
#[derive(Debug, Default)]
pub struct MessageStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    values: Vec<Value>,
    seen: HashSet<Value>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dedup gate: append `value` and return true only the first time
    /// it is offered.
    pub fn record_if_new(&self, value: Value) -> Result<bool> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| concurrency_error!("message store lock poisoned: {}", e))?;
        if !inner.seen.insert(value) {
            return Ok(false);
        }
        inner.values.push(value);
        Ok(true)
    }

    pub fn snapshot(&self) -> Result<Vec<Value>> {
        self.inner
            .read()
            .map(|inner| inner.values.clone())
            .map_err(|e| concurrency_error!("message store lock poisoned: {}", e))
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
