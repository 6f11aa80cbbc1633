use std::sync::RwLock;

use crate::concurrency_error;
use crate::error::Result;
use crate::node::Value;

/// Accumulates newly seen values on the hub until the flush timer fires.
///
/// `offer` and `drain` each hold the lock for their whole update, so a
/// value offered while a flush is draining lands either in that flush or
/// in the buffer for the next one. The caller owns the timer: `offer`
/// returns true when one has to be armed.
#[derive(Debug, Default)]
pub struct HubBatcher {
    inner: RwLock<BatchBuffer>,
}

#[derive(Debug, Default)]
struct BatchBuffer {
    values: Vec<Value>,
    armed: bool,
}

impl HubBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&self, value: Value) -> Result<bool> {
        let mut buffer = self
            .inner
            .write()
            .map_err(|e| concurrency_error!("batch buffer lock poisoned: {}", e))?;
        buffer.values.push(value);
        if buffer.armed {
            return Ok(false);
        }
        buffer.armed = true;
        Ok(true)
    }

    /// Take everything buffered and disarm
    pub fn drain(&self) -> Result<Vec<Value>> {
        let mut buffer = self
            .inner
            .write()
            .map_err(|e| concurrency_error!("batch buffer lock poisoned: {}", e))?;
        buffer.armed = false;
        Ok(std::mem::take(&mut buffer.values))
    }

    pub fn is_armed(&self) -> bool {
        self.inner.read().map(|b| b.armed).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|b| b.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
