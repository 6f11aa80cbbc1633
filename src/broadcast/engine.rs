use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::batcher::HubBatcher;
use super::retry::{Millis, RelayContext, RetryTracker};
use super::store::MessageStore;
use super::topology::{Topology, TopologyBuilder};
use crate::error::Result;
use crate::node::{NodeName, Payload, TopologyHint, Value};
use crate::settings::BroadcastSettings;
use crate::transport::Transport;
use crate::{concurrency_error, invariant_error};

/// Per-node dissemination state and the operations that drive it.
///
/// The engine is the only writer of the store, the only producer of
/// tracker entries and the only one arming batch flushes. The store,
/// topology, tracker and batch buffer each have their own lock and no
/// lock is held across a send.
pub struct Disseminator {
    node_id: NodeName,
    settings: BroadcastSettings,
    store: MessageStore,
    builder: TopologyBuilder,
    topology: RwLock<Topology>,
    tracker: RetryTracker,
    // Some only on the hub
    batcher: Option<HubBatcher>,
    transport: Arc<dyn Transport>,
    started: Instant,
}

impl std::fmt::Debug for Disseminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disseminator")
            .field("node_id", &self.node_id)
            .field("is_hub", &self.batcher.is_some())
            .field("values", &self.store.len())
            .finish()
    }
}

impl Disseminator {
    pub fn new(settings: BroadcastSettings, transport: Arc<dyn Transport>) -> Self {
        let node_id = transport.node_id().clone();
        let batcher = settings.is_hub(&node_id).then(HubBatcher::new);
        if batcher.is_some() {
            info!(
                "[{}] Acting as batching hub with {}ms flush delay",
                node_id,
                settings.batch_delay.as_millis()
            );
        }
        Self {
            builder: TopologyBuilder::new(settings.group_size, settings.link_group_hubs),
            node_id,
            settings,
            store: MessageStore::new(),
            topology: RwLock::new(Topology::default()),
            tracker: RetryTracker::new(),
            batcher,
            transport,
            started: Instant::now(),
        }
    }

    pub fn node_id(&self) -> &NodeName {
        &self.node_id
    }

    pub fn is_hub(&self) -> bool {
        self.batcher.is_some()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn tracker(&self) -> &RetryTracker {
        &self.tracker
    }

    pub fn batcher(&self) -> Option<&HubBatcher> {
        self.batcher.as_ref()
    }

    /// Milliseconds since this engine started
    pub fn now(&self) -> Millis {
        self.started.elapsed().as_millis() as Millis
    }

    pub fn neighbors(&self) -> Result<Vec<NodeName>> {
        self.topology
            .read()
            .map(|t| t.neighbors(&self.node_id))
            .map_err(|e| concurrency_error!("topology lock poisoned: {}", e))
    }

    /// A value arrived from a client or a peer. Duplicates are absorbed;
    /// new values go to the batcher on the hub and are relayed everywhere
    /// else. The caller replies `broadcast_ok` once this returns.
    pub async fn on_broadcast(self: &Arc<Self>, sender: &NodeName, value: Value) -> Result<()> {
        if !self.store.record_if_new(value)? {
            debug!("[{}] Already have {} (from {})", self.node_id, value, sender);
            return Ok(());
        }

        if self.is_hub() {
            self.offer_to_batch(value)?;
            return Ok(());
        }

        self.fan_out(sender, value).await?;
        self.sweep_retries(sender).await
    }

    /// A batch from the hub. Every value passes the same dedup gate as a
    /// single broadcast.
    pub async fn on_batch(self: &Arc<Self>, sender: &NodeName, values: Vec<Value>) -> Result<()> {
        let mut fresh = Vec::new();
        for value in values {
            if self.store.record_if_new(value)? {
                fresh.push(value);
            }
        }
        debug!(
            "[{}] Batch from {} added {} new values",
            self.node_id,
            sender,
            fresh.len()
        );
        if self.settings.relay_batches {
            for value in fresh {
                self.fan_out(sender, value).await?;
            }
        }
        Ok(())
    }

    pub fn on_read(&self) -> Result<Vec<Value>> {
        self.store.snapshot()
    }

    /// Replace the topology wholesale with this node's partitioned view
    pub fn on_topology(&self, hint: &TopologyHint) -> Result<()> {
        let topology = self.builder.build(hint);
        let neighbors = topology.neighbors(&self.node_id);
        *self
            .topology
            .write()
            .map_err(|e| concurrency_error!("topology lock poisoned: {}", e))? = topology;
        info!("[{}] Topology set, neighbors: {:?}", self.node_id, neighbors);
        Ok(())
    }

    /// `neighbor` replied to our relay of `context.value`
    pub async fn on_relay_ack(self: &Arc<Self>, context: RelayContext) -> Result<()> {
        let removed = self.tracker.ack(&context.neighbor, context.value)?;
        debug!(
            "[{}] {} acked {} ({} pending entries cleared)",
            self.node_id, context.neighbor, context.value, removed
        );
        self.sweep_retries(&context.neighbor).await
    }

    /// Resend whatever `neighbor` has left unacknowledged for at least the
    /// retry interval.
    pub async fn sweep_retries(self: &Arc<Self>, neighbor: &NodeName) -> Result<()> {
        if !self.tracker.has_pending(neighbor)? {
            return Ok(());
        }
        let due = self
            .tracker
            .due_for_retry(neighbor, self.now(), self.settings.retry_interval)?;
        if due.is_empty() {
            return Ok(());
        }

        ensure_distinct(&due, neighbor)?;
        debug!("[{}] Resending {} values to {}: {:?}", self.node_id, due.len(), neighbor, due);
        for value in due {
            self.relay(neighbor, value).await;
        }
        Ok(())
    }

    /// Sweep every neighbor with pending entries
    pub async fn sweep_all(self: &Arc<Self>) -> Result<()> {
        for neighbor in self.tracker.neighbors_with_pending()? {
            self.sweep_retries(&neighbor).await?;
        }
        Ok(())
    }

    /// Send everything buffered on the hub as one batch to each neighbor
    pub async fn flush_batch(self: &Arc<Self>) -> Result<usize> {
        let Some(batcher) = &self.batcher else {
            return Ok(0);
        };
        let values = batcher.drain()?;
        if values.is_empty() {
            return Ok(0);
        }
        let neighbors = self.neighbors()?;
        ensure_distinct(&values, &self.node_id)?;
        info!(
            "[{}] Flushing batch of {} values to {} neighbors",
            self.node_id,
            values.len(),
            neighbors.len()
        );
        for neighbor in neighbors.iter().filter(|n| **n != self.node_id) {
            let payload = Payload::Batch {
                nums: values.clone(),
            };
            if let Err(e) = self.transport.send(neighbor, payload).await {
                warn!("[{}] Batch to {} not sent: {}", self.node_id, neighbor, e);
            }
        }
        Ok(values.len())
    }

    /// Run `sweep_all` on a fixed period for the life of the process
    pub fn spawn_retry_sweeper(self: &Arc<Self>) {
        let Some(period) = self.settings.retry_sweep else {
            return;
        };
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.sweep_all().await {
                    if e.is_fatal() {
                        engine.abort(&e);
                    }
                    warn!("[{}] Retry sweep failed: {}", engine.node_id, e);
                }
            }
        });
    }

    pub(crate) fn abort(&self, err: &crate::error::TidingsError) -> ! {
        tracing::error!("[{}] Exiting: {}", self.node_id, err);
        std::process::exit(1)
    }

    fn offer_to_batch(self: &Arc<Self>, value: Value) -> Result<()> {
        let Some(batcher) = &self.batcher else {
            return Ok(());
        };
        if !batcher.offer(value)? {
            return Ok(());
        }
        let engine = self.clone();
        let delay = self.settings.batch_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = engine.flush_batch().await {
                if e.is_fatal() {
                    engine.abort(&e);
                }
                warn!("[{}] Batch flush failed: {}", engine.node_id, e);
            }
        });
        Ok(())
    }

    /// Track and relay `value` to every neighbor except `sender` and self
    async fn fan_out(self: &Arc<Self>, sender: &NodeName, value: Value) -> Result<()> {
        let now = self.now();
        for neighbor in self.neighbors()? {
            if neighbor == *sender || neighbor == self.node_id {
                continue;
            }
            self.tracker.track(&neighbor, value, now)?;
            self.relay(&neighbor, value).await;
        }
        Ok(())
    }

    // A failed send is left to the retry sweep like any lost relay
    async fn relay(&self, neighbor: &NodeName, value: Value) {
        let context = RelayContext {
            neighbor: neighbor.clone(),
            value,
        };
        let payload = Payload::Broadcast { message: value };
        if let Err(e) = self.transport.rpc(neighbor, payload, context).await {
            debug!("[{}] Relay of {} to {} not sent: {}", self.node_id, value, neighbor, e);
        }
    }
}

/// A value twice in one outgoing set means the dedup gate was bypassed
fn ensure_distinct(values: &[Value], destination: &NodeName) -> Result<()> {
    let mut unique = HashSet::with_capacity(values.len());
    match values.iter().find(|v| !unique.insert(**v)) {
        Some(dup) => Err(invariant_error!(
            "value {} appears twice in one flush for {}",
            dup,
            destination
        )),
        None => Ok(()),
    }
}
