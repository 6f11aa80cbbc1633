//! Envelope Transport
//!
//! The boundary the dissemination engine talks through. Delivery is
//! best-effort: `send` and `rpc` may be dropped silently, and an `rpc`
//! whose reply never arrives simply never resolves its context.
pub mod stdio;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::broadcast::RelayContext;
use crate::concurrency_error;
use crate::error::Result;
use crate::node::{Body, Message, NodeName, Payload};

#[async_trait]
pub trait Transport: Send + Sync {
    /// This node's id
    fn node_id(&self) -> &NodeName;

    /// Every node in the cluster, this one included
    fn node_ids(&self) -> &[NodeName];

    /// Fire-and-forget delivery attempt
    async fn send(&self, dest: &NodeName, payload: Payload) -> Result<()>;

    /// Answer `request` with a correlated reply
    async fn reply(&self, request: &Message, payload: Payload) -> Result<()>;

    /// Send a request whose reply, if it ever arrives, resolves `context`
    async fn rpc(&self, dest: &NodeName, payload: Payload, context: RelayContext) -> Result<()>;
}

/// Transport that hands envelopes to a channel drained by a writer task.
#[derive(Debug)]
pub struct ChannelTransport {
    node_id: NodeName,
    node_ids: Vec<NodeName>,
    next_msg_id: AtomicU64,
    callbacks: Mutex<Callbacks>,
    outbound: mpsc::Sender<Message>,
}

/// Outstanding rpcs. A resend of the same relay supersedes the earlier
/// send, so there is at most one live msg_id per context.
#[derive(Debug, Default)]
struct Callbacks {
    by_msg_id: HashMap<u64, RelayContext>,
    live: HashMap<RelayContext, u64>,
}

impl Callbacks {
    fn register(&mut self, msg_id: u64, context: RelayContext) {
        if let Some(superseded) = self.live.insert(context.clone(), msg_id) {
            self.by_msg_id.remove(&superseded);
        }
        self.by_msg_id.insert(msg_id, context);
    }

    fn take(&mut self, msg_id: u64) -> Option<RelayContext> {
        let context = self.by_msg_id.remove(&msg_id)?;
        self.live.remove(&context);
        Some(context)
    }
}

impl ChannelTransport {
    pub fn new(
        node_id: NodeName,
        node_ids: Vec<NodeName>,
        outbound: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            node_id,
            node_ids,
            next_msg_id: AtomicU64::new(1),
            callbacks: Mutex::new(Callbacks::default()),
            outbound,
        }
    }

    fn next_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn push(&self, dest: &NodeName, body: Body) -> Result<()> {
        let message = Message::new(self.node_id.clone(), dest.clone(), body);
        self.outbound.send(message).await?;
        Ok(())
    }

    /// Claim the context registered for `in_reply_to`. Only the first
    /// reply to the latest send of a relay resolves it.
    pub fn resolve(&self, in_reply_to: u64) -> Result<Option<RelayContext>> {
        self.callbacks
            .lock()
            .map(|mut callbacks| callbacks.take(in_reply_to))
            .map_err(|e| concurrency_error!("callback registry lock poisoned: {}", e))
    }

    /// Number of rpcs still waiting for a reply
    pub fn outstanding(&self) -> usize {
        self.callbacks.lock().map(|c| c.by_msg_id.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn node_id(&self) -> &NodeName {
        &self.node_id
    }

    fn node_ids(&self) -> &[NodeName] {
        &self.node_ids
    }

    async fn send(&self, dest: &NodeName, payload: Payload) -> Result<()> {
        let body = Body {
            msg_id: None,
            in_reply_to: None,
            payload,
        };
        self.push(dest, body).await
    }

    async fn reply(&self, request: &Message, payload: Payload) -> Result<()> {
        let body = Body {
            msg_id: Some(self.next_msg_id()),
            in_reply_to: request.body.msg_id,
            payload,
        };
        self.push(&request.src, body).await
    }

    async fn rpc(&self, dest: &NodeName, payload: Payload, context: RelayContext) -> Result<()> {
        let msg_id = self.next_msg_id();
        self.callbacks
            .lock()
            .map_err(|e| concurrency_error!("callback registry lock poisoned: {}", e))?
            .register(msg_id, context);
        let body = Body {
            msg_id: Some(msg_id),
            in_reply_to: None,
            payload,
        };
        if let Err(e) = self.push(dest, body).await {
            debug!("[{}] rpc {} to {} not sent: {}", self.node_id, msg_id, dest, e);
            self.resolve(msg_id)?;
            return Err(e);
        }
        Ok(())
    }
}
