use std::sync::Arc;

use tracing::{debug, warn};

pub mod messages;
pub mod node_id;
pub mod unique_id;

use crate::broadcast::{Disseminator, RelayContext};
use crate::error::{ProtocolError, Result};
use crate::settings::BroadcastSettings;
use crate::transport::Transport;
pub use messages::{parse_line, Body, Message, Payload, Rejected, TopologyHint, Value};
pub use node_id::NodeName;
pub use unique_id::UniqueIds;

/// Everything one node owns after `init`: the dissemination engine, the
/// id generator and the transport to answer through. Built once per
/// process and shared with every handler task.
pub struct Node {
    engine: Arc<Disseminator>,
    ids: UniqueIds,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", self.node_id())
            .field("engine", &self.engine)
            .finish()
    }
}

impl Node {
    pub fn new(settings: BroadcastSettings, transport: Arc<dyn Transport>) -> Self {
        let node_id = transport.node_id().clone();
        Self {
            engine: Arc::new(Disseminator::new(settings, transport.clone())),
            ids: UniqueIds::new(node_id),
            transport,
        }
    }

    /// Start background work (the periodic retry sweep)
    pub fn start(&self) {
        self.engine.spawn_retry_sweeper();
    }

    pub fn node_id(&self) -> &NodeName {
        self.transport.node_id()
    }

    pub fn engine(&self) -> &Arc<Disseminator> {
        &self.engine
    }

    /// Handle one request and send its reply. Non-fatal failures are
    /// answered with an `error` body; only fatal ones are returned.
    pub async fn handle_request(&self, request: Message) -> Result<()> {
        match self.route(&request).await {
            Ok(Some(payload)) => self.transport.reply(&request, payload).await,
            Ok(None) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(
                    "[{}] {} from {} failed: {}",
                    self.node_id(),
                    request.body.payload.kind(),
                    request.src,
                    e
                );
                if request.body.msg_id.is_some() {
                    self.transport.reply(&request, Payload::error(&e)).await?;
                }
                Ok(())
            }
        }
    }

    /// A reply to one of our relays came back
    pub async fn handle_reply(&self, context: RelayContext, reply: Message) -> Result<()> {
        match reply.body.payload {
            Payload::BroadcastOk => self.engine.on_relay_ack(context).await,
            Payload::Error { code, text } => {
                debug!(
                    "[{}] {} rejected relay of {}: [{}] {}",
                    self.node_id(),
                    reply.src,
                    context.value,
                    code,
                    text
                );
                Ok(())
            }
            other => {
                warn!(
                    "[{}] Unexpected {} in reply to relay of {}",
                    self.node_id(),
                    other.kind(),
                    context.value
                );
                Ok(())
            }
        }
    }

    async fn route(&self, request: &Message) -> Result<Option<Payload>> {
        let sender = &request.src;
        match &request.body.payload {
            Payload::Broadcast { message } => {
                self.engine.on_broadcast(sender, *message).await?;
                Ok(Some(Payload::BroadcastOk))
            }
            Payload::Read => Ok(Some(Payload::ReadOk {
                messages: self.engine.on_read()?,
            })),
            Payload::Topology { topology } => {
                self.engine.on_topology(topology)?;
                Ok(Some(Payload::TopologyOk))
            }
            Payload::Batch { nums } => {
                self.engine.on_batch(sender, nums.clone()).await?;
                Ok(None)
            }
            Payload::Generate => Ok(Some(Payload::GenerateOk {
                id: self.ids.generate(),
            })),
            // identity is fixed at startup; a repeated init changes nothing
            Payload::Init { .. } => Ok(Some(Payload::InitOk)),
            // never answer an error with another error
            Payload::Error { code, text } => {
                debug!("[{}] Uncorrelated error from {}: [{}] {}", self.node_id(), sender, code, text);
                Ok(None)
            }
            other => Err(ProtocolError::NotSupported(format!(
                "'{}' is not a request",
                other.kind()
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::codes;
    use crate::transport::ChannelTransport;

    fn settings() -> BroadcastSettings {
        BroadcastSettings {
            retry_sweep: None,
            ..BroadcastSettings::default()
        }
    }

    fn new_node(node_id: &str) -> (Node, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(ChannelTransport::new(NodeName::from(node_id), vec![], tx));
        (Node::new(settings(), transport), rx)
    }

    fn request(msg_id: u64, payload: Payload) -> Message {
        Message::new(
            NodeName::from("c1"),
            NodeName::from("n1"),
            Body {
                msg_id: Some(msg_id),
                in_reply_to: None,
                payload,
            },
        )
    }

    #[tokio::test]
    async fn read_on_empty_node() {
        let (node, mut rx) = new_node("n1");
        node.handle_request(request(1, Payload::Read)).await.unwrap();
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.body.in_reply_to, Some(1));
        assert_eq!(reply.body.payload, Payload::ReadOk { messages: vec![] });
    }

    #[tokio::test]
    async fn generate_returns_node_scoped_ids() {
        let (node, mut rx) = new_node("n3");
        node.handle_request(request(1, Payload::Generate)).await.unwrap();
        node.handle_request(request(2, Payload::Generate)).await.unwrap();
        let first = rx.recv().await.unwrap().body.payload;
        let second = rx.recv().await.unwrap().body.payload;
        assert_eq!(first, Payload::GenerateOk { id: "n3_1".to_string() });
        assert_eq!(second, Payload::GenerateOk { id: "n3_2".to_string() });
    }

    #[tokio::test]
    async fn batch_is_not_replied_to() {
        let (node, mut rx) = new_node("n1");
        node.handle_request(request(1, Payload::Batch { nums: vec![3, 4] }))
            .await
            .unwrap();
        node.handle_request(request(2, Payload::Read)).await.unwrap();
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.body.payload, Payload::ReadOk { messages: vec![3, 4] });
    }

    #[tokio::test]
    async fn reply_types_are_not_requests() {
        let (node, mut rx) = new_node("n1");
        node.handle_request(request(8, Payload::TopologyOk)).await.unwrap();
        let reply = rx.recv().await.unwrap();
        match reply.body.payload {
            Payload::Error { code, .. } => assert_eq!(code, codes::NOT_SUPPORTED),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_reply_leaves_relay_pending() {
        let (node, _rx) = new_node("n2");
        let context = RelayContext {
            neighbor: NodeName::from("n1"),
            value: 5,
        };
        node.engine().tracker().track(&context.neighbor, 5, 0).unwrap();

        let reply = Message::new(
            NodeName::from("n1"),
            NodeName::from("n2"),
            Body {
                msg_id: Some(1),
                in_reply_to: Some(1),
                payload: Payload::Error {
                    code: codes::TEMPORARILY_UNAVAILABLE,
                    text: "not ready".to_string(),
                },
            },
        );
        node.handle_reply(context.clone(), reply.clone()).await.unwrap();
        assert!(node.engine().tracker().has_pending(&context.neighbor).unwrap());

        let ok = Message {
            body: Body {
                payload: Payload::BroadcastOk,
                ..reply.body
            },
            ..reply
        };
        node.handle_reply(context.clone(), ok).await.unwrap();
        assert!(!node.engine().tracker().has_pending(&context.neighbor).unwrap());
    }
}
