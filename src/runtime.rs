//! Process runtime
//!
//! Reads envelopes, performs the `init` handshake, then hands every
//! envelope to its own task. Replies to our relays are routed to the
//! acknowledgment path; everything else is a request.
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{ProtocolError, Result, TidingsError};
use crate::node::{parse_line, Body, Message, Node, NodeName, Payload, Rejected};
use crate::settings::Settings;
use crate::transport::stdio::{write_loop, LineReader};
use crate::transport::{ChannelTransport, Transport};

// How long queued replies get to reach stdout after input closes
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Run a node over stdin/stdout until stdin closes
pub async fn run_stdio(settings: Settings) -> Result<()> {
    settings.validate()?;
    let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_buffer);
    let writer = tokio::spawn(write_loop(outbound_rx, tokio::io::stdout()));

    let runtime = Runtime::new(settings);
    let reader = LineReader::new(BufReader::new(tokio::io::stdin()));
    let outcome = runtime.run(reader, outbound_tx).await;

    // background tasks keep senders alive, so the writer may never see
    // the channel close
    match tokio::time::timeout(SHUTDOWN_GRACE, writer).await {
        Ok(Ok(Err(e))) => warn!("Writer stopped with error: {}", e),
        Ok(Err(e)) => warn!("Writer task failed: {}", e),
        _ => {}
    }
    outcome
}

/// Route one envelope for an initialized node
pub async fn dispatch(node: &Node, transport: &ChannelTransport, message: Message) -> Result<()> {
    if let Some(in_reply_to) = message.body.in_reply_to {
        return match transport.resolve(in_reply_to)? {
            Some(context) => node.handle_reply(context, message).await,
            None => {
                debug!(
                    "[{}] Ignoring uncorrelated {} from {} (in_reply_to {})",
                    node.node_id(),
                    message.body.payload.kind(),
                    message.src,
                    in_reply_to
                );
                Ok(())
            }
        };
    }
    node.handle_request(message).await
}

struct Initialized {
    node: Arc<Node>,
    transport: Arc<ChannelTransport>,
}

pub struct Runtime {
    settings: Settings,
}

impl Runtime {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Consume `reader` to EOF, then wait for in-flight handlers
    pub async fn run<R: AsyncBufRead + Unpin>(
        &self,
        mut reader: LineReader<R>,
        outbound: mpsc::Sender<Message>,
    ) -> Result<()> {
        let mut state: Option<Initialized> = None;
        let mut handlers = JoinSet::new();

        loop {
            tokio::select! {
                line = reader.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    self.accept(&line, &mut state, &mut handlers, &outbound).await?;
                }
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        error!("Handler task failed: {}", e);
                    }
                }
            }
        }

        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = joined {
                error!("Handler task failed: {}", e);
            }
        }
        info!("Input closed, runtime stopping");
        Ok(())
    }

    async fn accept(
        &self,
        line: &str,
        state: &mut Option<Initialized>,
        handlers: &mut JoinSet<()>,
        outbound: &mpsc::Sender<Message>,
    ) -> Result<()> {
        debug!("Received {}", line);
        let message = match parse_line(line) {
            Ok(Ok(message)) => message,
            Ok(Err(rejected)) => return reject(rejected, outbound).await,
            Err(e) => {
                warn!("Ignoring line that is not an envelope: {}", e);
                return Ok(());
            }
        };

        if let Some(initialized) = state.as_ref() {
            let node = initialized.node.clone();
            let transport = initialized.transport.clone();
            handlers.spawn(async move {
                if let Err(e) = dispatch(&node, &transport, message).await {
                    if e.is_fatal() {
                        node.engine().abort(&e);
                    }
                    warn!("[{}] Handler error: {}", node.node_id(), e);
                }
            });
            return Ok(());
        }

        *state = self.initialize(message, outbound).await?;
        Ok(())
    }

    async fn initialize(
        &self,
        message: Message,
        outbound: &mpsc::Sender<Message>,
    ) -> Result<Option<Initialized>> {
        let Payload::Init { node_id, node_ids } = &message.body.payload else {
            warn!(
                "Received {} from {} before init",
                message.body.payload.kind(),
                message.src
            );
            if message.body.msg_id.is_some() && message.body.in_reply_to.is_none() {
                let err = TidingsError::from(ProtocolError::NotInitialized);
                let reply = Message::new(
                    message.dest.clone(),
                    message.src.clone(),
                    Body {
                        msg_id: None,
                        in_reply_to: message.body.msg_id,
                        payload: Payload::error(&err),
                    },
                );
                outbound.send(reply).await?;
            }
            return Ok(None);
        };

        info!(
            "[{}] Initialized in a cluster of {} nodes",
            node_id,
            node_ids.len()
        );
        let transport = Arc::new(ChannelTransport::new(
            node_id.clone(),
            node_ids.clone(),
            outbound.clone(),
        ));
        let node = Arc::new(Node::new(
            self.settings.broadcast_settings(),
            transport.clone(),
        ));
        node.start();
        transport.reply(&message, Payload::InitOk).await?;
        Ok(Some(Initialized { node, transport }))
    }
}

async fn reject(rejected: Rejected, outbound: &mpsc::Sender<Message>) -> Result<()> {
    let err = TidingsError::from(rejected.error);
    warn!("Rejecting envelope from {:?}: {}", rejected.src, err);
    let Some(src) = rejected.src else {
        return Ok(());
    };
    if rejected.msg_id.is_none() {
        return Ok(());
    }
    let reply = Message::new(
        rejected.dest.unwrap_or_else(|| NodeName::from("")),
        src,
        Body {
            msg_id: None,
            in_reply_to: rejected.msg_id,
            payload: Payload::error(&err),
        },
    );
    outbound.send(reply).await?;
    Ok(())
}
