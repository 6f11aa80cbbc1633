//! Envelope Protocol
//!
//! Every message between nodes and clients is one JSON object
//! `{"src", "dest", "body"}`. The body carries the correlation ids and a
//! payload tagged by its `type` field.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result, TidingsError};
use crate::node::NodeName;

/// The integer unit being disseminated
pub type Value = i64;

/// Cluster-wide adjacency hint carried by `topology` requests
pub type TopologyHint = HashMap<NodeName, Vec<NodeName>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub src: NodeName,
    pub dest: NodeName,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Init {
        node_id: NodeName,
        node_ids: Vec<NodeName>,
    },
    InitOk,
    Generate,
    GenerateOk {
        id: String,
    },
    Broadcast {
        message: Value,
    },
    BroadcastOk,
    Read,
    ReadOk {
        messages: Vec<Value>,
    },
    Topology {
        topology: TopologyHint,
    },
    TopologyOk,
    /// Hub flush; fire-and-forget, never replied to
    Batch {
        nums: Vec<Value>,
    },
    Error {
        code: u32,
        text: String,
    },
}

impl Payload {
    pub fn error(err: &TidingsError) -> Self {
        Payload::Error {
            code: err.code(),
            text: err.to_string(),
        }
    }

    /// The `type` tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Init { .. } => "init",
            Payload::InitOk => "init_ok",
            Payload::Generate => "generate",
            Payload::GenerateOk { .. } => "generate_ok",
            Payload::Broadcast { .. } => "broadcast",
            Payload::BroadcastOk => "broadcast_ok",
            Payload::Read => "read",
            Payload::ReadOk { .. } => "read_ok",
            Payload::Topology { .. } => "topology",
            Payload::TopologyOk => "topology_ok",
            Payload::Batch { .. } => "batch",
            Payload::Error { .. } => "error",
        }
    }
}

impl Message {
    pub fn new(src: NodeName, dest: NodeName, body: Body) -> Self {
        Self { src, dest, body }
    }

    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A line that is JSON but not a valid envelope. Keeps what is needed to
/// send an error reply back to whoever sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub src: Option<NodeName>,
    pub dest: Option<NodeName>,
    pub msg_id: Option<u64>,
    pub error: ProtocolError,
}

#[derive(Deserialize)]
struct Header {
    src: Option<NodeName>,
    dest: Option<NodeName>,
    body: Option<HeaderBody>,
}

#[derive(Deserialize)]
struct HeaderBody {
    msg_id: Option<u64>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

const KNOWN_TYPES: &[&str] = &[
    "init",
    "init_ok",
    "generate",
    "generate_ok",
    "broadcast",
    "broadcast_ok",
    "read",
    "read_ok",
    "topology",
    "topology_ok",
    "batch",
    "error",
];

/// Parse one inbound line.
///
/// `Err` means the line is not even JSON with an envelope header and
/// nobody can be told about it.
pub fn parse_line(line: &str) -> Result<std::result::Result<Message, Rejected>> {
    match serde_json::from_str::<Message>(line) {
        Ok(message) => Ok(Ok(message)),
        Err(parse_err) => {
            let header: Header = serde_json::from_str(line)?;
            let (msg_id, kind) = header
                .body
                .map(|b| (b.msg_id, b.kind))
                .unwrap_or((None, None));
            let error = match kind {
                Some(kind) if !KNOWN_TYPES.contains(&kind.as_str()) => {
                    ProtocolError::NotSupported(format!("message type '{}'", kind))
                }
                _ => ProtocolError::Malformed(parse_err.to_string()),
            };
            Ok(Err(Rejected {
                src: header.src,
                dest: header.dest,
                msg_id,
                error,
            }))
        }
    }
}
