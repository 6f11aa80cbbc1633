use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tidings::error::{codes, Result};
use tidings::node::{Message, NodeName, Payload};
use tidings::runtime::Runtime;
use tidings::settings::Settings;
use tidings::transport::stdio::LineReader;

const WAIT: Duration = Duration::from_secs(2);

/// A runtime fed line by line, with its outbound envelopes captured
struct Harness {
    input: Option<DuplexStream>,
    outbound: mpsc::Receiver<Message>,
    task: JoinHandle<Result<()>>,
}

impl Harness {
    fn start() -> Self {
        let settings = Settings {
            retry_sweep_ms: 0,
            ..Settings::default()
        };
        let (input, runtime_side) = tokio::io::duplex(64 * 1024);
        let (tx, outbound) = mpsc::channel(256);
        let task = tokio::spawn(async move {
            Runtime::new(settings)
                .run(LineReader::new(BufReader::new(runtime_side)), tx)
                .await
        });
        Self {
            input: Some(input),
            outbound,
            task,
        }
    }

    async fn send(&mut self, envelope: serde_json::Value) {
        let mut line = envelope.to_string();
        line.push('\n');
        self.send_raw(&line).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.send_bytes(line.as_bytes()).await;
    }

    async fn send_bytes(&mut self, bytes: &[u8]) {
        let input = self.input.as_mut().expect("input still open");
        input.write_all(bytes).await.unwrap();
        input.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Message {
        tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("runtime answered in time")
            .expect("outbound channel open")
    }

    async fn init(&mut self, node_id: &str, node_ids: &[&str]) {
        self.send(json!({
            "src": "c0",
            "dest": node_id,
            "body": {"type": "init", "msg_id": 1, "node_id": node_id, "node_ids": node_ids}
        }))
        .await;
        let reply = self.recv().await;
        assert_eq!(reply.body.payload, Payload::InitOk);
    }

    async fn close(mut self) -> Result<()> {
        drop(self.input.take());
        tokio::time::timeout(WAIT, self.task)
            .await
            .expect("runtime stopped at EOF")
            .unwrap()
    }
}

fn error_code(message: &Message) -> u32 {
    match &message.body.payload {
        Payload::Error { code, .. } => *code,
        other => panic!("expected an error body, got {:?}", other),
    }
}

#[tokio::test]
async fn init_handshake_is_answered() {
    let mut harness = Harness::start();
    harness
        .send(json!({
            "src": "c0",
            "dest": "n1",
            "body": {"type": "init", "msg_id": 1, "node_id": "n1", "node_ids": ["n1", "n2"]}
        }))
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.src, NodeName::from("n1"));
    assert_eq!(reply.dest, NodeName::from("c0"));
    assert_eq!(reply.body.in_reply_to, Some(1));
    assert_eq!(reply.body.payload, Payload::InitOk);
    harness.close().await.unwrap();
}

#[tokio::test]
async fn requests_before_init_are_refused() {
    let mut harness = Harness::start();
    harness
        .send(json!({"src": "c1", "dest": "n1", "body": {"type": "read", "msg_id": 4}}))
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.dest, NodeName::from("c1"));
    assert_eq!(reply.body.in_reply_to, Some(4));
    assert_eq!(error_code(&reply), codes::TEMPORARILY_UNAVAILABLE);

    // still waiting for init
    harness.init("n1", &["n1"]).await;
    harness.close().await.unwrap();
}

#[tokio::test]
async fn read_on_a_fresh_node_is_empty() {
    let mut harness = Harness::start();
    harness.init("n1", &["n1", "n2"]).await;
    harness
        .send(json!({"src": "c1", "dest": "n1", "body": {"type": "read", "msg_id": 2}}))
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.body.in_reply_to, Some(2));
    assert_eq!(reply.body.payload, Payload::ReadOk { messages: vec![] });
    harness.close().await.unwrap();
}

#[tokio::test]
async fn bad_envelopes_get_error_replies() {
    let mut harness = Harness::start();
    harness.init("n1", &["n1"]).await;

    harness
        .send(json!({"src": "c1", "dest": "n1", "body": {"type": "broadcast", "msg_id": 2}}))
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.body.in_reply_to, Some(2));
    assert_eq!(error_code(&reply), codes::MALFORMED_REQUEST);

    harness
        .send(json!({"src": "c1", "dest": "n1", "body": {"type": "frobnicate", "msg_id": 3}}))
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.body.in_reply_to, Some(3));
    assert_eq!(error_code(&reply), codes::NOT_SUPPORTED);

    // garbage lines are skipped and the node keeps serving
    harness.send_raw("this is not json\n").await;
    harness
        .send(json!({"src": "c1", "dest": "n1", "body": {"type": "read", "msg_id": 4}}))
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.body.in_reply_to, Some(4));
    assert_eq!(reply.body.payload, Payload::ReadOk { messages: vec![] });

    harness.close().await.unwrap();
}

#[tokio::test]
async fn lines_that_are_not_utf8_are_skipped() {
    let mut harness = Harness::start();
    harness.init("n1", &["n1"]).await;

    harness.send_bytes(b"\xff\xfe garbage\n").await;
    harness
        .send(json!({"src": "c1", "dest": "n1", "body": {"type": "read", "msg_id": 2}}))
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.body.in_reply_to, Some(2));
    assert_eq!(reply.body.payload, Payload::ReadOk { messages: vec![] });
    assert!(!harness.task.is_finished());

    harness.close().await.unwrap();
}

#[tokio::test]
async fn broadcast_is_relayed_acked_and_read_back() {
    let mut harness = Harness::start();
    harness.init("n2", &["n1", "n2"]).await;

    harness
        .send(json!({
            "src": "c0",
            "dest": "n2",
            "body": {"type": "topology", "msg_id": 2, "topology": {"n1": ["n2"], "n2": ["n1"]}}
        }))
        .await;
    assert_eq!(harness.recv().await.body.payload, Payload::TopologyOk);

    harness
        .send(json!({"src": "c1", "dest": "n2", "body": {"type": "broadcast", "msg_id": 3, "message": 10}}))
        .await;
    let relay = harness.recv().await;
    assert_eq!(relay.dest, NodeName::from("n1"));
    assert_eq!(relay.body.payload, Payload::Broadcast { message: 10 });
    let relay_id = relay.body.msg_id.expect("relay is an rpc");

    let reply = harness.recv().await;
    assert_eq!(reply.dest, NodeName::from("c1"));
    assert_eq!(reply.body.in_reply_to, Some(3));
    assert_eq!(reply.body.payload, Payload::BroadcastOk);

    // the neighbor acknowledges; no answer goes back for a reply
    harness
        .send(json!({"src": "n1", "dest": "n2", "body": {"type": "broadcast_ok", "msg_id": 1, "in_reply_to": relay_id}}))
        .await;

    // a repeat from another client is absorbed without a relay
    harness
        .send(json!({"src": "c2", "dest": "n2", "body": {"type": "broadcast", "msg_id": 4, "message": 10}}))
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.dest, NodeName::from("c2"));
    assert_eq!(reply.body.payload, Payload::BroadcastOk);

    harness
        .send(json!({"src": "c1", "dest": "n2", "body": {"type": "read", "msg_id": 5}}))
        .await;
    let reply = harness.recv().await;
    assert_eq!(reply.body.payload, Payload::ReadOk { messages: vec![10] });

    harness.close().await.unwrap();
}

#[tokio::test]
async fn generate_ids_are_unique_per_node() {
    let mut harness = Harness::start();
    harness.init("n4", &["n4"]).await;
    let mut ids = Vec::new();
    for msg_id in 2..5 {
        harness
            .send(json!({"src": "c1", "dest": "n4", "body": {"type": "generate", "msg_id": msg_id}}))
            .await;
        match harness.recv().await.body.payload {
            Payload::GenerateOk { id } => ids.push(id),
            other => panic!("expected generate_ok, got {:?}", other),
        }
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id.starts_with("n4_")));
    harness.close().await.unwrap();
}

#[tokio::test]
async fn eof_before_init_stops_cleanly() {
    let harness = Harness::start();
    harness.close().await.unwrap();
}
