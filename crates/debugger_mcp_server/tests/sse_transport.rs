use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use debug_bridge_core::testing::StubAdapter;
use debug_bridge_core::{BridgeConfig, DebugBridge};
use debugger_mcp_server::{ProtocolRouter, ServerConfig, SseServer, PROTOCOL_VERSION};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>;

/// Minimal SSE reader over a streaming response body.
struct SseClient {
    body: ByteStream,
    buffer: String,
}

#[derive(Debug)]
struct SseEvent {
    event: Option<String>,
    data: String,
}

impl SseClient {
    async fn connect(client: &reqwest::Client, base: &str) -> Self {
        let response = client.get(format!("{base}/sse")).send().await.unwrap();
        assert!(response.status().is_success());
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/event-stream"));
        Self {
            body: Box::pin(response.bytes_stream()),
            buffer: String::new(),
        }
    }

    async fn next_event(&mut self) -> SseEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(end) = self.buffer.find("\n\n") {
                    let block: String = self.buffer.drain(..end + 2).collect();
                    if let Some(event) = parse_event(&block) {
                        return event;
                    }
                    continue;
                }
                let chunk = self.body.next().await.expect("stream ended").unwrap();
                self.buffer.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .expect("timed out waiting for SSE event")
    }
}

/// Returns `None` for comment-only blocks such as keep-alives.
fn parse_event(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data = Vec::new();
    for line in block.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = Some(name.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
    }
    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}

async fn start_server(adapter: StubAdapter) -> (SseServer, String) {
    let bridge = DebugBridge::new(
        Arc::new(adapter),
        BridgeConfig::new(vec![PathBuf::from("/work")], None),
    );
    let mut config = ServerConfig::new("127.0.0.1", 0);
    config.shutdown_grace = Duration::from_secs(2);
    let server = SseServer::new(Arc::new(ProtocolRouter::new(bridge)), config);
    let status = server.start(0).await.unwrap();
    let base = format!("http://{}", status.address.unwrap());
    (server, base)
}

async fn post(client: &reqwest::Client, base: &str, body: impl Into<reqwest::Body>) -> String {
    let response = client
        .post(format!("{base}/sse"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    response.text().await.unwrap()
}

#[tokio::test]
async fn test_reply_is_broadcast_verbatim_to_every_listener() {
    let (server, base) = start_server(StubAdapter::new()).await;
    let client = reqwest::Client::new();

    let mut listeners = Vec::new();
    for _ in 0..3 {
        let mut listener = SseClient::connect(&client, &base).await;
        let connected = listener.next_event().await;
        assert_eq!(connected.event.as_deref(), Some("connected"));
        listeners.push(listener);
    }

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["clients"], 3);
    assert_eq!(health["listenerCount"], 3);
    let timestamp = health["timestamp"].as_str().unwrap();
    assert!(timestamp.ends_with('Z'));
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());

    let request = json!({"protocolVersion": PROTOCOL_VERSION, "id": 1, "method": "tools/list"});
    let reply = post(&client, &base, request.to_string()).await;
    let parsed: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(parsed["id"], 1);
    assert_eq!(parsed["result"]["tools"].as_array().unwrap().len(), 8);

    for listener in &mut listeners {
        let event = listener.next_event().await;
        assert_eq!(event.event, None);
        assert_eq!(event.data, reply);
    }

    server.stop().await;
}

#[tokio::test]
async fn test_not_json_body_gets_parse_error() {
    let (server, base) = start_server(StubAdapter::new()).await;
    let client = reqwest::Client::new();

    let reply: Value = serde_json::from_str(&post(&client, &base, "not json").await).unwrap();
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["code"], -32700);
    assert_eq!(reply["error"]["message"], "Parse error");

    server.stop().await;
}

#[tokio::test]
async fn test_bogus_step_type_over_http() {
    let (server, base) = start_server(StubAdapter::new().with_session("Launch app")).await;
    let client = reqwest::Client::new();

    let request = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "id": 1,
        "method": "tools/call",
        "params": {"name": "step_debugger", "arguments": {"type": "bogus"}}
    });
    let reply: Value = serde_json::from_str(&post(&client, &base, request.to_string()).await).unwrap();
    assert_eq!(reply["id"], 1);
    assert_eq!(
        reply["error"],
        json!({"code": -32603, "message": "Unknown step type: bogus"})
    );

    server.stop().await;
}

#[tokio::test]
async fn test_json_string_body_is_unwrapped() {
    let (server, base) = start_server(StubAdapter::new()).await;
    let client = reqwest::Client::new();

    let inner = json!({"protocolVersion": PROTOCOL_VERSION, "id": "abc", "method": "initialize"});
    let body = Value::String(inner.to_string()).to_string();
    let reply: Value = serde_json::from_str(&post(&client, &base, body).await).unwrap();
    assert_eq!(reply["id"], "abc");
    assert_eq!(reply["result"]["protocolVersion"], PROTOCOL_VERSION);

    server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_listener_streams() {
    let (server, base) = start_server(StubAdapter::new()).await;
    let client = reqwest::Client::new();

    let mut listener = SseClient::connect(&client, &base).await;
    listener.next_event().await;
    assert_eq!(server.listeners().len(), 1);

    server.stop().await;
    assert!(server.listeners().is_empty());

    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match listener.body.next().await {
                None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}

#[tokio::test]
async fn test_health_and_connect_are_served_during_slow_tool_call() {
    let adapter = StubAdapter::new().with_breakpoints_delay(Duration::from_secs(2));
    let (server, base) = start_server(adapter).await;
    let client = reqwest::Client::new();

    let request = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "id": 1,
        "method": "tools/call",
        "params": {"name": "get_debug_status", "arguments": {}}
    });
    let slow = tokio::spawn({
        let client = client.clone();
        let base = base.clone();
        async move { post(&client, &base, request.to_string()).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let health = tokio::time::timeout(
        Duration::from_millis(500),
        client.get(format!("{base}/health")).send(),
    )
    .await
    .expect("health blocked by the running tool call")
    .unwrap();
    assert!(health.status().is_success());

    let mut listener = tokio::time::timeout(
        Duration::from_millis(500),
        SseClient::connect(&client, &base),
    )
    .await
    .expect("SSE connect blocked by the running tool call");
    assert_eq!(listener.next_event().await.event.as_deref(), Some("connected"));
    assert!(!slow.is_finished());

    let reply: Value = serde_json::from_str(&slow.await.unwrap()).unwrap();
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["content"][0]["type"], "text");

    server.stop().await;
}
