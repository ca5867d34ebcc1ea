// ABOUTME: Tests for the chat client connection lifecycle against a local WebSocket server
// ABOUTME: Covers address discovery on connect, replies, reconnect delay, and connect failures

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use simplex_relay::config::ChatConfig;
use simplex_relay::{
    ChatConnection, CommandSink, ConnectionState, Forward, Relay, RelayError, WebhookForwarder,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct RecordingForwarder {
    forwarded: Mutex<Vec<(String, String)>>,
}

impl Forward for RecordingForwarder {
    fn forward(&self, sender: String, message: String) {
        self.forwarded.lock().unwrap().push((sender, message));
    }
}

async fn chat_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("relay did not connect in time")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("no frame from relay in time");
        match frame {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

fn new_message(sender: &str, text: &str) -> Message {
    Message::Text(
        json!({
            "event": "x.msg.new",
            "sender": sender,
            "params": { "content": { "type": "text", "text": text } }
        })
        .to_string()
        .into(),
    )
}

#[tokio::test]
async fn test_address_discovery_sent_on_connect() {
    let (listener, url) = chat_server().await;
    let connection = ChatConnection::new(ChatConfig {
        ws_url: url,
        reconnect_delay_ms: 5000,
    });
    let handle = connection.handle();
    let relay = Relay::new(Arc::new(WebhookForwarder::disabled()));
    tokio::spawn(connection.run(relay));

    let mut ws = accept(&listener).await;
    let first = next_json(&mut ws).await;

    assert_eq!(first["cmd"], "/address");
    let corr_id = first["corrId"].as_str().unwrap();
    assert!(corr_id.starts_with("bot-"));
    assert!(corr_id.ends_with("-0"));
    assert_eq!(handle.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_ping_round_trip() {
    let (listener, url) = chat_server().await;
    let connection = ChatConnection::new(ChatConfig {
        ws_url: url,
        reconnect_delay_ms: 5000,
    });
    let relay = Relay::new(Arc::new(WebhookForwarder::disabled()));
    tokio::spawn(connection.run(relay));

    let mut ws = accept(&listener).await;
    let discovery = next_json(&mut ws).await;
    assert_eq!(discovery["cmd"], "/address");

    ws.send(Message::Text("garbage {".into())).await.unwrap();
    ws.send(new_message("alice", "/ping")).await.unwrap();

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["cmd"], "@alice Pong!");
    assert_ne!(reply["corrId"], discovery["corrId"]);
}

#[tokio::test]
async fn test_user_text_reaches_forwarder() {
    let (listener, url) = chat_server().await;
    let forwarder = Arc::new(RecordingForwarder::default());
    let connection = ChatConnection::new(ChatConfig {
        ws_url: url,
        reconnect_delay_ms: 5000,
    });
    tokio::spawn(connection.run(Relay::new(forwarder.clone())));

    let mut ws = accept(&listener).await;
    next_json(&mut ws).await;
    ws.send(new_message("bob", "order pizza")).await.unwrap();

    let deadline = Instant::now() + WAIT;
    loop {
        if !forwarder.forwarded.lock().unwrap().is_empty() {
            break;
        }
        assert!(Instant::now() < deadline, "message was never forwarded");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(
        forwarder.forwarded.lock().unwrap().clone(),
        vec![("bob".to_string(), "order pizza".to_string())]
    );
}

#[tokio::test]
async fn test_reconnects_after_close_with_configured_delay() {
    let (listener, url) = chat_server().await;
    let connection = ChatConnection::new(ChatConfig {
        ws_url: url,
        reconnect_delay_ms: 300,
    });
    let handle = connection.handle();
    tokio::spawn(connection.run(Relay::new(Arc::new(WebhookForwarder::disabled()))));

    let mut ws = accept(&listener).await;
    let first = next_json(&mut ws).await;
    assert!(first["corrId"].as_str().unwrap().ends_with("-0"));

    ws.close(None).await.unwrap();
    let closed_at = Instant::now();
    drop(ws);

    let mut ws = accept(&listener).await;
    let elapsed = closed_at.elapsed();
    assert!(
        elapsed >= Duration::from_millis(300),
        "reconnected after {:?}, before the delay",
        elapsed
    );

    // The counter survives the reconnect
    let second = next_json(&mut ws).await;
    assert_eq!(second["cmd"], "/address");
    assert!(second["corrId"].as_str().unwrap().ends_with("-1"));
    assert_eq!(handle.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_keeps_retrying_after_repeated_closes() {
    let (listener, url) = chat_server().await;
    let connection = ChatConnection::new(ChatConfig {
        ws_url: url,
        reconnect_delay_ms: 50,
    });
    tokio::spawn(connection.run(Relay::new(Arc::new(WebhookForwarder::disabled()))));

    for _ in 0..3 {
        let mut ws = accept(&listener).await;
        assert_eq!(next_json(&mut ws).await["cmd"], "/address");
        ws.close(None).await.unwrap();
    }
}

#[tokio::test]
async fn test_connect_failure_is_a_transport_error() {
    // Reserve a port, then free it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let connection = ChatConnection::new(ChatConfig {
        ws_url: url,
        reconnect_delay_ms: 5000,
    });
    let relay = Relay::new(Arc::new(WebhookForwarder::disabled()));

    let result = connection.run_session(&relay).await;

    assert!(matches!(result, Err(RelayError::Transport(_))));
    assert_eq!(connection.handle().state(), ConnectionState::Disconnected);
    assert!(connection
        .handle()
        .send_command(simplex_relay::correlator::CommandPayload::new("/ping"))
        .is_none());
}
