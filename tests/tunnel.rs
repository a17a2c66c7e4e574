// CacheLink Agent - Tunnel Integration Tests
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Drives the agent against an in-process hub on 127.0.0.1.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cachelink_agent::{
    config::AgentConfig,
    dispatch::Dispatcher,
    fs::CacheFs,
    paths::CacheRoot,
    tunnel::{ConnectionState, Tunnel},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type HubSocket = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

fn cache_dir() -> TempDir {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"test").unwrap();
    std::fs::create_dir(dir.path().join("b")).unwrap();
    dir
}

fn tunnel_for(dir: &TempDir, hub_url: String, reconnect_delay_secs: u64) -> Tunnel {
    let config = AgentConfig {
        hub_url,
        reconnect_delay_secs,
        ..AgentConfig::default()
    };
    let fs = CacheFs::new(CacheRoot::open(dir.path()).unwrap());
    Tunnel::new(config, Dispatcher::new(fs))
}

async fn accept(listener: &TcpListener) -> HubSocket {
    let (tcp, _) = timeout(WAIT, listener.accept()).await.expect("agent never connected").unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

/// Next text frame as JSON, skipping control frames
async fn next_json(ws: &mut HubSocket) -> Value {
    next_json_within(ws, WAIT).await
}

async fn next_json_within(ws: &mut HubSocket, wait: Duration) -> Value {
    loop {
        let frame = timeout(wait, ws.next()).await.expect("no frame from agent").unwrap().unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut HubSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

#[tokio::test]
async fn registers_serves_requests_and_reconnects_once() {
    let dir = cache_dir();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let tunnel = tunnel_for(&dir, url, 1);
    let mut token = tunnel.subscribe_token();
    let mut state = tunnel.subscribe_state();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agent = tokio::spawn(tunnel.run(shutdown_rx));

    // Registration
    let mut ws = accept(&listener).await;
    let register = next_json(&mut ws).await;
    assert_eq!(register["type"], json!("register"));
    assert_eq!(register["cacheFiles"], json!(["a.txt", "b"]));
    let first_agent_id = register["agentId"].as_str().unwrap().to_string();

    send_json(&mut ws, json!({"type": "registered", "sessionToken": "QX7R"})).await;
    timeout(WAIT, token.wait_for(|t| t.as_deref() == Some("QX7R"))).await.unwrap().unwrap();
    assert_eq!(*state.borrow(), ConnectionState::Registered);

    // Noise the agent must not answer
    send_json(&mut ws, json!({"type": "error", "message": "unrelated"})).await;
    send_json(&mut ws, json!({"type": "heartbeat"})).await;
    ws.send(Message::Text("{broken".into())).await.unwrap();

    // Two requests in flight at once, answered by id in any order
    let payload = STANDARD.encode([0u8, 255, 7]);
    send_json(&mut ws, json!({
        "type": "request", "requestId": "w1", "action": "writeFile",
        "params": {"filePath": "b/new.bin", "data": payload, "encoding": "base64"}
    })).await;
    send_json(&mut ws, json!({
        "type": "request", "requestId": "i1", "action": "getCacheInfo", "params": {}
    })).await;
    send_json(&mut ws, json!({
        "type": "request", "requestId": "x1", "action": "formatDisk", "params": {}
    })).await;

    let mut responses = HashMap::new();
    for _ in 0..3 {
        let resp = next_json(&mut ws).await;
        assert_eq!(resp["type"], json!("response"));
        responses.insert(resp["requestId"].as_str().unwrap().to_string(), resp);
    }

    assert_eq!(responses["w1"]["success"], json!(true));
    assert_eq!(responses["w1"]["data"]["written"], json!(3));
    assert_eq!(responses["i1"]["data"]["fileCount"], json!(2));
    assert_eq!(responses["i1"]["data"]["totalSize"], json!(4));
    assert_eq!(responses["x1"]["success"], json!(false));
    assert!(responses["x1"].get("data").is_none());
    assert_eq!(std::fs::read(dir.path().join("b/new.bin")).unwrap(), vec![0u8, 255, 7]);

    // Hub drops the connection: token cleared, one reconnect after the delay
    let dropped_at = Instant::now();
    ws.close(None).await.unwrap();
    while let Ok(Some(_)) = timeout(WAIT, ws.next()).await {}
    timeout(WAIT, token.wait_for(|t| t.is_none())).await.unwrap().unwrap();
    assert_ne!(*state.borrow(), ConnectionState::Registered);

    let mut ws2 = accept(&listener).await;
    assert!(dropped_at.elapsed() >= Duration::from_millis(900));
    let register2 = next_json(&mut ws2).await;
    assert_eq!(register2["type"], json!("register"));
    assert_ne!(register2["agentId"].as_str().unwrap(), first_agent_id);
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connected)).await.unwrap().unwrap();

    // No duplicate attempt while the second connection is healthy
    assert!(timeout(Duration::from_millis(1500), listener.accept()).await.is_err());

    // Shutdown closes the socket and stops the loop
    shutdown_tx.send(true).unwrap();
    timeout(WAIT, agent).await.expect("agent did not stop").unwrap();
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    let mut closed = false;
    while let Ok(Some(frame)) = timeout(WAIT, ws2.next()).await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => {
                closed = true;
                break;
            }
            Ok(_) => {}
        }
    }
    assert!(closed);
}

#[tokio::test]
async fn retries_until_hub_is_reachable() {
    let dir = cache_dir();

    // Reserve a port, then free it so the first attempt is refused
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let tunnel = tunnel_for(&dir, format!("ws://{}", addr), 1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agent = tokio::spawn(tunnel.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let listener = TcpListener::bind(addr).await.unwrap();
    let mut ws = accept(&listener).await;
    assert_eq!(next_json(&mut ws).await["type"], json!("register"));

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, agent).await.expect("agent did not stop").unwrap();
}

#[tokio::test]
async fn shutdown_while_waiting_to_reconnect() {
    let dir = cache_dir();
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    // Long delay: the agent will sit in the reconnect wait
    let tunnel = tunnel_for(&dir, format!("ws://{}", addr), 60);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agent = tokio::spawn(tunnel.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(true).unwrap();
    timeout(WAIT, agent).await.expect("agent did not stop").unwrap();
}

#[tokio::test]
async fn large_write_survives_a_single_frame() {
    let dir = cache_dir();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let tunnel = tunnel_for(&dir, url, 60);
    let mut token = tunnel.subscribe_token();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agent = tokio::spawn(tunnel.run(shutdown_rx));

    let mut ws = accept(&listener).await;
    assert_eq!(next_json(&mut ws).await["type"], json!("register"));
    send_json(&mut ws, json!({"type": "registered", "sessionToken": "BIG1"})).await;

    // 14 MiB raw is ~19.6 MB of base64, past the usual 16 MiB frame cap
    let bytes: Vec<u8> = (0..14 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    send_json(&mut ws, json!({
        "type": "request", "requestId": "big", "action": "writeFile",
        "params": {"filePath": "asset.dat", "data": STANDARD.encode(&bytes)}
    })).await;

    let resp = next_json_within(&mut ws, Duration::from_secs(60)).await;
    assert_eq!(resp["requestId"], json!("big"));
    assert_eq!(resp["success"], json!(true));
    assert_eq!(resp["data"]["written"], json!(bytes.len()));
    assert_eq!(std::fs::read(dir.path().join("asset.dat")).unwrap(), bytes);

    // Session survived the frame
    assert_eq!(token.borrow_and_update().as_deref(), Some("BIG1"));

    shutdown_tx.send(true).unwrap();
    timeout(WAIT, agent).await.expect("agent did not stop").unwrap();
}
