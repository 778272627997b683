// In-process stand-in for the platform's signaling and media servers
//
// Each server accepts one websocket, records what the client sends and
// replies according to a `Script`. Both servers keep their socket open
// until the client closes it.

#![allow(dead_code)]

use anyhow::{Context, Result};
use base64::Engine;
use futures::{SinkExt, StreamExt};
use rtms_recorder::audio::NativeEncoder;
use rtms_recorder::{Credentials, SessionManager, SessionSettings, SessionStatus};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub const CLIENT_ID: &str = "client-123";
pub const CLIENT_SECRET: &str = "test-secret";

/// Keep-alive timestamp the fake servers send
pub const PING_TIMESTAMP: i64 = 1_700_000_000_000;

#[derive(Debug, Clone)]
pub struct Script {
    /// Status returned for the signaling handshake
    pub signaling_status: i64,
    /// Never answer the signaling handshake
    pub signaling_silent: bool,
    pub media_status: i64,
    /// `(channel, pcm)` frames sent once the media handshake succeeds
    pub frames: Vec<(String, Vec<u8>)>,
    /// Close the media socket right after the last frame
    pub media_hangup: bool,
    /// After the first frame, send messages the client must shrug off
    pub inject_noise: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            signaling_status: 0,
            signaling_silent: false,
            media_status: 0,
            frames: Vec::new(),
            media_hangup: false,
            inject_noise: false,
        }
    }
}

/// Everything the client sent, per socket, in arrival order
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub signaling: Vec<Value>,
    pub media: Vec<Value>,
}

impl Recorded {
    pub fn of_type(messages: &[Value], msg_type: u64) -> Vec<Value> {
        messages
            .iter()
            .filter(|m| m["msg_type"].as_u64() == Some(msg_type))
            .cloned()
            .collect()
    }
}

pub struct FakeRtms {
    pub signaling_url: String,
    recorded: Arc<Mutex<Recorded>>,
    tasks: Vec<JoinHandle<()>>,
}

impl FakeRtms {
    pub async fn start(script: Script) -> Result<Self> {
        let signaling = TcpListener::bind("127.0.0.1:0").await?;
        let media = TcpListener::bind("127.0.0.1:0").await?;

        let signaling_url = format!("ws://{}", signaling.local_addr()?);
        let media_url = format!("ws://{}", media.local_addr()?);

        let recorded = Arc::new(Mutex::new(Recorded::default()));

        let tasks = vec![
            tokio::spawn(serve_signaling(
                signaling,
                media_url,
                script.clone(),
                Arc::clone(&recorded),
            )),
            tokio::spawn(serve_media(media, script, Arc::clone(&recorded))),
        ];

        Ok(Self {
            signaling_url,
            recorded,
            tasks,
        })
    }

    /// Snapshot of what has been received so far
    pub fn recorded(&self) -> Recorded {
        self.recorded.lock().unwrap().clone()
    }

    /// Wait for both servers to see the client close, then return the record
    pub async fn finish(self) -> Recorded {
        for task in self.tasks {
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }
        self.recorded.lock().unwrap().clone()
    }
}

async fn accept(listener: &TcpListener) -> Result<WebSocketStream<TcpStream>> {
    let (stream, _) = listener.accept().await?;
    tokio_tungstenite::accept_async(stream)
        .await
        .context("websocket accept failed")
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) -> Result<()> {
    ws.send(Message::Text(value.to_string())).await?;
    Ok(())
}

/// Garbage, an unknown type, an undecodable frame and a frame with no channel
async fn send_noise(ws: &mut WebSocketStream<TcpStream>) -> Result<()> {
    ws.send(Message::Text("not json".to_string())).await?;
    send_json(ws, json!({"msg_type": 99})).await?;
    send_json(
        ws,
        json!({"msg_type": 14, "content": {"channel_id": "agent", "data": "%%%"}}),
    )
    .await?;
    send_json(ws, json!({"msg_type": 14, "content": {"data": "AQA="}})).await?;
    Ok(())
}

/// Next text frame as JSON; `None` once the client closes
async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).ok(),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

async fn serve_signaling(
    listener: TcpListener,
    media_url: String,
    script: Script,
    recorded: Arc<Mutex<Recorded>>,
) {
    let Ok(mut ws) = accept(&listener).await else {
        return;
    };

    let Some(handshake) = next_json(&mut ws).await else {
        return;
    };
    recorded.lock().unwrap().signaling.push(handshake);

    if !script.signaling_silent {
        let response = json!({
            "msg_type": 2,
            "status_code": script.signaling_status,
            "media_server": {"server_urls": {"audio": media_url}}
        });
        if send_json(&mut ws, response).await.is_err() {
            return;
        }
        let _ = send_json(&mut ws, json!({"msg_type": 12, "timestamp": PING_TIMESTAMP})).await;
    }

    while let Some(message) = next_json(&mut ws).await {
        if message["msg_type"] == 5 {
            let _ = send_json(&mut ws, json!({"msg_type": 6, "status_code": 0})).await;
        }
        recorded.lock().unwrap().signaling.push(message);
    }
}

async fn serve_media(listener: TcpListener, script: Script, recorded: Arc<Mutex<Recorded>>) {
    let Ok(mut ws) = accept(&listener).await else {
        return;
    };

    let Some(handshake) = next_json(&mut ws).await else {
        return;
    };
    recorded.lock().unwrap().media.push(handshake);

    let response = json!({"msg_type": 4, "status_code": script.media_status});
    if send_json(&mut ws, response).await.is_err() {
        return;
    }

    if script.media_status == 0 {
        let _ = send_json(&mut ws, json!({"msg_type": 12, "timestamp": PING_TIMESTAMP})).await;

        for (i, (channel, pcm)) in script.frames.iter().enumerate() {
            let frame = json!({
                "msg_type": 14,
                "content": {
                    "channel_id": channel,
                    "data": base64::engine::general_purpose::STANDARD.encode(pcm),
                }
            });
            if send_json(&mut ws, frame).await.is_err() {
                return;
            }

            if script.inject_noise && i == 0 && send_noise(&mut ws).await.is_err() {
                return;
            }
        }

        if script.media_hangup {
            let _ = ws.close(None).await;
        }
    }

    while let Some(message) = next_json(&mut ws).await {
        recorded.lock().unwrap().media.push(message);
    }
}

pub fn settings(recordings_root: &Path, handshake_timeout: Duration) -> SessionSettings {
    SessionSettings {
        credentials: Credentials::new(CLIENT_ID, CLIENT_SECRET),
        recordings_root: recordings_root.to_path_buf(),
        handshake_timeout,
        protocol_version: 1,
        encoder: Arc::new(NativeEncoder),
    }
}

/// 16-bit little-endian PCM of `samples` copies of `value`
pub fn pcm(value: i16, samples: usize) -> Vec<u8> {
    std::iter::repeat(value.to_le_bytes())
        .take(samples)
        .flatten()
        .collect()
}

/// Poll a session's status until `done` holds
pub async fn wait_for_status(
    manager: &SessionManager,
    session_id: &str,
    done: impl Fn(&SessionStatus) -> bool,
) -> Result<SessionStatus> {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(status) = manager.status(session_id).await {
                if done(&status) {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .with_context(|| format!("timed out waiting on session {}", session_id))
}

/// Poll until the registry no longer holds `session_id`
pub async fn wait_for_removal(manager: &SessionManager, session_id: &str) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(10), async {
        while manager.registry().contains(session_id).await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .with_context(|| format!("session {} was never removed", session_id))
}
