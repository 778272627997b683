use anyhow::{Context, Result};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::messages::{InboundMessage, KeepAliveResponse, OutboundMessage};

/// How long an explicit close may take before the connection task is aborted
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    Signaling,
    Media,
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Link::Signaling => write!(f, "signaling"),
            Link::Media => write!(f, "media"),
        }
    }
}

/// What a connection task reports to its session
#[derive(Debug)]
pub enum LinkEvent {
    Connected(Link),
    Message(Link, InboundMessage),
    /// The connection ended without being asked to (refused, dropped, closed by peer)
    Closed { link: Link, reason: String },
}

enum Command {
    Send(OutboundMessage),
    Close,
}

/// Handle to one websocket connection running in its own task.
///
/// Keep-alive requests are answered inside the task on the same socket; every
/// other decoded message is forwarded to the session in arrival order.
pub struct Connection {
    link: Link,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl Connection {
    pub fn open(
        link: Link,
        url: String,
        session_id: String,
        events: mpsc::Sender<LinkEvent>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(link, url, session_id, command_rx, events));

        Self {
            link,
            commands,
            task,
        }
    }

    pub fn link(&self) -> Link {
        self.link
    }

    pub fn send(&self, message: OutboundMessage) -> Result<()> {
        self.commands
            .send(Command::Send(message))
            .ok()
            .with_context(|| format!("{} connection is no longer running", self.link))
    }

    /// Close the socket and wait for the task to exit
    pub async fn close(mut self) {
        // The task may already be gone; that is the state we want anyway.
        let _ = self.commands.send(Command::Close);

        match tokio::time::timeout(CLOSE_TIMEOUT, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{} connection task failed: {}", self.link, e),
            Err(_) => {
                warn!("{} connection did not close in time, aborting", self.link);
                self.task.abort();
            }
        }
    }
}

async fn run(
    link: Link,
    url: String,
    session_id: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<LinkEvent>,
) {
    info!("[{}] Connecting {} socket to {}", session_id, link, url);

    let ws = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                let _ = events
                    .send(LinkEvent::Closed { link, reason: format!("connect failed: {}", e) })
                    .await;
                return;
            }
        },
        // Only a close can be queued before the socket is up
        _ = commands.recv() => {
            debug!("[{}] {} connection closed before connecting", session_id, link);
            return;
        }
    };

    info!("[{}] {} socket connected", session_id, link);
    if events.send(LinkEvent::Connected(link)).await.is_err() {
        return;
    }

    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(Command::Send(message)) => {
                    if let Err(e) = send_message(&mut sink, &message).await {
                        break format!("send failed: {:#}", e);
                    }
                }
                Some(Command::Close) | None => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!("[{}] {} close frame not sent: {}", session_id, link, e);
                    }
                    info!("[{}] {} socket closed", session_id, link);
                    return;
                }
            },

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match InboundMessage::parse(&text) {
                    Ok(InboundMessage::KeepAliveRequest(ping)) => {
                        let pong = OutboundMessage::KeepAliveResponse(KeepAliveResponse {
                            timestamp: ping.timestamp,
                        });
                        if let Err(e) = send_message(&mut sink, &pong).await {
                            break format!("keep-alive response failed: {:#}", e);
                        }
                        debug!("[{}] {} keep-alive answered", session_id, link);
                    }
                    Ok(message) => {
                        if events.send(LinkEvent::Message(link, message)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("[{}] Ignoring bad {} message: {}", session_id, link, e),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => format!("closed by server ({}: {})", frame.code, frame.reason),
                        None => "closed by server".to_string(),
                    };
                }
                // Protocol pings are answered by tungstenite itself
                Some(Ok(other)) => debug!("[{}] Ignoring non-text {} frame: {:?}", session_id, link, other),
                Some(Err(e)) => break format!("read failed: {}", e),
                None => break "stream ended".to_string(),
            },
        }
    };

    warn!("[{}] {} connection lost: {}", session_id, link, reason);
    let _ = events.send(LinkEvent::Closed { link, reason }).await;
}

async fn send_message(sink: &mut WsSink, message: &OutboundMessage) -> Result<()> {
    let text = message.to_json().context("Failed to encode message")?;
    sink.send(Message::Text(text))
        .await
        .context("Failed to write to socket")?;
    Ok(())
}
