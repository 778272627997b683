use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::{Connection, Link, LinkEvent};
use super::messages::{ClientReady, InboundMessage, OutboundMessage, SignalingHandshakeRequest};
use super::HandshakeParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Connecting,
    AwaitingHandshakeAck,
    /// Handshake accepted and the media address handed to the session
    Relayed,
    /// Ready acknowledgement and event subscription sent
    Subscribed,
    Closed,
}

/// What the session must do after a signaling message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingOutcome {
    Continue,
    /// Open the media connection at this address
    MediaRelay(String),
    /// Tear the session down
    Abort(String),
}

/// Control-plane client: one signaling socket per session
pub struct SignalingClient {
    session_id: String,
    stream_id: String,
    state: SignalingState,
    connection: Option<Connection>,
}

impl SignalingClient {
    pub fn connect(
        url: &str,
        session_id: &str,
        stream_id: &str,
        events: mpsc::Sender<LinkEvent>,
    ) -> Self {
        let connection = Connection::open(
            Link::Signaling,
            url.to_string(),
            session_id.to_string(),
            events,
        );

        Self {
            session_id: session_id.to_string(),
            stream_id: stream_id.to_string(),
            state: SignalingState::Connecting,
            connection: Some(connection),
        }
    }

    pub fn state(&self) -> SignalingState {
        self.state
    }

    /// Socket is up: send the handshake request
    pub fn on_connected(&mut self, params: &HandshakeParams) -> Result<()> {
        let request = OutboundMessage::SignalingHandshake(SignalingHandshakeRequest {
            protocol_version: params.protocol_version,
            identity: params.identity.clone(),
            sequence: chrono::Utc::now().timestamp_millis().unsigned_abs(),
            signature: params.signature.clone(),
        });

        self.send(request)?;
        self.state = SignalingState::AwaitingHandshakeAck;
        info!("[{}] Signaling handshake sent", self.session_id);
        Ok(())
    }

    pub fn on_message(&mut self, message: InboundMessage) -> SignalingOutcome {
        match message {
            InboundMessage::SignalingHandshakeResponse(response)
                if self.state == SignalingState::AwaitingHandshakeAck =>
            {
                if response.status_code != 0 {
                    self.state = SignalingState::Closed;
                    return SignalingOutcome::Abort(format!(
                        "signaling handshake rejected with status {}{}",
                        response.status_code,
                        response
                            .reason
                            .map(|r| format!(": {}", r))
                            .unwrap_or_default()
                    ));
                }

                match response.media_url() {
                    Some(url) => {
                        info!("[{}] Signaling handshake accepted, media at {}", self.session_id, url);
                        self.state = SignalingState::Relayed;
                        SignalingOutcome::MediaRelay(url.to_string())
                    }
                    None => {
                        self.state = SignalingState::Closed;
                        SignalingOutcome::Abort(
                            "signaling handshake carried no media server address".to_string(),
                        )
                    }
                }
            }
            InboundMessage::SignalingHandshakeResponse(_) => {
                warn!(
                    "[{}] Unexpected signaling handshake response in state {:?}",
                    self.session_id, self.state
                );
                SignalingOutcome::Continue
            }
            InboundMessage::EventSubscriptionResponse(response) => {
                info!(
                    "[{}] Event subscription acknowledged (status {:?})",
                    self.session_id, response.status_code
                );
                SignalingOutcome::Continue
            }
            other => {
                debug!("[{}] Ignoring signaling message: {:?}", self.session_id, other);
                SignalingOutcome::Continue
            }
        }
    }

    /// Media handshake succeeded: acknowledge readiness and subscribe to events
    pub fn on_media_ready(&mut self) -> Result<()> {
        self.send(OutboundMessage::ClientReady(ClientReady {
            rtms_stream_id: self.stream_id.clone(),
        }))?;
        self.send(OutboundMessage::subscribe(&self.stream_id))?;

        self.state = SignalingState::Subscribed;
        info!("[{}] Client ready sent, events subscribed", self.session_id);
        Ok(())
    }

    pub fn on_closed(&mut self) {
        self.state = SignalingState::Closed;
    }

    pub async fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        self.state = SignalingState::Closed;
    }

    fn send(&self, message: OutboundMessage) -> Result<()> {
        match &self.connection {
            Some(connection) => connection.send(message),
            None => anyhow::bail!("signaling connection already closed"),
        }
    }
}

#[cfg(test)]
impl SignalingClient {
    fn detached(state: SignalingState) -> Self {
        Self {
            session_id: "test".to_string(),
            stream_id: "S1".to_string(),
            state,
            connection: None,
        }
    }
}
