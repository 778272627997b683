use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::{Connection, Link, LinkEvent};
use super::messages::{
    AudioParams, InboundMessage, MediaHandshakeRequest, MediaParams, OutboundMessage,
    MEDIA_TYPE_AUDIO,
};
use super::HandshakeParams;
use crate::audio::ChannelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    Connecting,
    AwaitingHandshakeAck,
    ReceivingAudio,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    Continue,
    /// Handshake accepted; the signaling side should send its follow-ups
    Ready,
    /// One decoded audio frame
    Audio { channel: ChannelId, payload: Vec<u8> },
    /// An audio frame arrived but has no channel or an undecodable payload
    Dropped,
    Abort(String),
}

/// Data-plane client: one media socket per session
pub struct MediaClient {
    session_id: String,
    state: MediaState,
    connection: Option<Connection>,
}

impl MediaClient {
    pub fn connect(url: &str, session_id: &str, events: mpsc::Sender<LinkEvent>) -> Self {
        let connection =
            Connection::open(Link::Media, url.to_string(), session_id.to_string(), events);

        Self {
            session_id: session_id.to_string(),
            state: MediaState::Connecting,
            connection: Some(connection),
        }
    }

    pub fn state(&self) -> MediaState {
        self.state
    }

    pub fn on_connected(&mut self, params: &HandshakeParams) -> Result<()> {
        let request = OutboundMessage::MediaHandshake(MediaHandshakeRequest {
            protocol_version: params.protocol_version,
            identity: params.identity.clone(),
            signature: params.signature.clone(),
            media_type: MEDIA_TYPE_AUDIO,
            payload_encryption: false,
            media_params: MediaParams {
                audio: AudioParams::default(),
            },
        });

        match &self.connection {
            Some(connection) => connection.send(request)?,
            None => anyhow::bail!("media connection already closed"),
        }

        self.state = MediaState::AwaitingHandshakeAck;
        info!("[{}] Media handshake sent", self.session_id);
        Ok(())
    }

    pub fn on_message(&mut self, message: InboundMessage) -> MediaOutcome {
        match (self.state, message) {
            (MediaState::AwaitingHandshakeAck, InboundMessage::MediaHandshakeResponse(response)) => {
                if response.status_code == 0 {
                    self.state = MediaState::ReceivingAudio;
                    info!("[{}] Media handshake accepted, receiving audio", self.session_id);
                    MediaOutcome::Ready
                } else {
                    self.state = MediaState::Closed;
                    MediaOutcome::Abort(format!(
                        "media handshake rejected with status {}{}",
                        response.status_code,
                        response
                            .reason
                            .map(|r| format!(": {}", r))
                            .unwrap_or_default()
                    ))
                }
            }
            (MediaState::ReceivingAudio, InboundMessage::AudioData(frame)) => {
                let Some(channel) = frame.channel.clone() else {
                    warn!("[{}] Dropping audio frame with no channel", self.session_id);
                    return MediaOutcome::Dropped;
                };

                match frame.decode_payload() {
                    Ok(payload) => MediaOutcome::Audio { channel, payload },
                    Err(e) => {
                        warn!(
                            "[{}] Dropping audio frame for channel {}: {}",
                            self.session_id, channel, e
                        );
                        MediaOutcome::Dropped
                    }
                }
            }
            (state, other) => {
                debug!(
                    "[{}] Ignoring media message in state {:?}: {:?}",
                    self.session_id, state, other
                );
                MediaOutcome::Continue
            }
        }
    }

    pub fn on_closed(&mut self) {
        self.state = MediaState::Closed;
    }

    pub async fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        self.state = MediaState::Closed;
    }
}

#[cfg(test)]
impl MediaClient {
    fn detached(state: MediaState) -> Self {
        Self {
            session_id: "test".to_string(),
            state,
            connection: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> InboundMessage {
        InboundMessage::parse(&value.to_string()).unwrap()
    }

    #[test]
    fn test_handshake_success_starts_audio() {
        let mut client = MediaClient::detached(MediaState::AwaitingHandshakeAck);

        let outcome = client.on_message(parse(json!({"msg_type": 4, "status_code": 0})));
        assert_eq!(outcome, MediaOutcome::Ready);
        assert_eq!(client.state(), MediaState::ReceivingAudio);
    }

    #[test]
    fn test_handshake_rejection_aborts() {
        let mut client = MediaClient::detached(MediaState::AwaitingHandshakeAck);

        let outcome = client.on_message(parse(
            json!({"msg_type": 4, "status_code": 3, "reason": "bad signature"}),
        ));
        match outcome {
            MediaOutcome::Abort(reason) => assert!(reason.contains("bad signature")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(client.state(), MediaState::Closed);
    }

    #[test]
    fn test_audio_before_handshake_is_ignored() {
        let mut client = MediaClient::detached(MediaState::AwaitingHandshakeAck);

        let outcome = client.on_message(parse(
            json!({"msg_type": 14, "content": {"channel_id": "agent", "data": "AQI="}}),
        ));
        assert_eq!(outcome, MediaOutcome::Continue);
        assert_eq!(client.state(), MediaState::AwaitingHandshakeAck);
    }

    #[test]
    fn test_audio_frames_decoded() {
        let mut client = MediaClient::detached(MediaState::ReceivingAudio);

        let outcome = client.on_message(parse(
            json!({"msg_type": 14, "content": {"channel_id": "agent", "data": "AQI="}}),
        ));
        assert_eq!(
            outcome,
            MediaOutcome::Audio {
                channel: ChannelId::new("agent"),
                payload: vec![1, 2],
            }
        );
    }

    #[test]
    fn test_bad_payload_is_dropped() {
        let mut client = MediaClient::detached(MediaState::ReceivingAudio);

        let outcome = client.on_message(parse(
            json!({"msg_type": 14, "content": {"channel_id": "agent", "data": "%%%"}}),
        ));
        assert_eq!(outcome, MediaOutcome::Dropped);
        assert_eq!(client.state(), MediaState::ReceivingAudio);
    }

    #[test]
    fn test_frame_without_channel_is_dropped() {
        let mut client = MediaClient::detached(MediaState::ReceivingAudio);

        let outcome = client.on_message(parse(json!({"msg_type": 14, "content": {"data": "AQI="}})));

        assert_eq!(outcome, MediaOutcome::Dropped);
    }

    #[test]
    fn test_handshake_request_needs_open_connection() {
        let mut client = MediaClient::detached(MediaState::Connecting);
        let params = HandshakeParams {
            protocol_version: 1,
            identity: crate::rtms::StreamIdentity::new(
                crate::rtms::StreamContext::ContactCenter,
                "E1",
                "S1",
            ),
            signature: "sig".to_string(),
        };

        assert!(client.on_connected(&params).is_err());
        assert_eq!(client.state(), MediaState::Connecting);
    }
}
