use crate::audio::ChannelId;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::StreamContext;

/// Wire discriminators carried in every message's `msg_type` field
pub mod msg_type {
    pub const SIGNALING_HANDSHAKE_REQ: u64 = 1;
    pub const SIGNALING_HANDSHAKE_RESP: u64 = 2;
    pub const MEDIA_HANDSHAKE_REQ: u64 = 3;
    pub const MEDIA_HANDSHAKE_RESP: u64 = 4;
    pub const EVENT_SUBSCRIPTION: u64 = 5;
    pub const EVENT_SUBSCRIPTION_RESP: u64 = 6;
    pub const CLIENT_READY_ACK: u64 = 7;
    pub const KEEP_ALIVE_REQ: u64 = 12;
    pub const KEEP_ALIVE_RESP: u64 = 13;
    pub const AUDIO_DATA: u64 = 14;
}

/// Event codes requested on the signaling connection once media is live:
/// active speaker change, participant join, participant leave.
pub const SUBSCRIBED_EVENTS: [u32; 3] = [2, 3, 4];

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has no integer msg_type")]
    MissingType,

    #[error("msg_type {msg_type} does not match its schema: {source}")]
    Schema {
        msg_type: u64,
        source: serde_json::Error,
    },

    #[error("audio payload is not valid base64: {0}")]
    Payload(#[from] base64::DecodeError),
}

// ============================================================================
// Outbound
// ============================================================================

/// Session identity as it appears in handshake requests. The session id travels
/// under a context-specific field name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_id: Option<String>,
    pub rtms_stream_id: String,
}

impl StreamIdentity {
    pub fn new(context: StreamContext, session_id: &str, stream_id: &str) -> Self {
        let (meeting_uuid, engagement_id) = match context {
            StreamContext::Meeting => (Some(session_id.to_string()), None),
            StreamContext::ContactCenter => (None, Some(session_id.to_string())),
        };

        Self {
            meeting_uuid,
            engagement_id,
            rtms_stream_id: stream_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalingHandshakeRequest {
    pub protocol_version: u32,
    #[serde(flatten)]
    pub identity: StreamIdentity,
    pub sequence: u64,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaHandshakeRequest {
    pub protocol_version: u32,
    #[serde(flatten)]
    pub identity: StreamIdentity,
    pub signature: String,
    pub media_type: u32,
    pub payload_encryption: bool,
    pub media_params: MediaParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaParams {
    pub audio: AudioParams,
}

/// Audio format requested from the media server. Values are protocol codes,
/// not literal rates.
#[derive(Debug, Clone, Serialize)]
pub struct AudioParams {
    pub content_type: u32,
    pub sample_rate: u32,
    pub channel: u32,
    pub codec: u32,
    pub data_opt: u32,
    pub send_rate: u32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            content_type: 1, // raw audio
            sample_rate: 1,  // 16 kHz
            channel: 1,      // mono
            codec: 1,        // L16
            data_opt: 1,     // mixed stream
            send_rate: 20,   // ms per frame
        }
    }
}

/// Media type code for audio-only streams
pub const MEDIA_TYPE_AUDIO: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct EventSubscriptionRequest {
    pub rtms_stream_id: String,
    pub events: Vec<EventSubscription>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventSubscription {
    pub event_type: u32,
    pub subscribe: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientReady {
    pub rtms_stream_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeepAliveResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum OutboundMessage {
    SignalingHandshake(SignalingHandshakeRequest),
    MediaHandshake(MediaHandshakeRequest),
    EventSubscription(EventSubscriptionRequest),
    ClientReady(ClientReady),
    KeepAliveResponse(KeepAliveResponse),
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    msg_type: u64,
    #[serde(flatten)]
    body: &'a T,
}

impl OutboundMessage {
    pub fn subscribe(stream_id: &str) -> Self {
        Self::EventSubscription(EventSubscriptionRequest {
            rtms_stream_id: stream_id.to_string(),
            events: SUBSCRIBED_EVENTS
                .iter()
                .map(|&event_type| EventSubscription {
                    event_type,
                    subscribe: true,
                })
                .collect(),
        })
    }

    pub fn msg_type(&self) -> u64 {
        match self {
            Self::SignalingHandshake(_) => msg_type::SIGNALING_HANDSHAKE_REQ,
            Self::MediaHandshake(_) => msg_type::MEDIA_HANDSHAKE_REQ,
            Self::EventSubscription(_) => msg_type::EVENT_SUBSCRIPTION,
            Self::ClientReady(_) => msg_type::CLIENT_READY_ACK,
            Self::KeepAliveResponse(_) => msg_type::KEEP_ALIVE_RESP,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let msg_type = self.msg_type();
        match self {
            Self::SignalingHandshake(body) => serde_json::to_string(&Envelope { msg_type, body }),
            Self::MediaHandshake(body) => serde_json::to_string(&Envelope { msg_type, body }),
            Self::EventSubscription(body) => serde_json::to_string(&Envelope { msg_type, body }),
            Self::ClientReady(body) => serde_json::to_string(&Envelope { msg_type, body }),
            Self::KeepAliveResponse(body) => serde_json::to_string(&Envelope { msg_type, body }),
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SignalingHandshakeResponse {
    pub status_code: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub media_server: Option<MediaServer>,
}

impl SignalingHandshakeResponse {
    /// Media endpoint to dial next: the audio-specific URL when present,
    /// otherwise the general one.
    pub fn media_url(&self) -> Option<&str> {
        let urls = &self.media_server.as_ref()?.server_urls;
        urls.audio
            .as_deref()
            .filter(|url| !url.is_empty())
            .or_else(|| urls.all.as_deref().filter(|url| !url.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaServer {
    pub server_urls: ServerUrls,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerUrls {
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub all: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MediaHandshakeResponse {
    pub status_code: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventSubscriptionResponse {
    #[serde(default)]
    pub status_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeepAliveRequest {
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct AudioDataWire {
    content: AudioContentWire,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct AudioContentWire {
    #[serde(default)]
    channel_id: Option<Value>,
    #[serde(default)]
    user_id: Option<Value>,
    data: String,
    #[serde(default)]
    timestamp: Option<i64>,
}

/// One audio frame with its payload still base64-encoded
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    /// `None` when the frame names no speaker
    pub channel: Option<ChannelId>,
    pub data: String,
    pub timestamp: Option<i64>,
}

impl AudioData {
    pub fn decode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(base64::engine::general_purpose::STANDARD.decode(&self.data)?)
    }
}

impl AudioData {
    fn from_wire(wire: AudioDataWire) -> Self {
        let content = wire.content;
        let channel = content
            .channel_id
            .or(content.user_id)
            .and_then(|value| match value {
                Value::String(s) if !s.is_empty() => Some(ChannelId::new(s)),
                Value::Number(n) => Some(ChannelId::new(n.to_string())),
                _ => None,
            });

        Self {
            channel,
            data: content.data,
            timestamp: content.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    SignalingHandshakeResponse(SignalingHandshakeResponse),
    MediaHandshakeResponse(MediaHandshakeResponse),
    EventSubscriptionResponse(EventSubscriptionResponse),
    KeepAliveRequest(KeepAliveRequest),
    AudioData(AudioData),
    /// Well-formed message of a type this client does not act on
    Ignored { msg_type: u64 },
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let msg_type = value
            .get("msg_type")
            .and_then(Value::as_u64)
            .ok_or(ProtocolError::MissingType)?;

        let message = match msg_type {
            msg_type::SIGNALING_HANDSHAKE_RESP => {
                Self::SignalingHandshakeResponse(decode(msg_type, value)?)
            }
            msg_type::MEDIA_HANDSHAKE_RESP => Self::MediaHandshakeResponse(decode(msg_type, value)?),
            msg_type::EVENT_SUBSCRIPTION_RESP => {
                Self::EventSubscriptionResponse(decode(msg_type, value)?)
            }
            msg_type::KEEP_ALIVE_REQ => Self::KeepAliveRequest(decode(msg_type, value)?),
            msg_type::AUDIO_DATA => {
                let wire: AudioDataWire = decode(msg_type, value)?;
                Self::AudioData(AudioData::from_wire(wire))
            }
            other => Self::Ignored { msg_type: other },
        };

        Ok(message)
    }
}

fn decode<T: DeserializeOwned>(msg_type: u64, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::Schema { msg_type, source })
}
