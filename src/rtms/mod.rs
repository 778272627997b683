//! Streaming protocol clients
//!
//! A session talks to the platform over two websocket connections:
//! - signaling: handshake, relays the media address, event subscription
//! - media: handshake declaring the audio format, then audio frames
//!
//! Each connection runs in its own task (see [`connection`]) and reports
//! back to the owning session over a single ordered event channel.

pub mod connection;
pub mod media;
pub mod messages;
pub mod signaling;

use serde::{Deserialize, Serialize};

pub use connection::{Connection, Link, LinkEvent};
pub use media::{MediaClient, MediaOutcome, MediaState};
pub use messages::{InboundMessage, OutboundMessage, ProtocolError, StreamIdentity};
pub use signaling::{SignalingClient, SignalingOutcome, SignalingState};

/// Which product surface the stream belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamContext {
    /// Contact-center engagement, keyed by `engagement_id`
    ContactCenter,
    /// Meeting, keyed by `meeting_uuid`
    Meeting,
}

/// Everything both handshake requests need, computed once per session
#[derive(Debug, Clone)]
pub struct HandshakeParams {
    pub protocol_version: u32,
    pub identity: StreamIdentity,
    pub signature: String,
}
