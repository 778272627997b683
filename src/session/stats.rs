use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::audio::{ChannelId, ChannelReport, MixedReport};
use crate::rtms::{Link, StreamContext};

/// Registry marker for a session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMarker {
    /// Slot claimed, session not yet running
    Reserved,
    /// Session task running (handshakes pending, in progress or done)
    Active,
}

/// Point-in-time view of a registry entry
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub marker: SessionMarker,
    pub stream_id: Option<String>,
    pub context: Option<StreamContext>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// Media handshake accepted and audio flowing
    pub media_live: bool,
    pub frames_received: u64,
    pub channels: Vec<ChannelId>,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndReason {
    /// Stop notification or process shutdown
    Stopped,
    /// Media phase not live within the configured timeout
    HandshakeTimeout,
    /// Handshake rejected or a request could not be sent
    Aborted { reason: String },
    /// A connection ended on its own
    ConnectionLost { link: Link, reason: String },
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Stopped => write!(f, "stopped"),
            EndReason::HandshakeTimeout => write!(f, "handshake timed out"),
            EndReason::Aborted { reason } => write!(f, "aborted: {}", reason),
            EndReason::ConnectionLost { link, reason } => {
                write!(f, "{} connection lost: {}", link, reason)
            }
        }
    }
}

/// Summary produced once a session has been cleaned up
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub stream_id: String,
    pub directory: PathBuf,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub frames_received: u64,
    pub end_reason: EndReason,
    pub channels: Vec<ChannelReport>,
    pub mixed: Option<MixedReport>,
}
