use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioEncoder, EncoderFactory};
use crate::config::Config;
use crate::rtms::StreamContext;
use crate::signature::Credentials;

/// Settings shared by every session the manager starts
#[derive(Clone)]
pub struct SessionSettings {
    /// Identity used to sign both handshakes
    pub credentials: Credentials,

    /// Parent of the per-session directories
    pub recordings_root: PathBuf,

    /// Abort a session whose media phase is not live after this long
    pub handshake_timeout: Duration,

    pub protocol_version: u32,

    /// Converts each channel's raw PCM to WAV at session end
    pub encoder: Arc<dyn AudioEncoder>,
}

impl SessionSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            credentials: Credentials::new(&cfg.rtms.client_id, &cfg.rtms.client_secret),
            recordings_root: PathBuf::from(
                shellexpand::tilde(&cfg.audio.recordings_path).as_ref(),
            ),
            handshake_timeout: Duration::from_secs(cfg.rtms.handshake_timeout_secs),
            protocol_version: cfg.rtms.protocol_version,
            encoder: EncoderFactory::create(cfg.audio.encoder, &cfg.audio.ffmpeg_path),
        }
    }
}

/// A validated "stream started" notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// Platform session key (engagement id or meeting uuid)
    pub session_id: String,

    /// Opaque stream token required by both handshakes
    pub stream_id: String,

    /// Signaling endpoint to dial first
    pub signaling_url: String,

    pub context: StreamContext,
}
