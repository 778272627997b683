use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub rtms: RtmsConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RtmsConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Seconds allowed between session start and the media phase going live
    pub handshake_timeout_secs: u64,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Root directory; one sub-directory is created per session
    pub recordings_path: String,
    pub encoder: EncoderKind,
    pub ffmpeg_path: String,
}

/// Which collaborator turns raw channel PCM into WAV files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    Native,
    Ffmpeg,
}

impl Config {
    /// Load from an optional file at `path` (extension resolved by the `config` crate),
    /// then overlay `RTMS__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "rtms-recorder")?
            .set_default("service.http.bind", "0.0.0.0")?
            .set_default("service.http.port", 8080)?
            .set_default("rtms.client_id", "")?
            .set_default("rtms.client_secret", "")?
            .set_default("rtms.handshake_timeout_secs", 30)?
            .set_default("rtms.protocol_version", 1)?
            .set_default("audio.recordings_path", "data/audio")?
            .set_default("audio.encoder", "native")?
            .set_default("audio.ffmpeg_path", "ffmpeg")?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("RTMS").separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
