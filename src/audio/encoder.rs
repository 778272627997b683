use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::EncoderKind;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("WAV writer error: {0}")]
    Wav(#[from] hound::Error),

    #[error("{program} exited with {status}: {stderr}")]
    Process {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("encoder task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Turns a headerless 16-bit little-endian PCM file into a WAV file
#[async_trait]
pub trait AudioEncoder: Send + Sync {
    async fn convert(
        &self,
        raw_path: &Path,
        wav_path: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(), EncodeError>;

    /// Encoder name for logging
    fn name(&self) -> &str;
}

/// In-process encoder built on `hound`
#[derive(Debug, Default, Clone)]
pub struct NativeEncoder;

#[async_trait]
impl AudioEncoder for NativeEncoder {
    async fn convert(
        &self,
        raw_path: &Path,
        wav_path: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(), EncodeError> {
        let raw_path = raw_path.to_path_buf();
        let wav_path = wav_path.to_path_buf();

        tokio::task::spawn_blocking(move || write_wav(&raw_path, &wav_path, sample_rate, channels))
            .await?
    }

    fn name(&self) -> &str {
        "native"
    }
}

fn write_wav(
    raw_path: &Path,
    wav_path: &Path,
    sample_rate: u32,
    channels: u16,
) -> Result<(), EncodeError> {
    let pcm = std::fs::read(raw_path)?;
    if pcm.len() % 2 != 0 {
        warn!("{} ends with a partial sample, dropping it", raw_path.display());
    }

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(wav_path, spec)?;
    for chunk in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
    }
    writer.finalize()?;

    Ok(())
}

/// Shells out to ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl AudioEncoder for FfmpegEncoder {
    async fn convert(
        &self,
        raw_path: &Path,
        wav_path: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(), EncodeError> {
        debug!(
            "Running {} on {} -> {}",
            self.program.display(),
            raw_path.display(),
            wav_path.display()
        );

        let output = Command::new(&self.program)
            .arg("-y")
            .args(["-f", "s16le"])
            .arg("-ar")
            .arg(sample_rate.to_string())
            .arg("-ac")
            .arg(channels.to_string())
            .arg("-i")
            .arg(raw_path)
            .arg(wav_path)
            .output()
            .await?;

        if !output.status.success() {
            return Err(EncodeError::Process {
                program: self.program.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

pub struct EncoderFactory;

impl EncoderFactory {
    pub fn create(kind: EncoderKind, ffmpeg_path: &str) -> Arc<dyn AudioEncoder> {
        match kind {
            EncoderKind::Native => Arc::new(NativeEncoder),
            EncoderKind::Ffmpeg => Arc::new(FfmpegEncoder::new(ffmpeg_path)),
        }
    }
}
