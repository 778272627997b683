use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info, warn};

use super::encoder::AudioEncoder;
use super::wav::{self, SAMPLE_RATE};

/// Name of the combined recording inside a session directory
pub const MIXED_FILE_NAME: &str = "mixed.wav";

/// Speaker channel tag assigned by the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace anything outside `[A-Za-z0-9_-]` so ids are safe as path components
pub fn safe_file_component(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Where one channel's audio lives on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelFiles {
    pub raw_path: PathBuf,
    pub wav_path: PathBuf,
}

impl ChannelFiles {
    pub fn new(dir: &Path, channel: &ChannelId) -> Self {
        Self::with_stem(dir, &Self::stem(channel))
    }

    fn stem(channel: &ChannelId) -> String {
        format!("channel_{}", safe_file_component(channel.as_str()))
    }

    fn with_stem(dir: &Path, stem: &str) -> Self {
        Self {
            raw_path: dir.join(format!("{}.raw", stem)),
            wav_path: dir.join(format!("{}.wav", stem)),
        }
    }
}

/// Append-only raw PCM writer for one channel
struct ChannelSink {
    channel: ChannelId,
    files: ChannelFiles,
    writer: BufWriter<File>,
    bytes_written: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelReport {
    pub channel: ChannelId,
    pub raw_path: PathBuf,
    /// Set when the container was produced
    pub wav_path: Option<PathBuf>,
    pub bytes: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MixedReport {
    pub path: Option<PathBuf>,
    pub channels: u16,
    /// Channels seen after the first two, not part of the mix
    pub excluded: Vec<ChannelId>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub channels: Vec<ChannelReport>,
    pub mixed: Option<MixedReport>,
}

/// Per-session demultiplexer: one raw sink per channel, in first-seen order.
///
/// Writes go through `&mut self`, so appends for a channel are ordered and
/// [`ChannelPipeline::finalize`] consumes the pipeline only after every
/// issued write has completed.
pub struct ChannelPipeline {
    dir: PathBuf,
    sinks: Vec<ChannelSink>,
    /// File stems already claimed in this directory
    stems: HashSet<String>,
}

impl ChannelPipeline {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sinks: Vec::new(),
            stems: HashSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Channels in order of first appearance
    pub fn channels(&self) -> Vec<ChannelId> {
        self.sinks.iter().map(|s| s.channel.clone()).collect()
    }

    pub fn channel_count(&self) -> usize {
        self.sinks.len()
    }

    /// Append `payload` to the channel's raw file, opening it on first use.
    /// Returns `true` when this frame introduced a new channel.
    pub async fn append(&mut self, channel: &ChannelId, payload: &[u8]) -> io::Result<bool> {
        let (index, is_new) = match self.sinks.iter().position(|s| &s.channel == channel) {
            Some(index) => (index, false),
            None => {
                let sink = self.open_sink(channel).await?;
                self.sinks.push(sink);
                (self.sinks.len() - 1, true)
            }
        };

        let sink = &mut self.sinks[index];
        sink.writer.write_all(payload).await?;
        sink.bytes_written += payload.len() as u64;

        Ok(is_new)
    }

    async fn open_sink(&mut self, channel: &ChannelId) -> io::Result<ChannelSink> {
        let stem = self.claim_stem(channel);
        let files = ChannelFiles::with_stem(&self.dir, &stem);
        let file = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&files.raw_path)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                self.stems.remove(&stem);
                return Err(e);
            }
        };

        info!("New channel {} -> {}", channel, files.raw_path.display());

        Ok(ChannelSink {
            channel: channel.clone(),
            files,
            writer: BufWriter::new(file),
            bytes_written: 0,
        })
    }

    /// Sanitized ids can coincide ("a.b" and "a_b"); later channels get a
    /// numeric suffix so every channel owns its own files.
    fn claim_stem(&mut self, channel: &ChannelId) -> String {
        let base = ChannelFiles::stem(channel);
        let mut stem = base.clone();
        let mut n = 2;
        while self.stems.contains(&stem) {
            stem = format!("{}_{}", base, n);
            n += 1;
        }
        self.stems.insert(stem.clone());
        stem
    }

    /// Close every sink, convert each channel to its own WAV and build the
    /// combined recording. Failures are recorded per item and never stop the
    /// remaining work.
    pub async fn finalize(self, encoder: &dyn AudioEncoder) -> PipelineReport {
        let mut report = PipelineReport::default();
        let mut closed: Vec<(ChannelId, ChannelFiles)> = Vec::with_capacity(self.sinks.len());

        for mut sink in self.sinks {
            if let Err(e) = sink.writer.shutdown().await {
                error!("Failed to flush channel {}: {}", sink.channel, e);
            }

            let mut channel_report = ChannelReport {
                channel: sink.channel.clone(),
                raw_path: sink.files.raw_path.clone(),
                wav_path: None,
                bytes: sink.bytes_written,
                error: None,
            };

            match encoder
                .convert(&sink.files.raw_path, &sink.files.wav_path, SAMPLE_RATE, 1)
                .await
            {
                Ok(()) => {
                    info!(
                        "Channel {} saved: {} ({} bytes PCM, {} encoder)",
                        sink.channel,
                        sink.files.wav_path.display(),
                        sink.bytes_written,
                        encoder.name()
                    );
                    channel_report.wav_path = Some(sink.files.wav_path.clone());
                }
                Err(e) => {
                    error!("Failed to convert channel {}: {}", sink.channel, e);
                    channel_report.error = Some(e.to_string());
                }
            }

            report.channels.push(channel_report);
            closed.push((sink.channel, sink.files));
        }

        report.mixed = write_mixed(&self.dir, &closed).await;
        report
    }
}

async fn write_mixed(dir: &Path, channels: &[(ChannelId, ChannelFiles)]) -> Option<MixedReport> {
    if channels.is_empty() {
        info!("No audio channels captured, skipping {}", MIXED_FILE_NAME);
        return None;
    }

    let excluded: Vec<ChannelId> = channels.iter().skip(2).map(|(id, _)| id.clone()).collect();
    if !excluded.is_empty() {
        warn!(
            "{} channels captured; only the first two are mixed, excluding {:?}",
            channels.len(),
            excluded
        );
    }

    let mut report = MixedReport {
        path: None,
        channels: channels.len().min(2) as u16,
        excluded,
        error: None,
    };

    let mut pcm = Vec::with_capacity(2);
    for (id, files) in channels.iter().take(2) {
        match tokio::fs::read(&files.raw_path).await {
            Ok(bytes) => pcm.push(bytes),
            Err(e) => {
                error!("Failed to read channel {} for mixing: {}", id, e);
                report.error = Some(e.to_string());
                return Some(report);
            }
        }
    }

    let (channel_count, payload) = wav::mix_channels(&pcm)?;

    let path = dir.join(MIXED_FILE_NAME);
    let result = match wav::encode_wav(&payload, channel_count) {
        Ok(bytes) => tokio::fs::write(&path, bytes).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!(
                "Combined recording saved: {} ({} channel{}, {} bytes PCM)",
                path.display(),
                channel_count,
                if channel_count == 1 { "" } else { "s" },
                payload.len()
            );
            report.path = Some(path);
        }
        Err(e) => {
            error!("Failed to write {}: {}", path.display(), e);
            report.error = Some(e.to_string());
        }
    }

    Some(report)
}
