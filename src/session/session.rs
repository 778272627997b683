use super::config::{SessionSettings, StartRequest};
use super::registry::SessionRegistry;
use super::stats::{EndReason, SessionMarker, SessionReport, SessionStatus};
use crate::audio::{ChannelId, ChannelPipeline};
use crate::rtms::{
    HandshakeParams, InboundMessage, Link, LinkEvent, MediaClient, MediaOutcome, SignalingClient,
    SignalingOutcome, StreamContext, StreamIdentity,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Buffered link events per session before connection tasks wait
const EVENT_BUFFER: usize = 256;

/// Log a progress line every this many frames
const FRAME_LOG_INTERVAL: u64 = 500;

/// Session facts readable while the session task runs
pub struct SessionInfo {
    pub session_id: String,
    pub stream_id: String,
    pub context: StreamContext,
    pub directory: PathBuf,
    pub started_at: DateTime<Utc>,

    frames_received: AtomicU64,
    media_live: AtomicBool,
    channels: Mutex<Vec<ChannelId>>,
}

impl SessionInfo {
    fn new(request: &StartRequest, directory: PathBuf) -> Self {
        Self {
            session_id: request.session_id.clone(),
            stream_id: request.stream_id.clone(),
            context: request.context,
            directory,
            started_at: Utc::now(),
            frames_received: AtomicU64::new(0),
            media_live: AtomicBool::new(false),
            channels: Mutex::new(Vec::new()),
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::SeqCst)
    }

    pub fn media_live(&self) -> bool {
        self.media_live.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> SessionStatus {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStatus {
            session_id: self.session_id.clone(),
            marker: SessionMarker::Active,
            stream_id: Some(self.stream_id.clone()),
            context: Some(self.context),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            media_live: self.media_live(),
            frames_received: self.frames_received(),
            channels: self.channels.lock().await.clone(),
        }
    }
}

/// Owner's handle to a running session task
pub struct SessionHandle {
    token: Uuid,
    info: Arc<SessionInfo>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// Registry token this session was reserved under
    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Ask the session to stop and wait for its cleanup to finish
    pub async fn stop(self) -> Option<SessionReport> {
        // Err means the task is already winding down on its own
        let _ = self.stop.send(());

        match self.task.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("[{}] Session task panicked: {}", self.info.session_id, e);
                None
            }
        }
    }
}

/// One capture session: drives both protocol clients and the channel
/// pipeline from a single task, so all session state is owned here.
pub(crate) struct StreamSession {
    info: Arc<SessionInfo>,
    token: Uuid,
    settings: Arc<SessionSettings>,
    registry: Arc<SessionRegistry>,
    handshake: HandshakeParams,
    signaling: SignalingClient,
    media: Option<MediaClient>,
    pipeline: ChannelPipeline,
    events_tx: mpsc::Sender<LinkEvent>,
    events: mpsc::Receiver<LinkEvent>,
    frames_received: u64,
}

impl StreamSession {
    pub(crate) fn spawn(
        request: &StartRequest,
        token: Uuid,
        directory: PathBuf,
        signature: String,
        settings: Arc<SessionSettings>,
        registry: Arc<SessionRegistry>,
    ) -> SessionHandle {
        let info = Arc::new(SessionInfo::new(request, directory.clone()));
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);

        let handshake = HandshakeParams {
            protocol_version: settings.protocol_version,
            identity: StreamIdentity::new(request.context, &request.session_id, &request.stream_id),
            signature,
        };

        let signaling = SignalingClient::connect(
            &request.signaling_url,
            &request.session_id,
            &request.stream_id,
            events_tx.clone(),
        );

        let session = Self {
            info: Arc::clone(&info),
            token,
            settings,
            registry,
            handshake,
            signaling,
            media: None,
            pipeline: ChannelPipeline::new(directory),
            events_tx,
            events,
            frames_received: 0,
        };

        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(session.run(stop_rx));

        SessionHandle {
            token,
            info,
            stop,
            task,
        }
    }

    async fn run(mut self, mut stop: oneshot::Receiver<()>) -> SessionReport {
        info!(
            "[{}] Session started (stream {}, {:?})",
            self.info.session_id, self.info.stream_id, self.info.context
        );

        let deadline = Instant::now() + self.settings.handshake_timeout;

        let reason = loop {
            let awaiting_media = !self.info.media_live();

            tokio::select! {
                _ = &mut stop => break EndReason::Stopped,

                Some(event) = self.events.recv() => {
                    if let Some(reason) = self.handle_event(event).await {
                        break reason;
                    }
                }

                _ = tokio::time::sleep_until(deadline), if awaiting_media => {
                    break EndReason::HandshakeTimeout;
                }
            }
        };

        self.finish(reason).await
    }

    /// Returns a reason when the event ends the session
    async fn handle_event(&mut self, event: LinkEvent) -> Option<EndReason> {
        match event {
            LinkEvent::Connected(Link::Signaling) => {
                if let Err(e) = self.signaling.on_connected(&self.handshake) {
                    return Some(EndReason::Aborted {
                        reason: format!("{:#}", e),
                    });
                }
                None
            }
            LinkEvent::Connected(Link::Media) => {
                let media = self.media.as_mut()?;
                if let Err(e) = media.on_connected(&self.handshake) {
                    return Some(EndReason::Aborted {
                        reason: format!("{:#}", e),
                    });
                }
                None
            }
            LinkEvent::Message(Link::Signaling, message) => self.on_signaling_message(message),
            LinkEvent::Message(Link::Media, message) => self.on_media_message(message).await,
            LinkEvent::Closed { link, reason } => {
                match link {
                    Link::Signaling => self.signaling.on_closed(),
                    Link::Media => {
                        if let Some(media) = self.media.as_mut() {
                            media.on_closed();
                        }
                    }
                }
                Some(EndReason::ConnectionLost { link, reason })
            }
        }
    }

    fn on_signaling_message(&mut self, message: InboundMessage) -> Option<EndReason> {
        match self.signaling.on_message(message) {
            SignalingOutcome::Continue => None,
            SignalingOutcome::MediaRelay(url) => {
                if self.media.is_some() {
                    warn!("[{}] Media already relayed, ignoring {}", self.info.session_id, url);
                    return None;
                }
                self.media = Some(MediaClient::connect(
                    &url,
                    &self.info.session_id,
                    self.events_tx.clone(),
                ));
                None
            }
            SignalingOutcome::Abort(reason) => Some(EndReason::Aborted { reason }),
        }
    }

    async fn on_media_message(&mut self, message: InboundMessage) -> Option<EndReason> {
        let media = self.media.as_mut()?;

        match media.on_message(message) {
            MediaOutcome::Continue => None,
            MediaOutcome::Ready => {
                self.info.media_live.store(true, Ordering::SeqCst);
                if let Err(e) = self.signaling.on_media_ready() {
                    return Some(EndReason::Aborted {
                        reason: format!("{:#}", e),
                    });
                }
                None
            }
            MediaOutcome::Audio { channel, payload } => {
                self.record_frame(channel, payload).await;
                None
            }
            MediaOutcome::Dropped => {
                self.count_frame();
                None
            }
            MediaOutcome::Abort(reason) => Some(EndReason::Aborted { reason }),
        }
    }

    /// Every audio message counts, including ones dropped before the pipeline
    fn count_frame(&mut self) {
        self.frames_received += 1;
        self.info
            .frames_received
            .store(self.frames_received, Ordering::SeqCst);
    }

    async fn record_frame(&mut self, channel: ChannelId, payload: Vec<u8>) {
        self.count_frame();

        match self.pipeline.append(&channel, &payload).await {
            Ok(true) => {
                self.info.channels.lock().await.push(channel);
            }
            Ok(false) => {}
            Err(e) => error!(
                "[{}] Failed to write audio for channel {}: {}",
                self.info.session_id, channel, e
            ),
        }

        if self.frames_received % FRAME_LOG_INTERVAL == 0 {
            debug!(
                "[{}] {} audio frames across {} channels",
                self.info.session_id,
                self.frames_received,
                self.pipeline.channel_count()
            );
        }
    }

    /// Close both connections, finalize audio, drop the registry entry
    async fn finish(mut self, reason: EndReason) -> SessionReport {
        match &reason {
            EndReason::Stopped => info!("[{}] Stopping session", self.info.session_id),
            other => warn!("[{}] Session ending: {}", self.info.session_id, other),
        }

        self.signaling.close().await;
        if let Some(media) = self.media.as_mut() {
            media.close().await;
        }

        let audio = self
            .pipeline
            .finalize(self.settings.encoder.as_ref())
            .await;

        if self.registry.release(&self.info.session_id, self.token).await {
            debug!("[{}] Registry entry released", self.info.session_id);
        }

        let ended_at = Utc::now();
        let report = SessionReport {
            session_id: self.info.session_id.clone(),
            stream_id: self.info.stream_id.clone(),
            directory: self.info.directory.clone(),
            started_at: self.info.started_at,
            ended_at,
            duration_secs: ended_at
                .signed_duration_since(self.info.started_at)
                .num_milliseconds() as f64
                / 1000.0,
            frames_received: self.frames_received,
            end_reason: reason,
            channels: audio.channels,
            mixed: audio.mixed,
        };

        info!(
            "[{}] Cleaned up: {} frames, {} channels, {:.1}s",
            report.session_id,
            report.frames_received,
            report.channels.len(),
            report.duration_secs
        );

        report
    }
}
