use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::config::{SessionSettings, StartRequest};
use super::registry::{SessionRegistry, SessionSlot};
use super::session::{SessionHandle, StreamSession};
use super::stats::{SessionReport, SessionStatus};
use crate::audio::safe_file_component;

#[derive(Debug)]
pub enum StartOutcome {
    Started { directory: PathBuf },
    /// An entry for this session id already exists
    Duplicate,
    /// Stopped while it was still being set up
    Cancelled,
    Failed { error: String },
}

#[derive(Debug)]
pub enum StopOutcome {
    Stopped(Box<SessionReport>),
    /// The session was only reserved; nothing to clean up
    Cancelled,
    NotFound,
}

/// Owns the session registry and drives every session's lifecycle
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    settings: Arc<SessionSettings>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            settings: Arc::new(settings),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Start capturing a stream. Idempotent per session id.
    pub async fn start(&self, request: StartRequest) -> StartOutcome {
        let session_id = request.session_id.clone();

        let Some(token) = self.registry.reserve(&session_id).await else {
            warn!("[{}] Session already exists, ignoring start", session_id);
            return StartOutcome::Duplicate;
        };

        let handle = match self.launch(&request, token).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("[{}] Failed to start session: {:#}", session_id, e);
                self.registry.release(&session_id, token).await;
                return StartOutcome::Failed {
                    error: format!("{:#}", e),
                };
            }
        };

        let directory = handle.info().directory.clone();
        match self.registry.activate(&session_id, handle).await {
            Ok(()) => {
                info!("[{}] Session active, recording to {}", session_id, directory.display());
                StartOutcome::Started { directory }
            }
            Err(handle) => {
                warn!("[{}] Session ended while starting, cleaning up", session_id);
                handle.stop().await;
                StartOutcome::Cancelled
            }
        }
    }

    async fn launch(&self, request: &StartRequest, token: uuid::Uuid) -> Result<SessionHandle> {
        let signature = self
            .settings
            .credentials
            .sign(&request.session_id, &request.stream_id)
            .context("Failed to sign handshake")?;

        let directory = self.create_session_dir(&request.session_id).await?;

        Ok(StreamSession::spawn(
            request,
            token,
            directory,
            signature,
            Arc::clone(&self.settings),
            Arc::clone(&self.registry),
        ))
    }

    /// Fresh directory named by start time; never shared with another session
    async fn create_session_dir(&self, session_id: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.settings.recordings_root)
            .await
            .with_context(|| {
                format!(
                    "Failed to create recordings root {}",
                    self.settings.recordings_root.display()
                )
            })?;

        let name = format!(
            "{}_{}",
            chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S-%3f"),
            safe_file_component(session_id)
        );

        create_unique_dir(&self.settings.recordings_root, &name)
            .await
            .with_context(|| format!("Failed to create session directory {}", name))
    }

    /// Stop a session and wait for its cleanup. Unknown ids are a no-op.
    pub async fn stop(&self, session_id: &str) -> StopOutcome {
        match self.registry.take(session_id).await {
            Some(SessionSlot::Active(handle)) => match handle.stop().await {
                Some(report) => StopOutcome::Stopped(Box::new(report)),
                None => StopOutcome::NotFound,
            },
            Some(SessionSlot::Reserved { .. }) => {
                info!("[{}] Stopped before setup finished", session_id);
                StopOutcome::Cancelled
            }
            None => {
                info!("[{}] No active session to stop", session_id);
                StopOutcome::NotFound
            }
        }
    }

    /// Force-clean every remaining session
    pub async fn shutdown(&self) -> Vec<SessionReport> {
        let slots = self.registry.drain().await;
        if slots.is_empty() {
            return Vec::new();
        }

        info!("Cleaning up {} remaining sessions", slots.len());

        let stops = slots.into_iter().filter_map(|(session_id, slot)| match slot {
            SessionSlot::Active(handle) => Some(handle.stop()),
            SessionSlot::Reserved { .. } => {
                info!("[{}] Dropping reservation", session_id);
                None
            }
        });

        futures::future::join_all(stops)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    pub async fn active_sessions(&self) -> Vec<String> {
        self.registry.ids().await
    }

    pub async fn status(&self, session_id: &str) -> Option<SessionStatus> {
        self.registry.status(session_id).await
    }

    pub async fn statuses(&self) -> Vec<SessionStatus> {
        self.registry.statuses().await
    }
}

/// Upper bound on `_<n>` suffixes tried for one directory name
const MAX_DIR_SUFFIX: u32 = 1000;

/// Create `root/name`, or `root/name_<n>` when the name is already taken
/// (same-millisecond starts whose ids sanitize alike).
async fn create_unique_dir(root: &Path, name: &str) -> io::Result<PathBuf> {
    let mut directory = root.join(name);

    for n in 2..=MAX_DIR_SUFFIX + 1 {
        match tokio::fs::create_dir(&directory).await {
            Ok(()) => return Ok(directory),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                directory = root.join(format!("{}_{}", name, n));
            }
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free directory name for {}", name),
    ))
}
