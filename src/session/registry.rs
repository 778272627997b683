use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::session::SessionHandle;
use super::stats::{SessionMarker, SessionStatus};

/// One registry entry. Absence of an entry is the terminal state.
pub enum SessionSlot {
    /// Claimed by a start notification whose session is still being set up
    Reserved {
        token: Uuid,
        reserved_at: DateTime<Utc>,
    },
    Active(SessionHandle),
}

impl SessionSlot {
    pub fn token(&self) -> Uuid {
        match self {
            SessionSlot::Reserved { token, .. } => *token,
            SessionSlot::Active(handle) => handle.token(),
        }
    }

    pub fn marker(&self) -> SessionMarker {
        match self {
            SessionSlot::Reserved { .. } => SessionMarker::Reserved,
            SessionSlot::Active(_) => SessionMarker::Active,
        }
    }

    async fn status(&self, session_id: &str) -> SessionStatus {
        match self {
            SessionSlot::Reserved { reserved_at, .. } => SessionStatus {
                session_id: session_id.to_string(),
                marker: SessionMarker::Reserved,
                stream_id: None,
                context: None,
                started_at: *reserved_at,
                duration_secs: Utc::now()
                    .signed_duration_since(*reserved_at)
                    .num_milliseconds() as f64
                    / 1000.0,
                media_live: false,
                frames_received: 0,
                channels: Vec::new(),
            },
            SessionSlot::Active(handle) => handle.info().status().await,
        }
    }
}

/// Live sessions keyed by session identifier.
///
/// Every check-then-modify runs under one write lock, so a duplicate start
/// can never slip in between "absent" and "reserved".
#[derive(Default)]
pub struct SessionRegistry {
    slots: RwLock<HashMap<String, SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `session_id`. `None` when an entry already exists.
    pub async fn reserve(&self, session_id: &str) -> Option<Uuid> {
        let mut slots = self.slots.write().await;
        if slots.contains_key(session_id) {
            return None;
        }

        let token = Uuid::new_v4();
        slots.insert(
            session_id.to_string(),
            SessionSlot::Reserved {
                token,
                reserved_at: Utc::now(),
            },
        );
        Some(token)
    }

    /// Promote our reservation to an active session. Hands the session back
    /// if the reservation is gone (stopped or aborted meanwhile).
    pub async fn activate(&self, session_id: &str, handle: SessionHandle) -> Result<(), SessionHandle> {
        let mut slots = self.slots.write().await;
        match slots.get_mut(session_id) {
            Some(slot)
                if slot.marker() == SessionMarker::Reserved && slot.token() == handle.token() =>
            {
                *slot = SessionSlot::Active(handle);
                Ok(())
            }
            _ => Err(handle),
        }
    }

    /// Remove and return the entry, whatever its state
    pub async fn take(&self, session_id: &str) -> Option<SessionSlot> {
        self.slots.write().await.remove(session_id)
    }

    /// Remove the entry only if it still belongs to `token`
    pub async fn release(&self, session_id: &str, token: Uuid) -> bool {
        let mut slots = self.slots.write().await;
        match slots.get(session_id) {
            Some(slot) if slot.token() == token => {
                slots.remove(session_id);
                true
            }
            _ => false,
        }
    }

    pub async fn drain(&self) -> Vec<(String, SessionSlot)> {
        self.slots.write().await.drain().collect()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.slots.read().await.contains_key(session_id)
    }

    pub async fn marker(&self, session_id: &str) -> Option<SessionMarker> {
        self.slots.read().await.get(session_id).map(SessionSlot::marker)
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }

    /// Session identifiers, sorted
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn status(&self, session_id: &str) -> Option<SessionStatus> {
        let slots = self.slots.read().await;
        match slots.get(session_id) {
            Some(slot) => Some(slot.status(session_id).await),
            None => None,
        }
    }

    pub async fn statuses(&self) -> Vec<SessionStatus> {
        let slots = self.slots.read().await;
        let mut statuses = Vec::with_capacity(slots.len());
        for (session_id, slot) in slots.iter() {
            statuses.push(slot.status(session_id).await);
        }
        statuses.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        statuses
    }
}
