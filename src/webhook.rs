//! Webhook ingestor
//!
//! Translates start/stop notifications relayed from the platform into
//! `SessionManager` calls. Every notification is acknowledged; the outcome
//! only shapes the response body and the logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::rtms::StreamContext;
use crate::session::{SessionManager, SessionReport, StartOutcome, StartRequest, StopOutcome};

pub const CONTACT_CENTER_STARTED: &str = "contact_center.voice_rtms_started";
pub const CONTACT_CENTER_STOPPED: &str = "contact_center.voice_rtms_stopped";
pub const MEETING_STARTED: &str = "meeting.rtms_started";
pub const MEETING_STOPPED: &str = "meeting.rtms_stopped";

/// Inbound notification body
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

/// `server_urls` arrives either as one (possibly comma-separated) string or a list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServerUrlList {
    One(String),
    Many(Vec<String>),
}

impl ServerUrlList {
    /// First non-empty address
    pub fn first(&self) -> Option<String> {
        let candidates: Vec<&str> = match self {
            ServerUrlList::One(urls) => urls.split(',').collect(),
            ServerUrlList::Many(urls) => urls.iter().map(String::as_str).collect(),
        };

        candidates
            .into_iter()
            .map(str::trim)
            .find(|url| !url.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamPayload {
    pub engagement_id: Option<String>,
    pub meeting_uuid: Option<String>,
    pub rtms_stream_id: Option<String>,
    pub server_urls: Option<ServerUrlList>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("payload is not an object: {0}")]
    Payload(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// A recognized, validated notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Started(StartRequest),
    Stopped {
        session_id: String,
        context: StreamContext,
    },
}

impl Notification {
    /// `Ok(None)` for events this service does not handle
    pub fn from_event(event: &WebhookEvent) -> Result<Option<Self>, ValidationError> {
        let (context, started) = match event.event.as_str() {
            CONTACT_CENTER_STARTED => (StreamContext::ContactCenter, true),
            CONTACT_CENTER_STOPPED => (StreamContext::ContactCenter, false),
            MEETING_STARTED => (StreamContext::Meeting, true),
            MEETING_STOPPED => (StreamContext::Meeting, false),
            _ => return Ok(None),
        };

        let payload: StreamPayload = serde_json::from_value(event.payload.clone())
            .map_err(|e| ValidationError::Payload(e.to_string()))?;

        // Either id field is accepted; the context's own field wins
        let session_id = match context {
            StreamContext::ContactCenter => required(
                non_empty(payload.engagement_id).or(non_empty(payload.meeting_uuid)),
                "engagement_id",
            )?,
            StreamContext::Meeting => required(
                non_empty(payload.meeting_uuid).or(non_empty(payload.engagement_id)),
                "meeting_uuid",
            )?,
        };

        if !started {
            return Ok(Some(Notification::Stopped {
                session_id,
                context,
            }));
        }

        let stream_id = required(payload.rtms_stream_id, "rtms_stream_id")?;
        let signaling_url = payload
            .server_urls
            .as_ref()
            .and_then(ServerUrlList::first)
            .ok_or(ValidationError::MissingField("server_urls"))?;

        Ok(Some(Notification::Started(StartRequest {
            session_id,
            stream_id,
            signaling_url,
            context,
        })))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    non_empty(value).ok_or(ValidationError::MissingField(field))
}

/// What the ingestor did with a notification
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Started { session_id: String },
    Duplicate { session_id: String },
    Cancelled { session_id: String },
    StartFailed { session_id: String, error: String },
    Stopped { report: Box<SessionReport> },
    UnknownSession { session_id: String },
    Ignored { event: String },
    Rejected { error: String },
}

pub async fn ingest(manager: &SessionManager, event: WebhookEvent) -> IngestOutcome {
    let notification = match Notification::from_event(&event) {
        Ok(Some(notification)) => notification,
        Ok(None) => {
            debug!("Ignoring webhook event {}", event.event);
            return IngestOutcome::Ignored { event: event.event };
        }
        Err(e) => {
            warn!("Rejected {} notification: {}", event.event, e);
            return IngestOutcome::Rejected {
                error: e.to_string(),
            };
        }
    };

    match notification {
        Notification::Started(request) => {
            let session_id = request.session_id.clone();
            info!(
                "[{}] Stream started ({:?}), signaling at {}",
                session_id, request.context, request.signaling_url
            );

            match manager.start(request).await {
                StartOutcome::Started { .. } => IngestOutcome::Started { session_id },
                StartOutcome::Duplicate => IngestOutcome::Duplicate { session_id },
                StartOutcome::Cancelled => IngestOutcome::Cancelled { session_id },
                StartOutcome::Failed { error } => IngestOutcome::StartFailed { session_id, error },
            }
        }
        Notification::Stopped { session_id, context } => {
            info!("[{}] Stream stopped ({:?})", session_id, context);

            match manager.stop(&session_id).await {
                StopOutcome::Stopped(report) => IngestOutcome::Stopped { report },
                StopOutcome::Cancelled => IngestOutcome::Cancelled { session_id },
                StopOutcome::NotFound => IngestOutcome::UnknownSession { session_id },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, payload: Value) -> WebhookEvent {
        WebhookEvent {
            event: name.to_string(),
            payload,
        }
    }

    #[test]
    fn test_contact_center_start() {
        let notification = Notification::from_event(&event(
            CONTACT_CENTER_STARTED,
            json!({
                "engagement_id": "E1",
                "rtms_stream_id": "S1",
                "server_urls": "wss://sig.example"
            }),
        ))
        .unwrap()
        .unwrap();

        assert_eq!(
            notification,
            Notification::Started(StartRequest {
                session_id: "E1".to_string(),
                stream_id: "S1".to_string(),
                signaling_url: "wss://sig.example".to_string(),
                context: StreamContext::ContactCenter,
            })
        );
    }

    #[test]
    fn test_meeting_stop_uses_meeting_uuid() {
        let notification = Notification::from_event(&event(
            MEETING_STOPPED,
            json!({ "meeting_uuid": "m==", "rtms_stream_id": "S1" }),
        ))
        .unwrap()
        .unwrap();

        assert_eq!(
            notification,
            Notification::Stopped {
                session_id: "m==".to_string(),
                context: StreamContext::Meeting,
            }
        );
    }

    #[test]
    fn test_session_id_falls_back_to_other_field() {
        let stop = Notification::from_event(&event(
            CONTACT_CENTER_STOPPED,
            json!({ "meeting_uuid": "m1" }),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(
            stop,
            Notification::Stopped {
                session_id: "m1".to_string(),
                context: StreamContext::ContactCenter,
            }
        );

        let start = Notification::from_event(&event(
            MEETING_STARTED,
            json!({
                "engagement_id": "E9",
                "rtms_stream_id": "S1",
                "server_urls": "wss://sig"
            }),
        ))
        .unwrap()
        .unwrap();
        match start {
            Notification::Started(request) => {
                assert_eq!(request.session_id, "E9");
                assert_eq!(request.context, StreamContext::Meeting);
            }
            other => panic!("unexpected notification: {:?}", other),
        }

        let both = Notification::from_event(&event(
            MEETING_STOPPED,
            json!({ "meeting_uuid": "m1", "engagement_id": "E1" }),
        ))
        .unwrap()
        .unwrap();
        assert_eq!(
            both,
            Notification::Stopped {
                session_id: "m1".to_string(),
                context: StreamContext::Meeting,
            }
        );
    }

    #[test]
    fn test_server_url_forms() {
        let one: ServerUrlList = serde_json::from_value(json!(" , wss://a, wss://b")).unwrap();
        assert_eq!(one.first().as_deref(), Some("wss://a"));

        let many: ServerUrlList = serde_json::from_value(json!(["", "wss://c"])).unwrap();
        assert_eq!(many.first().as_deref(), Some("wss://c"));

        let empty: ServerUrlList = serde_json::from_value(json!([])).unwrap();
        assert_eq!(empty.first(), None);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let missing_stream = Notification::from_event(&event(
            CONTACT_CENTER_STARTED,
            json!({ "engagement_id": "E1", "server_urls": "wss://sig" }),
        ));
        assert_eq!(
            missing_stream,
            Err(ValidationError::MissingField("rtms_stream_id"))
        );

        let missing_urls = Notification::from_event(&event(
            MEETING_STARTED,
            json!({ "meeting_uuid": "m1", "rtms_stream_id": "S1" }),
        ));
        assert_eq!(missing_urls, Err(ValidationError::MissingField("server_urls")));

        let no_id = Notification::from_event(&event(
            CONTACT_CENTER_STOPPED,
            json!({ "engagement_id": " ", "rtms_stream_id": "S1" }),
        ));
        assert_eq!(no_id, Err(ValidationError::MissingField("engagement_id")));

        let not_object = Notification::from_event(&event(MEETING_STOPPED, json!("nope")));
        assert!(matches!(not_object, Err(ValidationError::Payload(_))));
    }

    #[test]
    fn test_unknown_event_ignored() {
        let result = Notification::from_event(&event("endpoint.url_validation", json!({})));
        assert_eq!(result, Ok(None));
    }
}
