// Integration tests for the HTTP surface
//
// Requests go through the router in-process with tower's `oneshot`.

mod support;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rtms_recorder::{create_router, AppState, SessionManager};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use support::{FakeRtms, Script};
use tempfile::TempDir;
use tower::ServiceExt;

fn app(temp_dir: &TempDir) -> (Router, Arc<SessionManager>) {
    let manager = Arc::new(SessionManager::new(support::settings(
        &temp_dir.path().join("recordings"),
        Duration::from_secs(5),
    )));
    (create_router(AppState::new(Arc::clone(&manager))), manager)
}

async fn call(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn post_webhook(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_with_no_sessions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (app, _) = app(&temp_dir);

    let (status, body) = call(&app, get("/health")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "active_sessions": 0, "sessions": []}));
    Ok(())
}

#[tokio::test]
async fn test_unknown_session_is_404() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (app, _) = app(&temp_dir);

    let (status, body) = call(&app, get("/sessions/nope")).await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
    Ok(())
}

#[tokio::test]
async fn test_bad_notifications_are_acknowledged() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (app, manager) = app(&temp_dir);

    let (status, body) = call(&app, post_webhook("not json")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    let missing_stream = json!({
        "event": "meeting.rtms_started",
        "payload": {"meeting_uuid": "M1", "server_urls": "ws://127.0.0.1:1"}
    });
    let (status, body) = call(&app, post_webhook(missing_stream.to_string())).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    let other_event = json!({"event": "meeting.participant_joined", "payload": {}});
    let (status, body) = call(&app, post_webhook(other_event.to_string())).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ignored", "event": "meeting.participant_joined"}));

    let unknown_stop = json!({
        "event": "meeting.rtms_stopped",
        "payload": {"meeting_uuid": "M1"}
    });
    let (status, body) = call(&app, post_webhook(unknown_stop.to_string())).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "unknown_session", "session_id": "M1"}));

    assert!(manager.registry().is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_meeting_session_through_webhook() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (app, manager) = app(&temp_dir);
    let fake = FakeRtms::start(Script {
        frames: vec![("16778240".to_string(), support::pcm(3, 80))],
        ..Script::default()
    })
    .await?;

    let start = json!({
        "event": "meeting.rtms_started",
        "payload": {
            "meeting_uuid": "M1",
            "rtms_stream_id": "S1",
            "server_urls": [fake.signaling_url],
        }
    });
    let (status, body) = call(&app, post_webhook(start.to_string())).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "started", "session_id": "M1"}));

    support::wait_for_status(&manager, "M1", |s| s.frames_received == 1).await?;

    let (status, body) = call(&app, get("/sessions/M1")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marker"], "active");
    assert_eq!(body["context"], "meeting");
    assert_eq!(body["stream_id"], "S1");
    assert_eq!(body["frames_received"], 1);
    assert_eq!(body["channels"], json!(["16778240"]));

    let (_, body) = call(&app, get("/health")).await?;
    assert_eq!(body["active_sessions"], 1);
    assert_eq!(body["sessions"], json!(["M1"]));

    let (_, body) = call(&app, get("/sessions")).await?;
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);

    let stop = json!({"event": "meeting.rtms_stopped", "payload": {"meeting_uuid": "M1"}});
    let (status, body) = call(&app, post_webhook(stop.to_string())).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stopped");
    assert_eq!(body["report"]["frames_received"], 1);
    assert_eq!(body["report"]["end_reason"]["kind"], "stopped");

    let (status, _) = call(&app, get("/sessions/M1")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let recorded = fake.finish().await;
    assert_eq!(recorded.signaling[0]["meeting_uuid"], "M1");
    assert!(recorded.signaling[0].get("engagement_id").is_none());
    Ok(())
}
