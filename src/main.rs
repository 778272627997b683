use anyhow::{Context, Result};
use clap::Parser;
use rtms_recorder::{create_router, AppState, Config, SessionManager, SessionSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How often active sessions are summarized in the log
const ACTIVITY_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "rtms-recorder")]
#[command(about = "Record real-time media stream audio per speaker channel")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/rtms-recorder")]
    config: String,

    /// Override the HTTP port from config
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Media servers are reached over wss
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut cfg = Config::load(&args.config)?;
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Recordings: {}", cfg.audio.recordings_path);
    info!("Encoder: {:?}", cfg.audio.encoder);
    if cfg.rtms.client_secret.is_empty() {
        warn!("rtms.client_secret is not set; every session start will fail to sign");
    }

    let manager = Arc::new(SessionManager::new(SessionSettings::from_config(&cfg)));
    let activity = tokio::spawn(log_activity(Arc::clone(&manager)));

    let app = create_router(AppState::new(Arc::clone(&manager)));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on http://{}", addr);
    info!("   Webhook: POST http://{}/webhook", addr);
    info!("   Health: GET http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    activity.abort();

    let reports = manager.shutdown().await;
    for report in &reports {
        info!(
            "[{}] Finalized on shutdown: {} frames in {}",
            report.session_id,
            report.frames_received,
            report.directory.display()
        );
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT, shutting down..."),
        Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
    }
}

async fn log_activity(manager: Arc<SessionManager>) {
    let mut ticker = tokio::time::interval(ACTIVITY_LOG_INTERVAL);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let statuses = manager.statuses().await;
        if statuses.is_empty() {
            continue;
        }

        info!("{} active sessions", statuses.len());
        for status in statuses {
            info!(
                "   [{}] {:.0}s, {} frames, {} channels",
                status.session_id,
                status.duration_secs,
                status.frames_received,
                status.channels.len()
            );
        }
    }
}
