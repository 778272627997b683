pub mod audio;
pub mod config;
pub mod http;
pub mod rtms;
pub mod session;
pub mod signature;
pub mod webhook;

pub use audio::{AudioEncoder, ChannelId, ChannelPipeline, EncoderFactory};
pub use config::Config;
pub use http::{create_router, AppState};
pub use session::{
    SessionManager, SessionReport, SessionSettings, SessionStatus, StartOutcome, StartRequest,
    StopOutcome,
};
pub use signature::{generate_signature, Credentials};
pub use webhook::{ingest, IngestOutcome, WebhookEvent};
