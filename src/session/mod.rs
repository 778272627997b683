//! Session lifecycle management
//!
//! This module provides the `SessionManager` and the pieces it coordinates:
//! - Registry of live sessions with an atomic reserve-before-start slot
//! - One task per session driving the signaling and media clients
//! - Audio finalization and registry removal on stop, abort or shutdown
//! - Status snapshots and end-of-session reports

mod config;
mod manager;
mod registry;
mod session;
mod stats;

pub use config::{SessionSettings, StartRequest};
pub use manager::{SessionManager, StartOutcome, StopOutcome};
pub use registry::{SessionRegistry, SessionSlot};
pub use session::{SessionHandle, SessionInfo};
pub use stats::{EndReason, SessionMarker, SessionReport, SessionStatus};
