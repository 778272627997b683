//! HTTP surface for the platform webhook relay and operators
//!
//! - POST /webhook - Stream started/stopped notifications (always acknowledged)
//! - GET /sessions - Status of every registry entry
//! - GET /sessions/:id - Status of one session
//! - GET /health - Health check with active session ids

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
