//! HTTP API for external control (command handlers, operators)
//!
//! - POST /recording/start - Start recording a voice channel
//! - POST /recording/stop - Stop the active recording
//! - GET /recording/status - Query the active session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, StartRecordingRequest, StatusResponse, StopRecordingRequest};
pub use routes::create_router;
pub use state::AppState;
