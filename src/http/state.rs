use crate::manager::RecordingManager;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The process-wide recording manager
    pub manager: Arc<RecordingManager>,

    /// Teardown deadline for stop requests
    pub stop_timeout: Duration,
}

impl AppState {
    pub fn new(manager: Arc<RecordingManager>, stop_timeout: Duration) -> Self {
        Self {
            manager,
            stop_timeout,
        }
    }
}
