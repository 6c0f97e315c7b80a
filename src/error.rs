//! Error types for the recording lifecycle

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the recording manager and its sessions
#[derive(Error, Debug)]
pub enum RecordingError {
    /// A session (or a session being created) already exists
    #[error("Recording is already active")]
    AlreadyActive,

    /// The transport did not establish the voice connection in time
    #[error("Timed out after {0:?} joining voice channel")]
    JoinTimeout(Duration),

    /// The transport refused or failed the join
    #[error("Failed to join voice channel: {0}")]
    JoinFailed(#[source] anyhow::Error),

    /// The session log could not be created (e.g. the path already exists)
    #[error("Failed to open session log {}: {source}", path.display())]
    WriterOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Disconnect or log finalization failed during teardown
    #[error("Teardown failed: {0}")]
    Teardown(String),

    /// The background start task panicked or was cancelled
    #[error("Recording task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RecordingError {
    /// True when a log open failed because the file already exists
    pub fn is_path_collision(&self) -> bool {
        matches!(
            self,
            RecordingError::WriterOpen { source, .. }
                if source.kind() == std::io::ErrorKind::AlreadyExists
        )
    }
}

/// Result type alias using RecordingError
pub type RecordingResult<T> = Result<T, RecordingError>;
