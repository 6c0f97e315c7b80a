use super::state::AppState;
use crate::error::RecordingError;
use crate::manager::{StartRequest, StopOutcome};
use crate::session::SessionStats;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingRequest {
    pub guild_id: u64,
    pub channel_id: u64,
    /// Display name of whoever asked, used in the log file name
    pub requested_by: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StopRecordingRequest {
    /// Free-form reason, only logged
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRecordingResponse {
    pub session_id: String,
    pub channel_name: String,
    pub log_path: PathBuf,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRecordingResponse {
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SessionStats>,
    /// False when teardown reported errors
    pub clean: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub recording: bool,
    pub guild_id: Option<u64>,
    pub channel_id: Option<u64>,
    pub channel_name: Option<String>,
    pub log_path: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub packets_written: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recording/start
/// Join a voice channel and start recording
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> impl IntoResponse {
    info!(
        "Start requested by {} for channel {} in guild {}",
        req.requested_by, req.channel_id, req.guild_id
    );

    let request = StartRequest {
        guild_id: req.guild_id,
        channel_id: req.channel_id,
        requested_by: req.requested_by,
    };

    match state.manager.start_recording(request).await {
        Ok(active) => (
            StatusCode::OK,
            Json(StartRecordingResponse {
                session_id: active.meta.session_id.to_string(),
                channel_name: active.meta.channel_name.clone(),
                log_path: active.meta.log_path.clone(),
                message: format!("Recording started in {}", active.meta.channel_name),
            }),
        )
            .into_response(),
        Err(e) => {
            let status = match &e {
                RecordingError::AlreadyActive => StatusCode::CONFLICT,
                RecordingError::JoinTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
                RecordingError::JoinFailed(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };

            if status == StatusCode::CONFLICT {
                warn!("Unable to start recording: {}", e);
            } else {
                error!("Failed to start recording: {}", e);
            }

            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /recording/stop
/// Stop the active recording; succeeds when nothing is recording
pub async fn stop_recording(
    State(state): State<AppState>,
    body: Option<Json<StopRecordingRequest>>,
) -> impl IntoResponse {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .unwrap_or_else(|| "stop command".to_string());

    let response = match state.manager.stop_recording(&reason, state.stop_timeout).await {
        StopOutcome::Idle => StopRecordingResponse {
            stopped: false,
            log_path: None,
            stats: None,
            clean: true,
        },
        StopOutcome::Stopped { meta, stats, clean } => StopRecordingResponse {
            stopped: true,
            log_path: Some(meta.log_path.clone()),
            stats: Some(stats),
            clean,
        },
    };

    (StatusCode::OK, Json(response))
}

/// GET /recording/status
/// Snapshot of the active session; never waits on start/stop
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let response = match state.manager.active_session() {
        Some(active) => StatusResponse {
            recording: true,
            guild_id: Some(active.meta.guild_id),
            channel_id: Some(active.meta.channel_id),
            channel_name: Some(active.meta.channel_name.clone()),
            log_path: Some(active.meta.log_path.clone()),
            started_at: Some(active.meta.started_at),
            packets_written: Some(active.stats().packets_written),
        },
        None => StatusResponse {
            recording: false,
            guild_id: None,
            channel_id: None,
            channel_name: None,
            log_path: None,
            started_at: None,
            packets_written: None,
        },
    };

    (StatusCode::OK, Json(response))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
