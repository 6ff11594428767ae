use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type. Variants mirror the taxonomy carried
/// through every layer: device discovery, agent lifecycle, framing, and
/// the two named HTTP entry points.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("adb is not available: {0}")]
    AdbUnavailable(String),

    #[error("device offline: {0}")]
    DeviceOffline(String),

    #[error("failed to spawn capture agent for {device}: {reason}")]
    AgentSpawnFailed { device: String, reason: String },

    #[error("stream died for {device}: {reason}")]
    StreamDied { device: String, reason: String },

    #[error("framer could not locate a start code for {device}")]
    FramerCorrupted { device: String },

    #[error("control send failed for {device}: {reason}")]
    ControlSendFailed { device: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body (unified success format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        // Always return 200 OK - success/failure is indicated by the success field
        StatusCode::OK
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        tracing::error!(
            error_type = std::any::type_name_of_val(&self),
            error_message = %body.message,
            "request failed"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, AppError>;
