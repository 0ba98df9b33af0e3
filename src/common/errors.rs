use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::common::types::now_ms;

/// Failures a relay operation can end with.
///
/// Every variant is recovered at the session boundary (rollback or a
/// transition to `Failed`) and then rendered into the command status payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The radio endpoint could not be reached after all retries.
    #[error("radio stream unreachable: {0}")]
    Connect(String),
    /// Voice transport connect or disconnect failed.
    #[error("voice transport error: {0}")]
    Voice(String),
    /// Playback died and the automatic retry did not bring it back.
    #[error("playback failed: {0}")]
    Playback(String),
    /// A suspension point exceeded its bound.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },
    #[error("you must be in a voice channel to use this command")]
    NotInVoiceChannel,
    #[error("guild {0} is not served by this relay")]
    GuildNotAllowed(u64),
}

/// Stable machine-readable name of a [`RelayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Connect,
    Voice,
    Playback,
    Timeout,
    NotInVoiceChannel,
    GuildNotAllowed,
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect(_) => ErrorKind::Connect,
            Self::Voice(_) => ErrorKind::Voice,
            Self::Playback(_) => ErrorKind::Playback,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::NotInVoiceChannel => ErrorKind::NotInVoiceChannel,
            Self::GuildNotAllowed(_) => ErrorKind::GuildNotAllowed,
        }
    }

    pub fn timeout(operation: &'static str, limit: std::time::Duration) -> Self {
        Self::Timeout {
            operation,
            secs: limit.as_secs(),
        }
    }
}

/// JSON error body returned by the HTTP API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub status: u16,
    /// HTTP status reason phrase (e.g. "Bad Request").
    pub error: String,
    pub message: String,
    /// The request path that caused the error.
    pub path: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Unknown").into(),
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, path)
    }

    pub fn not_found(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, path)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
