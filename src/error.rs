//! Closed application error type: a single `thiserror` enum with an
//! `IntoResponse` impl for the observability HTTP surface, covering
//! identification, match, transfer, cycle-level, and retry-level
//! failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("track {id} not found")]
    TrackNotFound { id: i64 },

    #[error("a track with tg_file_unique_id {0} already exists")]
    DuplicateTgFile(String),

    #[error("a track with tg_message_id {0} already exists")]
    DuplicateTgMessage(i64),

    #[error("no match found on {service}")]
    NoMatch { service: &'static str },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("adapter error ({service}): {message}")]
    Adapter { service: &'static str, message: String },

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("serialization error")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl AppError {
    /// The `failure_reason` string recorded on the track.
    pub fn failure_reason(&self) -> String {
        match self {
            AppError::NoMatch { service } => format!("no_{service}_match"),
            AppError::DownloadFailed(msg) => format!("download_failed: {msg}"),
            AppError::UploadFailed(msg) => format!("upload_failed: {msg}"),
            other => format!("unexpected_error: {other}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::TrackNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::DuplicateTgFile(_) | AppError::DuplicateTgMessage(_) => StatusCode::CONFLICT,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) | AppError::Unexpected(_) | AppError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::NoMatch { .. } | AppError::DownloadFailed(_) | AppError::UploadFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Adapter { .. } => StatusCode::BAD_GATEWAY,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
