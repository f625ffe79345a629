//! Domain-specific error types for tok-lens

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the tok-lens dashboard
#[derive(Error, Debug)]
pub enum TokLensError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid archive: {message}")]
    InvalidArchive { message: String },

    #[error("Archive entry not found: {path}")]
    EntryNotFound { path: String },

    #[error("Archive entry {path} exceeds {limit_bytes} bytes")]
    EntryTooLarge { path: String, limit_bytes: u64 },

    #[error("Upload exceeds the {limit_bytes} byte limit")]
    UploadTooLarge { limit_bytes: u64 },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Session not found or expired: {id}")]
    SessionNotFound { id: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("Upstream error: {message}")]
    Upstream { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TokLensError {
    /// HTTP status used when this error reaches a route
    pub fn status(&self) -> StatusCode {
        match self {
            TokLensError::InvalidArchive { .. }
            | TokLensError::Parse { .. }
            | TokLensError::InvalidParams { .. } => StatusCode::BAD_REQUEST,
            TokLensError::EntryNotFound { .. } | TokLensError::SessionNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            TokLensError::EntryTooLarge { .. } | TokLensError::UploadTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            TokLensError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            TokLensError::Config { .. } | TokLensError::Io { .. } | TokLensError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for TokLensError {
    fn from(err: anyhow::Error) -> Self {
        TokLensError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<axum::extract::rejection::QueryRejection> for TokLensError {
    fn from(err: axum::extract::rejection::QueryRejection) -> Self {
        TokLensError::InvalidParams {
            message: err.body_text(),
        }
    }
}

impl From<serde_json::Error> for TokLensError {
    fn from(err: serde_json::Error) -> Self {
        TokLensError::Parse {
            message: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for TokLensError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::FileNotFound => TokLensError::EntryNotFound {
                path: "<unknown>".to_string(),
            },
            other => TokLensError::InvalidArchive {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for TokLensError {
    fn from(err: std::io::Error) -> Self {
        TokLensError::Io {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for TokLensError {
    fn from(err: csv::Error) -> Self {
        TokLensError::Internal {
            message: format!("CSV export failed: {}", err),
        }
    }
}

impl From<reqwest::Error> for TokLensError {
    fn from(err: reqwest::Error) -> Self {
        TokLensError::Upstream {
            message: format!("HTTP request failed: {}", err),
        }
    }
}

impl From<tokio::task::JoinError> for TokLensError {
    fn from(err: tokio::task::JoinError) -> Self {
        TokLensError::Internal {
            message: format!("Background task failed: {}", err),
        }
    }
}

/// JSON error body used by the `/api` routes
impl IntoResponse for TokLensError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("{}", self);
        }
        (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            json!({"error": {"code": status.as_u16(), "message": self.to_string()}}).to_string(),
        )
            .into_response()
    }
}

/// Result type alias for tok-lens operations
pub type Result<T> = std::result::Result<T, TokLensError>;
