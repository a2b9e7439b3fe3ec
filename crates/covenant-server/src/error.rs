//! Error-to-response mapping.
//!
//! Validation failures surface as 4xx with a machine-readable code;
//! processing failures surface as 500 with the underlying message. The
//! body shape is `{"error": {"code", "message"}}` everywhere.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use covenant_core::LifecycleError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("{0}")]
    BadRequest(String),
}

fn classify(err: &LifecycleError) -> (StatusCode, &'static str) {
    match err {
        LifecycleError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        LifecycleError::NoClauses => (StatusCode::NOT_FOUND, "no_clauses"),
        LifecycleError::InvalidState { .. } => (StatusCode::BAD_REQUEST, "invalid_state"),
        LifecycleError::UnsupportedFileType(_) => {
            (StatusCode::BAD_REQUEST, "unsupported_file_type")
        }
        LifecycleError::UploadTooLarge { .. } => (StatusCode::BAD_REQUEST, "upload_too_large"),
        LifecycleError::NoRedline(_) => (StatusCode::BAD_REQUEST, "no_redline"),
        LifecycleError::EngineTimeout(_)
        | LifecycleError::Engine(_)
        | LifecycleError::Repository(_)
        | LifecycleError::Index(_)
        | LifecycleError::Artifacts(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "processing_error")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::Lifecycle(err) => {
                let (status, code) = classify(err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "processing failure");
                }
                (status, code, err.to_string())
            }
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "bad_request", message.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));
        (status, body).into_response()
    }
}
