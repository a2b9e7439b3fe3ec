//! Feedback endpoints: submission and analysis regeneration.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use covenant_core::DocumentStatus;

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback_text: String,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub feedback_text: String,
}

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub status: DocumentStatus,
    pub document_id: Uuid,
    pub redline_path: Option<String>,
}

/// `POST /feedback/{id}`: record reviewer feedback on the redline.
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, ApiError> {
    let feedback = state
        .lifecycle
        .submit_feedback(id, &request.feedback_text)
        .await?;
    Ok(Json(FeedbackResponse {
        id: feedback.id,
        document_id: feedback.document_id,
        feedback_text: feedback.feedback_text,
    }))
}

/// `POST /feedback/{id}/regenerate`: rebuild the analysis from feedback.
pub async fn regenerate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RegenerateResponse>, ApiError> {
    let (document, _) = state.lifecycle.regenerate(id).await?;
    Ok(Json(RegenerateResponse {
        status: document.status,
        document_id: document.id,
        redline_path: document.redline_path,
    }))
}
