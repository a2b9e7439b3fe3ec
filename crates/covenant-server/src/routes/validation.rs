//! Validation endpoints: score suggested rewrites against similar clauses.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use covenant_core::DocumentStatus;

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ValidationRequest {
    pub document_id: Uuid,
    pub clause_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ValidatedClauseResponse {
    pub id: Uuid,
    pub clause_text: String,
    pub suggested_text: Option<String>,
    pub validation_score: Option<u8>,
    pub validation_notes: String,
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub document_id: Uuid,
    pub validated_clauses: Vec<ValidatedClauseResponse>,
    pub status: DocumentStatus,
}

#[derive(Debug, Serialize)]
pub struct ValidateAllResponse {
    pub status: DocumentStatus,
    pub document_id: Uuid,
    pub validated_clauses_count: usize,
}

/// `POST /validation/validate`: validate selected clauses.
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidationRequest>,
) -> Result<Json<ValidationResponse>, ApiError> {
    let (document, validated) = state
        .lifecycle
        .validate(request.document_id, Some(&request.clause_ids))
        .await?;

    Ok(Json(ValidationResponse {
        document_id: document.id,
        validated_clauses: validated
            .into_iter()
            .map(|v| ValidatedClauseResponse {
                id: v.clause.id,
                clause_text: v.clause.clause_text,
                suggested_text: v.clause.suggested_text,
                validation_score: v.clause.validation_score,
                validation_notes: v.notes,
            })
            .collect(),
        status: document.status,
    }))
}

/// `POST /validation/{id}/validate-all`: validate every clause.
pub async fn validate_all(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ValidateAllResponse>, ApiError> {
    let (document, validated) = state.lifecycle.validate(id, None).await?;
    Ok(Json(ValidateAllResponse {
        status: document.status,
        document_id: document.id,
        validated_clauses_count: validated.len(),
    }))
}
