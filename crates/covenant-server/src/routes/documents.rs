//! Document endpoints: upload, fetch, analyze, clean.

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use serde::Serialize;
use uuid::Uuid;

use covenant_core::{Clause, Document, DocumentStatus};

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub status: DocumentStatus,
    pub original_path: String,
    pub redline_path: Option<String>,
    pub clean_path: Option<String>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            status: doc.status,
            original_path: doc.original_path,
            redline_path: doc.redline_path,
            clean_path: doc.clean_path,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClauseResponse {
    pub id: Uuid,
    pub clause_text: String,
    pub original_text: String,
    pub suggested_text: Option<String>,
    pub confidence_score: u8,
    pub validation_score: Option<u8>,
}

impl From<Clause> for ClauseResponse {
    fn from(clause: Clause) -> Self {
        Self {
            id: clause.id,
            clause_text: clause.clause_text,
            original_text: clause.original_text,
            suggested_text: clause.suggested_text,
            confidence_score: clause.confidence_score,
            validation_score: clause.validation_score,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub document_id: Uuid,
    pub clauses: Vec<ClauseResponse>,
    pub status: DocumentStatus,
}

#[derive(Debug, Serialize)]
pub struct CleanResponse {
    pub status: DocumentStatus,
    pub clean_path: Option<String>,
}

/// `POST /documents/upload`: multipart upload of a `.docx` original.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<DocumentResponse>, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let name = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::BadRequest("file field has no filename".into()))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("reading file field: {e}")))?;
            file = Some((name, bytes.to_vec()));
        }
    }
    let (name, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("missing multipart field \"file\"".into()))?;

    let user = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(&state.default_user);

    let document = state.lifecycle.upload(user, &name, &bytes).await?;
    Ok(Json(document.into()))
}

/// `GET /documents/{id}`.
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document = state.lifecycle.document(id).await?;
    Ok(Json(document.into()))
}

/// `POST /documents/{id}/analyze`.
pub async fn analyze(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let (document, clauses) = state.lifecycle.analyze(id).await?;
    Ok(Json(AnalysisResponse {
        document_id: document.id,
        clauses: clauses.into_iter().map(Into::into).collect(),
        status: document.status,
    }))
}

/// `POST /documents/{id}/clean`.
pub async fn create_clean(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CleanResponse>, ApiError> {
    let document = state.lifecycle.create_clean(id).await?;
    Ok(Json(CleanResponse {
        status: document.status,
        clean_path: document.clean_path,
    }))
}
