//! Persistent records: documents, extracted clauses, and reviewer feedback.
//!
//! The document is the aggregate root; clauses and feedback rows belong to
//! exactly one document. Clause rows are replaced wholesale whenever the
//! analysis is regenerated; feedback rows are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::DocumentStatus;

pub type DocumentId = Uuid;
pub type ClauseId = Uuid;
pub type FeedbackId = Uuid;

/// An NDA document moving through review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub user_id: String,
    pub original_path: String,
    pub redline_path: Option<String>,
    pub clean_path: Option<String>,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A freshly uploaded document: original stored, nothing analysed.
    pub fn new(id: DocumentId, user_id: &str, original_path: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.to_string(),
            original_path: original_path.to_string(),
            redline_path: None,
            clean_path: None,
            status: DocumentStatus::Uploaded,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One extracted clause with its suggested rewrite.
///
/// `confidence_score` comes from analysis; `validation_score` stays empty
/// until the clause is explicitly validated against similar clauses.
/// Both are 0..=100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    pub id: ClauseId,
    pub document_id: DocumentId,
    pub clause_text: String,
    pub original_text: String,
    pub suggested_text: Option<String>,
    pub confidence_score: u8,
    pub validation_score: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// Reviewer feedback on a document's analysis. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: FeedbackId,
    pub document_id: DocumentId,
    pub feedback_text: String,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(document_id: DocumentId, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            feedback_text: text.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_starts_uploaded() {
        let id = Uuid::new_v4();
        let doc = Document::new(id, "user_1", "user_1/abc/original.docx");
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        assert!(doc.redline_path.is_none());
        assert!(doc.clean_path.is_none());
        assert_eq!(doc.created_at, doc.updated_at);
    }

    #[test]
    fn feedback_belongs_to_document() {
        let doc_id = Uuid::new_v4();
        let fb = Feedback::new(doc_id, "clarify term duration");
        assert_eq!(fb.document_id, doc_id);
        assert_eq!(fb.feedback_text, "clarify term duration");
    }
}
