//! Collaborator ports consumed by the lifecycle controller.
//!
//! Every external capability the controller touches sits behind one of
//! these traits so adapters can be swapped for in-memory fakes in tests:
//! the relational repository, the vector index, the artifact store, the
//! text encoder, and the analysis engine.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{Clause, ClauseId, Document, DocumentId, Feedback};
use crate::status::DocumentStatus;

/// Failure surfaced by a port.
///
/// Transient failures (lost connection, busy index) are eligible for the
/// controller's bounded retry; fatal failures are surfaced immediately.
/// Engine and repository failures are always treated as fatal by the
/// controller regardless of variant.
#[derive(Debug, Clone, Error)]
pub enum PortError {
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Fatal(String),
}

impl PortError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// What a stored embedding represents. Persisted as a metadata column and
/// usable as a search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    Clause,
    Feedback,
}

impl EmbeddingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clause => "clause",
            Self::Feedback => "feedback",
        }
    }
}

/// One embedding to upsert, keyed by a composite string id
/// (`{document}:{clause}` for clauses, `feedback:{document}:{feedback}`
/// for feedback). The source text rides along so similarity hits can be
/// compared against it without a second lookup.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub id: String,
    pub document_id: DocumentId,
    pub kind: EmbeddingKind,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A nearest-neighbour hit.
#[derive(Debug, Clone)]
pub struct SimilarMatch {
    pub id: String,
    pub document_id: DocumentId,
    pub kind: EmbeddingKind,
    pub text: String,
    /// Cosine similarity in [-1, 1]; vectors are unit-length.
    pub score: f32,
}

/// Clause-level output of analysis, before persistence assigns row ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseAnalysis {
    pub clause_text: String,
    pub original_text: String,
    pub suggested_text: Option<String>,
    /// 0..=100.
    pub confidence_score: u8,
}

/// Outcome of validating one clause against similar historical clauses.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// 0..=100.
    pub validation_score: u8,
    pub notes: String,
}

/// Relational persistence for documents, clauses, and feedback.
///
/// Each mutating method is one transition boundary: implementations must
/// commit all of its writes atomically so a failure can never leave rows
/// from a half-applied transition behind.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_document(&self, document: &Document) -> Result<(), PortError>;

    async fn document(&self, id: DocumentId) -> Result<Option<Document>, PortError>;

    /// Move a document to `status`, touching `updated_at`.
    async fn set_status(&self, id: DocumentId, status: DocumentStatus) -> Result<(), PortError>;

    /// Replace the document's clause set wholesale, record the redline
    /// artifact key, and move to `REDLINE_READY`, all in one transaction.
    async fn replace_analysis(
        &self,
        id: DocumentId,
        clauses: &[Clause],
        redline_path: &str,
    ) -> Result<(), PortError>;

    async fn clauses(&self, id: DocumentId) -> Result<Vec<Clause>, PortError>;

    /// Overwrite validation scores for the given clause rows.
    async fn apply_validation_scores(
        &self,
        id: DocumentId,
        scores: &[(ClauseId, u8)],
    ) -> Result<(), PortError>;

    /// Append a feedback row and move to `FEEDBACK_RECEIVED` atomically.
    async fn record_feedback(&self, feedback: &Feedback) -> Result<(), PortError>;

    /// All feedback for a document, oldest first.
    async fn feedback(&self, id: DocumentId) -> Result<Vec<Feedback>, PortError>;

    /// Record the clean artifact key and move to `COMPLETED` atomically.
    async fn set_clean(&self, id: DocumentId, clean_path: &str) -> Result<(), PortError>;
}

/// Nearest-neighbour index over text embeddings.
///
/// The embedding dimension and distance metric are fixed when the index is
/// created; implementations must reject vectors of any other dimension.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), PortError>;

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        kind: Option<EmbeddingKind>,
    ) -> Result<Vec<SimilarMatch>, PortError>;

    /// Drop every embedding of `kind` belonging to a document. Used when a
    /// regeneration replaces the clause set.
    async fn remove_document(
        &self,
        document_id: DocumentId,
        kind: EmbeddingKind,
    ) -> Result<(), PortError>;
}

/// Blob storage for document artifacts, keyed by opaque path strings.
/// Must provide read-after-write consistency.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), PortError>;

    async fn get(&self, path: &str) -> Result<Vec<u8>, PortError>;

    async fn delete(&self, path: &str) -> Result<(), PortError>;
}

/// Fixed-dimension text embedding.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Embedding dimensionality; constant for the encoder's lifetime.
    fn dim(&self) -> usize;

    /// Encode one text into a unit-length vector of `dim()` entries.
    async fn encode(&self, text: &str) -> Result<Vec<f32>, PortError>;
}

/// Clause-level analysis of NDA text.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    /// Extract clauses and propose rewrites.
    async fn analyze(&self, text: &str) -> Result<Vec<ClauseAnalysis>, PortError>;

    /// Re-run analysis informed by the document's accumulated feedback and
    /// by similar historical feedback.
    async fn regenerate(
        &self,
        text: &str,
        feedback: &[Feedback],
        similar_feedback: &[SimilarMatch],
    ) -> Result<Vec<ClauseAnalysis>, PortError>;

    /// Score how well a suggested rewrite aligns with similar clauses.
    async fn validate(
        &self,
        clause_text: &str,
        suggested_text: Option<&str>,
        similar_clauses: &[SimilarMatch],
    ) -> Result<ValidationOutcome, PortError>;

    /// Build the tracked-change artifact from the original bytes.
    async fn build_redline(
        &self,
        original: &[u8],
        analyses: &[ClauseAnalysis],
    ) -> Result<Vec<u8>, PortError>;

    /// Build the clean artifact from redline bytes.
    async fn build_clean(&self, redline: &[u8]) -> Result<Vec<u8>, PortError>;
}
