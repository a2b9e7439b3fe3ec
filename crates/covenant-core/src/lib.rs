//! Core domain: document records, the review status machine, collaborator
//! ports, and the lifecycle controller that orchestrates them.

pub mod artifact;
pub mod lifecycle;
pub mod ports;
pub mod record;
pub mod status;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use artifact::{ArtifactKind, DOCX_CONTENT_TYPE, object_key};
pub use lifecycle::{Lifecycle, LifecycleError, LifecyclePolicy, ValidatedClause};
pub use ports::{
    AnalysisEngine, ArtifactStore, ClauseAnalysis, EmbeddingKind, EmbeddingRecord, PortError,
    Repository, SimilarMatch, TextEncoder, ValidationOutcome, VectorIndex,
};
pub use record::{Clause, ClauseId, Document, DocumentId, Feedback, FeedbackId};
pub use status::DocumentStatus;
