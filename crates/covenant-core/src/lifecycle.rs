//! Document lifecycle controller.
//!
//! Owns the review status machine and orchestrates the collaborator ports
//! in the right order for each transition. Transitions on the same
//! document are serialised through a per-document async lock, reads stay
//! lock-free so the transient `ANALYZING` marker is observable while work
//! is in flight.
//!
//! Failure policy: engine calls run under a timeout budget and are never
//! retried; transient vector-index and artifact-store failures are retried
//! with exponential backoff; validation errors are rejected before any
//! work starts. All relational writes for a transition commit atomically
//! through the [`Repository`] port.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::{ArtifactKind, DOCX_CONTENT_TYPE, object_key};
use crate::ports::{
    AnalysisEngine, ArtifactStore, ClauseAnalysis, EmbeddingKind, EmbeddingRecord, PortError,
    Repository, SimilarMatch, TextEncoder, VectorIndex,
};
use crate::record::{Clause, ClauseId, Document, DocumentId, Feedback};
use crate::status::DocumentStatus;

/// Tuning knobs for the controller.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    /// Budget for a single analysis-engine or encoder call.
    pub engine_timeout: Duration,
    /// Total attempts (first try included) for transient index/store failures.
    pub max_attempts: u32,
    /// Base backoff delay; attempt `n` waits `retry_delay * 2^(n-1)`.
    pub retry_delay: Duration,
    /// Fan-out of each similarity lookup.
    pub top_k: usize,
    /// Upload size cap in bytes.
    pub max_upload_bytes: usize,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            engine_timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_delay: Duration::from_millis(250),
            top_k: 5,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Failure of a lifecycle operation.
///
/// The first group are validation errors (the request itself is wrong for
/// the document's current state); the rest are processing errors from a
/// collaborator.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("document {0} not found")]
    NotFound(DocumentId),

    #[error("{operation} requires status {expected}, document is {actual}")]
    InvalidState {
        operation: &'static str,
        expected: &'static str,
        actual: DocumentStatus,
    },

    #[error("unsupported file type {0:?}, only .docx uploads are accepted")]
    UnsupportedFileType(String),

    #[error("upload exceeds the {limit}-byte cap")]
    UploadTooLarge { limit: usize },

    #[error("document {0} has no redline artifact")]
    NoRedline(DocumentId),

    #[error("no clauses matched the request")]
    NoClauses,

    #[error("analysis engine timed out after {0:?}")]
    EngineTimeout(Duration),

    #[error("analysis engine: {0}")]
    Engine(PortError),

    #[error("repository: {0}")]
    Repository(PortError),

    #[error("vector index: {0}")]
    Index(PortError),

    #[error("artifact store: {0}")]
    Artifacts(PortError),
}

impl LifecycleError {
    /// Whether the failure is the caller's fault (wrong request for the
    /// current state) rather than a processing failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::InvalidState { .. }
                | Self::UnsupportedFileType(_)
                | Self::UploadTooLarge { .. }
                | Self::NoRedline(_)
                | Self::NoClauses
        )
    }
}

/// A clause together with the notes produced while validating it.
#[derive(Debug, Clone)]
pub struct ValidatedClause {
    pub clause: Clause,
    pub notes: String,
}

/// The controller. Cheap to share behind an `Arc`; all state lives in the
/// injected collaborators apart from the per-document lock registry.
pub struct Lifecycle {
    repo: Arc<dyn Repository>,
    index: Arc<dyn VectorIndex>,
    artifacts: Arc<dyn ArtifactStore>,
    engine: Arc<dyn AnalysisEngine>,
    encoder: Arc<dyn TextEncoder>,
    policy: LifecyclePolicy,
    guards: Mutex<HashMap<DocumentId, Arc<Mutex<()>>>>,
}

impl Lifecycle {
    pub fn new(
        repo: Arc<dyn Repository>,
        index: Arc<dyn VectorIndex>,
        artifacts: Arc<dyn ArtifactStore>,
        engine: Arc<dyn AnalysisEngine>,
        encoder: Arc<dyn TextEncoder>,
        policy: LifecyclePolicy,
    ) -> Self {
        Self {
            repo,
            index,
            artifacts,
            engine,
            encoder,
            policy,
            guards: Mutex::new(HashMap::new()),
        }
    }

    // ── Operations ──

    /// Store an uploaded original and create its document row.
    pub async fn upload(
        &self,
        user_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Document, LifecycleError> {
        if !file_name.to_ascii_lowercase().ends_with(".docx") {
            return Err(LifecycleError::UnsupportedFileType(file_name.to_string()));
        }
        if bytes.len() > self.policy.max_upload_bytes {
            return Err(LifecycleError::UploadTooLarge {
                limit: self.policy.max_upload_bytes,
            });
        }

        let id = Uuid::new_v4();
        let key = object_key(user_id, id, ArtifactKind::Original);
        self.with_retry("store original", || {
            self.artifacts.put(&key, bytes, DOCX_CONTENT_TYPE)
        })
        .await
        .map_err(LifecycleError::Artifacts)?;

        let document = Document::new(id, user_id, &key);
        self.repo
            .create_document(&document)
            .await
            .map_err(LifecycleError::Repository)?;

        info!(document = %id, user = user_id, "document uploaded");
        Ok(document)
    }

    /// Fetch a document without taking the transition lock.
    pub async fn document(&self, id: DocumentId) -> Result<Document, LifecycleError> {
        self.repo
            .document(id)
            .await
            .map_err(LifecycleError::Repository)?
            .ok_or(LifecycleError::NotFound(id))
    }

    /// Run analysis: extract clauses, store their embeddings, build and
    /// store the redline, and move to `REDLINE_READY`.
    ///
    /// The `ANALYZING` marker is committed before work starts; on failure
    /// the document is restored to the status it had before the call.
    pub async fn analyze(
        &self,
        id: DocumentId,
    ) -> Result<(Document, Vec<Clause>), LifecycleError> {
        let _guard = self.lock(id).await;

        let document = self.document(id).await?;
        if !document.status.may_analyze() {
            return Err(LifecycleError::InvalidState {
                operation: "analyze",
                expected: "uploaded or redline_ready",
                actual: document.status,
            });
        }
        let prior_status = document.status;

        self.repo
            .set_status(id, DocumentStatus::Analyzing)
            .await
            .map_err(LifecycleError::Repository)?;

        match self.run_analysis(&document).await {
            Ok(result) => Ok(result),
            Err(err) => {
                // Restore the pre-ANALYZING status so the redline/status
                // invariant holds even when a re-analysis fails.
                if let Err(rollback) = self.repo.set_status(id, prior_status).await {
                    warn!(document = %id, error = %rollback, "status rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Record reviewer feedback and move to `FEEDBACK_RECEIVED`.
    pub async fn submit_feedback(
        &self,
        id: DocumentId,
        text: &str,
    ) -> Result<Feedback, LifecycleError> {
        let _guard = self.lock(id).await;

        let document = self.document(id).await?;
        if !document.status.may_receive_feedback() {
            return Err(LifecycleError::InvalidState {
                operation: "submit_feedback",
                expected: "redline_ready",
                actual: document.status,
            });
        }

        let feedback = Feedback::new(id, text);
        let vector = self.encode(text).await?;
        // The vector write sits outside the transaction; a failure after it
        // leaves an orphaned embedding, which later searches tolerate.
        self.with_retry("store feedback embedding", || {
            self.index.upsert(EmbeddingRecord {
                id: format!("feedback:{id}:{}", feedback.id),
                document_id: id,
                kind: EmbeddingKind::Feedback,
                text: text.to_string(),
                vector: vector.clone(),
            })
        })
        .await
        .map_err(LifecycleError::Index)?;

        self.repo
            .record_feedback(&feedback)
            .await
            .map_err(LifecycleError::Repository)?;

        info!(document = %id, feedback = %feedback.id, "feedback recorded");
        Ok(feedback)
    }

    /// Regenerate the analysis from accumulated feedback and move back to
    /// `REDLINE_READY`. The previous clause set is replaced wholesale.
    pub async fn regenerate(
        &self,
        id: DocumentId,
    ) -> Result<(Document, Vec<Clause>), LifecycleError> {
        let _guard = self.lock(id).await;

        let document = self.document(id).await?;
        if !document.status.may_regenerate() {
            return Err(LifecycleError::InvalidState {
                operation: "regenerate",
                expected: "feedback_received",
                actual: document.status,
            });
        }

        let original = self
            .with_retry("fetch original", || {
                self.artifacts.get(&document.original_path)
            })
            .await
            .map_err(LifecycleError::Artifacts)?;
        let text = String::from_utf8_lossy(&original).into_owned();

        let feedback = self
            .repo
            .feedback(id)
            .await
            .map_err(LifecycleError::Repository)?;

        // One similarity lookup per feedback row, as accumulated across
        // regeneration cycles.
        let mut similar: Vec<SimilarMatch> = Vec::new();
        for item in &feedback {
            let vector = self.encode(&item.feedback_text).await?;
            let hits = self
                .with_retry("search feedback", || {
                    self.index
                        .search(&vector, self.policy.top_k, Some(EmbeddingKind::Feedback))
                })
                .await
                .map_err(LifecycleError::Index)?;
            similar.extend(hits);
        }

        let analyses = self
            .engine_call(self.engine.regenerate(&text, &feedback, &similar))
            .await?;

        self.persist_analysis(&document, &original, analyses).await
    }

    /// Validate clauses against similar historical clauses and persist
    /// their scores. `clause_ids = None` validates every clause. Scores
    /// are overwritten on repeat calls; the document status is unchanged.
    pub async fn validate(
        &self,
        id: DocumentId,
        clause_ids: Option<&[ClauseId]>,
    ) -> Result<(Document, Vec<ValidatedClause>), LifecycleError> {
        let _guard = self.lock(id).await;

        let document = self.document(id).await?;
        if !document.status.may_validate() {
            return Err(LifecycleError::InvalidState {
                operation: "validate",
                expected: "redline_ready",
                actual: document.status,
            });
        }

        let mut clauses = self
            .repo
            .clauses(id)
            .await
            .map_err(LifecycleError::Repository)?;
        if let Some(ids) = clause_ids {
            clauses.retain(|c| ids.contains(&c.id));
        }
        if clauses.is_empty() {
            return Err(LifecycleError::NoClauses);
        }

        let mut validated = Vec::with_capacity(clauses.len());
        let mut scores = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let vector = self.encode(&clause.clause_text).await?;
            let similar: Vec<SimilarMatch> = self
                .with_retry("search clauses", || {
                    self.index
                        .search(&vector, self.policy.top_k, Some(EmbeddingKind::Clause))
                })
                .await
                .map_err(LifecycleError::Index)?
                .into_iter()
                // Historical context only: the document's own clauses
                // (including this one) are excluded.
                .filter(|hit| hit.document_id != id)
                .collect();

            let outcome = self
                .engine_call(self.engine.validate(
                    &clause.clause_text,
                    clause.suggested_text.as_deref(),
                    &similar,
                ))
                .await?;

            scores.push((clause.id, outcome.validation_score));
            validated.push(ValidatedClause {
                clause: Clause {
                    validation_score: Some(outcome.validation_score),
                    ..clause
                },
                notes: outcome.notes,
            });
        }

        self.repo
            .apply_validation_scores(id, &scores)
            .await
            .map_err(LifecycleError::Repository)?;

        Ok((document, validated))
    }

    /// Produce the clean artifact from the redline and move to `COMPLETED`.
    ///
    /// Keyed on the presence of a redline artifact rather than a status
    /// value, so a completed document can be re-cleaned.
    pub async fn create_clean(&self, id: DocumentId) -> Result<Document, LifecycleError> {
        let _guard = self.lock(id).await;

        let document = self.document(id).await?;
        let redline_path = document
            .redline_path
            .as_deref()
            .ok_or(LifecycleError::NoRedline(id))?;

        let redline = self
            .with_retry("fetch redline", || self.artifacts.get(redline_path))
            .await
            .map_err(LifecycleError::Artifacts)?;

        let clean = self.engine_call(self.engine.build_clean(&redline)).await?;

        let clean_key = object_key(&document.user_id, id, ArtifactKind::Clean);
        self.with_retry("store clean", || {
            self.artifacts.put(&clean_key, &clean, DOCX_CONTENT_TYPE)
        })
        .await
        .map_err(LifecycleError::Artifacts)?;

        self.repo
            .set_clean(id, &clean_key)
            .await
            .map_err(LifecycleError::Repository)?;

        info!(document = %id, "clean document generated");
        let mut document = document;
        document.clean_path = Some(clean_key);
        document.status = DocumentStatus::Completed;
        Ok(document)
    }

    // ── Internals ──

    /// Analysis body shared by `analyze`; runs with the `ANALYZING` marker
    /// already committed and the per-document lock held.
    async fn run_analysis(
        &self,
        document: &Document,
    ) -> Result<(Document, Vec<Clause>), LifecycleError> {
        let original = self
            .with_retry("fetch original", || {
                self.artifacts.get(&document.original_path)
            })
            .await
            .map_err(LifecycleError::Artifacts)?;
        let text = String::from_utf8_lossy(&original).into_owned();

        let analyses = self.engine_call(self.engine.analyze(&text)).await?;
        self.persist_analysis(document, &original, analyses).await
    }

    /// Common tail of `analyze` and `regenerate`: swap clause embeddings,
    /// build and store the redline, and commit rows + status atomically.
    async fn persist_analysis(
        &self,
        document: &Document,
        original: &[u8],
        analyses: Vec<ClauseAnalysis>,
    ) -> Result<(Document, Vec<Clause>), LifecycleError> {
        let id = document.id;
        let clauses: Vec<Clause> = analyses.iter().map(|a| clause_row(id, a)).collect();

        self.with_retry("drop clause embeddings", || {
            self.index.remove_document(id, EmbeddingKind::Clause)
        })
        .await
        .map_err(LifecycleError::Index)?;

        for clause in &clauses {
            let vector = self.encode(&clause.clause_text).await?;
            self.with_retry("store clause embedding", || {
                self.index.upsert(EmbeddingRecord {
                    id: format!("{id}:{}", clause.id),
                    document_id: id,
                    kind: EmbeddingKind::Clause,
                    text: clause.clause_text.clone(),
                    vector: vector.clone(),
                })
            })
            .await
            .map_err(LifecycleError::Index)?;
        }

        let redline = self
            .engine_call(self.engine.build_redline(original, &analyses))
            .await?;
        let redline_key = object_key(&document.user_id, id, ArtifactKind::Redline);
        self.with_retry("store redline", || {
            self.artifacts.put(&redline_key, &redline, DOCX_CONTENT_TYPE)
        })
        .await
        .map_err(LifecycleError::Artifacts)?;

        self.repo
            .replace_analysis(id, &clauses, &redline_key)
            .await
            .map_err(LifecycleError::Repository)?;

        info!(document = %id, clauses = clauses.len(), "analysis persisted");
        // The transition is committed; build the result from known state so
        // a failed refetch cannot trigger the caller's status rollback.
        let mut document = document.clone();
        document.redline_path = Some(redline_key);
        document.status = DocumentStatus::RedlineReady;
        Ok((document, clauses))
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, LifecycleError> {
        self.engine_call(self.encoder.encode(text)).await
    }

    /// Wrap an engine or encoder call in the timeout budget.
    async fn engine_call<T>(
        &self,
        fut: impl Future<Output = Result<T, PortError>>,
    ) -> Result<T, LifecycleError> {
        match tokio::time::timeout(self.policy.engine_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(LifecycleError::Engine(err)),
            Err(_) => Err(LifecycleError::EngineTimeout(self.policy.engine_timeout)),
        }
    }

    /// Bounded retry with exponential backoff for transient failures.
    async fn with_retry<T, Fut>(
        &self,
        what: &'static str,
        mut op: impl FnMut() -> Fut,
    ) -> Result<T, PortError>
    where
        Fut: Future<Output = Result<T, PortError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.retry_delay * 2u32.pow(attempt - 1);
                    warn!(what, attempt, error = %err, "transient failure, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Per-document transition lock. The registry entry persists for the
    /// process lifetime; document counts are request-scale, not index-scale.
    async fn lock(&self, id: DocumentId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut guards = self.guards.lock().await;
            guards
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

fn clause_row(document_id: DocumentId, analysis: &ClauseAnalysis) -> Clause {
    Clause {
        id: Uuid::new_v4(),
        document_id,
        clause_text: analysis.clause_text.clone(),
        original_text: analysis.original_text.clone(),
        suggested_text: analysis.suggested_text.clone(),
        confidence_score: analysis.confidence_score,
        validation_score: None,
        created_at: chrono::Utc::now(),
    }
}
