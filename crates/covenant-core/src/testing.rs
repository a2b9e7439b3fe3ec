//! In-memory fakes for every collaborator port.
//!
//! Enabled for this crate's own tests and, behind the `test-support`
//! feature, for downstream integration tests. The fakes keep the ports'
//! contracts (atomic transitions, dimension checks, cosine ranking) while
//! staying deterministic and dependency-free.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{
    AnalysisEngine, ArtifactStore, ClauseAnalysis, EmbeddingKind, EmbeddingRecord, PortError,
    Repository, SimilarMatch, TextEncoder, ValidationOutcome, VectorIndex,
};
use crate::record::{Clause, ClauseId, Document, DocumentId, Feedback};
use crate::status::DocumentStatus;

// ── Repository ──

#[derive(Default)]
struct RepoInner {
    documents: HashMap<DocumentId, Document>,
    clauses: Vec<Clause>,
    feedback: Vec<Feedback>,
}

/// Hash-map repository with the same transition-atomicity the SQL adapter
/// provides (trivially, since every method runs under one lock).
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<RepoInner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.documents.is_empty()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_document(&self, document: &Document) -> Result<(), PortError> {
        let mut inner = self.inner.lock().await;
        inner.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn document(&self, id: DocumentId) -> Result<Option<Document>, PortError> {
        Ok(self.inner.lock().await.documents.get(&id).cloned())
    }

    async fn set_status(&self, id: DocumentId, status: DocumentStatus) -> Result<(), PortError> {
        let mut inner = self.inner.lock().await;
        let doc = inner
            .documents
            .get_mut(&id)
            .ok_or_else(|| PortError::fatal(format!("document {id} missing")))?;
        doc.status = status;
        doc.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn replace_analysis(
        &self,
        id: DocumentId,
        clauses: &[Clause],
        redline_path: &str,
    ) -> Result<(), PortError> {
        let mut inner = self.inner.lock().await;
        inner.clauses.retain(|c| c.document_id != id);
        inner.clauses.extend_from_slice(clauses);
        let doc = inner
            .documents
            .get_mut(&id)
            .ok_or_else(|| PortError::fatal(format!("document {id} missing")))?;
        doc.redline_path = Some(redline_path.to_string());
        doc.status = DocumentStatus::RedlineReady;
        doc.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn clauses(&self, id: DocumentId) -> Result<Vec<Clause>, PortError> {
        Ok(self
            .inner
            .lock()
            .await
            .clauses
            .iter()
            .filter(|c| c.document_id == id)
            .cloned()
            .collect())
    }

    async fn apply_validation_scores(
        &self,
        id: DocumentId,
        scores: &[(ClauseId, u8)],
    ) -> Result<(), PortError> {
        let mut inner = self.inner.lock().await;
        for clause in inner.clauses.iter_mut().filter(|c| c.document_id == id) {
            if let Some((_, score)) = scores.iter().find(|(cid, _)| *cid == clause.id) {
                clause.validation_score = Some(*score);
            }
        }
        Ok(())
    }

    async fn record_feedback(&self, feedback: &Feedback) -> Result<(), PortError> {
        let mut inner = self.inner.lock().await;
        inner.feedback.push(feedback.clone());
        let id = feedback.document_id;
        let doc = inner
            .documents
            .get_mut(&id)
            .ok_or_else(|| PortError::fatal(format!("document {id} missing")))?;
        doc.status = DocumentStatus::FeedbackReceived;
        doc.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn feedback(&self, id: DocumentId) -> Result<Vec<Feedback>, PortError> {
        Ok(self
            .inner
            .lock()
            .await
            .feedback
            .iter()
            .filter(|f| f.document_id == id)
            .cloned()
            .collect())
    }

    async fn set_clean(&self, id: DocumentId, clean_path: &str) -> Result<(), PortError> {
        let mut inner = self.inner.lock().await;
        let doc = inner
            .documents
            .get_mut(&id)
            .ok_or_else(|| PortError::fatal(format!("document {id} missing")))?;
        doc.clean_path = Some(clean_path.to_string());
        doc.status = DocumentStatus::Completed;
        doc.updated_at = chrono::Utc::now();
        Ok(())
    }
}

// ── Vector index ──

#[derive(Default)]
struct IndexInner {
    records: Vec<EmbeddingRecord>,
    fail_budget: u32,
}

/// Brute-force cosine index with failure injection for retry tests.
pub struct MemoryIndex {
    dim: usize,
    inner: Mutex<IndexInner>,
}

impl MemoryIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            inner: Mutex::new(IndexInner::default()),
        }
    }

    /// Make the next `n` operations fail with a transient error.
    pub async fn fail_next(&self, n: u32) {
        self.inner.lock().await.fail_budget = n;
    }

    pub async fn contains_id(&self, id: &str) -> bool {
        self.inner.lock().await.records.iter().any(|r| r.id == id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_dim(&self, len: usize) -> Result<(), PortError> {
        if len != self.dim {
            return Err(PortError::fatal(format!(
                "embedding dimension {len} does not match index dimension {}",
                self.dim
            )));
        }
        Ok(())
    }
}

fn take_failure(inner: &mut IndexInner) -> Result<(), PortError> {
    if inner.fail_budget > 0 {
        inner.fail_budget -= 1;
        return Err(PortError::transient("index unavailable"));
    }
    Ok(())
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), PortError> {
        self.check_dim(record.vector.len())?;
        let mut inner = self.inner.lock().await;
        take_failure(&mut inner)?;
        inner.records.retain(|r| r.id != record.id);
        inner.records.push(record);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        kind: Option<EmbeddingKind>,
    ) -> Result<Vec<SimilarMatch>, PortError> {
        self.check_dim(vector.len())?;
        let mut inner = self.inner.lock().await;
        take_failure(&mut inner)?;

        let mut hits: Vec<SimilarMatch> = inner
            .records
            .iter()
            .filter(|r| kind.is_none_or(|k| r.kind == k))
            .map(|r| SimilarMatch {
                id: r.id.clone(),
                document_id: r.document_id,
                kind: r.kind,
                text: r.text.clone(),
                score: cosine(vector, &r.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn remove_document(
        &self,
        document_id: DocumentId,
        kind: EmbeddingKind,
    ) -> Result<(), PortError> {
        let mut inner = self.inner.lock().await;
        take_failure(&mut inner)?;
        inner
            .records
            .retain(|r| !(r.document_id == document_id && r.kind == kind));
        Ok(())
    }
}

// ── Artifact store ──

/// Blob map with read-after-write consistency for free.
#[derive(Default)]
pub struct MemoryArtifacts {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.blobs.lock().await.contains_key(path)
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<(), PortError> {
        self.blobs
            .lock()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, PortError> {
        self.blobs
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| PortError::fatal(format!("no artifact at {path}")))
    }

    async fn delete(&self, path: &str) -> Result<(), PortError> {
        self.blobs.lock().await.remove(path);
        Ok(())
    }
}

// ── Text encoder ──

/// Feature-hashing encoder: tokens hash into a fixed number of buckets and
/// the bucket counts are L2-normalised. Deterministic, and texts sharing
/// vocabulary land close together, so cosine ranking behaves like a real
/// sentence encoder at test scale.
pub struct HashingEncoder {
    dim: usize,
}

impl HashingEncoder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a, small and stable across platforms.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x1000_0000_01b3);
        }
        (hash % self.dim as u64) as usize
    }
}

#[async_trait]
impl TextEncoder for HashingEncoder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, PortError> {
        let mut vector = vec![0.0f32; self.dim];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket(&token.to_ascii_lowercase())] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}

// ── Analysis engine ──

/// Deterministic engine: one clause per paragraph, a fixed rewrite marker,
/// similarity-mean validation. Supports failure injection, a configurable
/// per-call delay, and a high-water mark of concurrent `analyze` entries
/// for mutual-exclusion tests.
pub struct StubEngine {
    delay: Duration,
    fail_analyze: AtomicBool,
    current: AtomicUsize,
    max_seen: AtomicUsize,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            fail_analyze: AtomicBool::new(false),
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        }
    }

    /// Make the next `analyze` or `regenerate` call fail.
    pub fn fail_next_analyze(&self) {
        self.fail_analyze.store(true, Ordering::SeqCst);
    }

    /// Highest number of simultaneous `analyze`/`regenerate` entries seen.
    pub fn max_concurrency(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), PortError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_analyze.swap(false, Ordering::SeqCst) {
            self.current.fetch_sub(1, Ordering::SeqCst);
            return Err(PortError::fatal("clause extraction failed"));
        }
        Ok(())
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn split(text: &str, marker: &str) -> Vec<ClauseAnalysis> {
        text.split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| ClauseAnalysis {
                clause_text: p.to_string(),
                original_text: p.to_string(),
                suggested_text: Some(format!("{p} {marker}")),
                confidence_score: 75,
            })
            .collect()
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisEngine for StubEngine {
    async fn analyze(&self, text: &str) -> Result<Vec<ClauseAnalysis>, PortError> {
        self.enter().await?;
        let result = Self::split(text, "(revised)");
        self.exit();
        Ok(result)
    }

    async fn regenerate(
        &self,
        text: &str,
        _feedback: &[Feedback],
        _similar_feedback: &[SimilarMatch],
    ) -> Result<Vec<ClauseAnalysis>, PortError> {
        self.enter().await?;
        let result = Self::split(text, "(revised after feedback)");
        self.exit();
        Ok(result)
    }

    async fn validate(
        &self,
        _clause_text: &str,
        _suggested_text: Option<&str>,
        similar_clauses: &[SimilarMatch],
    ) -> Result<ValidationOutcome, PortError> {
        if similar_clauses.is_empty() {
            return Ok(ValidationOutcome {
                validation_score: 0,
                notes: "no similar clauses available".to_string(),
            });
        }
        let mean: f32 = similar_clauses.iter().map(|m| m.score.max(0.0)).sum::<f32>()
            / similar_clauses.len() as f32;
        Ok(ValidationOutcome {
            validation_score: (mean * 100.0).round().clamp(0.0, 100.0) as u8,
            notes: format!("compared against {} similar clauses", similar_clauses.len()),
        })
    }

    async fn build_redline(
        &self,
        original: &[u8],
        analyses: &[ClauseAnalysis],
    ) -> Result<Vec<u8>, PortError> {
        let mut out = String::from_utf8_lossy(original).into_owned();
        for analysis in analyses {
            if let Some(suggested) = &analysis.suggested_text {
                if suggested != &analysis.original_text {
                    out.push_str(&format!(
                        "\n[[-{}-]][[+{}+]]",
                        analysis.original_text, suggested
                    ));
                }
            }
        }
        Ok(out.into_bytes())
    }

    async fn build_clean(&self, redline: &[u8]) -> Result<Vec<u8>, PortError> {
        let text = String::from_utf8_lossy(redline);
        let cleaned: String = text
            .lines()
            .filter(|line| !line.starts_with("[[-"))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(cleaned.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn hashing_encoder_is_unit_length_and_deterministic() {
        let encoder = HashingEncoder::new(16);
        let a = encoder.encode("confidential information").await.unwrap();
        let b = encoder.encode("confidential information").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn index_ranks_by_cosine_and_filters_kind() {
        let encoder = HashingEncoder::new(16);
        let index = MemoryIndex::new(16);
        let doc = Uuid::new_v4();

        for (id, kind, text) in [
            ("a", EmbeddingKind::Clause, "confidential information clause"),
            ("b", EmbeddingKind::Clause, "governing law of delaware"),
            ("c", EmbeddingKind::Feedback, "confidential information clause"),
        ] {
            index
                .upsert(EmbeddingRecord {
                    id: id.to_string(),
                    document_id: doc,
                    kind,
                    text: text.to_string(),
                    vector: encoder.encode(text).await.unwrap(),
                })
                .await
                .unwrap();
        }

        let query = encoder
            .encode("confidential information clause")
            .await
            .unwrap();
        let hits = index
            .search(&query, 5, Some(EmbeddingKind::Clause))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn index_rejects_dimension_mismatch() {
        let index = MemoryIndex::new(16);
        let err = index.search(&[0.0; 8], 5, None).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn upsert_replaces_same_id() {
        let index = MemoryIndex::new(4);
        let doc = Uuid::new_v4();
        for _ in 0..2 {
            index
                .upsert(EmbeddingRecord {
                    id: "x".to_string(),
                    document_id: doc,
                    kind: EmbeddingKind::Clause,
                    text: "t".to_string(),
                    vector: vec![1.0, 0.0, 0.0, 0.0],
                })
                .await
                .unwrap();
        }
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn stub_engine_clean_strips_markup() {
        let engine = StubEngine::new();
        let analyses = vec![ClauseAnalysis {
            clause_text: "old words".to_string(),
            original_text: "old words".to_string(),
            suggested_text: Some("new words".to_string()),
            confidence_score: 50,
        }];
        let redline = engine.build_redline(b"old words", &analyses).await.unwrap();
        assert!(String::from_utf8_lossy(&redline).contains("[[+new words+]]"));
        let clean = engine.build_clean(&redline).await.unwrap();
        assert!(!String::from_utf8_lossy(&clean).contains("[[-"));
    }
}
