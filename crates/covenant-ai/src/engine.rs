//! The clause engine: segmentation, disposition, retrieval suggestions,
//! feedback-driven regeneration, and validation scoring behind the
//! [`AnalysisEngine`] port.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use covenant_core::{
    AnalysisEngine, ClauseAnalysis, Feedback, PortError, SimilarMatch, TextEncoder,
    ValidationOutcome,
};

use crate::disposition::{Disposition, DispositionModel, SEED_CLAUSES, cosine};
use crate::library::ClauseLibrary;
use crate::redline::{apply_redline, build_redline};
use crate::segment::segment_clauses;

/// Feedback similarity at which a clause is escalated to a rewrite during
/// regeneration.
const ESCALATION_FLOOR: f32 = 0.35;

/// Clause-level analysis engine over any [`TextEncoder`].
pub struct ClauseEngine {
    encoder: Arc<dyn TextEncoder>,
    dispositions: DispositionModel,
    library: ClauseLibrary,
}

impl ClauseEngine {
    /// Build the engine from the bundled seed clauses and standard-clause
    /// library, embedded with the given encoder.
    pub async fn load(encoder: Arc<dyn TextEncoder>) -> Result<Self, PortError> {
        let mut examples = Vec::with_capacity(SEED_CLAUSES.len());
        for (label, text) in SEED_CLAUSES {
            examples.push((*label, encoder.encode(text).await?));
        }
        let dispositions = DispositionModel::build(&examples);
        let library = ClauseLibrary::load(encoder.as_ref()).await?;
        info!(
            seeds = SEED_CLAUSES.len(),
            library = library.len(),
            "clause engine ready"
        );
        Ok(Self {
            encoder,
            dispositions,
            library,
        })
    }

    /// Build the engine from a custom disposition model and library, for
    /// alternative playbooks.
    pub fn from_parts(
        encoder: Arc<dyn TextEncoder>,
        dispositions: DispositionModel,
        library: ClauseLibrary,
    ) -> Self {
        Self {
            encoder,
            dispositions,
            library,
        }
    }

    /// Disposition and rewrite for one clause embedding.
    fn compose(&self, clause: String, embedding: &[f32]) -> ClauseAnalysis {
        let (disposition, similarity) = self.dispositions.classify(embedding);
        self.compose_with(clause, embedding, disposition, similarity)
    }

    fn compose_with(
        &self,
        clause: String,
        embedding: &[f32],
        disposition: Disposition,
        similarity: f32,
    ) -> ClauseAnalysis {
        let (suggested, confidence) = match disposition {
            Disposition::Keep => (Some(clause.clone()), 100),
            Disposition::Remove => (None, 0),
            Disposition::Modify => {
                let suggested = self
                    .library
                    .suggest(embedding)
                    .map(|(entry, _)| entry.text.to_string())
                    .unwrap_or_else(|| clause.clone());
                (Some(suggested), score_from(similarity))
            }
        };
        debug!(
            disposition = disposition.as_str(),
            confidence, "clause analysed"
        );
        ClauseAnalysis {
            original_text: clause.clone(),
            clause_text: clause,
            suggested_text: suggested,
            confidence_score: confidence,
        }
    }
}

fn score_from(similarity: f32) -> u8 {
    (similarity.clamp(0.0, 1.0) * 100.0).round() as u8
}

#[async_trait]
impl AnalysisEngine for ClauseEngine {
    async fn analyze(&self, text: &str) -> Result<Vec<ClauseAnalysis>, PortError> {
        let clauses = segment_clauses(text);
        let mut analyses = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let embedding = self.encoder.encode(&clause).await?;
            analyses.push(self.compose(clause, &embedding));
        }
        info!(clauses = analyses.len(), "analysis complete");
        Ok(analyses)
    }

    async fn regenerate(
        &self,
        text: &str,
        feedback: &[Feedback],
        similar_feedback: &[SimilarMatch],
    ) -> Result<Vec<ClauseAnalysis>, PortError> {
        // Pool the document's own feedback with similar historical feedback;
        // a clause close to any of it gets rewritten this cycle.
        let mut pool = Vec::with_capacity(feedback.len() + similar_feedback.len());
        for item in feedback {
            pool.push(self.encoder.encode(&item.feedback_text).await?);
        }
        for hit in similar_feedback {
            pool.push(self.encoder.encode(&hit.text).await?);
        }

        let clauses = segment_clauses(text);
        let mut analyses = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let embedding = self.encoder.encode(&clause).await?;
            let feedback_sim = pool
                .iter()
                .map(|fb| cosine(&embedding, fb))
                .fold(f32::NEG_INFINITY, f32::max);

            let analysis = if feedback_sim >= ESCALATION_FLOOR {
                self.compose_with(clause, &embedding, Disposition::Modify, feedback_sim)
            } else {
                self.compose(clause, &embedding)
            };
            analyses.push(analysis);
        }
        info!(
            clauses = analyses.len(),
            feedback = feedback.len(),
            "regeneration complete"
        );
        Ok(analyses)
    }

    async fn validate(
        &self,
        clause_text: &str,
        suggested_text: Option<&str>,
        similar_clauses: &[SimilarMatch],
    ) -> Result<ValidationOutcome, PortError> {
        if similar_clauses.is_empty() {
            return Ok(ValidationOutcome {
                validation_score: 0,
                notes: "no similar clauses available for comparison".to_string(),
            });
        }

        let target = suggested_text.unwrap_or(clause_text);
        let target_embedding = self.encoder.encode(target).await?;

        let mut total = 0.0f32;
        for hit in similar_clauses {
            let hit_embedding = self.encoder.encode(&hit.text).await?;
            total += cosine(&target_embedding, &hit_embedding);
        }
        let mean = total / similar_clauses.len() as f32;

        Ok(ValidationOutcome {
            validation_score: score_from(mean),
            notes: format!(
                "validated against {} similar clauses",
                similar_clauses.len()
            ),
        })
    }

    async fn build_redline(
        &self,
        original: &[u8],
        analyses: &[ClauseAnalysis],
    ) -> Result<Vec<u8>, PortError> {
        let text = String::from_utf8_lossy(original);
        Ok(build_redline(&text, analyses).into_bytes())
    }

    async fn build_clean(&self, redline: &[u8]) -> Result<Vec<u8>, PortError> {
        let text = String::from_utf8_lossy(redline);
        Ok(apply_redline(&text).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::LibraryEntry;
    use covenant_core::testing::HashingEncoder;
    use uuid::Uuid;

    /// Marker-driven encoder: each marker token contributes one axis, so
    /// tests control classification exactly (unknown text lands on a
    /// fourth, neutral axis).
    struct MarkerEncoder;

    #[async_trait]
    impl TextEncoder for MarkerEncoder {
        fn dim(&self) -> usize {
            4
        }

        async fn encode(&self, text: &str) -> Result<Vec<f32>, PortError> {
            let mut v = [0.0f32; 4];
            if text.contains("KEEPME") {
                v[0] = 1.0;
            }
            if text.contains("DROPME") {
                v[1] = 1.0;
            }
            if text.contains("FIXME") {
                v[2] = 1.0;
            }
            if v == [0.0; 4] {
                v[3] = 1.0;
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            Ok(v.iter().map(|x| x / norm).collect())
        }
    }

    async fn marker_engine() -> ClauseEngine {
        let encoder: Arc<dyn TextEncoder> = Arc::new(MarkerEncoder);
        let examples = vec![
            (Disposition::Keep, vec![1.0, 0.0, 0.0, 0.0]),
            (Disposition::Remove, vec![0.0, 1.0, 0.0, 0.0]),
            (Disposition::Modify, vec![0.0, 0.0, 1.0, 0.0]),
        ];
        let model = DispositionModel::build(&examples);
        let library = ClauseLibrary::from_entries(
            encoder.as_ref(),
            &[LibraryEntry {
                topic: "test",
                text: "FIXME replacement wording from the library entry",
            }],
        )
        .await
        .unwrap();
        ClauseEngine::from_parts(encoder, model, library)
    }

    const KEEP_CLAUSE: &str = "KEEPME this clause is acceptable exactly as written today.";
    const DROP_CLAUSE: &str = "DROPME this clause has no business being in the agreement.";
    const FIX_CLAUSE: &str = "FIXME this clause needs to be rewritten before signature.";

    fn doc(parts: &[&str]) -> String {
        parts.join("\n\n")
    }

    #[tokio::test]
    async fn analyze_routes_dispositions() {
        let engine = marker_engine().await;
        let analyses = engine
            .analyze(&doc(&[KEEP_CLAUSE, DROP_CLAUSE, FIX_CLAUSE]))
            .await
            .unwrap();
        assert_eq!(analyses.len(), 3);

        // Keep: clause echoed at full confidence.
        assert_eq!(analyses[0].suggested_text.as_deref(), Some(KEEP_CLAUSE));
        assert_eq!(analyses[0].confidence_score, 100);

        // Remove: no suggested replacement.
        assert!(analyses[1].suggested_text.is_none());
        assert_eq!(analyses[1].confidence_score, 0);

        // Modify: library wording retrieved.
        assert_eq!(
            analyses[2].suggested_text.as_deref(),
            Some("FIXME replacement wording from the library entry")
        );
        assert!(analyses[2].confidence_score > 0);
    }

    #[tokio::test]
    async fn regenerate_escalates_clauses_matching_feedback() {
        let engine = marker_engine().await;
        let doc_id = Uuid::new_v4();
        let feedback = vec![Feedback::new(doc_id, "KEEPME tighten this provision")];

        let analyses = engine
            .regenerate(&doc(&[KEEP_CLAUSE, DROP_CLAUSE]), &feedback, &[])
            .await
            .unwrap();

        // The keep clause matches the feedback and is escalated; with no
        // library entry on its axis the rewrite falls back to the clause.
        assert_eq!(analyses[0].suggested_text.as_deref(), Some(KEEP_CLAUSE));
        assert_eq!(analyses[0].confidence_score, 100);

        // The unrelated clause keeps its base disposition.
        assert!(analyses[1].suggested_text.is_none());
    }

    #[tokio::test]
    async fn regenerate_uses_similar_historical_feedback() {
        let engine = marker_engine().await;
        let similar = vec![SimilarMatch {
            id: "feedback:x:y".to_string(),
            document_id: Uuid::new_v4(),
            kind: covenant_core::EmbeddingKind::Feedback,
            text: "FIXME same complaint from another document".to_string(),
            score: 0.9,
        }];

        // FIX_CLAUSE would be Modify anyway; KEEP_CLAUSE must stay Keep even
        // with historical feedback present, since it sits on another axis.
        let analyses = engine
            .regenerate(&doc(&[KEEP_CLAUSE, FIX_CLAUSE]), &[], &similar)
            .await
            .unwrap();
        assert_eq!(analyses[0].confidence_score, 100);
        assert_eq!(analyses[0].suggested_text.as_deref(), Some(KEEP_CLAUSE));
        assert_eq!(
            analyses[1].suggested_text.as_deref(),
            Some("FIXME replacement wording from the library entry")
        );
    }

    #[tokio::test]
    async fn validate_scores_mean_similarity() {
        let engine = marker_engine().await;
        let similar = vec![
            SimilarMatch {
                id: "a:b".to_string(),
                document_id: Uuid::new_v4(),
                kind: covenant_core::EmbeddingKind::Clause,
                text: "KEEPME historical clause".to_string(),
                score: 1.0,
            },
            SimilarMatch {
                id: "c:d".to_string(),
                document_id: Uuid::new_v4(),
                kind: covenant_core::EmbeddingKind::Clause,
                text: "DROPME unrelated clause".to_string(),
                score: 0.0,
            },
        ];

        let outcome = engine
            .validate(KEEP_CLAUSE, Some(KEEP_CLAUSE), &similar)
            .await
            .unwrap();
        // Mean of cosine 1.0 and 0.0.
        assert_eq!(outcome.validation_score, 50);
        assert!(outcome.notes.contains("2 similar clauses"));
    }

    #[tokio::test]
    async fn validate_without_context_scores_zero() {
        let engine = marker_engine().await;
        let outcome = engine.validate(KEEP_CLAUSE, None, &[]).await.unwrap();
        assert_eq!(outcome.validation_score, 0);
        assert!(outcome.notes.contains("no similar clauses"));
    }

    #[tokio::test]
    async fn redline_and_clean_round_trip() {
        let engine = marker_engine().await;
        let text = doc(&[DROP_CLAUSE, FIX_CLAUSE]);
        let analyses = engine.analyze(&text).await.unwrap();

        let redline = engine
            .build_redline(text.as_bytes(), &analyses)
            .await
            .unwrap();
        let redline_text = String::from_utf8(redline.clone()).unwrap();
        assert!(redline_text.contains("[[-DROPME"));
        assert!(redline_text.contains("[[+FIXME replacement"));

        let clean = engine.build_clean(&redline).await.unwrap();
        let clean_text = String::from_utf8(clean).unwrap();
        assert!(!clean_text.contains("DROPME"));
        assert!(!clean_text.contains("[["));
        assert!(clean_text.contains("FIXME replacement wording from the library entry"));
    }

    #[tokio::test]
    async fn loads_from_bundled_seeds() {
        // Smoke-check the real seed path with the hashing encoder.
        let encoder: Arc<dyn TextEncoder> = Arc::new(HashingEncoder::new(128));
        let engine = ClauseEngine::load(encoder).await.unwrap();
        let analyses = engine
            .analyze(
                "1. Each party shall use the confidential information solely for the stated purpose.\n",
            )
            .await
            .unwrap();
        assert_eq!(analyses.len(), 1);
        assert!(analyses[0].confidence_score <= 100);
    }
}
