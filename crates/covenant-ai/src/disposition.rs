//! Centroid-based clause disposition.
//!
//! Each disposition label (keep, modify, remove) gets one centroid: the
//! normalised mean of the embeddings of its seed clauses. A clause is
//! classified by cosine similarity to the nearest centroid, and the
//! similarity doubles as the confidence signal.

/// What the review proposes to do with a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acceptable as written.
    Keep,
    /// Should be rewritten.
    Modify,
    /// Should be struck from the document.
    Remove,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Modify => "modify",
            Self::Remove => "remove",
        }
    }
}

/// Labelled seed clauses the disposition centroids are built from.
///
/// Keep: ordinary mutual-NDA boilerplate. Modify: enforceable but
/// overreaching obligations. Remove: provisions that do not belong in an
/// NDA at all.
pub const SEED_CLAUSES: &[(Disposition, &str)] = &[
    (
        Disposition::Keep,
        "Each party shall use the confidential information solely for the purpose of \
         evaluating the proposed business relationship.",
    ),
    (
        Disposition::Keep,
        "Confidential information does not include information that is or becomes publicly \
         available through no fault of the receiving party.",
    ),
    (
        Disposition::Keep,
        "This agreement shall be governed by and construed in accordance with the laws of \
         the state named above.",
    ),
    (
        Disposition::Keep,
        "The receiving party may disclose confidential information when required by law, \
         provided it gives the disclosing party prompt written notice.",
    ),
    (
        Disposition::Modify,
        "The receiving party shall hold all information of the disclosing party in strict \
         confidence in perpetuity without limitation or exception.",
    ),
    (
        Disposition::Modify,
        "All information disclosed by either party, whether or not marked as confidential, \
         shall be deemed confidential information.",
    ),
    (
        Disposition::Modify,
        "The receiving party agrees to indemnify the disclosing party against any and all \
         losses arising in any way from any use of the confidential information.",
    ),
    (
        Disposition::Modify,
        "The obligations of confidentiality shall survive termination of this agreement \
         indefinitely.",
    ),
    (
        Disposition::Remove,
        "The receiving party shall not engage in any business competitive with the \
         disclosing party for a period of five years in any territory.",
    ),
    (
        Disposition::Remove,
        "The receiving party hereby assigns to the disclosing party all inventions \
         conceived during the term of this agreement.",
    ),
    (
        Disposition::Remove,
        "A breach of this agreement shall entitle the disclosing party to a fixed penalty \
         of one million dollars per occurrence.",
    ),
    (
        Disposition::Remove,
        "The receiving party waives all rights to contest the validity of any intellectual \
         property of the disclosing party.",
    ),
];

/// Per-label centroids over clause embeddings.
pub struct DispositionModel {
    centroids: Vec<(Disposition, Vec<f32>)>,
}

impl DispositionModel {
    /// Build centroids from labelled embeddings: per-label mean, then
    /// L2-normalised so dot products are cosine similarities.
    pub fn build(examples: &[(Disposition, Vec<f32>)]) -> Self {
        let mut centroids = Vec::new();
        for label in [Disposition::Keep, Disposition::Modify, Disposition::Remove] {
            let members: Vec<&Vec<f32>> = examples
                .iter()
                .filter(|(l, _)| *l == label)
                .map(|(_, v)| v)
                .collect();
            let Some(first) = members.first() else {
                continue;
            };

            let mut centroid = vec![0.0f32; first.len()];
            for member in &members {
                for (acc, &value) in centroid.iter_mut().zip(member.iter()) {
                    *acc += value;
                }
            }
            for value in &mut centroid {
                *value /= members.len() as f32;
            }
            normalize(&mut centroid);
            centroids.push((label, centroid));
        }
        Self { centroids }
    }

    /// Nearest centroid and its cosine similarity.
    ///
    /// An empty model (no seed embeddings) conservatively keeps the clause
    /// with zero confidence.
    pub fn classify(&self, embedding: &[f32]) -> (Disposition, f32) {
        let mut best = (Disposition::Keep, f32::NEG_INFINITY);
        for (label, centroid) in &self.centroids {
            let sim = cosine(embedding, centroid);
            if sim > best.1 {
                best = (*label, sim);
            }
        }
        if best.1 == f32::NEG_INFINITY {
            return (Disposition::Keep, 0.0);
        }
        best
    }
}

pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small hand-built embeddings, one axis per disposition.
    fn examples() -> Vec<(Disposition, Vec<f32>)> {
        vec![
            (Disposition::Keep, vec![1.0, 0.0, 0.0, 0.0]),
            (Disposition::Keep, vec![0.9, 0.1, 0.0, 0.0]),
            (Disposition::Modify, vec![0.0, 1.0, 0.0, 0.0]),
            (Disposition::Modify, vec![0.1, 0.9, 0.0, 0.0]),
            (Disposition::Remove, vec![0.0, 0.0, 1.0, 0.0]),
        ]
    }

    #[test]
    fn classify_picks_nearest_centroid() {
        let model = DispositionModel::build(&examples());
        let (label, sim) = model.classify(&[0.95, 0.05, 0.0, 0.0]);
        assert_eq!(label, Disposition::Keep);
        assert!(sim > 0.9);

        let (label, _) = model.classify(&[0.0, 0.0, 0.9, 0.1]);
        assert_eq!(label, Disposition::Remove);
    }

    #[test]
    fn centroids_are_unit_length() {
        let model = DispositionModel::build(&examples());
        for (_, centroid) in &model.centroids {
            let norm: f32 = centroid.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn missing_label_is_skipped() {
        let model = DispositionModel::build(&[(Disposition::Keep, vec![1.0, 0.0])]);
        assert_eq!(model.centroids.len(), 1);
        let (label, _) = model.classify(&[1.0, 0.0]);
        assert_eq!(label, Disposition::Keep);
    }

    #[test]
    fn empty_model_keeps_with_zero_confidence() {
        let model = DispositionModel::build(&[]);
        let (label, sim) = model.classify(&[1.0, 0.0]);
        assert_eq!(label, Disposition::Keep);
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn seed_set_covers_every_label() {
        for label in [Disposition::Keep, Disposition::Modify, Disposition::Remove] {
            assert!(SEED_CLAUSES.iter().any(|(l, _)| *l == label));
        }
    }
}
