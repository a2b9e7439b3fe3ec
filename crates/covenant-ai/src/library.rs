//! Standard-clause library for rewrite suggestions.
//!
//! Rewrites are retrieved, not generated: a clause marked for modification
//! gets the preferred wording of the nearest library entry, provided the
//! match clears a similarity floor. Entries carry market-standard NDA
//! language curated for balanced, mutual agreements.

use covenant_core::{PortError, TextEncoder};

use crate::disposition::cosine;

/// Minimum cosine similarity before a library entry is offered.
const SUGGESTION_FLOOR: f32 = 0.15;

/// One preferred wording, keyed by topic.
#[derive(Debug, Clone, Copy)]
pub struct LibraryEntry {
    pub topic: &'static str,
    pub text: &'static str,
}

pub const STANDARD_CLAUSES: &[LibraryEntry] = &[
    LibraryEntry {
        topic: "definition",
        text: "Confidential information means non-public information that is designated as \
               confidential at the time of disclosure or that a reasonable person would \
               understand to be confidential from its nature and the circumstances of \
               disclosure.",
    },
    LibraryEntry {
        topic: "term",
        text: "The obligations of confidentiality shall remain in effect for a period of \
               three (3) years from the date of disclosure.",
    },
    LibraryEntry {
        topic: "use-restriction",
        text: "The receiving party shall use the confidential information solely for the \
               purpose stated in this agreement and shall not disclose it to any third \
               party other than employees and advisers with a need to know.",
    },
    LibraryEntry {
        topic: "standard-of-care",
        text: "The receiving party shall protect the confidential information with the same \
               degree of care it uses for its own confidential information, and no less \
               than reasonable care.",
    },
    LibraryEntry {
        topic: "compelled-disclosure",
        text: "The receiving party may disclose confidential information to the extent \
               required by law, provided it gives the disclosing party prompt written \
               notice and reasonable cooperation in seeking protective treatment.",
    },
    LibraryEntry {
        topic: "return-destruction",
        text: "Upon written request, the receiving party shall promptly return or destroy \
               all confidential information and, on request, certify destruction in \
               writing.",
    },
    LibraryEntry {
        topic: "remedies",
        text: "The disclosing party may seek injunctive relief for any threatened or actual \
               breach, in addition to any other remedies available at law or in equity.",
    },
    LibraryEntry {
        topic: "no-licence",
        text: "No licence or other right to confidential information or intellectual \
               property is granted under this agreement except the limited right to use it \
               for the stated purpose.",
    },
];

struct EmbeddedEntry {
    entry: LibraryEntry,
    vector: Vec<f32>,
}

/// The library with its entries embedded for nearest-neighbour lookup.
pub struct ClauseLibrary {
    entries: Vec<EmbeddedEntry>,
}

impl ClauseLibrary {
    /// Embed the standard clause set with the given encoder.
    pub async fn load(encoder: &dyn TextEncoder) -> Result<Self, PortError> {
        Self::from_entries(encoder, STANDARD_CLAUSES).await
    }

    /// Embed a custom entry set; used for alternative playbooks and tests.
    pub async fn from_entries(
        encoder: &dyn TextEncoder,
        entries: &[LibraryEntry],
    ) -> Result<Self, PortError> {
        let mut embedded = Vec::with_capacity(entries.len());
        for entry in entries {
            embedded.push(EmbeddedEntry {
                entry: *entry,
                vector: encoder.encode(entry.text).await?,
            });
        }
        Ok(Self { entries: embedded })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Preferred wording of the nearest entry above the similarity floor.
    pub fn suggest(&self, embedding: &[f32]) -> Option<(&LibraryEntry, f32)> {
        let mut best: Option<(&LibraryEntry, f32)> = None;
        for candidate in &self.entries {
            let sim = cosine(embedding, &candidate.vector);
            if best.is_none_or(|(_, s)| sim > s) {
                best = Some((&candidate.entry, sim));
            }
        }
        best.filter(|(_, sim)| *sim >= SUGGESTION_FLOOR)
    }
}
