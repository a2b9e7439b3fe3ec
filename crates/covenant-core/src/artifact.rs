//! Artifact naming for the document store.
//!
//! Storage paths are deterministic functions of `(user, document, kind)`,
//! not content hashes: re-saving an artifact of the same kind overwrites
//! the previous version at the same key.

use crate::record::DocumentId;

/// MIME type for `.docx` payloads.
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// The three artifact variants a document can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The uploaded document, unmodified.
    Original,
    /// Tracked-change variant with proposed edits.
    Redline,
    /// Variant with accepted edits applied and markup removed.
    Clean,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Redline => "redline",
            Self::Clean => "clean",
        }
    }
}

/// Storage key for one artifact: `{user}/{document}/{kind}.docx`.
pub fn object_key(user_id: &str, document_id: DocumentId, kind: ArtifactKind) -> String {
    format!("{user_id}/{document_id}/{}.docx", kind.as_str())
}
