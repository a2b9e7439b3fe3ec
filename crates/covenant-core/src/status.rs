//! Document review status machine.
//!
//! A document moves through review as a small linear state machine:
//!
//! ```text
//! UPLOADED ──analyze──▶ ANALYZING ──success──▶ REDLINE_READY
//!    ▲                      │                      │  ▲
//!    └───────failure────────┘         feedback ────┘  │
//!                                          │          │
//!                                          ▼          │
//!                                 FEEDBACK_RECEIVED ──┘ (regenerate)
//!
//! REDLINE_READY ──clean──▶ COMPLETED
//! ```
//!
//! ANALYZING is a transient marker: it is written before analysis work
//! starts so concurrent readers can observe an in-flight run, and it is
//! replaced on both success and failure. Clean generation is keyed on the
//! presence of a redline artifact rather than on a status value.

use serde::{Deserialize, Serialize};

/// Review status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Original stored, no analysis yet.
    Uploaded,
    /// Analysis in flight.
    Analyzing,
    /// Analysis complete, redline artifact available.
    RedlineReady,
    /// Feedback recorded, awaiting regeneration.
    FeedbackReceived,
    /// Clean document generated.
    Completed,
}

impl DocumentStatus {
    /// Stable lowercase name, also used as the persisted column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Analyzing => "analyzing",
            Self::RedlineReady => "redline_ready",
            Self::FeedbackReceived => "feedback_received",
            Self::Completed => "completed",
        }
    }

    /// Parse a persisted column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "analyzing" => Some(Self::Analyzing),
            "redline_ready" => Some(Self::RedlineReady),
            "feedback_received" => Some(Self::FeedbackReceived),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Whether `analyze` may start from this status.
    ///
    /// Fresh documents and documents with an existing redline may be
    /// (re-)analysed; in-flight, feedback-pending, and completed documents
    /// may not. Feedback-pending documents go through `regenerate` instead.
    pub fn may_analyze(&self) -> bool {
        matches!(self, Self::Uploaded | Self::RedlineReady)
    }

    /// Whether feedback may be recorded against this status.
    pub fn may_receive_feedback(&self) -> bool {
        matches!(self, Self::RedlineReady)
    }

    /// Whether `regenerate` may start from this status.
    pub fn may_regenerate(&self) -> bool {
        matches!(self, Self::FeedbackReceived)
    }

    /// Whether clauses may be validated in this status.
    pub fn may_validate(&self) -> bool {
        matches!(self, Self::RedlineReady)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
