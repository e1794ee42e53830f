//! Conversation tracking: Request → Turn → Step records kept for replay and analysis.
//!
//! Records are append-only and never consulted by the orchestration loop's
//! control flow.

use serde::{Deserialize, Serialize};
use std::fmt;

mod ids;
mod records;
mod tracker;

pub use ids::{RequestId, StepId, TurnId};
pub use records::{RequestRecord, StepRecord, TurnRecord};
pub use tracker::{ConversationMetrics, ConversationTracker, LegacyView, TranscriptEntry};

/// Whether a request opened the conversation or followed an earlier one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// First request of the conversation
    Initial,
    /// Any later request
    FollowUp,
}

/// How a run of the orchestration loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Final answer given, or the step limit reached
    Completed,
    /// Suspended on a clarifying question
    Clarification,
    /// Suspended on a question describing an execution failure
    ErrorClarification,
    /// Could not complete the request
    Error,
}

impl OutcomeKind {
    /// Wire name of this outcome
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Clarification => "clarification",
            Self::ErrorClarification => "error_clarification",
            Self::Error => "error",
        }
    }

    /// Whether the request is waiting for the user
    #[must_use]
    pub const fn is_suspended(self) -> bool {
        matches!(self, Self::Clarification | Self::ErrorClarification)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_kind_names() {
        assert_eq!(OutcomeKind::Completed.to_string(), "completed");
        assert_eq!(
            serde_json::to_value(OutcomeKind::ErrorClarification).unwrap(),
            serde_json::json!("error_clarification")
        );
        assert!(OutcomeKind::Clarification.is_suspended());
        assert!(!OutcomeKind::Error.is_suspended());
    }
}
