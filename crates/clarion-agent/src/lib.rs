//! Disambiguation engine of the clarion agent.
//!
//! Scores how certain a proposed set of tool calls is, decides whether a
//! clarifying question is worth asking, and drives the reason / disambiguate /
//! act / observe loop for one conversation.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::float_cmp,
        clippy::indexing_slicing,
        reason = "Allow for tests"
    )
)]

/// Reason / disambiguate / act loop.
pub mod orchestrator;
/// Prompt templates.
pub mod prompts;
/// Candidate questions and selection.
pub mod question;
/// Certainty and regret scoring.
pub mod uncertainty;

pub use orchestrator::{COULD_NOT_COMPLETE, Orchestrator, RunResult, STEP_LIMIT_REACHED};
pub use question::{
    AuditRecord, ClarificationCounters, Evaluation, EvaluationReason, QuestionGenerator,
};
pub use uncertainty::{
    CallCertainty, EPSILON, Regret, SequenceCertainty, UncertaintyCalculator, dynamic_threshold,
    ucb_score,
};
