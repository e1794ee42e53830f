//! Core types and traits for the clarion disambiguation agent.
//!
//! This crate provides the tool/argument data model, error handling,
//! configuration, the language model trait and conversation tracking
//! used across the workspace.
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
        reason = "Allow for tests"
    )
)]

/// Tool calls and the unknown sentinel.
pub mod call;
/// Agent configuration.
pub mod config;
/// Request/Turn/Step tracking.
pub mod conversation;
/// Argument domains.
pub mod domain;
/// Error types and result definitions.
pub mod error;
/// Normalized execution results.
pub mod execution;
/// Lenient JSON parsing of model output.
pub mod json;
/// Clarifying questions.
pub mod question;
/// Poison-tolerant lock helpers.
pub mod sync;
/// Tool and argument definitions.
pub mod tool;
/// Trait definitions for language model services.
pub mod traits;

pub use call::{ArgumentState, RESOLVED, ToolCall, UNKNOWN, is_unknown};
pub use config::{
    AgentConfig, ExecutionConfig, LlmConfig, LoggingConfig, ProviderKind, QuestionConfig,
};
pub use conversation::{
    ConversationMetrics, ConversationTracker, LegacyView, OutcomeKind, RequestKind, RequestRecord,
};
pub use domain::{ArgumentDomain, DomainKind, DomainSize};
pub use error::{Error, Result};
pub use execution::{ExecutionResult, FailureKind};
pub use json::{JsonOutcome, parse_json_output};
pub use question::{ArgRef, ClarificationQuestion, QuestionMetrics};
pub use sync::{IgnoreLock, IgnoreRwLock};
pub use tool::{Argument, FINAL_ANSWER_ARG, FINAL_ANSWER_TOOL, Tool, ToolOrigin};
pub use traits::{GenerationParams, LanguageModel};
