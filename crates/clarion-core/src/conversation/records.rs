//! Request, turn and step records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{RequestId, StepId, TurnId};
use super::{OutcomeKind, RequestKind};
use crate::call::ToolCall;
use crate::execution::ExecutionResult;
use crate::question::ClarificationQuestion;

/// One user utterance and everything the agent did about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Unique identifier
    pub id: RequestId,
    /// Initial or follow-up
    pub kind: RequestKind,
    /// Request text as the user wrote it
    pub text: String,
    /// When the request was opened
    pub started_at: DateTime<Utc>,
    /// Turns run for this request, oldest first
    pub turns: Vec<TurnRecord>,
}

impl RequestRecord {
    /// Creates an empty request record
    pub fn new(kind: RequestKind, text: String) -> Self {
        Self {
            id: RequestId::new(),
            kind,
            text,
            started_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    /// Outcome of the most recent turn, if it has finished
    #[must_use]
    pub fn outcome(&self) -> Option<OutcomeKind> {
        self.turns.last()?.outcome
    }
}

/// One run of the loop for a request, ending in an outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Unique identifier
    pub id: TurnId,
    /// Request text the turn reasoned over (including clarifications)
    pub input: String,
    /// Steps taken, oldest first
    pub steps: Vec<StepRecord>,
    /// How the turn ended; `None` while running
    pub outcome: Option<OutcomeKind>,
    /// Message returned to the caller
    pub message: Option<String>,
}

impl TurnRecord {
    /// Creates an empty, running turn
    pub fn new(input: String) -> Self {
        Self {
            id: TurnId::new(),
            input,
            steps: Vec::new(),
            outcome: None,
            message: None,
        }
    }
}

/// One REASON + DISAMBIGUATE + ACT cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Unique identifier
    pub id: StepId,
    /// Position within the request, starting at 1
    pub index: usize,
    /// Model's reasoning text, if any
    pub reasoning: String,
    /// Calls the model proposed
    pub proposed_calls: Vec<ToolCall>,
    /// Sequence certainty of the proposal
    pub certainty: f64,
    /// Every candidate question scored in this step
    pub candidates: Vec<ClarificationQuestion>,
    /// Question selected for the user, if any
    pub selected_question: Option<ClarificationQuestion>,
    /// Results of executed calls
    pub executions: Vec<ExecutionResult>,
    /// Observation fed back into the next REASON
    pub observation: Option<String>,
    /// When the step finished
    pub finished_at: DateTime<Utc>,
}

impl StepRecord {
    /// Creates an empty step record at the given position
    pub fn new(index: usize) -> Self {
        Self {
            id: StepId::new(),
            index,
            reasoning: String::new(),
            proposed_calls: Vec::new(),
            certainty: 0.0,
            candidates: Vec::new(),
            selected_question: None,
            executions: Vec::new(),
            observation: None,
            finished_at: Utc::now(),
        }
    }
}
