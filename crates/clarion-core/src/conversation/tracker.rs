//! Append-only conversation tracker with nested and flattened projections.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ids::{RequestId, TurnId};
use super::records::{RequestRecord, StepRecord, TurnRecord};
use super::{OutcomeKind, RequestKind};
use crate::call::ToolCall;
use crate::question::ClarificationQuestion;

/// One line of the flattened transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// `user` or `agent`
    pub role: String,
    /// What was said
    pub message: String,
    /// Entry type, e.g. `request`, `clarification`, `completed`
    pub kind: String,
}

/// Flattened view of the whole conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacyView {
    /// Everything said, in order
    pub transcript: Vec<TranscriptEntry>,
    /// Questions actually put to the user
    pub selected_questions: Vec<ClarificationQuestion>,
    /// Calls that executed successfully
    pub executed_calls: Vec<ToolCall>,
    /// Every call the model proposed
    pub attempted_calls: Vec<ToolCall>,
}

/// Summary counts over a whole conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMetrics {
    /// Turns across every request
    pub turn_count: usize,
    /// Calls the model proposed
    pub tool_call_count: usize,
    /// Questions put to the user
    pub question_count: usize,
    /// Executions that succeeded
    pub successful_execution_count: usize,
}

/// Records every request, turn and step of one conversation
#[derive(Debug, Clone, Default)]
pub struct ConversationTracker {
    /// Requests, oldest first
    requests: Vec<RequestRecord>,
    /// Flattened projection maintained alongside the tree
    legacy: LegacyView,
}

impl ConversationTracker {
    /// Creates an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new request; the first one is initial, later ones are follow-ups
    pub fn begin_request(&mut self, text: &str) -> RequestId {
        let kind = if self.requests.is_empty() {
            RequestKind::Initial
        } else {
            RequestKind::FollowUp
        };
        let record = RequestRecord::new(kind, text.to_owned());
        let id = record.id;
        debug!("Opened {kind:?} request {id}");
        self.requests.push(record);
        self.add_transcript("user", text, "request");
        id
    }

    /// Opens a turn on the current request
    ///
    /// Returns `None` when no request has been opened yet.
    pub fn begin_turn(&mut self, input: &str) -> Option<TurnId> {
        let request = self.requests.last_mut()?;
        let turn = TurnRecord::new(input.to_owned());
        let id = turn.id;
        request.turns.push(turn);
        Some(id)
    }

    /// Appends a finished step to the current turn
    pub fn record_step(&mut self, step: StepRecord) {
        self.legacy
            .attempted_calls
            .extend(step.proposed_calls.iter().cloned());
        for (call, result) in step.proposed_calls.iter().zip(&step.executions) {
            if result.success {
                self.legacy.executed_calls.push(call.clone());
            }
        }
        if let Some(question) = &step.selected_question {
            self.legacy.selected_questions.push(question.clone());
        }

        if let Some(turn) = self.current_turn_mut() {
            turn.steps.push(step);
        }
    }

    /// Closes the current turn with its outcome and the message returned to the caller
    pub fn end_turn(&mut self, outcome: OutcomeKind, message: &str) {
        if let Some(turn) = self.current_turn_mut() {
            turn.outcome = Some(outcome);
            turn.message = Some(message.to_owned());
        }
        self.add_transcript("agent", message, outcome.as_str());
    }

    /// Records a question put to the user outside of a step
    pub fn record_question(&mut self, question: &ClarificationQuestion) {
        self.legacy.selected_questions.push(question.clone());
    }

    /// Appends a transcript entry
    pub fn add_transcript(&mut self, role: &str, message: &str, kind: &str) {
        self.legacy.transcript.push(TranscriptEntry {
            role: role.to_owned(),
            message: message.to_owned(),
            kind: kind.to_owned(),
        });
    }

    /// Nested Request/Turn/Step projection
    #[must_use]
    pub fn requests(&self) -> &[RequestRecord] {
        &self.requests
    }

    /// Flattened projection
    #[must_use]
    pub fn legacy(&self) -> &LegacyView {
        &self.legacy
    }

    /// Summary counts derived from the recorded tree
    #[must_use]
    pub fn metrics(&self) -> ConversationMetrics {
        let turns = self.requests.iter().flat_map(|request| &request.turns);
        let successful_execution_count = turns
            .clone()
            .flat_map(|turn| &turn.steps)
            .flat_map(|step| &step.executions)
            .filter(|result| result.success)
            .count();
        ConversationMetrics {
            turn_count: turns.count(),
            tool_call_count: self.legacy.attempted_calls.len(),
            question_count: self.legacy.selected_questions.len(),
            successful_execution_count,
        }
    }

    /// Request currently open, if any
    #[must_use]
    pub fn current_request(&self) -> Option<&RequestRecord> {
        self.requests.last()
    }

    /// Mutable access to the running turn
    fn current_turn_mut(&mut self) -> Option<&mut TurnRecord> {
        self.requests.last_mut()?.turns.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionResult, FailureKind};

    #[test]
    fn test_request_kinds() {
        let mut tracker = ConversationTracker::new();
        tracker.begin_request("book a flight");
        tracker.begin_request("and a hotel");

        let kinds: Vec<RequestKind> = tracker.requests().iter().map(|req| req.kind).collect();
        assert_eq!(kinds, vec![RequestKind::Initial, RequestKind::FollowUp]);
        assert_eq!(tracker.legacy().transcript.len(), 2);
    }

    #[test]
    fn test_turn_requires_request() {
        let mut tracker = ConversationTracker::new();
        assert!(tracker.begin_turn("orphan").is_none());
    }

    #[test]
    fn test_steps_feed_legacy_view() {
        let mut tracker = ConversationTracker::new();
        tracker.begin_request("book a flight");
        tracker.begin_turn("book a flight");

        let good = ToolCall::new("search").with_argument("query", "SFO");
        let bad = ToolCall::new("book").with_argument("seat", "9Z");
        let mut step = StepRecord::new(1);
        step.proposed_calls = vec![good.clone(), bad];
        step.executions = vec![
            ExecutionResult::success("search", "found", None),
            ExecutionResult::failure("book", "bad seat", FailureKind::Validation),
        ];
        tracker.record_step(step);
        tracker.end_turn(OutcomeKind::Completed, "done");

        let legacy = tracker.legacy();
        assert_eq!(legacy.attempted_calls.len(), 2);
        assert_eq!(legacy.executed_calls, vec![good]);

        let request = tracker.current_request().unwrap();
        assert_eq!(request.turns.len(), 1);
        assert_eq!(request.turns[0].steps.len(), 1);
        assert_eq!(request.outcome(), Some(OutcomeKind::Completed));
        assert_eq!(legacy.transcript.last().unwrap().kind, "completed");
    }

    #[test]
    fn test_metrics_count_the_tree() {
        let mut tracker = ConversationTracker::new();
        assert_eq!(tracker.metrics(), ConversationMetrics::default());

        tracker.begin_request("book a flight");
        tracker.begin_turn("book a flight");
        let mut asking = StepRecord::new(1);
        asking.proposed_calls = vec![ToolCall::new("book").with_unknown("seat")];
        asking.selected_question = Some(ClarificationQuestion::new("q_0", "Which seat?", Vec::new()));
        tracker.record_step(asking);
        tracker.end_turn(OutcomeKind::Clarification, "Which seat?");

        tracker.begin_turn("book a flight\nAnswer: 9A");
        let mut acting = StepRecord::new(2);
        acting.proposed_calls = vec![
            ToolCall::new("book").with_argument("seat", "9A"),
            ToolCall::new("pay").with_argument("card", "visa"),
        ];
        acting.executions = vec![
            ExecutionResult::success("book", "booked", None),
            ExecutionResult::failure("pay", "declined", FailureKind::Execution {
                kind: "declined".to_owned(),
            }),
        ];
        tracker.record_step(acting);
        tracker.end_turn(OutcomeKind::ErrorClarification, "Card declined");

        let metrics = tracker.metrics();
        assert_eq!(metrics.turn_count, 2);
        assert_eq!(metrics.tool_call_count, 3);
        assert_eq!(metrics.question_count, 1);
        assert_eq!(metrics.successful_execution_count, 1);
    }
}
