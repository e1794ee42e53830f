//! The reason / disambiguate / act / observe loop.
//!
//! One [`Orchestrator`] serves one conversation. A request runs until the
//! model gives a final answer, the step limit is hit, a question has to be
//! put to the user, or the model cannot be reached. A suspended request is
//! resumed by answering through [`Orchestrator::apply_clarification`] and
//! calling [`Orchestrator::run`] with the enriched text.

use std::collections::BTreeMap;
use std::sync::Arc;

use clarion_core::conversation::StepRecord;
use clarion_core::{
    AgentConfig, ClarificationQuestion, ConversationMetrics, ConversationTracker, ExecutionConfig,
    ExecutionResult, FINAL_ANSWER_ARG, GenerationParams, LanguageModel, LegacyView, OutcomeKind,
    QuestionConfig, RequestRecord, ToolCall,
};
use clarion_tooling::{ToolExecutor, ToolRegistry};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::prompts;
use crate::question::{AuditRecord, ClarificationCounters, QuestionGenerator};

/// Message returned when the model cannot be reached.
pub const COULD_NOT_COMPLETE: &str = "I could not complete the request.";
/// Message returned when the step limit ends a request.
pub const STEP_LIMIT_REACHED: &str = "Reached the step limit before a final answer.";

/// Observation recorded when the model proposes nothing usable.
const NO_CALLS_OBSERVATION: &str =
    "No tool call was proposed. Choose one of the available tools or provide the final answer.";

/// Outcome of one [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    /// Whether the request completed
    pub success: bool,
    /// Final answer, question or failure message for the user
    pub message: String,
    /// How the run ended
    #[serde(rename = "type")]
    pub kind: OutcomeKind,
    /// Question put to the user, when suspended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<ClarificationQuestion>,
    /// Steps used by the request so far
    pub steps_taken: usize,
    /// Answer text from the final-answer action, if one ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

/// Working state of the request being served.
#[derive(Debug, Clone)]
struct ActiveRequest {
    /// Text as the user first wrote it
    original: String,
    /// Text the model reasons over, including clarifications
    text: String,
    /// Observations fed back into reasoning
    observations: Vec<String>,
    /// Most recent proposal
    calls: Vec<ToolCall>,
    /// Argument values settled by the user, per tool
    resolved: BTreeMap<String, Map<String, Value>>,
    /// Question awaiting an answer
    pending: Option<ClarificationQuestion>,
    /// Whether the pending question has been answered
    answered: bool,
    /// Steps used so far
    steps_taken: usize,
}

impl ActiveRequest {
    /// Fresh state for a new request.
    fn new(text: &str) -> Self {
        Self {
            original: text.to_owned(),
            text: text.to_owned(),
            observations: Vec::new(),
            calls: Vec::new(),
            resolved: BTreeMap::new(),
            pending: None,
            answered: false,
            steps_taken: 0,
        }
    }

    /// Fills arguments settled by the user into a new proposal.
    ///
    /// Only arguments the proposal omits or leaves unknown are filled.
    fn fill_resolved(&self, calls: &mut [ToolCall]) {
        for call in calls {
            let Some(values) = self.resolved.get(&call.tool_name) else {
                continue;
            };
            for (name, value) in values {
                if !call.is_known(name) {
                    debug!("Filling resolved {}.{name}", call.tool_name);
                    call.arguments.insert(name.clone(), value.clone());
                }
            }
        }
    }

    /// Remembers the arguments an answer settled.
    ///
    /// Only values that are known in `answered` and were missing, unknown or
    /// different in the current proposal count; values the model proposed on
    /// its own are left out.
    fn remember_answer(&mut self, answered: &[ToolCall]) {
        for call in answered {
            let previous = self.calls.iter().find(|prior| prior.tool_name == call.tool_name);
            let settled: Map<String, Value> = call
                .execution_parameters()
                .into_iter()
                .filter(|(name, value)| {
                    previous.is_none_or(|prior| {
                        !prior.is_known(name) || prior.arguments.get(name) != Some(value)
                    })
                })
                .collect();
            if settled.is_empty() {
                continue;
            }
            debug!("Answer settled {:?} on {}", settled.keys().collect::<Vec<_>>(), call.tool_name);
            self.resolved
                .entry(call.tool_name.clone())
                .or_default()
                .extend(settled);
        }
    }
}

/// What the model proposed in one REASON step.
struct Proposal {
    /// Reasoning text
    reasoning: String,
    /// Parsed calls
    calls: Vec<ToolCall>,
}

/// How the ACT phase of a step ended.
enum ActOutcome {
    /// All calls ran; keep looping
    Continue,
    /// The final-answer action ran
    Finished(String),
    /// A retryable failure; re-reason
    Retry,
    /// A failure the user has to help with
    Failed(ToolCall, ExecutionResult),
}

/// Drives one conversation through the reason / disambiguate / act loop.
pub struct Orchestrator {
    /// Model proposing calls
    llm: Arc<dyn LanguageModel>,
    /// Tool definitions
    registry: Arc<ToolRegistry>,
    /// Dispatches calls to plugins
    executor: ToolExecutor,
    /// Question generation and selection
    questions: QuestionGenerator,
    /// Thresholds and limits for questions
    question_settings: QuestionConfig,
    /// Step limit and retry policy
    execution: ExecutionConfig,
    /// Sampling parameters for reasoning
    params: GenerationParams,
    /// Request/Turn/Step records
    tracker: ConversationTracker,
    /// Request being served, kept while suspended
    active: Option<ActiveRequest>,
}

impl Orchestrator {
    /// Creates an orchestrator for one conversation.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        config: &AgentConfig,
    ) -> Self {
        let params = config.llm.generation_params();
        Self {
            questions: QuestionGenerator::new(
                Arc::clone(&llm),
                Arc::clone(&registry),
                config.question.clone(),
                params,
            ),
            executor: ToolExecutor::new(Arc::clone(&registry)),
            llm,
            registry,
            question_settings: config.question.clone(),
            execution: config.execution.clone(),
            params,
            tracker: ConversationTracker::new(),
            active: None,
        }
    }

    /// Overrides the per-request step limit.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.execution.max_steps = max_steps;
        self
    }

    /// Runs the loop for `request_text`.
    ///
    /// `context` is offered to the plugins for domain updates first. If the
    /// previous request is suspended and its question has been answered, the
    /// run resumes that request with `request_text` as the enriched text;
    /// otherwise a new request is opened.
    pub async fn run(&mut self, request_text: &str, context: &Map<String, Value>) -> RunResult {
        let updated = self.registry.apply_context(context);
        if updated > 0 {
            info!("Context updated {updated} argument domains");
        }

        let mut state = match self.active.take() {
            Some(mut state) if state.answered => {
                info!("Resuming request after clarification");
                state.answered = false;
                state.pending = None;
                request_text.clone_into(&mut state.text);
                state
            }
            previous => {
                if previous.is_some() {
                    info!("Abandoning unanswered question for a new request");
                }
                self.tracker.begin_request(request_text);
                ActiveRequest::new(request_text)
            }
        };
        self.tracker.begin_turn(&state.text);

        while state.steps_taken < self.execution.max_steps {
            state.steps_taken += 1;
            let mut step = StepRecord::new(state.steps_taken);
            info!("Step {}/{}", state.steps_taken, self.execution.max_steps);

            // REASON
            let Some(proposal) = self.reason(&state).await else {
                step.observation = Some(COULD_NOT_COMPLETE.to_owned());
                self.tracker.record_step(step);
                return self.finish(state, OutcomeKind::Error, COULD_NOT_COMPLETE.to_owned(), None, None);
            };
            step.reasoning = proposal.reasoning;
            let mut calls = proposal.calls;
            if calls.is_empty() {
                warn!("Model proposed no usable calls");
                state.observations.push(NO_CALLS_OBSERVATION.to_owned());
                step.observation = Some(NO_CALLS_OBSERVATION.to_owned());
                self.tracker.record_step(step);
                continue;
            }
            state.fill_resolved(&mut calls);

            // DISAMBIGUATE
            let certainty = self
                .questions
                .calculator()
                .sequence_certainty(&mut calls)
                .certainty;
            step.certainty = certainty;
            step.proposed_calls.clone_from(&calls);
            state.calls.clone_from(&calls);
            debug!("Sequence certainty {certainty:.4}");

            if certainty < self.question_settings.certainty_threshold {
                let candidates = self
                    .questions
                    .generate_candidates(
                        &state.text,
                        &calls,
                        self.question_settings.max_candidates,
                        &state.observations,
                    )
                    .await;
                let evaluation = self.questions.evaluate(candidates, &calls);
                step.candidates = evaluation.candidates;
                if let Some(question) = evaluation.selected {
                    self.questions.record_selection(&question);
                    step.selected_question = Some(question.clone());
                    self.tracker.record_step(step);
                    return self.suspend(state, question, OutcomeKind::Clarification);
                }
                debug!("No question selected ({:?}); acting", evaluation.reason);
            }

            // ACT
            let outcome = self.act(&calls, &mut state, &mut step).await;
            self.tracker.record_step(step);
            match outcome {
                ActOutcome::Continue | ActOutcome::Retry => {}
                ActOutcome::Finished(answer) => {
                    info!("Final answer after {} steps", state.steps_taken);
                    return self.finish(
                        state,
                        OutcomeKind::Completed,
                        answer.clone(),
                        None,
                        Some(answer),
                    );
                }
                ActOutcome::Failed(call, result) => {
                    let question = self
                        .questions
                        .error_clarification(&state.text, &call, &result)
                        .await;
                    self.questions.record_selection(&question);
                    self.tracker.record_question(&question);
                    return self.suspend(state, question, OutcomeKind::ErrorClarification);
                }
            }
        }

        warn!(
            "Step limit of {} reached without a final answer",
            self.execution.max_steps
        );
        self.finish(
            state,
            OutcomeKind::Completed,
            STEP_LIMIT_REACHED.to_owned(),
            None,
            None,
        )
    }

    /// Applies the user's answer to the pending question.
    ///
    /// The answer is interpreted into argument values that are kept for the
    /// rest of the request. Returns the enriched request text to pass to the
    /// next [`Orchestrator::run`].
    pub async fn apply_clarification(&mut self, original_request: &str, answer: &str) -> String {
        self.tracker.add_transcript("user", answer, "clarification_answer");
        let Some(state) = self.active.as_mut() else {
            warn!("Clarification received with no suspended request");
            return format!("{original_request}\nAnswer: {answer}");
        };
        let Some(question) = state.pending.clone() else {
            warn!("Clarification received with no pending question");
            return format!("{original_request}\nAnswer: {answer}");
        };

        let updated = self
            .questions
            .apply_user_response(&question, answer, &state.calls)
            .await;
        state.remember_answer(&updated);
        state.calls = updated;
        state.answered = true;
        state.text = format!(
            "{original_request}\nClarification: {}\nAnswer: {answer}",
            question.text
        );
        debug!("Enriched request: {}", state.text);
        state.text.clone()
    }

    /// Nested Request/Turn/Step projection.
    #[must_use]
    pub fn conversation_tree(&self) -> &[RequestRecord] {
        self.tracker.requests()
    }

    /// Flattened transcript projection.
    #[must_use]
    pub fn legacy_view(&self) -> &LegacyView {
        self.tracker.legacy()
    }

    /// Summary counts for this conversation.
    #[must_use]
    pub fn metrics(&self) -> ConversationMetrics {
        self.tracker.metrics()
    }

    /// Every candidate question scored in this conversation, selected or not.
    #[must_use]
    pub fn audit_log(&self) -> &[AuditRecord] {
        self.questions.audit_log()
    }

    /// Clarification counts for this conversation.
    #[must_use]
    pub fn counters(&self) -> &ClarificationCounters {
        self.questions.counters()
    }

    /// Text of the request being served, as the user first wrote it.
    #[must_use]
    pub fn active_request(&self) -> Option<&str> {
        self.active.as_ref().map(|state| state.original.as_str())
    }

    /// Asks the model for the next calls.
    ///
    /// Returns `None` only when the model could not be reached; malformed
    /// output yields an empty proposal.
    async fn reason(&self, state: &ActiveRequest) -> Option<Proposal> {
        let prompt = prompts::reasoning_prompt(
            &state.text,
            &state.observations,
            &self.registry.render_documentation(),
        );
        let outcome = self
            .llm
            .generate_json(
                &prompt,
                &prompts::reasoning_schema(),
                &self.params,
                prompts::reasoning_default(),
            )
            .await;
        if let Some(err) = &outcome.transport_error {
            error!("Reasoning failed: {err}");
            return None;
        }
        if outcome.fallback_used {
            warn!("Reasoning output was malformed; using an empty proposal");
        }

        let reasoning = outcome
            .value
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let calls = outcome
            .value
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(ToolCall::from_json).collect())
            .unwrap_or_default();
        Some(Proposal { reasoning, calls })
    }

    /// Executes `calls` in order, stopping at the first failure or final answer.
    async fn act(
        &self,
        calls: &[ToolCall],
        state: &mut ActiveRequest,
        step: &mut StepRecord,
    ) -> ActOutcome {
        for call in calls {
            let result = self.executor.execute(call).await;
            step.executions.push(result.clone());

            if result.success {
                if call.is_final_answer() {
                    let answer = call
                        .arguments
                        .get(FINAL_ANSWER_ARG)
                        .and_then(Value::as_str)
                        .map_or_else(|| result.message.clone(), str::to_owned);
                    return ActOutcome::Finished(answer);
                }
                let observation = format!("{} succeeded: {}", call.tool_name, result.message);
                debug!("Observation: {observation}");
                state.observations.push(observation.clone());
                step.observation = Some(observation);
                continue;
            }

            let label = result
                .failure
                .as_ref()
                .map_or("unknown", |failure| failure.label())
                .to_owned();
            if result.is_recoverable(&self.execution.recoverable_errors) {
                warn!("{} failed with recoverable {label}: {}", call.tool_name, result.message);
                let observation = format!(
                    "{} failed ({label}): {}. Try again or choose a different approach.",
                    call.tool_name, result.message
                );
                state.observations.push(observation.clone());
                step.observation = Some(observation);
                return ActOutcome::Retry;
            }

            warn!("{} failed with {label}: {}", call.tool_name, result.message);
            step.observation = Some(format!("{} failed ({label})", call.tool_name));
            return ActOutcome::Failed(call.clone(), result);
        }
        ActOutcome::Continue
    }

    /// Suspends the request on `question`.
    fn suspend(
        &mut self,
        mut state: ActiveRequest,
        question: ClarificationQuestion,
        kind: OutcomeKind,
    ) -> RunResult {
        info!("Asking the user ({kind}): {}", question.text);
        state.pending = Some(question.clone());
        state.answered = false;
        let message = question.text.clone();
        self.finish(state, kind, message, Some(question), None)
    }

    /// Closes the turn and builds the result.
    fn finish(
        &mut self,
        state: ActiveRequest,
        kind: OutcomeKind,
        message: String,
        question: Option<ClarificationQuestion>,
        final_answer: Option<String>,
    ) -> RunResult {
        self.tracker.end_turn(kind, &message);
        let steps_taken = state.steps_taken;
        self.active = kind.is_suspended().then_some(state);
        RunResult {
            success: kind == OutcomeKind::Completed,
            message,
            kind,
            question,
            steps_taken,
            final_answer,
        }
    }
}
