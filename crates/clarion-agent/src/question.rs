//! Candidate question generation, scoring and selection.

use std::collections::BTreeMap;
use std::sync::Arc;

use clarion_core::{
    ArgRef, ClarificationQuestion, ExecutionResult, GenerationParams, LanguageModel,
    QuestionConfig, QuestionMetrics, ToolCall,
};
use clarion_tooling::ToolRegistry;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::prompts::{self, UncertainArgument};
use crate::uncertainty::{UncertaintyCalculator, dynamic_threshold, ucb_score};

/// How many times each argument has been asked about.
///
/// Counts only ever grow for the lifetime of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClarificationCounters {
    /// Count per `"tool.arg"`
    per_arg: BTreeMap<String, u32>,
    /// Questions asked in total
    total: u32,
}

impl ClarificationCounters {
    /// Records one question aimed at `targets`.
    pub fn record(&mut self, targets: &[ArgRef]) {
        for target in targets {
            *self.per_arg.entry(target.key()).or_insert(0) += 1;
        }
        self.total += 1;
    }

    /// Count for one `"tool.arg"` key.
    #[must_use]
    pub fn count(&self, key: &str) -> u32 {
        self.per_arg.get(key).copied().unwrap_or(0)
    }

    /// Counts per argument.
    #[must_use]
    pub fn per_arg(&self) -> &BTreeMap<String, u32> {
        &self.per_arg
    }

    /// Questions asked in total.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }
}

/// Why an evaluation did or did not select a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
    /// Nothing to choose from
    NoCandidates,
    /// The calls are already certain enough
    CertaintyReached,
    /// The best candidate scored below the dynamic threshold
    BelowThreshold,
    /// A question was selected
    Selected,
}

/// Result of scoring a batch of candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Question to ask, if any
    pub selected: Option<ClarificationQuestion>,
    /// Why
    pub reason: EvaluationReason,
    /// Sequence certainty of the calls
    pub overall_certainty: f64,
    /// Threshold the best candidate had to reach
    pub dynamic_threshold: f64,
    /// Questions asked before this evaluation
    pub total_clarifications: u32,
    /// Scored candidates, best first; empty when scoring was skipped
    pub candidates: Vec<ClarificationQuestion>,
}

/// One scored candidate kept for later analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// The candidate with its metrics
    pub question: ClarificationQuestion,
    /// Sequence certainty when it was scored
    pub overall_certainty: f64,
    /// Whether it was put to the user
    pub selected: bool,
}

/// Generates clarifying questions with the model and decides which one, if
/// any, is worth asking.
pub struct QuestionGenerator {
    /// Model used to phrase questions and interpret answers
    llm: Arc<dyn LanguageModel>,
    /// Tool definitions
    registry: Arc<ToolRegistry>,
    /// Certainty arithmetic
    calculator: UncertaintyCalculator,
    /// Thresholds and limits
    settings: QuestionConfig,
    /// Per-conversation clarification counts
    counters: ClarificationCounters,
    /// Every candidate ever scored
    audit: Vec<AuditRecord>,
    /// Sampling parameters for model requests
    params: GenerationParams,
}

impl QuestionGenerator {
    /// Creates a generator with empty counters.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        settings: QuestionConfig,
        params: GenerationParams,
    ) -> Self {
        Self {
            llm,
            calculator: UncertaintyCalculator::new(Arc::clone(&registry)),
            registry,
            settings,
            counters: ClarificationCounters::default(),
            audit: Vec::new(),
            params,
        }
    }

    /// Calculator over the same registry.
    #[must_use]
    pub fn calculator(&self) -> &UncertaintyCalculator {
        &self.calculator
    }

    /// Clarification counts so far.
    #[must_use]
    pub fn counters(&self) -> &ClarificationCounters {
        &self.counters
    }

    /// Every candidate scored so far, oldest first.
    #[must_use]
    pub fn audit_log(&self) -> &[AuditRecord] {
        &self.audit
    }

    /// Arguments whose certainty is below the configured cutoff.
    pub fn uncertain_arguments(&self, calls: &[ToolCall]) -> Vec<UncertainArgument> {
        let mut found: Vec<UncertainArgument> = Vec::new();
        for call in calls {
            let mut scored = call.clone();
            let certainty = self.calculator.call_certainty(&mut scored);
            for (name, arg_certainty) in certainty.arguments {
                if arg_certainty >= self.settings.uncertain_cutoff {
                    continue;
                }
                let target = ArgRef::new(call.tool_name.clone(), name);
                if found.iter().any(|arg| arg.target == target) {
                    continue;
                }
                let Some(argument) = self.registry.argument(target.tool(), target.arg()) else {
                    continue;
                };
                found.push(UncertainArgument {
                    domain: argument.domain.to_string(),
                    description: argument.description,
                    certainty: arg_certainty,
                    target,
                });
            }
        }
        found
    }

    /// Asks the model for up to `max_questions` candidates about the uncertain
    /// arguments of `calls`.
    ///
    /// Returns nothing without calling the model when no argument is uncertain.
    /// Candidates with empty text or no well-formed targets are dropped.
    pub async fn generate_candidates(
        &self,
        request: &str,
        calls: &[ToolCall],
        max_questions: usize,
        history: &[String],
    ) -> Vec<ClarificationQuestion> {
        let uncertain = self.uncertain_arguments(calls);
        if uncertain.is_empty() || max_questions == 0 {
            debug!("No uncertain arguments; skipping question generation");
            return Vec::new();
        }

        let prompt = prompts::question_prompt(request, history, calls, &uncertain, max_questions);
        let outcome = self
            .llm
            .generate_json(
                &prompt,
                &prompts::questions_schema(),
                &self.params,
                json!({"questions": []}),
            )
            .await;
        if outcome.fallback_used {
            warn!("Question generation fell back to no candidates");
        }

        let mut accepted = Vec::new();
        let entries = outcome
            .value
            .get("questions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for entry in &entries {
            if accepted.len() >= max_questions {
                break;
            }
            let text = entry
                .get("question")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default();
            let targets = parse_targets(entry.get("target_args"));
            if text.is_empty() || targets.is_empty() {
                debug!("Dropping malformed candidate: {entry}");
                continue;
            }
            accepted.push(ClarificationQuestion::new(
                format!("q_{}", accepted.len()),
                text,
                targets,
            ));
        }
        debug!("Generated {} candidate questions", accepted.len());
        accepted
    }

    /// Scores `candidates` against `calls` and picks the one worth asking.
    ///
    /// No question is selected when the calls are already at or above the
    /// certainty threshold, whatever the candidates would score. Every scored
    /// candidate is appended to the audit log.
    pub fn evaluate(
        &mut self,
        candidates: Vec<ClarificationQuestion>,
        calls: &[ToolCall],
    ) -> Evaluation {
        let mut scored_calls = calls.to_vec();
        let overall_certainty = self
            .calculator
            .sequence_certainty(&mut scored_calls)
            .certainty;
        let total_clarifications = self.counters.total();
        let threshold = dynamic_threshold(
            self.settings.base_threshold,
            total_clarifications,
            self.settings.threshold_alpha,
        );
        let mut evaluation = Evaluation {
            selected: None,
            reason: EvaluationReason::NoCandidates,
            overall_certainty,
            dynamic_threshold: threshold,
            total_clarifications,
            candidates: Vec::new(),
        };

        if candidates.is_empty() {
            return evaluation;
        }
        if overall_certainty >= self.settings.certainty_threshold {
            debug!(
                "Certainty {overall_certainty:.3} meets threshold {:.3}; no question needed",
                self.settings.certainty_threshold
            );
            evaluation.reason = EvaluationReason::CertaintyReached;
            return evaluation;
        }

        let first_record = self.audit.len();
        let mut scored = candidates;
        for question in &mut scored {
            let evpi = self.calculator.evpi(calls, &question.target_args);
            let regret_reduction = self
                .calculator
                .regret_reduction(calls, &question.target_args);
            let ucb = ucb_score(
                evpi,
                regret_reduction,
                self.counters.per_arg(),
                &question.target_args,
                total_clarifications,
                self.settings.exploration_constant,
            );
            question.metrics = QuestionMetrics {
                evpi,
                regret_reduction,
                ucb_score: ucb,
            };
            debug!(
                "{} evpi={evpi:.4} regret_reduction={regret_reduction:.4} ucb={ucb:.4}",
                question.id
            );
            self.audit.push(AuditRecord {
                question: question.clone(),
                overall_certainty,
                selected: false,
            });
        }
        scored.sort_by(|left, right| right.metrics.ucb_score.total_cmp(&left.metrics.ucb_score));

        let best = scored
            .first()
            .filter(|question| question.metrics.ucb_score >= threshold)
            .cloned();
        if let Some(question) = &best {
            info!(
                "Selected {} (ucb {:.3} >= threshold {threshold:.3}): {}",
                question.id, question.metrics.ucb_score, question.text
            );
            if let Some(record) = self.audit[first_record..]
                .iter_mut()
                .find(|record| record.question.id == question.id)
            {
                record.selected = true;
            }
            evaluation.reason = EvaluationReason::Selected;
        } else {
            debug!("No candidate reached threshold {threshold:.3}");
            evaluation.reason = EvaluationReason::BelowThreshold;
        }
        evaluation.selected = best;
        evaluation.candidates = scored;
        evaluation
    }

    /// Counts a question put to the user against each of its targets.
    ///
    /// Targets on tools the registry does not know are not counted, and a
    /// question aimed only at such tools leaves the counters untouched.
    pub fn record_selection(&mut self, question: &ClarificationQuestion) {
        let known: Vec<ArgRef> = question
            .target_args
            .iter()
            .filter(|target| self.registry.tool(target.tool()).is_some())
            .cloned()
            .collect();
        if known.is_empty() && !question.target_args.is_empty() {
            debug!("{} targets no registered tool; counters unchanged", question.id);
            return;
        }
        self.counters.record(&known);
        debug!(
            "Clarification counters: total {} after {}",
            self.counters.total(),
            question.id
        );
    }

    /// Applies the user's answer to `calls` through the model.
    ///
    /// Returned arguments are merged into the existing call with the same tool
    /// name, and calls for unseen tools are appended. Unusable model output
    /// leaves the calls unchanged.
    pub async fn apply_user_response(
        &self,
        question: &ClarificationQuestion,
        answer: &str,
        calls: &[ToolCall],
    ) -> Vec<ToolCall> {
        let prompt = prompts::interpret_prompt(question, answer, calls);
        let outcome = self
            .llm
            .generate_json(
                &prompt,
                &prompts::updated_calls_schema(),
                &self.params,
                json!({"updated_tool_calls": []}),
            )
            .await;
        if !outcome.is_usable() {
            warn!("Could not interpret answer to {}; keeping calls", question.id);
            return calls.to_vec();
        }

        let entries: Vec<ToolCall> = outcome
            .value
            .get("updated_tool_calls")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(ToolCall::from_json).collect())
            .unwrap_or_default();
        if entries.is_empty() {
            warn!("Answer to {} produced no updated calls", question.id);
            return calls.to_vec();
        }

        let mut updated = calls.to_vec();
        for entry in entries {
            if let Some(existing) = updated
                .iter_mut()
                .find(|call| call.tool_name == entry.tool_name)
            {
                existing.merge_arguments(&entry.arguments);
            } else {
                debug!("Answer introduced a call to {}", entry.tool_name);
                updated.push(entry);
            }
        }
        for call in &mut updated {
            call.arg_states.clear();
        }
        updated
    }

    /// Builds a question describing why `call` failed.
    ///
    /// The model phrases the question; when its output is unusable a generic
    /// question naming the tool is used. The call's arguments are the targets.
    pub async fn error_clarification(
        &self,
        request: &str,
        call: &ToolCall,
        result: &ExecutionResult,
    ) -> ClarificationQuestion {
        let prompt = prompts::error_prompt(request, call, &result.message);
        let outcome = self
            .llm
            .generate_json(&prompt, &prompts::error_schema(), &self.params, json!({}))
            .await;
        let text = outcome
            .value
            .get("clarification_question")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map_or_else(
                || {
                    warn!("Using generic error question for {}", call.tool_name);
                    format!(
                        "I couldn't complete {}. Could you check the details you gave and tell me how to proceed?",
                        call.tool_name
                    )
                },
                str::to_owned,
            );

        let mut targets: Vec<ArgRef> = call
            .arguments
            .keys()
            .map(|arg| ArgRef::new(call.tool_name.clone(), arg.clone()))
            .collect();
        if targets.is_empty() {
            targets = self
                .registry
                .tool(&call.tool_name)
                .map(|tool| {
                    tool.arguments
                        .iter()
                        .map(|arg| ArgRef::new(call.tool_name.clone(), arg.name.clone()))
                        .collect()
                })
                .unwrap_or_default();
        }
        ClarificationQuestion::new(format!("error_{}", call.tool_name), text, targets)
    }
}

/// Parses `[[tool, arg], ...]`, skipping entries that are not two strings.
fn parse_targets(raw: Option<&Value>) -> Vec<ArgRef> {
    raw.and_then(Value::as_array)
        .map(|pairs| {
            pairs
                .iter()
                .filter_map(|pair| match pair.as_array().map(Vec::as_slice) {
                    Some([tool, arg]) => Some(ArgRef::new(tool.as_str()?, arg.as_str()?)),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
