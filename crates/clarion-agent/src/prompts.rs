//! Prompt templates and the JSON shapes expected back from the model.
//!
//! Each template is a markdown document with Usage and Prompt sections,
//! embedded at compile time. Only the Prompt section is sent; it starts with
//! a `TASK:` line naming the request so replies can be scripted per task.

use std::fmt::Write as _;

use clarion_core::{ArgRef, ClarificationQuestion, FINAL_ANSWER_TOOL, ToolCall, UNKNOWN};
use serde_json::{Value, json};

const REASON_MD: &str = include_str!("../prompts/reason.md");
const GENERATE_QUESTIONS_MD: &str = include_str!("../prompts/generate_questions.md");
const INTERPRET_ANSWER_MD: &str = include_str!("../prompts/interpret_answer.md");
const EXPLAIN_ERROR_MD: &str = include_str!("../prompts/explain_error.md");

/// Line shown when there is nothing to list.
const NONE: &str = "(none)";

/// The model requests the agent makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Propose the next tool calls
    Reason,
    /// Phrase clarifying questions
    GenerateQuestions,
    /// Interpret an answer to a clarifying question
    InterpretAnswer,
    /// Turn an execution failure into a question
    ExplainError,
}

impl PromptKind {
    /// Prompt section of the embedded template.
    #[must_use]
    pub fn template(self) -> &'static str {
        let content = match self {
            Self::Reason => REASON_MD,
            Self::GenerateQuestions => GENERATE_QUESTIONS_MD,
            Self::InterpretAnswer => INTERPRET_ANSWER_MD,
            Self::ExplainError => EXPLAIN_ERROR_MD,
        };
        prompt_section(content)
    }
}

/// Everything after the `## Prompt` header, or the whole document if it has none.
fn prompt_section(content: &str) -> &str {
    content
        .find("## Prompt")
        .and_then(|start| {
            content[start..]
                .find('\n')
                .map(|newline| &content[start + newline + 1..])
        })
        .unwrap_or(content)
        .trim()
}

/// Substitutes `{NAME}` placeholders in a template.
fn fill(kind: PromptKind, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(kind.template().to_owned(), |prompt, (name, value)| {
            prompt.replace(&format!("{{{name}}}"), value)
        })
}

/// Numbered observation list.
fn render_history(history: &[String]) -> String {
    if history.is_empty() {
        return NONE.to_owned();
    }
    let mut rendered = String::new();
    for (index, observation) in history.iter().enumerate() {
        let _ignored = writeln!(rendered, "{}. {observation}", index + 1);
    }
    rendered.trim_end().to_owned()
}

/// Calls as pretty JSON without derived argument states.
fn render_calls(calls: &[ToolCall]) -> String {
    let plain: Vec<Value> = calls
        .iter()
        .map(|call| json!({"tool_name": call.tool_name, "arguments": call.arguments}))
        .collect();
    serde_json::to_string_pretty(&plain).unwrap_or_else(|_| NONE.to_owned())
}

/// One uncertain argument as shown to the question writer.
#[derive(Debug, Clone, PartialEq)]
pub struct UncertainArgument {
    /// Tool and argument
    pub target: ArgRef,
    /// Human-readable domain
    pub domain: String,
    /// Argument description
    pub description: String,
    /// Current certainty
    pub certainty: f64,
}

/// Prompt asking for the next tool calls.
#[must_use]
pub fn reasoning_prompt(request: &str, history: &[String], tools: &str) -> String {
    fill(
        PromptKind::Reason,
        &[
            ("REQUEST", request),
            ("HISTORY", &render_history(history)),
            ("TOOLS", tools),
            ("UNKNOWN", UNKNOWN),
            ("FINAL_ANSWER_TOOL", FINAL_ANSWER_TOOL),
        ],
    )
}

/// Prompt asking for clarifying questions about `uncertain` arguments.
#[must_use]
pub fn question_prompt(
    request: &str,
    history: &[String],
    calls: &[ToolCall],
    uncertain: &[UncertainArgument],
    max_questions: usize,
) -> String {
    let mut lines = String::new();
    for arg in uncertain {
        let _ignored = writeln!(
            lines,
            "- {} (domain: {}; certainty {:.3}): {}",
            arg.target, arg.domain, arg.certainty, arg.description
        );
    }
    fill(
        PromptKind::GenerateQuestions,
        &[
            ("REQUEST", request),
            ("HISTORY", &render_history(history)),
            ("TOOL_CALLS", &render_calls(calls)),
            ("UNCERTAIN_ARGS", lines.trim_end()),
            ("MAX_QUESTIONS", &max_questions.to_string()),
        ],
    )
}

/// Prompt asking the model to apply a user's answer to the calls.
#[must_use]
pub fn interpret_prompt(question: &ClarificationQuestion, answer: &str, calls: &[ToolCall]) -> String {
    let targets = question
        .target_args
        .iter()
        .map(ArgRef::key)
        .collect::<Vec<_>>()
        .join(", ");
    fill(
        PromptKind::InterpretAnswer,
        &[
            ("QUESTION", &question.text),
            ("ANSWER", answer),
            ("TARGETS", &targets),
            ("TOOL_CALLS", &render_calls(calls)),
            ("UNKNOWN", UNKNOWN),
        ],
    )
}

/// Prompt asking for a question describing a failed call.
#[must_use]
pub fn error_prompt(request: &str, call: &ToolCall, error: &str) -> String {
    let arguments = serde_json::to_string_pretty(&call.arguments).unwrap_or_else(|_| NONE.to_owned());
    fill(
        PromptKind::ExplainError,
        &[
            ("REQUEST", request),
            ("TOOL", &call.tool_name),
            ("ARGUMENTS", &arguments),
            ("ERROR", error),
        ],
    )
}

/// Shape of a reasoning reply.
#[must_use]
pub fn reasoning_schema() -> Value {
    json!({
        "reasoning": "string",
        "tool_calls": [{"tool_name": "string", "arguments": {}}]
    })
}

/// Fallback when a reasoning reply is unusable.
#[must_use]
pub fn reasoning_default() -> Value {
    json!({"reasoning": "", "tool_calls": []})
}

/// Shape of a question-generation reply.
#[must_use]
pub fn questions_schema() -> Value {
    json!({"questions": [{"question": "string", "target_args": [["tool_name", "arg_name"]]}]})
}

/// Shape of an answer-interpretation reply.
#[must_use]
pub fn updated_calls_schema() -> Value {
    json!({"updated_tool_calls": [{"tool_name": "string", "arguments": {}}]})
}

/// Shape of an error-explanation reply.
#[must_use]
pub fn error_schema() -> Value {
    json!({"clarification_question": "string"})
}
