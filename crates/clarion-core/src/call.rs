//! Proposed tool invocations and their per-argument certainty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tool::FINAL_ANSWER_TOOL;

/// Placeholder for an argument the model could not determine.
pub const UNKNOWN: &str = "<UNK>";
/// Marker used when simulating that a question resolved an argument.
pub const RESOLVED: &str = "<RESOLVED>";

/// Whether a value is, or contains, the unknown sentinel.
///
/// Arrays count when any element is the sentinel, objects when any value is.
pub fn is_unknown(value: &Value) -> bool {
    match value {
        Value::String(text) => text == UNKNOWN,
        Value::Array(items) => items.iter().any(|item| item.as_str() == Some(UNKNOWN)),
        Value::Object(entries) => entries.values().any(|item| item.as_str() == Some(UNKNOWN)),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Derived state of one argument of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentState {
    /// Current value (possibly the unknown sentinel)
    pub value: Value,
    /// Estimated probability the value is correct, within `[0, 1]`
    pub certainty: f64,
}

/// A proposed invocation of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Target tool
    pub tool_name: String,
    /// Argument values keyed by name
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
    /// Per-argument certainty, recomputed by the uncertainty calculator
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arg_states: BTreeMap<String, ArgumentState>,
}

impl ToolCall {
    /// Creates a call with no arguments.
    #[must_use]
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: BTreeMap::new(),
            arg_states: BTreeMap::new(),
        }
    }

    /// Sets an argument value.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Sets an argument to the unknown sentinel.
    #[must_use]
    pub fn with_unknown(self, name: impl Into<String>) -> Self {
        self.with_argument(name, UNKNOWN)
    }

    /// Parses a `{"tool_name": ..., "arguments": {...}}` object.
    ///
    /// Returns `None` when the tool name is missing or empty. Non-object
    /// `arguments` are treated as empty.
    pub fn from_json(value: &Value) -> Option<Self> {
        let tool_name = value.get("tool_name").and_then(Value::as_str)?.trim();
        if tool_name.is_empty() {
            return None;
        }
        let arguments = value
            .get("arguments")
            .and_then(Value::as_object)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(name, arg)| (name.clone(), arg.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            tool_name: tool_name.to_owned(),
            arguments,
            arg_states: BTreeMap::new(),
        })
    }

    /// Whether this call invokes the virtual final-answer action.
    pub fn is_final_answer(&self) -> bool {
        self.tool_name == FINAL_ANSWER_TOOL
    }

    /// Whether the named argument is present with a known value.
    pub fn is_known(&self, name: &str) -> bool {
        self.arguments.get(name).is_some_and(|value| !is_unknown(value))
    }

    /// Parameters handed to execution, with every unknown value removed.
    pub fn execution_parameters(&self) -> Map<String, Value> {
        self.arguments
            .iter()
            .filter(|(_, value)| !is_unknown(value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Merges another call's arguments into this one.
    ///
    /// Unknown incoming values never overwrite a known value.
    pub fn merge_arguments(&mut self, incoming: &BTreeMap<String, Value>) {
        for (name, value) in incoming {
            if is_unknown(value) && self.is_known(name) {
                continue;
            }
            self.arguments.insert(name.clone(), value.clone());
        }
    }
}
