//! Normalized results of tool execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why an execution failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or out-of-domain argument; never retried automatically
    Validation,
    /// No plugin owns the tool
    PluginNotFound,
    /// The plugin raised an error of the given kind
    Execution {
        /// Error kind reported by the plugin, e.g. `timeout`
        kind: String,
    },
}

impl FailureKind {
    /// Whether this failure may be retried by re-reasoning.
    ///
    /// Only execution failures whose kind appears in `recoverable` qualify.
    pub fn is_recoverable(&self, recoverable: &[String]) -> bool {
        match self {
            Self::Execution { kind } => recoverable
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(kind)),
            Self::Validation | Self::PluginNotFound => false,
        }
    }

    /// Short label for logs and transcripts.
    pub fn label(&self) -> &str {
        match self {
            Self::Validation => "validation",
            Self::PluginNotFound => "plugin_not_found",
            Self::Execution { kind } => kind,
        }
    }
}

/// Outcome of executing one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Tool that was (or would have been) executed
    pub tool_name: String,
    /// Whether the call succeeded
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
    /// Structured output, if the plugin produced any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure classification when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    /// Successful result.
    #[must_use]
    pub fn success(
        tool_name: impl Into<String>,
        message: impl Into<String>,
        output: Option<Value>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            message: message.into(),
            output,
            failure: None,
        }
    }

    /// Failed result.
    #[must_use]
    pub fn failure(
        tool_name: impl Into<String>,
        message: impl Into<String>,
        failure: FailureKind,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            message: message.into(),
            output: None,
            failure: Some(failure),
        }
    }

    /// Whether this is a failure that may be retried by re-reasoning.
    pub fn is_recoverable(&self, recoverable: &[String]) -> bool {
        self.failure
            .as_ref()
            .is_some_and(|failure| failure.is_recoverable(recoverable))
    }
}
