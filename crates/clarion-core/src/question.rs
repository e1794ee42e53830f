//! Clarifying questions and their information-value metrics.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Reference to one argument of one tool, serialized as `[tool, arg]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArgRef(pub String, pub String);

impl ArgRef {
    /// Creates a reference to `tool.arg`.
    #[must_use]
    pub fn new(tool: impl Into<String>, arg: impl Into<String>) -> Self {
        Self(tool.into(), arg.into())
    }

    /// Tool name.
    pub fn tool(&self) -> &str {
        &self.0
    }

    /// Argument name.
    pub fn arg(&self) -> &str {
        &self.1
    }

    /// Counter key `"tool.arg"`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.0, self.1)
    }
}

impl fmt::Display for ArgRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}", self.0, self.1)
    }
}

/// Scores assigned to a candidate question by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QuestionMetrics {
    /// Expected value of perfect information
    pub evpi: f64,
    /// Regret removed if the question is answered
    pub regret_reduction: f64,
    /// Exploitation plus exploration score
    pub ucb_score: f64,
}

/// A candidate question aimed at resolving specific arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    /// Identifier such as `q_0`
    pub id: String,
    /// Question text shown to the user
    pub text: String,
    /// Arguments the answer is expected to resolve
    pub target_args: Vec<ArgRef>,
    /// Evaluator scores
    #[serde(default)]
    pub metrics: QuestionMetrics,
}

impl ClarificationQuestion {
    /// Creates an unscored question.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, target_args: Vec<ArgRef>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            target_args,
            metrics: QuestionMetrics::default(),
        }
    }
}
