//! Tool and argument definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ArgumentDomain;

/// Name of the virtual tool the model uses to finish a request.
pub const FINAL_ANSWER_TOOL: &str = "provide_final_answer";
/// The single argument of [`FINAL_ANSWER_TOOL`].
pub const FINAL_ANSWER_ARG: &str = "answer";

/// Where a tool's behaviour lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOrigin {
    /// Backed by a plugin method
    #[default]
    Real,
    /// Synthetic action with no backing plugin
    Virtual,
}

/// One parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Parameter name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Legal value space
    pub domain: ArgumentDomain,
    /// Whether the tool cannot run without this argument
    #[serde(default = "default_required")]
    pub required: bool,
    /// Value used when an optional argument is omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Serde default for [`Argument::required`].
fn default_required() -> bool {
    true
}

impl Argument {
    /// Creates a required argument.
    #[must_use]
    pub fn required(name: impl Into<String>, domain: ArgumentDomain) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            domain,
            required: true,
            default: None,
        }
    }

    /// Creates an optional argument with a default value.
    #[must_use]
    pub fn optional(name: impl Into<String>, domain: ArgumentDomain, default: Value) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            domain,
            required: false,
            default: Some(default),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// An action the agent can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Unique tool name
    pub name: String,
    /// What the tool does
    #[serde(default)]
    pub description: String,
    /// Ordered parameter list
    #[serde(default)]
    pub arguments: Vec<Argument>,
    /// Real plugin-backed tool or virtual action
    #[serde(default)]
    pub origin: ToolOrigin,
}

impl Tool {
    /// Creates a real tool with no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: Vec::new(),
            origin: ToolOrigin::Real,
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// The virtual action that ends a request with an answer.
    #[must_use]
    pub fn final_answer() -> Self {
        Self {
            name: FINAL_ANSWER_TOOL.to_owned(),
            description: "Provide the final answer to the user's request once it is fulfilled"
                .to_owned(),
            arguments: vec![
                Argument::required(
                    FINAL_ANSWER_ARG,
                    ArgumentDomain::string().with_importance(1.0),
                )
                .with_description("The answer to show the user"),
            ],
            origin: ToolOrigin::Virtual,
        }
    }

    /// Looks up an argument by name.
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|argument| argument.name == name)
    }

    /// Mutable lookup of an argument by name.
    pub fn argument_mut(&mut self, name: &str) -> Option<&mut Argument> {
        self.arguments
            .iter_mut()
            .find(|argument| argument.name == name)
    }

    /// Whether this tool has no backing plugin.
    pub fn is_virtual(&self) -> bool {
        self.origin == ToolOrigin::Virtual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_final_answer_tool_is_virtual() {
        let tool = Tool::final_answer();
        assert!(tool.is_virtual());
        assert_eq!(tool.name, FINAL_ANSWER_TOOL);
        let answer = tool.argument(FINAL_ANSWER_ARG).unwrap();
        assert!(answer.required);
        assert!((answer.domain.importance - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tool_argument_lookup() {
        let tool = Tool::new("book_flight", "Book a flight")
            .with_argument(Argument::required("travel_to", ArgumentDomain::string()))
            .with_argument(Argument::optional(
                "class",
                ArgumentDomain::finite(["economy", "business"]),
                json!("economy"),
            ));

        assert!(!tool.is_virtual());
        assert!(tool.argument("travel_to").is_some_and(|arg| arg.required));
        assert!(tool.argument("class").is_some_and(|arg| !arg.required));
        assert!(tool.argument("seat").is_none());
    }
}
