use std::collections::BTreeMap;
use std::io::Error as IoError;

use async_trait::async_trait;
use clarion_core::{ArgumentDomain, Tool};
use serde::{Deserialize, Serialize};
use serde_json::{Error as SerdeJsonError, Map, Value};
use thiserror::Error;

/// Errors that can occur while a plugin handles a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// The provided input parameters were invalid or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The tool failed to execute its operation.
    #[error("Tool execution failed ({kind}): {message}")]
    ExecutionFailed {
        /// Error kind used for recovery decisions, e.g. `timeout`
        kind: String,
        /// Human-readable detail
        message: String,
    },

    /// The plugin does not provide the requested tool.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Failed to serialize or deserialize data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerdeJsonError),
}

impl ToolError {
    /// Creates an execution failure of the given kind.
    pub fn execution(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Error kind string used to classify the failure.
    pub fn kind(&self) -> &str {
        match self {
            Self::Io(_) => "io",
            Self::InvalidInput(_) => "invalid_input",
            Self::ExecutionFailed { kind, .. } => kind,
            Self::UnknownTool(_) => "unknown_tool",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Raw response returned by a plugin for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginResponse {
    /// Whether the tool did what was asked.
    pub success: bool,
    /// Human-readable message describing the result.
    pub message: String,
    /// Optional JSON data containing tool-specific output.
    pub output: Option<Value>,
    /// Error kind when `success` is false.
    pub error: Option<String>,
}

impl PluginResponse {
    /// Creates a successful response with the given message and no output.
    pub fn success<T: Into<String>>(message: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            output: None,
            error: None,
        }
    }

    /// Creates a successful response with the given message and output.
    pub fn success_with_output<T: Into<String>>(message: T, output: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            output: Some(output),
            error: None,
        }
    }

    /// Creates a failed response with an error kind.
    pub fn failure<K: Into<String>, T: Into<String>>(kind: K, message: T) -> Self {
        Self {
            success: false,
            message: message.into(),
            output: None,
            error: Some(kind.into()),
        }
    }
}

/// Capability interface implemented once per domain plugin.
///
/// Plugins own the tool catalog and business logic of one domain; the
/// registry resolves tool names to the plugin that provides them.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Returns the unique name of this plugin.
    fn name(&self) -> &str;

    /// Returns the plugin's current tool definitions.
    fn tools(&self) -> Vec<Tool>;

    /// Executes one of this plugin's tools with already-validated parameters.
    ///
    /// # Errors
    ///
    /// Returns a `ToolError` if the tool is unknown or its execution fails.
    async fn execute_tool(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
    ) -> ToolResult<PluginResponse>;

    /// Plugin-specific validation run after domain checks.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::InvalidInput` describing why the call cannot run.
    fn validate_tool_call(&self, _tool_name: &str, _params: &Map<String, Value>) -> ToolResult<()> {
        Ok(())
    }

    /// Domain updates implied by runtime context, keyed `"tool.arg"`.
    fn domain_updates_from_context(
        &self,
        _context: &Map<String, Value>,
    ) -> BTreeMap<String, ArgumentDomain> {
        BTreeMap::new()
    }

    /// Applies a domain update to the plugin's own tool definitions.
    fn accept_domain_update(&self, _tool_name: &str, _arg_name: &str, _domain: &ArgumentDomain) {}
}
