//! Validates resolved tool calls and dispatches them to their owning plugin.

use std::sync::Arc;

use clarion_core::{
    ExecutionResult, FINAL_ANSWER_ARG, FailureKind, Tool, ToolCall, is_unknown,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::registry::ToolRegistry;

/// Executes tool calls against the registry's plugins.
///
/// Never returns an error: every failure becomes a failed [`ExecutionResult`].
pub struct ToolExecutor {
    /// Registry used for lookup, validation and ownership
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    /// Create an executor over a registry
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Check that a call is executable: required arguments present and every
    /// known value inside its domain.
    ///
    /// # Errors
    /// Returns a message describing the first problem found
    pub fn validate(&self, call: &ToolCall) -> Result<(), String> {
        let tool = self
            .registry
            .tool(&call.tool_name)
            .ok_or_else(|| format!("Unknown tool: {}", call.tool_name))?;
        Self::validate_against(&tool, call)?;

        if let Some(plugin) = self.registry.owner(&call.tool_name) {
            plugin
                .validate_tool_call(&call.tool_name, &call.execution_parameters())
                .map_err(|error| error.to_string())?;
        }
        Ok(())
    }

    /// Domain checks against a tool definition
    fn validate_against(tool: &Tool, call: &ToolCall) -> Result<(), String> {
        for arg in &tool.arguments {
            let value = call.arguments.get(&arg.name).filter(|value| !is_unknown(value));
            match value {
                None if arg.required => {
                    return Err(format!("Missing required argument: {}", arg.name));
                }
                None => {}
                Some(value) => {
                    if !arg.domain.is_valid(value) {
                        return Err(format!("Invalid value for argument {}: {value}", arg.name));
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate and execute one call
    pub async fn execute(&self, call: &ToolCall) -> ExecutionResult {
        let Some(tool) = self.registry.tool(&call.tool_name) else {
            warn!("No tool registered as '{}'", call.tool_name);
            return ExecutionResult::failure(
                &call.tool_name,
                format!("No plugin found for tool: {}", call.tool_name),
                FailureKind::PluginNotFound,
            );
        };

        if let Err(error) = self.validate(call) {
            info!("Validation failed for {}: {error}", call.tool_name);
            return ExecutionResult::failure(
                &call.tool_name,
                format!("Validation failed: {error}"),
                FailureKind::Validation,
            );
        }

        if tool.is_virtual() {
            let answer = call
                .arguments
                .get(FINAL_ANSWER_ARG)
                .map(|value| match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            return ExecutionResult::success(&call.tool_name, answer, None);
        }

        let Some(plugin) = self.registry.owner(&call.tool_name) else {
            warn!("Tool '{}' has no owning plugin", call.tool_name);
            return ExecutionResult::failure(
                &call.tool_name,
                format!("No plugin found for tool: {}", call.tool_name),
                FailureKind::PluginNotFound,
            );
        };

        let params = call.execution_parameters();
        debug!("Executing {} via '{}' with {params:?}", call.tool_name, plugin.name());
        match plugin.execute_tool(&call.tool_name, &params).await {
            Ok(response) if response.success => ExecutionResult::success(
                &call.tool_name,
                if response.message.is_empty() {
                    "Tool executed successfully".to_owned()
                } else {
                    response.message
                },
                response.output,
            ),
            Ok(response) => {
                let kind = response.error.unwrap_or_else(|| "unknown".to_owned());
                info!("{} reported failure ({kind}): {}", call.tool_name, response.message);
                ExecutionResult::failure(
                    &call.tool_name,
                    if response.message.is_empty() {
                        "Tool execution failed".to_owned()
                    } else {
                        response.message
                    },
                    FailureKind::Execution { kind },
                )
            }
            Err(error) => {
                warn!("Error executing tool {}: {error}", call.tool_name);
                ExecutionResult::failure(
                    &call.tool_name,
                    format!("Error executing tool: {error}"),
                    FailureKind::Execution {
                        kind: error.kind().to_owned(),
                    },
                )
            }
        }
    }

    /// Execute calls in order, stopping after the first failure
    pub async fn execute_sequence(&self, calls: &[ToolCall]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.execute(call).await;
            let failed = !result.success;
            results.push(result);
            if failed {
                break;
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Plugin, PluginResponse, ToolError, ToolResult};
    use async_trait::async_trait;
    use clarion_core::{Argument, ArgumentDomain, FINAL_ANSWER_TOOL, IgnoreLock as _, UNKNOWN};
    use serde_json::{Map, json};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TravelPlugin {
        received: Mutex<Vec<Map<String, Value>>>,
    }

    #[async_trait]
    impl Plugin for TravelPlugin {
        fn name(&self) -> &str {
            "travel"
        }

        fn tools(&self) -> Vec<Tool> {
            vec![
                Tool::new("book_flight", "Book a flight")
                    .with_argument(Argument::required(
                        "travel_to",
                        ArgumentDomain::finite(["LAX", "JFK"]),
                    ))
                    .with_argument(Argument::optional(
                        "seats",
                        ArgumentDomain::numeric_range(1.0, 4.0),
                        json!(1),
                    )),
                Tool::new("cancel_flight", "Cancel a flight"),
                Tool::new("crash", "Always raises"),
            ]
        }

        async fn execute_tool(
            &self,
            tool_name: &str,
            params: &Map<String, Value>,
        ) -> ToolResult<PluginResponse> {
            self.received.lock_ignore_poison().push(params.clone());
            match tool_name {
                "book_flight" => Ok(PluginResponse::success_with_output(
                    "Booked",
                    Value::Object(params.clone()),
                )),
                "cancel_flight" => Ok(PluginResponse::failure("not_found", "No booking")),
                _ => Err(ToolError::execution("timeout", "upstream timed out")),
            }
        }
    }

    fn executor() -> (ToolExecutor, Arc<TravelPlugin>) {
        let plugin = Arc::new(TravelPlugin::default());
        let registry = ToolRegistry::new()
            .with_plugin(Arc::clone(&plugin) as Arc<dyn Plugin>)
            .unwrap();
        (ToolExecutor::new(Arc::new(registry)), plugin)
    }

    /// Tests validation of required and out-of-domain arguments.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_validate() {
        let (executor, _plugin) = executor();
        let missing = ToolCall::new("book_flight").with_unknown("travel_to");
        assert_eq!(
            executor.validate(&missing),
            Err("Missing required argument: travel_to".to_owned())
        );

        let out_of_domain = ToolCall::new("book_flight").with_argument("travel_to", "ORD");
        let domain_error = executor.validate(&out_of_domain).unwrap_err();
        assert!(domain_error.starts_with("Invalid value for argument travel_to"));

        let optional_unknown = ToolCall::new("book_flight")
            .with_argument("travel_to", "LAX")
            .with_unknown("seats");
        assert_eq!(executor.validate(&optional_unknown), Ok(()));
    }

    /// Tests that unknown values are stripped before dispatch.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_execute_strips_unknown() {
        let (executor, plugin) = executor();
        let call = ToolCall::new("book_flight")
            .with_argument("travel_to", "LAX")
            .with_argument("seats", UNKNOWN);
        let result = executor.execute(&call).await;

        assert!(result.success);
        assert_eq!(result.output, Some(json!({"travel_to": "LAX"})));
        let received = plugin.received.lock_ignore_poison();
        assert!(!received[0].contains_key("seats"));
    }

    /// Tests failure normalization for each failure kind.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_execute_failures() {
        let (executor, _plugin) = executor();

        let unknown = executor.execute(&ToolCall::new("teleport")).await;
        assert_eq!(unknown.failure, Some(FailureKind::PluginNotFound));

        let invalid = executor
            .execute(&ToolCall::new("book_flight").with_argument("travel_to", "ORD"))
            .await;
        assert_eq!(invalid.failure, Some(FailureKind::Validation));

        let reported = executor.execute(&ToolCall::new("cancel_flight")).await;
        assert_eq!(
            reported.failure,
            Some(FailureKind::Execution {
                kind: "not_found".to_owned()
            })
        );

        let raised = executor.execute(&ToolCall::new("crash")).await;
        assert!(!raised.success);
        assert_eq!(
            raised.failure,
            Some(FailureKind::Execution {
                kind: "timeout".to_owned()
            })
        );
    }

    /// Tests the virtual final-answer tool.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_final_answer_executes_without_plugin() {
        let (executor, plugin) = executor();
        let call = ToolCall::new(FINAL_ANSWER_TOOL).with_argument(FINAL_ANSWER_ARG, "All booked");
        let result = executor.execute(&call).await;
        assert!(result.success);
        assert_eq!(result.message, "All booked");
        assert!(plugin.received.lock_ignore_poison().is_empty());
    }

    /// Tests that sequences stop at the first failure.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_execute_sequence_fail_fast() {
        let (executor, plugin) = executor();
        let calls = vec![
            ToolCall::new("book_flight").with_argument("travel_to", "JFK"),
            ToolCall::new("cancel_flight"),
            ToolCall::new("book_flight").with_argument("travel_to", "LAX"),
        ];
        let results = executor.execute_sequence(&calls).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(plugin.received.lock_ignore_poison().len(), 2);
    }
}
