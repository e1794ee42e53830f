//! Plugin defined by a TOML manifest, simulating execution without business logic.
//!
//! ```toml
//! name = "travel"
//!
//! [[tools]]
//! name = "book_flight"
//! description = "Book a flight"
//!
//! [[tools.arguments]]
//! name = "travel_to"
//! domain = { kind = "finite", values = ["LAX", "JFK"], importance = 0.9 }
//!
//! [[failures]]
//! tool = "book_flight"
//! kind = "timeout"
//! message = "Booking service timed out"
//! times = 1
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use clarion_core::{
    Argument, ArgumentDomain, DomainKind, Error, IgnoreLock as _, IgnoreRwLock as _, Result, Tool,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::plugin::{Plugin, PluginResponse, ToolError, ToolResult};

/// Top-level manifest document
#[derive(Debug, Deserialize)]
struct Manifest {
    /// Plugin name
    #[serde(default = "default_plugin_name")]
    name: String,
    /// Tool definitions
    #[serde(default)]
    tools: Vec<ManifestTool>,
    /// Scripted failures
    #[serde(default)]
    failures: Vec<ScriptedFailure>,
}

/// Serde default for [`Manifest::name`]
fn default_plugin_name() -> String {
    "manifest".to_owned()
}

/// Tool entry of a manifest
#[derive(Debug, Deserialize)]
struct ManifestTool {
    /// Tool name
    name: String,
    /// Tool description
    #[serde(default)]
    description: String,
    /// Arguments in order
    #[serde(default)]
    arguments: Vec<ManifestArgument>,
}

/// Argument entry of a manifest
#[derive(Debug, Deserialize)]
struct ManifestArgument {
    /// Argument name
    name: String,
    /// Argument description
    #[serde(default)]
    description: String,
    /// Whether the argument is required
    #[serde(default = "default_required")]
    required: bool,
    /// Default for optional arguments
    #[serde(default)]
    default: Option<Value>,
    /// Value space, optionally bound to a context key
    domain: ManifestDomain,
}

/// Serde default for [`ManifestArgument::required`]
fn default_required() -> bool {
    true
}

/// Domain table of a manifest argument
#[derive(Debug, Deserialize)]
struct ManifestDomain {
    /// Context key whose numeric value `N` sets the range to `[1, N]`
    #[serde(default)]
    bound_to: Option<String>,
    /// The domain itself
    #[serde(flatten)]
    domain: ArgumentDomain,
}

/// Failure injected into the next executions of a tool
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedFailure {
    /// Tool that fails
    pub tool: String,
    /// Error kind reported, e.g. `timeout`
    pub kind: String,
    /// Error message reported
    #[serde(default = "default_failure_message")]
    pub message: String,
    /// How many executions fail before the tool succeeds again
    #[serde(default = "default_failure_times")]
    pub times: u32,
}

/// Serde default for [`ScriptedFailure::message`]
fn default_failure_message() -> String {
    "Scripted failure".to_owned()
}

/// Serde default for [`ScriptedFailure::times`]
fn default_failure_times() -> u32 {
    1
}

/// A call received by a [`ManifestPlugin`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Tool that was executed
    pub tool_name: String,
    /// Parameters it received
    pub params: Map<String, Value>,
}

/// Argument whose range tracks a context value
#[derive(Debug, Clone)]
struct ContextBinding {
    /// Tool name
    tool: String,
    /// Argument name
    arg: String,
    /// Context key holding the upper bound
    key: String,
}

/// Plugin whose tools come from a manifest and whose execution is simulated
pub struct ManifestPlugin {
    /// Plugin name
    name: String,
    /// Authoritative tool definitions
    tools: RwLock<Vec<Tool>>,
    /// Context-bound arguments
    bindings: Vec<ContextBinding>,
    /// Remaining scripted failures
    failures: Mutex<Vec<ScriptedFailure>>,
    /// Every call received
    calls: Mutex<Vec<RecordedCall>>,
}

impl ManifestPlugin {
    /// Parse a manifest from TOML text
    ///
    /// # Errors
    /// Returns an error if the TOML is malformed or a tool name repeats
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(text)?;
        let mut tools: Vec<Tool> = Vec::with_capacity(manifest.tools.len());
        let mut bindings = Vec::new();

        for entry in manifest.tools {
            if tools.iter().any(|tool| tool.name == entry.name) {
                return Err(Error::Config(format!(
                    "Manifest '{}' defines tool '{}' twice",
                    manifest.name, entry.name
                )));
            }
            let mut tool = Tool::new(entry.name, entry.description);
            for arg in entry.arguments {
                let mut domain = arg.domain.domain;
                if let Some(key) = arg.domain.bound_to {
                    domain.data_dependent = true;
                    bindings.push(ContextBinding {
                        tool: tool.name.clone(),
                        arg: arg.name.clone(),
                        key,
                    });
                }
                tool.arguments.push(Argument {
                    name: arg.name,
                    description: arg.description,
                    domain,
                    required: arg.required,
                    default: arg.default,
                });
            }
            tools.push(tool);
        }

        info!(
            "Loaded manifest '{}' with {} tools and {} scripted failures",
            manifest.name,
            tools.len(),
            manifest.failures.len()
        );

        Ok(Self {
            name: manifest.name,
            tools: RwLock::new(tools),
            bindings,
            failures: Mutex::new(manifest.failures),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Load a manifest file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|error| {
            Error::Config(format!("Failed to read manifest {}: {error}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Every call received so far
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock_ignore_poison().clone()
    }

    /// Consume one pending failure for `tool_name`, if any
    fn take_failure(&self, tool_name: &str) -> Option<ScriptedFailure> {
        let mut failures = self.failures.lock_ignore_poison();
        let failure = failures
            .iter_mut()
            .find(|failure| failure.tool == tool_name && failure.times > 0)?;
        failure.times -= 1;
        Some(failure.clone())
    }
}

#[async_trait]
impl Plugin for ManifestPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<Tool> {
        self.tools.read_ignore_poison().clone()
    }

    async fn execute_tool(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
    ) -> ToolResult<PluginResponse> {
        let known = self
            .tools
            .read_ignore_poison()
            .iter()
            .any(|tool| tool.name == tool_name);
        if !known {
            return Err(ToolError::UnknownTool(tool_name.to_owned()));
        }

        self.calls.lock_ignore_poison().push(RecordedCall {
            tool_name: tool_name.to_owned(),
            params: params.clone(),
        });

        if let Some(failure) = self.take_failure(tool_name) {
            debug!("Injecting scripted {} failure into {tool_name}", failure.kind);
            return Err(ToolError::execution(failure.kind, failure.message));
        }

        let rendered = Value::Object(params.clone());
        Ok(PluginResponse::success_with_output(
            format!("Executed {tool_name} with {rendered}"),
            rendered,
        ))
    }

    fn domain_updates_from_context(
        &self,
        context: &Map<String, Value>,
    ) -> BTreeMap<String, ArgumentDomain> {
        let tools = self.tools.read_ignore_poison();
        let mut updates = BTreeMap::new();
        for binding in &self.bindings {
            let Some(upper) = context.get(&binding.key).and_then(Value::as_f64) else {
                continue;
            };
            let Some(current) = tools
                .iter()
                .find(|tool| tool.name == binding.tool)
                .and_then(|tool| tool.argument(&binding.arg))
            else {
                continue;
            };
            let mut domain = current.domain.clone();
            domain.kind = DomainKind::NumericRange {
                min: 1.0,
                max: upper.max(1.0),
            };
            updates.insert(format!("{}.{}", binding.tool, binding.arg), domain);
        }
        updates
    }

    fn accept_domain_update(&self, tool_name: &str, arg_name: &str, domain: &ArgumentDomain) {
        let mut tools = self.tools.write_ignore_poison();
        if let Some(arg) = tools
            .iter_mut()
            .find(|tool| tool.name == tool_name)
            .and_then(|tool| tool.argument_mut(arg_name))
        {
            arg.domain = domain.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clarion_core::DomainSize;
    use serde_json::json;

    const MANIFEST: &str = r#"
name = "docs"

[[tools]]
name = "read_page"
description = "Read one page"

[[tools.arguments]]
name = "page_num"
description = "Page to read"
domain = { kind = "numeric_range", min = 1, max = 1, importance = 0.7, bound_to = "number_of_pages" }

[[tools.arguments]]
name = "highlight"
required = false
default = false
domain = { kind = "boolean" }

[[failures]]
tool = "read_page"
kind = "timeout"
message = "Document server timed out"
"#;

    /// Tests manifest parsing.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_parse_manifest() {
        let plugin = ManifestPlugin::from_toml_str(MANIFEST).unwrap();
        assert_eq!(plugin.name(), "docs");

        let tools = plugin.tools();
        assert_eq!(tools.len(), 1);
        let page = tools[0].argument("page_num").unwrap();
        assert!(page.required);
        assert!(page.domain.data_dependent);
        assert!((page.domain.importance - 0.7).abs() < f64::EPSILON);

        let highlight = tools[0].argument("highlight").unwrap();
        assert!(!highlight.required);
        assert_eq!(highlight.default, Some(json!(false)));
    }

    /// Tests duplicate tool names in one manifest.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_duplicate_tools_rejected() {
        let text = "[[tools]]\nname = \"a\"\n\n[[tools]]\nname = \"a\"\n";
        assert!(matches!(ManifestPlugin::from_toml_str(text), Err(Error::Config(_))));
    }

    /// Tests context-bound ranges.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_context_binding() {
        let plugin = ManifestPlugin::from_toml_str(MANIFEST).unwrap();
        let context = json!({"number_of_pages": 40});
        let updates = plugin.domain_updates_from_context(context.as_object().unwrap());

        let domain = &updates["read_page.page_num"];
        assert_eq!(domain.size(), DomainSize::Finite(40));
        assert!((domain.importance - 0.7).abs() < f64::EPSILON);

        let empty = plugin.domain_updates_from_context(&Map::new());
        assert!(empty.is_empty());
    }

    /// Tests scripted failures followed by simulated success.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_scripted_failure_then_success() {
        let plugin = ManifestPlugin::from_toml_str(MANIFEST).unwrap();
        let params = json!({"page_num": 1}).as_object().cloned().unwrap();

        let first = plugin.execute_tool("read_page", &params).await;
        assert!(matches!(first, Err(ToolError::ExecutionFailed { ref kind, .. }) if kind == "timeout"));

        let second = plugin.execute_tool("read_page", &params).await.unwrap();
        assert!(second.success);
        assert_eq!(second.output, Some(json!({"page_num": 1})));
        assert_eq!(plugin.calls().len(), 2);

        let unknown = plugin.execute_tool("write_page", &params).await;
        assert!(matches!(unknown, Err(ToolError::UnknownTool(_))));
    }
}
