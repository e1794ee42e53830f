//! Tool registry: name → tool index, plugin ownership and domain mutation.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, RwLock};

use clarion_core::{Argument, ArgumentDomain, Error, IgnoreRwLock as _, Result, Tool};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::plugin::Plugin;

/// Registry of every tool the agent may call
pub struct ToolRegistry {
    /// Tool definitions in registration order; the final-answer tool comes first
    tools: RwLock<Vec<Tool>>,
    /// Owning plugin per real tool name
    owners: HashMap<String, Arc<dyn Plugin>>,
    /// Registered plugins in registration order
    plugins: Vec<Arc<dyn Plugin>>,
}

impl ToolRegistry {
    /// Create a registry holding only the virtual final-answer tool
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(vec![Tool::final_answer()]),
            owners: HashMap::new(),
            plugins: Vec::new(),
        }
    }

    /// Add a plugin and index its tools
    ///
    /// # Errors
    /// Returns [`Error::Config`] if any tool name is already registered
    pub fn register_plugin(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let plugin_tools = plugin.tools();
        {
            let tools = self.tools.read_ignore_poison();
            for tool in &plugin_tools {
                if tools.iter().any(|existing| existing.name == tool.name) {
                    return Err(Error::Config(format!(
                        "Tool '{}' from plugin '{}' is already registered",
                        tool.name,
                        plugin.name()
                    )));
                }
            }
        }

        info!(
            "Registered plugin '{}' with {} tools",
            plugin.name(),
            plugin_tools.len()
        );
        for tool in plugin_tools {
            self.owners
                .insert(tool.name.clone(), Arc::clone(&plugin));
            self.tools.write_ignore_poison().push(tool);
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Add a plugin, builder style
    ///
    /// # Errors
    /// Returns [`Error::Config`] if any tool name is already registered
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Result<Self> {
        self.register_plugin(plugin)?;
        Ok(self)
    }

    /// Get a tool by name, if it exists
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<Tool> {
        self.tools
            .read_ignore_poison()
            .iter()
            .find(|tool| tool.name == name)
            .cloned()
    }

    /// Get one argument definition of a tool
    #[must_use]
    pub fn argument(&self, tool_name: &str, arg_name: &str) -> Option<Argument> {
        self.tools
            .read_ignore_poison()
            .iter()
            .find(|tool| tool.name == tool_name)?
            .argument(arg_name)
            .cloned()
    }

    /// List all tools
    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.read_ignore_poison().clone()
    }

    /// Plugin that owns a tool; virtual tools have none
    #[must_use]
    pub fn owner(&self, tool_name: &str) -> Option<Arc<dyn Plugin>> {
        self.owners.get(tool_name).map(Arc::clone)
    }

    /// Get number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read_ignore_poison().len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read_ignore_poison().is_empty()
    }

    /// Human-readable tool catalog for prompting
    #[must_use]
    pub fn render_documentation(&self) -> String {
        let tools = self.tools.read_ignore_poison();
        let mut sections = Vec::with_capacity(tools.len());
        for tool in tools.iter() {
            let mut section = format!(
                "Tool: {}\nDescription: {}\nArguments:",
                tool.name, tool.description
            );
            if tool.arguments.is_empty() {
                section.push_str("\n  (none)");
            }
            for arg in &tool.arguments {
                let _ignored = write!(section, "\n  - {} ({})", arg.name, arg.domain);
                if !arg.description.is_empty() {
                    let _ignored = write!(section, ": {}", arg.description);
                }
                if !arg.required {
                    let default = arg
                        .default
                        .as_ref()
                        .map_or_else(|| "none".to_owned(), Value::to_string);
                    let _ignored = write!(section, " (Optional, default: {default})");
                }
            }
            sections.push(section);
        }
        sections.join("\n\n")
    }

    /// Replace one argument's domain in the registry and in the owning plugin
    ///
    /// # Errors
    /// Returns [`Error::UnknownTool`] if the tool or argument does not exist
    pub fn update_domain(
        &self,
        tool_name: &str,
        arg_name: &str,
        domain: ArgumentDomain,
    ) -> Result<()> {
        {
            let mut tools = self.tools.write_ignore_poison();
            let argument = tools
                .iter_mut()
                .find(|tool| tool.name == tool_name)
                .and_then(|tool| tool.argument_mut(arg_name))
                .ok_or_else(|| Error::UnknownTool(format!("{tool_name}.{arg_name}")))?;
            argument.domain = domain.clone();
        }

        if let Some(plugin) = self.owners.get(tool_name) {
            plugin.accept_domain_update(tool_name, arg_name, &domain);
        }
        debug!("Updated domain of {tool_name}.{arg_name} to {domain}");
        Ok(())
    }

    /// Apply every plugin's context-driven domain updates
    ///
    /// Returns the number of arguments updated.
    pub fn apply_context(&self, context: &Map<String, Value>) -> usize {
        let mut updated = 0;
        for plugin in &self.plugins {
            for (key, domain) in plugin.domain_updates_from_context(context) {
                let Some((tool_name, arg_name)) = key.split_once('.') else {
                    warn!("Plugin '{}' sent malformed domain key '{key}'", plugin.name());
                    continue;
                };
                match self.update_domain(tool_name, arg_name, domain) {
                    Ok(()) => updated += 1,
                    Err(error) => warn!("Skipping domain update from '{}': {error}", plugin.name()),
                }
            }
        }
        if updated > 0 {
            info!("Applied {updated} context-driven domain updates");
        }
        updated
    }

    /// `"tool.arg"` keys whose registry domain differs from the owning plugin's
    #[must_use]
    pub fn divergent_domains(&self) -> Vec<String> {
        let tools = self.tools.read_ignore_poison();
        let mut divergent = Vec::new();
        for plugin in &self.plugins {
            for plugin_tool in plugin.tools() {
                let Some(registered) = tools.iter().find(|tool| tool.name == plugin_tool.name)
                else {
                    divergent.push(format!("{}.*", plugin_tool.name));
                    continue;
                };
                for arg in &plugin_tool.arguments {
                    let matches = registered
                        .argument(&arg.name)
                        .is_some_and(|current| current.domain == arg.domain);
                    if !matches {
                        divergent.push(format!("{}.{}", plugin_tool.name, arg.name));
                    }
                }
            }
        }
        divergent
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
