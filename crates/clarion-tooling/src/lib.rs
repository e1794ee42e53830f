//! Tooling layer for the clarion agent.
//!
//! This crate provides:
//! - the `Plugin` capability interface implemented once per domain
//! - `ToolRegistry`, the name → tool index with domain mutation
//! - `ToolExecutor`, which validates and dispatches resolved calls
//! - `ManifestPlugin`, a TOML-driven plugin with simulated execution
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

/// Validation and dispatch of tool calls.
mod executor;
/// TOML manifest plugin.
mod manifest;
/// Plugin capability interface.
mod plugin;
/// Tool registry.
mod registry;

pub use executor::ToolExecutor;
pub use manifest::{ManifestPlugin, RecordedCall, ScriptedFailure};
pub use plugin::{Plugin, PluginResponse, ToolError, ToolResult};
pub use registry::ToolRegistry;
