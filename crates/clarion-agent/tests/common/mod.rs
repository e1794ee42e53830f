//! Shared fixtures for orchestrator tests.

#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use std::env;
use std::sync::{Arc, Once};

use clarion_agent::Orchestrator;
use clarion_core::{AgentConfig, FINAL_ANSWER_ARG, FINAL_ANSWER_TOOL, UNKNOWN};
use clarion_providers::MockProvider;
use clarion_tooling::{ManifestPlugin, Plugin, ToolRegistry};
use serde_json::{Value, json};
use tracing_subscriber::{EnvFilter, fmt};

/// Travel tools with a ten-airport domain.
pub const TRAVEL_MANIFEST: &str = r#"
name = "travel"

[[tools]]
name = "book_flight"
description = "Book a flight between two airports"

[[tools.arguments]]
name = "travel_from"
description = "Departure airport"
domain = { kind = "finite", values = ["SFO", "LAX", "JFK", "ORD", "SEA", "BOS", "DEN", "ATL", "MIA", "DFW"], importance = 0.8 }

[[tools.arguments]]
name = "travel_to"
description = "Destination airport"
domain = { kind = "finite", values = ["SFO", "LAX", "JFK", "ORD", "SEA", "BOS", "DEN", "ATL", "MIA", "DFW"], importance = 0.8 }

[[tools]]
name = "read_page"
description = "Read one page of the itinerary"

[[tools.arguments]]
name = "page_num"
domain = { kind = "numeric_range", min = 1, max = 1, bound_to = "number_of_pages" }
"#;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests (idempotent).
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = env::var("RUST_LOG").unwrap_or_else(|_| "clarion=debug".to_owned());
        if fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_test_writer()
            .try_init()
            .is_err()
        {
            // already initialized in this process
        }
    });
}

/// Travel plugin, optionally with extra `[[failures]]` entries.
pub fn travel_plugin(failures: &str) -> Arc<ManifestPlugin> {
    let manifest = format!("{TRAVEL_MANIFEST}\n{failures}");
    Arc::new(ManifestPlugin::from_toml_str(&manifest).unwrap())
}

/// Orchestrator over `plugin` driven by `provider`.
pub fn orchestrator(
    provider: &MockProvider,
    plugin: &Arc<ManifestPlugin>,
    config: &AgentConfig,
) -> Orchestrator {
    init_tracing();
    let registry = ToolRegistry::new()
        .with_plugin(Arc::clone(plugin) as Arc<dyn Plugin>)
        .unwrap();
    Orchestrator::new(Arc::new(provider.clone()), Arc::new(registry), config)
}

/// Reasoning reply proposing one call.
pub fn propose(tool: &str, arguments: &Value) -> String {
    json!({
        "reasoning": format!("Calling {tool}"),
        "tool_calls": [{"tool_name": tool, "arguments": arguments}]
    })
    .to_string()
}

/// Reasoning reply proposing a flight from SFO to `destination`.
pub fn propose_flight(destination: &str) -> String {
    propose(
        "book_flight",
        &json!({"travel_from": "SFO", "travel_to": destination}),
    )
}

/// Reasoning reply proposing a flight with an unknown destination.
pub fn propose_unknown_flight() -> String {
    propose_flight(UNKNOWN)
}

/// Reasoning reply giving the final answer.
pub fn propose_answer(answer: &str) -> String {
    propose(FINAL_ANSWER_TOOL, &json!({ FINAL_ANSWER_ARG: answer }))
}

/// Question-generation reply asking for the destination.
pub fn destination_questions() -> String {
    json!({"questions": [{
        "question": "Where would you like to fly to?",
        "target_args": [["book_flight", "travel_to"]]
    }]})
    .to_string()
}

/// Answer-interpretation reply setting the destination.
pub fn destination_update(destination: &str) -> String {
    json!({"updated_tool_calls": [{
        "tool_name": "book_flight",
        "arguments": {"travel_to": destination}
    }]})
    .to_string()
}

/// Question-generation reply asking for the departure airport.
pub fn origin_questions() -> String {
    json!({"questions": [{
        "question": "Where are you flying from?",
        "target_args": [["book_flight", "travel_from"]]
    }]})
    .to_string()
}
