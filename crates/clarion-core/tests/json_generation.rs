//! Tests for the provided `LanguageModel::generate_json` behaviour.

#![cfg_attr(
    test,
    allow(
        clippy::tests_outside_test_module,
        clippy::missing_panics_doc,
        clippy::unwrap_used,
        reason = "Test file allows"
    )
)]

use async_trait::async_trait;
use clarion_core::{Error, GenerationParams, LanguageModel, Result};
use serde_json::json;
use std::sync::Mutex;

/// Model that replays one fixed reply and remembers the params it saw.
struct FixedModel {
    reply: Option<String>,
    seen: Mutex<Vec<GenerationParams>>,
}

impl FixedModel {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_owned()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn unreachable() -> Self {
        Self {
            reply: None,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageModel for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn generate_text(&self, _prompt: &str, params: &GenerationParams) -> Result<String> {
        self.seen.lock().unwrap().push(*params);
        self.reply
            .clone()
            .ok_or_else(|| Error::Provider("connection refused".to_owned()))
    }
}

#[tokio::test]
async fn test_generate_json_sets_json_mode() {
    let model = FixedModel::replying(r#"{"tool_calls": []}"#);
    let outcome = model
        .generate_json("prompt", &json!({}), &GenerationParams::default(), json!(null))
        .await;

    assert!(outcome.is_usable());
    assert_eq!(outcome.value, json!({"tool_calls": []}));
    let seen = model.seen.lock().unwrap();
    assert!(seen.iter().all(|params| params.json_mode));
}

#[tokio::test]
async fn test_generate_json_repairs_then_falls_back() {
    let model = FixedModel::replying("```json\n{\"a\": [1,],}\n```");
    let repaired = model
        .generate_json("prompt", &json!({}), &GenerationParams::default(), json!({}))
        .await;
    assert!(repaired.repaired);
    assert_eq!(repaired.value, json!({"a": [1]}));

    let garbage = FixedModel::replying("I am not JSON");
    let fallback = garbage
        .generate_json("prompt", &json!({}), &GenerationParams::default(), json!({"d": 1}))
        .await;
    assert!(fallback.fallback_used);
    assert!(fallback.transport_error.is_none());
    assert_eq!(fallback.value, json!({"d": 1}));
}

#[tokio::test]
async fn test_generate_json_reports_transport_failure() {
    let model = FixedModel::unreachable();
    let outcome = model
        .generate_json("prompt", &json!({}), &GenerationParams::default(), json!({}))
        .await;

    assert!(outcome.fallback_used);
    assert!(
        outcome
            .transport_error
            .as_deref()
            .is_some_and(|error| error.contains("connection refused"))
    );
}
