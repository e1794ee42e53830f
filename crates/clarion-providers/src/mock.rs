//! Mock provider for testing agent conversations.
//!
//! Allows scripting replies for prompt patterns, enabling end-to-end tests
//! of the orchestration loop without real model calls.

use async_trait::async_trait;
use clarion_core::{
    Error, GenerationParams, IgnoreLock as _, LanguageModel, LlmConfig, Result,
};
use std::sync::{Arc, Mutex};

/// Sequence of replies for one prompt pattern
#[derive(Debug, Clone)]
struct Script {
    /// Substring the prompt must contain
    pattern: String,
    /// Replies in order; the last one repeats
    replies: Vec<String>,
    /// Index of the next reply
    cursor: usize,
}

impl Script {
    /// Returns the next reply, repeating the last one once exhausted.
    fn next_reply(&mut self) -> Option<String> {
        let index = self.cursor.min(self.replies.len().checked_sub(1)?);
        self.cursor += 1;
        self.replies.get(index).cloned()
    }
}

/// Script storage type
type ScriptList = Arc<Mutex<Vec<Script>>>;

/// Mock provider that returns scripted replies based on prompt patterns.
///
/// A prompt matches a pattern exactly or by containing it; among substring
/// matches the longest pattern wins.
#[derive(Clone)]
pub struct MockProvider {
    /// Name of this mock provider
    name: String,
    /// Scripted replies keyed by prompt pattern
    scripts: ScriptList,
    /// Patterns that fail with a provider error
    errors: Arc<Mutex<Vec<(String, String)>>>,
    /// Default reply if no pattern matches
    default_response: Arc<Mutex<Option<String>>>,
    /// Call history for verification
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Create a new mock provider with a given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scripts: Arc::new(Mutex::new(Vec::new())),
            errors: Arc::new(Mutex::new(Vec::new())),
            default_response: Arc::new(Mutex::new(None)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock provider from the `mock_responses` table of the config.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        config
            .mock_responses
            .iter()
            .fold(Self::new("mock"), |provider, (pattern, replies)| {
                provider.with_sequence(pattern.clone(), replies.clone())
            })
    }

    /// Append a reply to the sequence for a pattern.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.with_sequence(pattern, vec![response.into()])
    }

    /// Append several replies to the sequence for a pattern.
    #[must_use]
    pub fn with_sequence(self, pattern: impl Into<String>, replies: Vec<String>) -> Self {
        {
            let pattern = pattern.into();
            let mut scripts = self.scripts.lock_ignore_poison();
            if let Some(script) = scripts.iter_mut().find(|script| script.pattern == pattern) {
                script.replies.extend(replies);
            } else {
                scripts.push(Script {
                    pattern,
                    replies,
                    cursor: 0,
                });
            }
        }
        self
    }

    /// Make prompts containing `pattern` fail with a provider error.
    #[must_use]
    pub fn with_error(self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        {
            let mut errors = self.errors.lock_ignore_poison();
            errors.push((pattern.into(), message.into()));
        }
        self
    }

    /// Set a default response for prompts that don't match any pattern.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        {
            let mut default = self.default_response.lock_ignore_poison();
            *default = Some(response.into());
        }
        self
    }

    /// Get the call history (list of all prompts received).
    #[must_use]
    pub fn get_call_history(&self) -> Vec<String> {
        let history = self.call_history.lock_ignore_poison();
        history.clone()
    }

    /// Get the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        let history = self.call_history.lock_ignore_poison();
        history.len()
    }

    /// Number of recorded prompts containing `needle`.
    #[must_use]
    pub fn calls_containing(&self, needle: &str) -> usize {
        let history = self.call_history.lock_ignore_poison();
        history.iter().filter(|prompt| prompt.contains(needle)).count()
    }

    /// Find the next scripted reply for the given prompt.
    fn find_response(&self, prompt: &str) -> Option<String> {
        let mut scripts = self.scripts.lock_ignore_poison();

        // Try exact match first
        if let Some(script) = scripts.iter_mut().find(|script| script.pattern == prompt) {
            return script.next_reply();
        }

        // Longest substring match
        scripts
            .iter_mut()
            .filter(|script| prompt.contains(&script.pattern))
            .max_by_key(|script| script.pattern.len())
            .and_then(Script::next_reply)
    }
}

#[async_trait]
impl LanguageModel for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_text(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        // Record the call
        {
            let mut history = self.call_history.lock_ignore_poison();
            history.push(prompt.to_owned());
        }

        let failure = {
            let errors = self.errors.lock_ignore_poison();
            errors
                .iter()
                .find(|(pattern, _)| prompt.contains(pattern.as_str()))
                .map(|(_, message)| message.clone())
        };
        if let Some(message) = failure {
            return Err(Error::Provider(message));
        }

        Ok(self.find_response(prompt).unwrap_or_else(|| {
            let default = self.default_response.lock_ignore_poison();
            default
                .clone()
                .unwrap_or_else(|| format!("Mock response for prompt: {prompt}"))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clarion_core::GenerationParams;
    use serde_json::json;
    use std::collections::BTreeMap;

    /// Tests exact prompt matching in mock provider.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_mock_provider_exact_match() {
        let provider = MockProvider::new("test").with_response("hello", "world");
        let reply = provider
            .generate_text("hello", &GenerationParams::default())
            .await;
        assert!(reply.is_ok_and(|text| text == "world"));
    }

    /// Tests longest-substring matching in mock provider.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_mock_provider_longest_pattern_wins() {
        let provider = MockProvider::new("test")
            .with_response("TASK", "generic")
            .with_response("TASK: reason", "specific");
        let reply = provider
            .generate_text("TASK: reason\nrequest", &GenerationParams::default())
            .await;
        assert!(reply.is_ok_and(|text| text == "specific"));
    }

    /// Tests that sequences advance and the last reply repeats.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_mock_provider_sequence() {
        let provider = MockProvider::new("test")
            .with_sequence("step", vec!["one".to_owned(), "two".to_owned()]);
        let params = GenerationParams::default();

        let mut replies = Vec::new();
        for _ in 0..3 {
            replies.push(provider.generate_text("next step", &params).await.unwrap());
        }
        assert_eq!(replies, vec!["one", "two", "two"]);
        assert_eq!(provider.call_count(), 3);
    }

    /// Tests default response fallback in mock provider.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_mock_provider_default_response() {
        let provider = MockProvider::new("test").with_default_response("Default response");
        let reply = provider
            .generate_text("anything", &GenerationParams::default())
            .await;
        assert!(reply.is_ok_and(|text| text == "Default response"));
    }

    /// Tests scripted provider errors surface through JSON generation.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_mock_provider_error() {
        let provider = MockProvider::new("test").with_error("TASK: reason", "service down");
        let outcome = provider
            .generate_json(
                "TASK: reason",
                &json!({}),
                &GenerationParams::default(),
                json!({}),
            )
            .await;
        assert!(outcome.fallback_used);
        assert!(outcome.transport_error.is_some());
    }

    /// Tests building a mock provider from configuration.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[tokio::test]
    async fn test_mock_provider_from_config() {
        let mut responses = BTreeMap::new();
        responses.insert("ping".to_owned(), vec!["pong".to_owned()]);
        let config = LlmConfig {
            mock_responses: responses,
            ..LlmConfig::default()
        };

        let provider = MockProvider::from_config(&config);
        assert_eq!(provider.name(), "mock");
        let reply = provider
            .generate_text("ping", &GenerationParams::default())
            .await;
        assert!(reply.is_ok_and(|text| text == "pong"));
    }
}
