use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::Result;
use crate::json::{JsonOutcome, parse_json_output};

/// Sampling parameters for a single generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Whether the provider should constrain output to JSON
    pub json_mode: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.2,
            json_mode: false,
        }
    }
}

/// Trait for language model services that produce text for the agent.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the identifier of this model service.
    fn name(&self) -> &str;

    /// Generates free text for the prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable or rejects the request.
    async fn generate_text(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    /// Generates a JSON value shaped like `schema`, falling back to `default`.
    ///
    /// Never fails: malformed output gets one repair attempt and transport
    /// errors are reported through [`JsonOutcome::transport_error`].
    async fn generate_json(
        &self,
        prompt: &str,
        schema: &Value,
        params: &GenerationParams,
        default: Value,
    ) -> JsonOutcome {
        let full_prompt =
            format!("{prompt}\n\nRespond with JSON only, matching this schema:\n{schema}");
        let json_params = GenerationParams {
            json_mode: true,
            ..*params
        };
        match self.generate_text(&full_prompt, &json_params).await {
            Ok(raw) => parse_json_output(&raw, default),
            Err(error) => {
                warn!("{} failed to generate JSON: {error}", self.name());
                JsonOutcome::transport_failure(default, error.to_string())
            }
        }
    }
}
