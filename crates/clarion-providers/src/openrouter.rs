use async_trait::async_trait;
use clarion_core::config::ENV_OPENROUTER_API_KEY;
use clarion_core::{Error, GenerationParams, LanguageModel, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// `OpenRouter` API endpoint URL.
const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
/// Default model for `OpenRouter`.
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Provider implementation for `OpenRouter` API.
pub struct OpenRouterProvider {
    /// HTTP client for API requests.
    client: Client,
    /// `OpenRouter` API key.
    api_key: String,
    /// Model name to use.
    model: String,
    /// Chat completions endpoint.
    url: String,
}

impl OpenRouterProvider {
    /// Creates a new `OpenRouterProvider` with the given API key.
    ///
    /// # Errors
    /// Returns an error if the provided API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_OPENROUTER_API_KEY.to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            url: OPENROUTER_API_URL.to_owned(),
        })
    }

    /// Sets the model to use for generation.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        if !model.is_empty() {
            self.model = model;
        }
        self
    }

    /// Overrides the chat completions endpoint.
    #[must_use]
    pub fn with_url(mut self, url: String) -> Self {
        self.url = url;
        self
    }
}

/// Response payload returned by the `OpenRouter` API.
#[derive(Deserialize)]
struct OpenRouterResponse {
    /// List of generated choices.
    choices: Vec<Choice>,
}

/// Individual completion choice from `OpenRouter`.
#[derive(Deserialize)]
struct Choice {
    /// Message payload representing the completion text.
    message: Message,
}

/// Message structure containing generated content.
#[derive(Deserialize)]
struct Message {
    /// Text content produced by the model.
    content: String,
}

#[async_trait]
impl LanguageModel for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn generate_text(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let mut request_body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });
        if params.json_mode {
            request_body["response_format"] = json!({"type": "json_object"});
        }

        debug!("OpenRouter request to {} ({} chars)", self.model, prompt.len());
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "Clarion")
            .json(&request_body)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("Request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "OpenRouter API request failed with status {status}: {error_text}"
            )));
        }

        let api_response: OpenRouterResponse = response
            .json()
            .await
            .map_err(|err| Error::Provider(format!("Failed to parse response: {err}")))?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Provider("No response from OpenRouter".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            OpenRouterProvider::new(String::new()),
            Err(Error::MissingApiKey(_))
        ));
    }

    #[test]
    fn test_with_model_keeps_default_for_empty() {
        let provider = OpenRouterProvider::new("key".to_owned())
            .unwrap()
            .with_model(String::new());
        assert_eq!(provider.model, DEFAULT_MODEL);
        let provider = provider.with_model("meta-llama/llama-3.1-8b-instruct".to_owned());
        assert_eq!(provider.model, "meta-llama/llama-3.1-8b-instruct");
    }
}
