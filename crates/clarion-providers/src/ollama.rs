use async_trait::async_trait;
use clarion_core::{Error, GenerationParams, LanguageModel, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default Ollama server address.
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Request body for Ollama's `/api/generate`.
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    /// Model to run
    model: String,
    /// Full prompt
    prompt: String,
    /// Always false; we wait for the complete reply
    stream: bool,
    /// `"json"` to constrain output to JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    /// Sampling options
    options: OllamaOptions,
}

/// Sampling options for Ollama.
#[derive(Debug, Serialize)]
struct OllamaOptions {
    /// Sampling temperature
    temperature: f32,
    /// Maximum tokens to generate
    num_predict: u32,
}

/// Response body of `/api/generate` with `stream = false`.
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    /// Generated text
    response: String,
}

/// Local model provider using Ollama
pub struct OllamaProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Server base URL.
    base_url: String,
    /// Model name to run.
    model_name: String,
}

impl OllamaProvider {
    /// Creates a provider for a locally installed model.
    #[must_use]
    pub fn new(model_name: String) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_OLLAMA_URL.to_owned(),
            model_name,
        }
    }

    /// Points the provider at a different server.
    #[must_use]
    pub fn with_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_owned();
        self
    }
}

#[async_trait]
impl LanguageModel for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate_text(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let request = OllamaGenerateRequest {
            model: self.model_name.clone(),
            prompt: prompt.to_owned(),
            stream: false,
            format: params.json_mode.then_some("json"),
            options: OllamaOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        };

        debug!("Ollama request to {} ({} chars)", self.model_name, prompt.len());
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("Ollama request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "Ollama returned error: {}",
                response.status()
            )));
        }

        let ollama_response: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|err| Error::Provider(format!("Failed to parse Ollama response: {err}")))?;

        Ok(ollama_response.response)
    }
}
