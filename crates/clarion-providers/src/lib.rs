//! Provider adapters for the language model services the agent reasons with.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::float_cmp,
        reason = "Allow for tests"
    )
)]

use std::sync::Arc;

use clarion_core::config::ENV_OPENROUTER_API_KEY;
use clarion_core::{AgentConfig, Error, LanguageModel, ProviderKind, Result};

/// Scripted provider for tests and offline runs.
pub mod mock;
/// Local Ollama server provider.
pub mod ollama;
/// `OpenRouter` chat completions provider.
pub mod openrouter;

pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;

/// Builds the provider selected by the configuration.
///
/// # Errors
/// Returns an error if the selected provider needs an API key that is missing.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LanguageModel>> {
    let llm = &config.llm;
    match llm.provider {
        ProviderKind::Mock => Ok(Arc::new(MockProvider::from_config(llm))),
        ProviderKind::Ollama => {
            let mut provider = OllamaProvider::new(llm.model.clone());
            if let Some(base) = &llm.api_base {
                provider = provider.with_url(base.clone());
            }
            Ok(Arc::new(provider))
        }
        ProviderKind::OpenRouter => {
            let api_key = config.get_api_key(ProviderKind::OpenRouter).ok_or_else(|| {
                Error::MissingApiKey(format!("{ENV_OPENROUTER_API_KEY} or config.toml llm.api_key"))
            })?;
            let mut provider = OpenRouterProvider::new(api_key)?.with_model(llm.model.clone());
            if let Some(base) = &llm.api_base {
                provider = provider.with_url(base.clone());
            }
            Ok(Arc::new(provider))
        }
    }
}
