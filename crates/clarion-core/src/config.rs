//! Agent configuration: language model, questioning policy, execution limits and logging.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::GenerationParams;

/// Env var consulted for the `OpenRouter` API key.
pub const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";

/// Complete agent configuration.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Language model settings
    pub llm: LlmConfig,
    /// Question generation and selection settings
    pub question: QuestionConfig,
    /// Orchestration loop settings
    pub execution: ExecutionConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Which language model service backs the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Scripted responses from `mock_responses`
    #[default]
    Mock,
    /// Local Ollama server
    Ollama,
    /// `OpenRouter` chat completions
    OpenRouter,
}

/// Language model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider to use
    pub provider: ProviderKind,
    /// Model name passed to the provider
    pub model: String,
    /// Base URL override for the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// API key; falls back to the environment when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Maximum tokens per generation
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Canned replies for the mock provider, keyed by prompt substring
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub mock_responses: BTreeMap<String, Vec<String>>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Mock,
            model: "qwen2.5:7b".to_owned(),
            api_base: None,
            api_key: None,
            max_tokens: 2000,
            temperature: 0.2,
            mock_responses: BTreeMap::new(),
        }
    }
}

impl LlmConfig {
    /// Generation parameters derived from this configuration.
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            json_mode: false,
        }
    }
}

/// Question generation and selection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionConfig {
    /// Maximum candidate questions requested per turn
    pub max_candidates: usize,
    /// Base UCB threshold before any clarification
    pub base_threshold: f64,
    /// Threshold growth per clarification asked
    pub threshold_alpha: f64,
    /// Weight of the exploration term
    pub exploration_constant: f64,
    /// Sequence certainty at or above which no question is asked
    pub certainty_threshold: f64,
    /// Arguments below this certainty are offered to the question generator
    pub uncertain_cutoff: f64,
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self {
            max_candidates: 5,
            base_threshold: 0.1,
            threshold_alpha: 0.05,
            exploration_constant: 1.0,
            certainty_threshold: 0.9,
            uncertain_cutoff: 0.9,
        }
    }
}

/// Orchestration loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Maximum reason/act cycles per request
    pub max_steps: usize,
    /// Execution error kinds retried by re-reasoning
    pub recoverable_errors: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            recoverable_errors: ["timeout", "transient", "rate_limited", "unavailable"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    /// Log file path; defaults to `~/.clarion/debug.log`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "clarion=info".to_owned(),
            log_file: None,
        }
    }
}

impl AgentConfig {
    /// Directory holding the config file and default log.
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".clarion"))
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))
    }

    /// Get the default config file path (`~/.clarion/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, creating it if it doesn't exist
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read, parsed, or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or fails validation
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(
            "Loaded config from {:?}: provider={:?}, api_key={}",
            path,
            config.llm.provider,
            if config.llm.api_key.is_some() {
                "present"
            } else {
                "missing"
            }
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)?;

        let header = "# Clarion Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Get API key for a provider, checking config first, then environment variables
    pub fn get_api_key(&self, provider: ProviderKind) -> Option<String> {
        match provider {
            ProviderKind::OpenRouter => self
                .llm
                .api_key
                .clone()
                .or_else(|| env::var(ENV_OPENROUTER_API_KEY).ok()),
            ProviderKind::Ollama => self.llm.api_key.clone(),
            ProviderKind::Mock => None,
        }
    }

    /// Checks that thresholds and limits are usable.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        let question = &self.question;
        for (name, value) in [
            ("question.base_threshold", question.base_threshold),
            ("question.certainty_threshold", question.certainty_threshold),
            ("question.uncertain_cutoff", question.uncertain_cutoff),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if question.threshold_alpha.is_nan() || question.threshold_alpha < 0.0 {
            return Err(Error::Config(format!(
                "question.threshold_alpha must be non-negative, got {}",
                question.threshold_alpha
            )));
        }
        if question.exploration_constant.is_nan() || question.exploration_constant < 0.0 {
            return Err(Error::Config(format!(
                "question.exploration_constant must be non-negative, got {}",
                question.exploration_constant
            )));
        }
        if self.execution.max_steps == 0 {
            return Err(Error::Config(
                "execution.max_steps must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
