//! Drives an orchestrator from line-based input and prints its results.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use clarion_agent::{Orchestrator, RunResult};
use clarion_core::{AgentConfig, OutcomeKind};
use clarion_providers::create_provider;
use clarion_tooling::{ManifestPlugin, ToolRegistry};
use console::{Term, style};
use serde_json::{Map, Value};
use tokio::fs as async_fs;
use tokio::io::{AsyncBufRead, Lines};
use tracing::{info, warn};

/// Input that ends the interactive loop.
const EXIT_COMMAND: &str = "exit";

/// Registry with one plugin per manifest.
///
/// # Errors
/// Returns an error if a manifest cannot be loaded or two manifests define
/// the same tool
pub fn load_registry(manifests: &[impl AsRef<Path>]) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for path in manifests {
        let path = path.as_ref();
        let plugin = ManifestPlugin::load(path)
            .with_context(|| format!("Failed to load manifest {}", path.display()))?;
        registry.register_plugin(Arc::new(plugin))?;
    }
    info!("Registered {} tools", registry.len());
    Ok(registry)
}

/// Reads the context file as a JSON object.
///
/// # Errors
/// Returns an error if the file cannot be read or is not a JSON object
pub async fn load_context(path: &Path) -> Result<Map<String, Value>> {
    let text = async_fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read context {}", path.display()))?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(context) => Ok(context),
        other => bail!("Context must be a JSON object, got {other}"),
    }
}

/// One conversation between the user and the agent.
pub struct Session {
    /// The agent
    orchestrator: Orchestrator,
    /// Context offered to plugins on every run
    context: Map<String, Value>,
    /// Where results are shown
    term: Term,
}

impl Session {
    /// Builds the provider, registry and orchestrator for a conversation.
    ///
    /// # Errors
    /// Returns an error if the provider cannot be created
    pub fn new(
        config: &AgentConfig,
        registry: ToolRegistry,
        context: Map<String, Value>,
    ) -> Result<Self> {
        let llm = create_provider(config)?;
        info!("Using {} provider", llm.name());
        Ok(Self {
            orchestrator: Orchestrator::new(llm, Arc::new(registry), config),
            context,
            term: Term::stdout(),
        })
    }

    /// Agent serving this session.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Runs one request, answering clarifying questions from `input`.
    ///
    /// Returns the last result, or `None` if input ended while a question was
    /// pending.
    ///
    /// # Errors
    /// Returns an error if reading input or writing output fails
    pub async fn handle_request<R>(
        &mut self,
        request: &str,
        input: &mut Lines<R>,
    ) -> Result<Option<RunResult>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut text = request.to_owned();
        loop {
            let result = self.orchestrator.run(&text, &self.context).await;
            self.show(&result)?;
            if !result.kind.is_suspended() {
                return Ok(Some(result));
            }

            let Some(answer) = input.next_line().await? else {
                warn!("Input ended with a question pending");
                return Ok(None);
            };
            text = self
                .orchestrator
                .apply_clarification(&text, answer.trim())
                .await;
        }
    }

    /// Reads requests from `input` until it ends or the user types `exit`.
    ///
    /// # Errors
    /// Returns an error if reading input or writing output fails
    pub async fn run_interactive<R>(&mut self, input: &mut Lines<R>) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.term
            .write_line(&format!("{}", style("Ask me anything (type 'exit' to quit)").dim()))?;
        while let Some(line) = input.next_line().await? {
            let request = line.trim();
            if request.is_empty() {
                continue;
            }
            if request.eq_ignore_ascii_case(EXIT_COMMAND) {
                break;
            }
            if self.handle_request(request, input).await?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Writes the conversation tree, legacy view, candidate audit log and
    /// metrics as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if serialization or writing fails
    pub async fn write_transcript(&self, path: &Path) -> Result<()> {
        let mut transcript = Map::new();
        transcript.insert(
            "tree".to_owned(),
            serde_json::to_value(self.orchestrator.conversation_tree())?,
        );
        transcript.insert(
            "legacy".to_owned(),
            serde_json::to_value(self.orchestrator.legacy_view())?,
        );
        transcript.insert(
            "audit".to_owned(),
            serde_json::to_value(self.orchestrator.audit_log())?,
        );
        transcript.insert(
            "metrics".to_owned(),
            serde_json::to_value(self.orchestrator.metrics())?,
        );
        async_fs::write(path, serde_json::to_string_pretty(&transcript)?)
            .await
            .with_context(|| format!("Failed to write transcript {}", path.display()))?;
        info!("Transcript written to {}", path.display());
        Ok(())
    }

    /// Prints one result.
    fn show(&self, result: &RunResult) -> Result<()> {
        let line = match result.kind {
            OutcomeKind::Completed => format!("{} {}", style("✓").green().bold(), result.message),
            OutcomeKind::Clarification => {
                format!("{} {}", style("?").cyan().bold(), style(&result.message).cyan())
            }
            OutcomeKind::ErrorClarification => {
                format!("{} {}", style("!").yellow().bold(), style(&result.message).yellow())
            }
            OutcomeKind::Error => format!("{} {}", style("✗").red().bold(), result.message),
        };
        self.term.write_line(&line)?;
        Ok(())
    }
}
