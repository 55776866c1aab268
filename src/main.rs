//! ctxguard dry run
//!
//! Runs one pre-call compaction over a saved transcript and prints what the
//! guard would send to the model.
//!
//! ```bash
//! ctxguard --config guard.toml --transcript turns.json --agent support --model gpt-4o
//! ```
//!
//! The summarization client is offline and always answers with no text, so
//! a triggered compaction shows the mechanical fallback summary.

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use ctxguard_core::{
    CallContext, ContextGuard, GenerateRequest, GuardConfig, GuardResult,
    InMemoryConversationState, LanguageModelClient, ModelRegistry, ModelRequest, StrategyTable,
    Turn,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "ctxguard.toml";

#[derive(Parser)]
#[command(name = "ctxguard")]
#[command(about = "Dry-run the context guard against a saved transcript")]
#[command(version)]
struct Cli {
    /// Guard configuration (TOML, YAML or JSON)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, env = "CTXGUARD_CONFIG")]
    config: PathBuf,

    /// JSON array of turns
    #[arg(long)]
    transcript: PathBuf,

    /// Agent id to look up in the configuration
    #[arg(long)]
    agent: String,

    /// Model id used to resolve the context window
    #[arg(long)]
    model: String,

    /// System instruction sent with the request
    #[arg(long)]
    system: Option<String>,
}

/// Client that never reaches a model
struct OfflineClient;

#[async_trait]
impl LanguageModelClient for OfflineClient {
    async fn generate(&self, _request: GenerateRequest) -> GuardResult<String> {
        Ok(String::new())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG=debug for verbose logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = GuardConfig::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let raw = std::fs::read_to_string(&cli.transcript)
        .with_context(|| format!("reading {}", cli.transcript.display()))?;
    let turns: Vec<Turn> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", cli.transcript.display()))?;
    info!(
        config = %cli.config.display(),
        agents = config.agents.len(),
        turns = turns.len(),
        "ctxguard: configuration and transcript loaded"
    );

    let client: Arc<dyn LanguageModelClient> = Arc::new(OfflineClient);
    let clients: HashMap<String, Arc<dyn LanguageModelClient>> = config
        .agents
        .keys()
        .map(|agent| (agent.clone(), client.clone()))
        .collect();
    let table = StrategyTable::build(
        &config,
        Arc::new(ModelRegistry::with_builtin_models()),
        &clients,
    )?;
    let guard = ContextGuard::new(table);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let ctx = CallContext::new(cli.agent, Arc::new(InMemoryConversationState::new()))
        .with_session("dry-run")
        .with_cancellation(cancel);
    let mut request = ModelRequest::new(cli.model, turns);
    if let Some(system) = cli.system {
        request = request.with_system_instruction(system);
    }

    let outcome = guard.before_model_call(&ctx, &mut request).await;
    if outcome.is_none() {
        warn!(
            agent = %ctx.agent_id,
            "ctxguard: no compaction outcome, request passes through unchanged"
        );
    }
    let report = serde_json::json!({
        "outcome": outcome,
        "turns": request.turns,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
