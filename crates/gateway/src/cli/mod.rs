//! CLI definition and config loading.

pub mod logs;
pub mod plan;
pub mod resume;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use maestro_domain::config::Config;
use maestro_engine::TaskExecutor;
use maestro_packs::SpecialistRegistry;
use maestro_providers::build_chat_client;
use maestro_runs::RunRepository;

#[derive(Parser)]
#[command(name = "maestro", about = "Local-first autonomous agent orchestrator", version)]
pub struct Cli {
    /// Path to the TOML config file (default: $MAESTRO_CONFIG, then
    /// ./maestro.toml, then built-in defaults).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute a task.
    Run {
        /// The task prompt.
        prompt: String,
        /// Bypass recruitment and use this specialist.
        #[arg(long)]
        pack: Option<String>,
        /// Model key from the config (default "quality").
        #[arg(long, default_value = "quality")]
        model_key: String,
        /// Allow network tools (web search, fetch, browser).
        #[arg(long)]
        network: bool,
        /// Print run events as they happen.
        #[arg(long)]
        stream: bool,
    },
    /// Show the orchestration plan for a prompt without executing it.
    Plan { prompt: String },
    /// Resume an interrupted run from its checkpoint.
    Resume { run_id: String },
    /// Inspect past runs.
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommand,
    },
    /// Start the HTTP gateway.
    Serve,
}

/// Load config: explicit path → `$MAESTRO_CONFIG` → `./maestro.toml` →
/// built-in local defaults. Validation problems are fatal.
pub fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<Config> {
    let path = explicit
        .cloned()
        .or_else(|| std::env::var("MAESTRO_CONFIG").ok().map(PathBuf::from))
        .or_else(|| {
            let default = PathBuf::from("maestro.toml");
            default.is_file().then_some(default)
        });

    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let config: Config = toml::from_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?;
            tracing::info!(path = %path.display(), "config loaded");
            config
        }
        None => {
            tracing::debug!("no config file found; using built-in defaults");
            Config::default_local()
        }
    };

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("config: {problem}");
        }
        anyhow::bail!("config validation failed with {} problem(s)", problems.len());
    }
    Ok(config)
}

/// Wire up a [`TaskExecutor`] for a model key.
pub fn build_executor(config: &Config, model_key: &str) -> anyhow::Result<TaskExecutor> {
    let model_cfg = config
        .models
        .get(model_key)
        .or_else(|| config.models.get("quality"))
        .with_context(|| format!("no model config for {model_key:?}"))?;
    let chat_client = build_chat_client(model_cfg)?;
    let repository = Arc::new(RunRepository::new(&config.workspace_root));
    let registry = Arc::new(SpecialistRegistry::new(config.clone()));
    Ok(TaskExecutor::new(
        config.clone(),
        chat_client,
        registry,
        repository,
    ))
}
