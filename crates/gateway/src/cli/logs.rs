//! `maestro logs`: list, show, and search past runs.

use clap::Subcommand;

use maestro_domain::config::Config;
use maestro_domain::task::RunId;
use maestro_runs::index::{search_index, semantic_search_index};
use maestro_runs::RunRepository;

#[derive(Subcommand)]
pub enum LogsCommand {
    /// List run ids, oldest first.
    List,
    /// Print a run's event log as JSON lines.
    Show { run_id: String },
    /// Search the cross-run index.
    Search {
        query: String,
        /// Rank by embedding similarity (requires an embedding model in
        /// config; degrades to keyword search otherwise).
        #[arg(long)]
        semantic: bool,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

pub async fn run(config: &Config, command: LogsCommand) -> anyhow::Result<()> {
    let repository = RunRepository::new(&config.workspace_root);

    match command {
        LogsCommand::List => {
            for run_id in repository.list_runs()? {
                println!("{run_id}");
            }
        }
        LogsCommand::Show { run_id } => {
            let run_id = RunId(run_id);
            let events = repository.read_run_events(&run_id)?;
            if events.is_empty() {
                anyhow::bail!("no events found for run {run_id:?}");
            }
            for event in events {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        LogsCommand::Search {
            query,
            semantic,
            limit,
        } => {
            let entries = if semantic {
                let model = config.run_index.embedding_model.as_deref().unwrap_or("");
                let base_url = config
                    .run_index
                    .embedding_base_url
                    .clone()
                    .or_else(|| config.models.get("quality").map(|m| m.base_url.clone()))
                    .unwrap_or_default();
                if model.is_empty() {
                    tracing::warn!("no embedding model configured; using keyword search");
                    search_index(&config.workspace_root, &query, limit)
                } else {
                    semantic_search_index(&config.workspace_root, &query, model, &base_url, limit)
                        .await
                }
            } else {
                search_index(&config.workspace_root, &query, limit)
            };

            for entry in entries {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
    }
    Ok(())
}
