use clap::Parser;
use tracing_subscriber::EnvFilter;

use maestro_gateway::api;
use maestro_gateway::cli::{load_config, logs, plan, resume, run, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => {
            init_tracing(true);
            let config = load_config(cli.config.as_ref())?;
            api::serve(config).await
        }
        Command::Run {
            prompt,
            pack,
            model_key,
            network,
            stream,
        } => {
            init_tracing(false);
            let config = load_config(cli.config.as_ref())?;
            run::run(&config, &prompt, pack, &model_key, network, stream).await
        }
        Command::Plan { prompt } => {
            init_tracing(false);
            let config = load_config(cli.config.as_ref())?;
            plan::run(&config, &prompt).await
        }
        Command::Resume { run_id } => {
            init_tracing(false);
            let config = load_config(cli.config.as_ref())?;
            resume::run(&config, &run_id).await
        }
        Command::Logs { command } => {
            init_tracing(false);
            let config = load_config(cli.config.as_ref())?;
            logs::run(&config, command).await
        }
    }
}

/// Structured logging; JSON for the server, compact for interactive use.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,maestro_gateway=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}
