//! `maestro resume <run_id>`: continue an interrupted run.

use maestro_domain::config::Config;
use maestro_runs::checkpoint::find_resumable_runs;

use super::build_executor;

pub async fn run(config: &Config, run_id: &str) -> anyhow::Result<()> {
    let executor = build_executor(config, "quality")?;
    match executor.resume_run(run_id).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            let resumable = find_resumable_runs(&config.workspace_root);
            if !resumable.is_empty() {
                eprintln!("resumable runs: {}", resumable.join(", "));
            }
            Err(e.into())
        }
    }
}
