//! `maestro plan <prompt>`: show the orchestration plan without running.

use maestro_domain::config::Config;

use super::build_executor;

pub async fn run(config: &Config, prompt: &str) -> anyhow::Result<()> {
    let executor = build_executor(config, &config.routing_model_key)?;
    let plan = executor.plan_task(prompt).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
