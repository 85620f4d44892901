//! `maestro run <prompt>`: execute a task and print the result.

use maestro_domain::config::Config;
use maestro_domain::task::Task;

use super::build_executor;

pub async fn run(
    config: &Config,
    prompt: &str,
    pack: Option<String>,
    model_key: &str,
    network: bool,
    stream: bool,
) -> anyhow::Result<()> {
    let task = Task {
        prompt: prompt.to_string(),
        specialist_id: pack,
        model_key: model_key.to_string(),
        network_allowed: network,
    };

    let mut executor = build_executor(config, model_key)?;

    let printer = if stream {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        executor = executor.with_event_stream(tx);
        Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if event.kind == "_run_done_" {
                    break;
                }
                if let Ok(line) = serde_json::to_string(&event) {
                    println!("{line}");
                }
            }
        }))
    } else {
        None
    };

    let result = executor.execute_task(&task).await?;
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
