//! Task force coordination: recruit → run pack loop(s) per the plan →
//! checkpoint → synthesise → record the run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use maestro_domain::config::{Config, ModelConfig};
use maestro_domain::error::{Error, Result};
use maestro_domain::event::{epoch_now, kind, RunEvent};
use maestro_domain::plan::{routing, OrchestrationPlan, TaskForceMode};
use maestro_domain::task::{RunId, RunResult, Task};
use maestro_domain::tool::{Message, ToolDefinition};
use maestro_packs::SpecialistRegistry;
use maestro_providers::{
    build_chat_client, embeddings::embed_text, ChatClient, ChatRequest, FallbackChatClient,
    FallbackPolicy,
};
use maestro_runs::checkpoint::{delete_checkpoint, load_checkpoint, save_checkpoint};
use maestro_runs::{RunCheckpoint, RunIndexEntry, RunRepository};

use crate::emitter::EventSink;
use crate::executor::PackLoop;
use crate::orchestrator::orchestrate_task;

/// Executes tasks end-to-end against injected collaborators.
pub struct TaskExecutor {
    config: Config,
    chat_client: Arc<dyn ChatClient>,
    registry: Arc<SpecialistRegistry>,
    repository: Arc<RunRepository>,
    stream: Option<UnboundedSender<RunEvent>>,
}

impl TaskExecutor {
    pub fn new(
        config: Config,
        chat_client: Arc<dyn ChatClient>,
        registry: Arc<SpecialistRegistry>,
        repository: Arc<RunRepository>,
    ) -> Self {
        Self {
            config,
            chat_client,
            registry,
            repository,
            stream: None,
        }
    }

    /// Attach a streaming consumer; every run event is mirrored to it.
    pub fn with_event_stream(mut self, tx: UnboundedSender<RunEvent>) -> Self {
        self.stream = Some(tx);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Arc<RunRepository> {
        &self.repository
    }

    // ── Collaborator resolution ────────────────────────────────────

    fn model_cfg(&self, key: &str) -> Result<ModelConfig> {
        self.config
            .models
            .get(key)
            .or_else(|| self.config.models.get("quality"))
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!("no model config for {key:?} and no 'quality' default"))
            })
    }

    /// The chat client, wrapped for cloud fallback when configured.
    fn effective_chat_client(&self) -> Result<Arc<dyn ChatClient>> {
        let Some(fb) = &self.config.cloud_fallback else {
            return Ok(self.chat_client.clone());
        };
        match self.config.models.get(&fb.model_key) {
            None => {
                tracing::warn!(
                    model_key = %fb.model_key,
                    "cloud_fallback.model_key not found in models; cloud fallback disabled"
                );
                Ok(self.chat_client.clone())
            }
            Some(cloud_cfg) => {
                let cloud = build_chat_client(cloud_cfg)?;
                tracing::debug!(
                    policy = %fb.policy,
                    cloud_model = %cloud_cfg.model,
                    "cloud fallback enabled"
                );
                Ok(Arc::new(FallbackChatClient::new(
                    self.chat_client.clone(),
                    cloud,
                    cloud_cfg.model.clone(),
                    FallbackPolicy::new(&fb.policy),
                )))
            }
        }
    }

    /// Produce the orchestration plan for a prompt (also powers `plan`
    /// inspection from the CLI).
    pub async fn plan_task(&self, prompt: &str) -> Result<OrchestrationPlan> {
        let chat_client = self.effective_chat_client()?;
        let routing_cfg = self
            .config
            .models
            .get(&self.config.routing_model_key)
            .cloned()
            .map(Ok)
            .unwrap_or_else(|| self.model_cfg("quality"))?;
        Ok(orchestrate_task(prompt, &self.config, &chat_client, &routing_cfg.model).await)
    }

    // ── Main entry point ───────────────────────────────────────────

    /// Execute a task end-to-end: recruit, create the run, drive each
    /// specialist, synthesise when required, and record the result.
    pub async fn execute_task(&self, task: &Task) -> Result<RunResult> {
        let chat_client = self.effective_chat_client()?;
        let model_cfg = self.model_cfg(&task.model_key)?;

        // Recruit.
        let (plan, specialist_ids, required_capabilities, routing_method) =
            if let Some(sid) = &task.specialist_id {
                (None, vec![sid.clone()], Vec::new(), routing::EXPLICIT.to_string())
            } else {
                let routing_cfg = self
                    .config
                    .models
                    .get(&self.config.routing_model_key)
                    .cloned()
                    .unwrap_or_else(|| model_cfg.clone());
                let plan =
                    orchestrate_task(&task.prompt, &self.config, &chat_client, &routing_cfg.model)
                        .await;
                let ids = plan.specialist_ids();
                let caps = plan.required_capabilities.clone();
                let method = plan.routing_method.clone();
                (Some(plan), ids, caps, method)
            };

        for sid in &specialist_ids {
            if self.config.specialist(sid).is_none() {
                return Err(Error::Recruit(sid.clone()));
            }
        }

        // Set up the run.
        let (run_id, run_dir, workspace_path) = self.repository.create_run()?;
        let is_task_force = specialist_ids.len() > 1;
        let mode = if is_task_force {
            plan.as_ref().map(|p| p.mode).unwrap_or(self.config.task_force_mode)
        } else {
            TaskForceMode::Sequential
        };
        tracing::info!(
            run_id = %run_id,
            specialists = ?specialist_ids,
            is_task_force,
            mode = mode.as_str(),
            "task started"
        );

        let events = EventSink::new(self.repository.clone(), run_id.clone(), self.stream.clone());
        events.emit(
            kind::RECRUITMENT,
            None,
            serde_json::json!({
                "specialist_id": &specialist_ids[0],
                "specialist_ids": &specialist_ids,
                "required_capabilities": &required_capabilities,
                "routing_method": &routing_method,
                "is_task_force": is_task_force,
            }),
        );

        if let Some(plan) = plan.as_ref().filter(|p| p.routing_method == routing::ORCHESTRATOR) {
            events.emit(
                kind::ORCHESTRATION_PLAN,
                None,
                serde_json::json!({
                    "assignments": plan
                        .assignments
                        .iter()
                        .map(|a| serde_json::json!({
                            "specialist_id": &a.specialist_id,
                            "brief": &a.brief,
                        }))
                        .collect::<Vec<_>>(),
                    "mode": plan.mode.as_str(),
                    "synthesis_required": plan.synthesis_required,
                    "reasoning": &plan.reasoning,
                }),
            );
        }

        // Initial checkpoint (non-fatal on failure).
        let mut checkpoint = Some(RunCheckpoint {
            run_id: run_id.as_str().to_string(),
            run_dir: run_dir.clone(),
            workspace_path: workspace_path.clone(),
            task_prompt: task.prompt.clone(),
            network_allowed: task.network_allowed,
            specialist_ids: specialist_ids.clone(),
            completed_specialists: Vec::new(),
            payloads: HashMap::new(),
            task_force_mode: mode,
            model_key: task.model_key.clone(),
            routing_method: routing_method.clone(),
            required_capabilities: required_capabilities.clone(),
            orchestration_plan: plan
                .as_ref()
                .filter(|p| p.routing_method == routing::ORCHESTRATOR)
                .cloned(),
            created_at: epoch_now(),
            updated_at: epoch_now(),
        });
        if let Some(cp) = &checkpoint {
            if let Err(e) = save_checkpoint(&run_dir, cp) {
                tracing::warn!(error = %e, "failed to create initial checkpoint");
                checkpoint = None;
            }
        }

        // Run the pack loop(s).
        let final_payload = if mode == TaskForceMode::Parallel && is_task_force {
            events.emit(
                kind::TASK_FORCE_PARALLEL,
                None,
                serde_json::json!({ "specialist_ids": &specialist_ids, "mode": "parallel" }),
            );
            let merged = self
                .run_parallel(
                    task,
                    &specialist_ids,
                    plan.as_ref(),
                    &workspace_path,
                    &chat_client,
                    &model_cfg,
                    &events,
                )
                .await;

            let pack_results: HashMap<String, Value> = merged
                .get("pack_results")
                .and_then(|v| v.as_object())
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            update_checkpoint(&mut checkpoint, &run_dir, &specialist_ids, &pack_results);

            let mut final_payload = merged;
            if plan.as_ref().map(|p| p.synthesis_required).unwrap_or(false) {
                match self
                    .synthesise(&task.prompt, &specialist_ids, &pack_results, &chat_client, &model_cfg, &events)
                    .await
                {
                    Ok(Some(synth)) => final_payload = synth,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "synthesis failed; using merged parallel result");
                    }
                }
            }
            final_payload
        } else {
            let (final_payload, payloads) = self
                .run_sequential(SequentialRun {
                    prompt: &task.prompt,
                    specialist_ids: &specialist_ids,
                    plan: plan.as_ref(),
                    network_allowed: task.network_allowed,
                    workspace_path: &workspace_path,
                    run_dir: &run_dir,
                    chat_client: &chat_client,
                    model_cfg: &model_cfg,
                    events: &events,
                    checkpoint: &mut checkpoint,
                    completed_payloads: HashMap::new(),
                    prev_payload: None,
                    resumed: false,
                })
                .await?;

            let mut final_payload = final_payload;
            let synthesis_required =
                plan.as_ref().map(|p| p.synthesis_required).unwrap_or(false) && payloads.len() > 1;
            if synthesis_required {
                match self
                    .synthesise(&task.prompt, &specialist_ids, &payloads, &chat_client, &model_cfg, &events)
                    .await
                {
                    Ok(Some(synth)) => final_payload = synth,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "synthesis failed; using last specialist result");
                    }
                }
            }
            final_payload
        };

        tracing::info!(run_id = %run_id, specialists = ?specialist_ids, "task completed");
        events.emit(
            kind::RUN_COMPLETE,
            None,
            serde_json::json!({
                "run_id": run_id.as_str(),
                "specialist_ids": &specialist_ids,
                "task_force_mode": mode.as_str(),
            }),
        );

        if let Err(e) = delete_checkpoint(&run_dir) {
            tracing::warn!(error = %e, "failed to delete checkpoint");
        }

        let result = RunResult {
            run_id: run_id.clone(),
            run_dir,
            workspace_path,
            specialist_id: specialist_ids[0].clone(),
            specialist_ids: specialist_ids.clone(),
            model_name: model_cfg.model.clone(),
            payload: final_payload,
            required_capabilities,
        };

        self.append_index_entry(task, &result, &routing_method).await;
        events.emit_stream_only(
            "_run_done_",
            serde_json::json!({ "run_id": run_id.as_str(), "ok": true }),
        );

        Ok(result)
    }

    // ── Resume ─────────────────────────────────────────────────────

    /// Resume an interrupted run from its checkpoint: skip completed
    /// specialists, seed context from the last completed payload, finish the
    /// rest, synthesise when flagged, and delete the checkpoint.
    pub async fn resume_run(&self, run_id_str: &str) -> Result<RunResult> {
        let run_dir = self
            .repository
            .workspace_root()
            .join("runs")
            .join(run_id_str);
        let mut checkpoint = load_checkpoint(&run_dir).ok_or_else(|| {
            Error::Checkpoint(format!("no checkpoint found for run {run_id_str:?}"))
        })?;
        if checkpoint.remaining_specialists().is_empty() {
            return Err(Error::Checkpoint(format!(
                "run {run_id_str:?} is already complete (all specialists finished)"
            )));
        }

        let run_id = RunId(checkpoint.run_id.clone());
        self.repository.open_run(&run_id)?;

        let chat_client = self.effective_chat_client()?;
        let model_cfg = self.model_cfg(&checkpoint.model_key)?;
        let events = EventSink::new(self.repository.clone(), run_id.clone(), self.stream.clone());

        tracing::info!(
            run_id = %run_id,
            remaining = ?checkpoint.remaining_specialists(),
            "resuming run"
        );

        let specialist_ids = checkpoint.specialist_ids.clone();
        let plan = checkpoint.orchestration_plan.clone();
        let workspace_path = checkpoint.workspace_path.clone();
        let prompt = checkpoint.task_prompt.clone();
        let network_allowed = checkpoint.network_allowed;
        let task_force_mode = checkpoint.task_force_mode;
        let required_capabilities = checkpoint.required_capabilities.clone();

        // Seed context from the last completed specialist.
        let prev_payload = checkpoint
            .completed_specialists
            .last()
            .and_then(|sid| checkpoint.payloads.get(sid).map(|p| (sid.clone(), p.clone())));
        let completed_payloads = checkpoint.payloads.clone();

        let mut checkpoint_slot = Some(checkpoint);
        let (mut final_payload, payloads) = self
            .run_sequential(SequentialRun {
                prompt: &prompt,
                specialist_ids: &specialist_ids,
                plan: plan.as_ref(),
                network_allowed,
                workspace_path: &workspace_path,
                run_dir: &run_dir,
                chat_client: &chat_client,
                model_cfg: &model_cfg,
                events: &events,
                checkpoint: &mut checkpoint_slot,
                completed_payloads,
                prev_payload,
                resumed: true,
            })
            .await?;

        let synthesis_required =
            plan.as_ref().map(|p| p.synthesis_required).unwrap_or(false) && payloads.len() > 1;
        if synthesis_required {
            match self
                .synthesise(&prompt, &specialist_ids, &payloads, &chat_client, &model_cfg, &events)
                .await
            {
                Ok(Some(synth)) => final_payload = synth,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "synthesis failed during resume; using last result");
                }
            }
        }

        events.emit(
            kind::RUN_COMPLETE,
            None,
            serde_json::json!({
                "run_id": run_id.as_str(),
                "specialist_ids": &specialist_ids,
                "task_force_mode": task_force_mode.as_str(),
                "resumed": true,
            }),
        );
        if let Err(e) = delete_checkpoint(&run_dir) {
            tracing::warn!(error = %e, "failed to delete checkpoint after resume");
        }

        let result = RunResult {
            run_id: run_id.clone(),
            run_dir,
            workspace_path,
            specialist_id: specialist_ids[0].clone(),
            specialist_ids,
            model_name: model_cfg.model.clone(),
            payload: final_payload,
            required_capabilities,
        };
        events.emit_stream_only(
            "_run_done_",
            serde_json::json!({ "run_id": run_id.as_str(), "ok": true }),
        );
        Ok(result)
    }

    // ── Sequential mode ────────────────────────────────────────────

    async fn run_sequential(
        &self,
        params: SequentialRun<'_>,
    ) -> Result<(Value, HashMap<String, Value>)> {
        let SequentialRun {
            prompt,
            specialist_ids,
            plan,
            network_allowed,
            workspace_path,
            run_dir,
            chat_client,
            model_cfg,
            events,
            checkpoint,
            completed_payloads,
            mut prev_payload,
            resumed,
        } = params;

        let is_task_force = specialist_ids.len() > 1;
        let mut payloads = completed_payloads;
        let mut final_payload = prev_payload
            .as_ref()
            .map(|(_, p)| p.clone())
            .unwrap_or(Value::Null);

        for (pack_idx, specialist_id) in specialist_ids.iter().enumerate() {
            if let Some(done) = payloads.get(specialist_id) {
                // Already completed in a prior session.
                prev_payload = Some((specialist_id.clone(), done.clone()));
                continue;
            }

            let pack = self
                .registry
                .get_pack(specialist_id, workspace_path, network_allowed)?;

            if is_task_force {
                let mut pack_start = serde_json::json!({
                    "specialist_id": specialist_id,
                    "pack_index": pack_idx,
                });
                if resumed {
                    pack_start["resumed"] = Value::Bool(true);
                }
                events.emit(kind::PACK_START, None, pack_start);
                tracing::info!(
                    pack = pack_idx + 1,
                    of = specialist_ids.len(),
                    specialist_id,
                    "task force sequential: starting pack"
                );
            }

            let brief = plan.map(|p| p.brief_for(specialist_id)).unwrap_or("");
            let user_content = build_user_content(prompt, prev_payload.as_ref(), brief);
            let messages = vec![
                Message::system(pack.system_prompt().to_string()),
                Message::user(user_content),
            ];
            let step_prefix = if is_task_force {
                format!("{specialist_id}_")
            } else {
                String::new()
            };

            let loop_run = PackLoop {
                pack,
                messages,
                chat_client: chat_client.clone(),
                model_cfg: model_cfg.clone(),
                events: events.clone(),
                step_prefix,
                max_steps: self.config.max_steps,
            };
            let payload = loop_run.run().await?;

            payloads.insert(specialist_id.clone(), payload.clone());
            prev_payload = Some((specialist_id.clone(), payload.clone()));
            final_payload = payload;

            update_checkpoint_completed(checkpoint, run_dir, specialist_id, &payloads);
        }

        Ok((final_payload, payloads))
    }

    // ── Parallel mode ──────────────────────────────────────────────

    /// Launch one pack loop per specialist concurrently (same prompt, no
    /// inter-pack context) and merge the results. Per-pack failures are
    /// captured, never propagated.
    #[allow(clippy::too_many_arguments)]
    async fn run_parallel(
        &self,
        task: &Task,
        specialist_ids: &[String],
        plan: Option<&OrchestrationPlan>,
        workspace_path: &Path,
        chat_client: &Arc<dyn ChatClient>,
        model_cfg: &ModelConfig,
        events: &EventSink,
    ) -> Value {
        let mut handles = Vec::new();

        for (pack_idx, specialist_id) in specialist_ids.iter().enumerate() {
            let registry = self.registry.clone();
            let specialist_id = specialist_id.clone();
            let workspace_path = workspace_path.to_path_buf();
            let network_allowed = task.network_allowed;
            let prompt = task.prompt.clone();
            let brief = plan.map(|p| p.brief_for(&specialist_id).to_string()).unwrap_or_default();
            let chat_client = chat_client.clone();
            let model_cfg = model_cfg.clone();
            let events = events.clone();
            let max_steps = self.config.max_steps;

            handles.push((specialist_id.clone(), tokio::spawn(async move {
                let pack = registry.get_pack(&specialist_id, &workspace_path, network_allowed)?;

                events.emit(
                    kind::PACK_START,
                    None,
                    serde_json::json!({
                        "specialist_id": &specialist_id,
                        "pack_index": pack_idx,
                    }),
                );

                let mut user_content = format!("Task:\n{prompt}");
                if !brief.is_empty() {
                    user_content.push_str(&format!("\n\nYour specific assignment:\n{brief}"));
                }
                let messages = vec![
                    Message::system(pack.system_prompt().to_string()),
                    Message::user(user_content),
                ];

                PackLoop {
                    pack,
                    messages,
                    chat_client,
                    model_cfg,
                    events,
                    step_prefix: format!("{specialist_id}_"),
                    max_steps,
                }
                .run()
                .await
            })));
        }

        let mut pack_results = serde_json::Map::new();
        let mut summaries: Vec<String> = Vec::new();
        for (specialist_id, handle) in handles {
            let outcome: Result<Value> = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(Error::Other(format!("pack task panicked: {join_err}"))),
            };
            match outcome {
                Ok(payload) => {
                    let summary = payload
                        .get("summary")
                        .or_else(|| payload.get("executive_summary"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    if !summary.is_empty() {
                        summaries.push(format!("{specialist_id}: {summary}"));
                    }
                    pack_results.insert(specialist_id, payload);
                }
                Err(e) => {
                    tracing::warn!(specialist_id = %specialist_id, error = %e, "parallel pack failed");
                    summaries.push(format!("{specialist_id}: error — {e}"));
                    pack_results.insert(
                        specialist_id,
                        serde_json::json!({
                            "error": e.to_string(),
                            "error_type": "pack_failure",
                        }),
                    );
                }
            }
        }

        let combined_summary = if summaries.is_empty() {
            "Parallel task force completed.".to_string()
        } else {
            summaries.join(" | ")
        };

        serde_json::json!({
            "action": "final",
            "pack_results": pack_results,
            "summary": combined_summary,
            "artifacts": [],
            "next_steps": [],
        })
    }

    // ── Synthesis ──────────────────────────────────────────────────

    /// One LLM call merging multi-specialist outputs.
    ///
    /// Returns `Ok(None)` when fewer than two non-error payloads exist
    /// (nothing to synthesise) or the model declined the tool; transport
    /// errors bubble up for the caller to swallow.
    async fn synthesise(
        &self,
        prompt: &str,
        specialist_ids: &[String],
        payloads: &HashMap<String, Value>,
        chat_client: &Arc<dyn ChatClient>,
        model_cfg: &ModelConfig,
        events: &EventSink,
    ) -> Result<Option<Value>> {
        let usable: Vec<(&String, &Value)> = specialist_ids
            .iter()
            .filter_map(|sid| payloads.get(sid).map(|p| (sid, p)))
            .filter(|(_, p)| p.get("error").is_none())
            .collect();
        if usable.len() < 2 {
            tracing::debug!(usable = usable.len(), "skipping synthesis: not enough payloads");
            return Ok(None);
        }

        let payload_lines: Vec<String> = usable
            .iter()
            .map(|(sid, payload)| {
                format!(
                    "**{sid}**:\n{}",
                    serde_json::to_string_pretty(payload).unwrap_or_default()
                )
            })
            .collect();

        let messages = vec![
            Message::system(
                "You are a synthesis agent. Combine the outputs of multiple specialist agents \
                 into a coherent, concise final answer for the original task.",
            ),
            Message::user(format!(
                "Original task:\n{prompt}\n\nSpecialist outputs:\n{}\n\n\
                 Call synthesise_results with a coherent synthesis.",
                payload_lines.join("\n\n"),
            )),
        ];

        events.emit(
            kind::LLM_REQUEST,
            Some("synthesis"),
            serde_json::json!({ "step": "synthesis", "message_count": messages.len() }),
        );

        let response = chat_client
            .chat(&ChatRequest {
                messages,
                model: model_cfg.model.clone(),
                tools: vec![synthesise_tool_def()],
                temperature: Some(0.0),
                top_p: None,
                max_tokens: Some(model_cfg.max_tokens),
            })
            .await?;

        if let Some(tc) = response
            .tool_calls
            .first()
            .filter(|tc| tc.tool_name == "synthesise_results")
        {
            let mut payload = serde_json::json!({ "action": "final" });
            if let (Some(obj), Some(args)) = (payload.as_object_mut(), tc.arguments.as_object()) {
                for (k, v) in args {
                    obj.insert(k.clone(), v.clone());
                }
            }
            events.emit(
                kind::SYNTHESIS_COMPLETE,
                Some("synthesis"),
                serde_json::json!({ "step": "synthesis", "result": "tool_call" }),
            );
            return Ok(Some(payload));
        }

        tracing::warn!("synthesis returned no tool call; using text response as summary");
        Ok(Some(serde_json::json!({
            "action": "final",
            "summary": if response.content.is_empty() {
                "Synthesis produced no output.".to_string()
            } else {
                response.content
            },
            "key_findings": [],
            "artifacts": [],
            "next_steps": [],
        })))
    }

    // ── Run index ──────────────────────────────────────────────────

    /// Append this run to the cross-run index (failure is non-fatal),
    /// embedding the entry when an embedding model is configured.
    async fn append_index_entry(&self, task: &Task, result: &RunResult, routing_method: &str) {
        let summary = result
            .payload
            .get("summary")
            .or_else(|| result.payload.get("executive_summary"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let mut entry = RunIndexEntry {
            run_id: result.run_id.as_str().to_string(),
            timestamp: epoch_now(),
            specialist_ids: result.specialist_ids.clone(),
            prompt_prefix: prefix_chars(&task.prompt, 200),
            summary: summary.clone(),
            workspace_path: result.workspace_path.to_string_lossy().to_string(),
            run_dir: result.run_dir.to_string_lossy().to_string(),
            routing_method: routing_method.to_string(),
            model_name: result.model_name.clone(),
            embedding: None,
        };

        if let Some(model) = &self.config.run_index.embedding_model {
            let base_url = self
                .config
                .run_index
                .embedding_base_url
                .clone()
                .or_else(|| {
                    self.config
                        .models
                        .get(&task.model_key)
                        .map(|m| m.base_url.clone())
                })
                .unwrap_or_default();
            let input = format!("{} {summary}", prefix_chars(&task.prompt, 200));
            match embed_text(input.trim(), model, &base_url).await {
                Ok(vector) => {
                    tracing::debug!(dims = vector.len(), "run index entry embedded");
                    entry.embedding = Some(vector);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "embedding failed; index entry written without embedding"
                    );
                }
            }
        }

        if let Err(e) = maestro_runs::index::append_to_index(self.repository.workspace_root(), &entry)
        {
            tracing::warn!(error = %e, "failed to append to run index");
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct SequentialRun<'a> {
    prompt: &'a str,
    specialist_ids: &'a [String],
    plan: Option<&'a OrchestrationPlan>,
    network_allowed: bool,
    workspace_path: &'a Path,
    run_dir: &'a Path,
    chat_client: &'a Arc<dyn ChatClient>,
    model_cfg: &'a ModelConfig,
    events: &'a EventSink,
    checkpoint: &'a mut Option<RunCheckpoint>,
    /// Payloads of specialists completed in a prior session (resume).
    completed_payloads: HashMap<String, Value>,
    /// `(specialist_id, payload)` forwarded as context to the next pack.
    prev_payload: Option<(String, Value)>,
    resumed: bool,
}

/// Initial user message: task prompt, optional context from the previous
/// task-force member, optional orchestrator brief.
fn build_user_content(
    prompt: &str,
    prev_payload: Option<&(String, Value)>,
    brief: &str,
) -> String {
    let mut content = format!("Task:\n{prompt}");
    if let Some((prev_sid, payload)) = prev_payload {
        let context_block = serde_json::to_string_pretty(payload).unwrap_or_default();
        content.push_str(&format!(
            "\n\nContext from '{prev_sid}' specialist (prior task-force member):\n{context_block}"
        ));
    }
    if !brief.is_empty() {
        content.push_str(&format!("\n\nYour specific assignment:\n{brief}"));
    }
    content
}

fn synthesise_tool_def() -> ToolDefinition {
    ToolDefinition::new(
        "synthesise_results",
        "Synthesise the outputs from multiple specialist agents into a coherent final \
         answer. Call this tool once with the combined result.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Coherent overall summary combining all specialist outputs.",
                },
                "key_findings": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Key findings from all specialists.",
                },
                "artifacts": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Paths to artefacts produced by specialists.",
                },
                "next_steps": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Recommended next steps.",
                },
            },
            "required": ["summary", "key_findings"],
        }),
    )
}

fn update_checkpoint_completed(
    checkpoint: &mut Option<RunCheckpoint>,
    run_dir: &Path,
    specialist_id: &str,
    payloads: &HashMap<String, Value>,
) {
    if let Some(cp) = checkpoint {
        cp.record_completed(
            specialist_id,
            payloads.get(specialist_id).cloned().unwrap_or(Value::Null),
        );
        cp.payloads = payloads.clone();
        if let Err(e) = save_checkpoint(run_dir, cp) {
            tracing::warn!(specialist_id, error = %e, "failed to update checkpoint");
        }
    }
}

fn update_checkpoint(
    checkpoint: &mut Option<RunCheckpoint>,
    run_dir: &Path,
    completed: &[String],
    payloads: &HashMap<String, Value>,
) {
    if let Some(cp) = checkpoint {
        cp.completed_specialists = completed.to_vec();
        cp.payloads = payloads.clone();
        cp.updated_at = epoch_now();
        if let Err(e) = save_checkpoint(run_dir, cp) {
            tracing::warn!(error = %e, "failed to update checkpoint");
        }
    }
}

/// First `max` characters of a string (char-boundary safe).
fn prefix_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_content_plain_task() {
        let content = build_user_content("list files", None, "");
        assert_eq!(content, "Task:\nlist files");
    }

    #[test]
    fn user_content_with_context_and_brief() {
        let prev = (
            "research".to_string(),
            serde_json::json!({"summary": "found three options"}),
        );
        let content = build_user_content("build it", Some(&prev), "pick the fastest option");
        assert!(content.starts_with("Task:\nbuild it"));
        assert!(content.contains("Context from 'research' specialist (prior task-force member):"));
        assert!(content.contains("\"summary\": \"found three options\""));
        assert!(content.ends_with("Your specific assignment:\npick the fastest option"));
    }

    #[test]
    fn prefix_chars_is_boundary_safe() {
        assert_eq!(prefix_chars("héllo", 2), "hé");
        assert_eq!(prefix_chars("abc", 10), "abc");
    }
}
