//! LLM orchestrator: decompose a task, assign specialists with briefs,
//! pick the execution mode, and flag synthesis.
//!
//! One LLM call with the `create_plan` tool. Every failure (transport, no
//! tool call, wrong tool, no valid assignments) falls back to
//! [`crate::recruit::llm_recruit_specialist`], so orchestration never makes
//! routing worse than plain recruitment.

use std::sync::Arc;

use maestro_domain::config::Config;
use maestro_domain::plan::{routing, OrchestrationPlan, SpecialistBrief, TaskForceMode};
use maestro_domain::tool::{Message, ToolDefinition};
use maestro_providers::{ChatClient, ChatRequest};

use crate::recruit::llm_recruit_specialist;

fn plan_tool_def() -> ToolDefinition {
    ToolDefinition::new(
        "create_plan",
        "Create a task execution plan by assigning sub-tasks to specialists. \
         Call this tool exactly once with the complete plan.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "assignments": {
                    "type": "array",
                    "description": "Ordered list of specialist assignments.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "specialist_id": {
                                "type": "string",
                                "description": "Specialist ID (e.g. 'engineering', 'research').",
                            },
                            "brief": {
                                "type": "string",
                                "description": "Specific sub-task instructions for this specialist.",
                            },
                        },
                        "required": ["specialist_id", "brief"],
                    },
                },
                "mode": {
                    "type": "string",
                    "enum": ["sequential", "parallel"],
                    "description": "'sequential' when specialists depend on each other's \
                                    outputs; 'parallel' when tasks are independent.",
                },
                "synthesis_required": {
                    "type": "boolean",
                    "description": "True when a final synthesis step must combine outputs.",
                },
                "reasoning": {
                    "type": "string",
                    "description": "One sentence explaining the orchestration decision.",
                },
            },
            "required": ["assignments", "mode", "synthesis_required", "reasoning"],
        }),
    )
}

fn plan_messages(prompt: &str, config: &Config) -> Vec<Message> {
    let specialist_lines: Vec<String> = config
        .specialists
        .iter()
        .map(|s| format!("- {} ({}): {}", s.id, s.capabilities.join(", "), s.description))
        .collect();
    let system = format!(
        "You are a task orchestrator. Decompose the given task into clear sub-task \
         assignments for the available specialist agents.\n\n\
         Available specialists:\n{}\n\n\
         Guidelines:\n\
         - Assign each specialist a specific, actionable brief.\n\
         - Use 'sequential' mode when later specialists need earlier specialists' outputs.\n\
         - Use 'parallel' mode when tasks are independent and can run concurrently.\n\
         - Set synthesis_required=true when multiple specialists produce outputs that need combining.\n\
         - For single-specialist tasks, assign only that specialist.\n\
         Call create_plan with the complete assignment plan.",
        specialist_lines.join("\n"),
    );
    vec![Message::system(system), Message::user(format!("Task: {prompt}"))]
}

/// Derive the union of the assigned specialists' declared capabilities,
/// preserving first-seen order.
fn derive_required_capabilities(specialist_ids: &[String], config: &Config) -> Vec<String> {
    let mut caps: Vec<String> = Vec::new();
    for sid in specialist_ids {
        if let Some(spec) = config.specialist(sid) {
            for cap in &spec.capabilities {
                if !caps.contains(cap) {
                    caps.push(cap.clone());
                }
            }
        }
    }
    caps
}

/// Produce an orchestration plan for the prompt.
///
/// Returns a plan with `routing_method = "orchestrator"` on success, or a
/// plan wrapped around the recruitment fallback otherwise. Multi-specialist
/// plans always carry `synthesis_required = true`.
pub async fn orchestrate_task(
    prompt: &str,
    config: &Config,
    chat_client: &Arc<dyn ChatClient>,
    model: &str,
) -> OrchestrationPlan {
    let req = ChatRequest {
        messages: plan_messages(prompt, config),
        model: model.to_string(),
        tools: vec![plan_tool_def()],
        temperature: Some(0.0),
        top_p: None,
        max_tokens: Some(512),
    };

    let response = match chat_client.chat(&req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "orchestrator LLM call failed; falling back to recruitment");
            return fallback_plan(prompt, config, chat_client, model).await;
        }
    };

    let tc = match response.tool_calls.first() {
        Some(tc) if tc.tool_name == "create_plan" => tc,
        Some(tc) => {
            tracing::info!(tool = %tc.tool_name, "orchestrator called unexpected tool; falling back");
            return fallback_plan(prompt, config, chat_client, model).await;
        }
        None => {
            tracing::info!("orchestrator returned no tool call; falling back");
            return fallback_plan(prompt, config, chat_client, model).await;
        }
    };

    let mut mode = tc
        .arguments
        .get("mode")
        .and_then(|v| v.as_str())
        .and_then(TaskForceMode::parse)
        .unwrap_or(TaskForceMode::Sequential);
    let mut synthesis_required = tc
        .arguments
        .get("synthesis_required")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let reasoning = tc
        .arguments
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    // Keep only assignments naming known specialists.
    let mut assignments: Vec<SpecialistBrief> = Vec::new();
    if let Some(raw) = tc.arguments.get("assignments").and_then(|v| v.as_array()) {
        for a in raw {
            let sid = a.get("specialist_id").and_then(|v| v.as_str()).unwrap_or("");
            let brief = a.get("brief").and_then(|v| v.as_str()).unwrap_or("");
            if config.specialist(sid).is_some() {
                assignments.push(SpecialistBrief {
                    specialist_id: sid.to_string(),
                    brief: brief.to_string(),
                });
            } else if !sid.is_empty() {
                tracing::warn!(specialist_id = sid, "orchestrator assigned unknown specialist; skipping");
            }
        }
    }

    if assignments.is_empty() {
        tracing::info!("orchestrator produced no valid assignments; falling back");
        return fallback_plan(prompt, config, chat_client, model).await;
    }

    // Enforce the plan invariants here so every consumer (the run itself,
    // the runlog event, `maestro plan`) sees the same values: multi-specialist
    // plans synthesise, single-specialist plans run sequentially.
    if assignments.len() > 1 {
        synthesis_required = true;
    } else {
        mode = TaskForceMode::Sequential;
    }

    let specialist_ids: Vec<String> =
        assignments.iter().map(|a| a.specialist_id.clone()).collect();
    let required_capabilities = derive_required_capabilities(&specialist_ids, config);

    tracing::info!(
        specialists = ?specialist_ids,
        mode = mode.as_str(),
        synthesis_required,
        reasoning = %reasoning,
        "orchestrator plan"
    );

    OrchestrationPlan {
        assignments,
        mode,
        synthesis_required,
        reasoning,
        routing_method: routing::ORCHESTRATOR.into(),
        required_capabilities,
    }
}

/// Wrap the recruitment result as a sequential plan with empty briefs.
async fn fallback_plan(
    prompt: &str,
    config: &Config,
    chat_client: &Arc<dyn ChatClient>,
    model: &str,
) -> OrchestrationPlan {
    let recruitment = llm_recruit_specialist(prompt, config, chat_client, model).await;
    let synthesis_required = recruitment.specialist_ids.len() > 1;
    OrchestrationPlan {
        assignments: recruitment
            .specialist_ids
            .iter()
            .map(|sid| SpecialistBrief {
                specialist_id: sid.clone(),
                brief: String::new(),
            })
            .collect(),
        mode: TaskForceMode::Sequential,
        synthesis_required,
        reasoning: String::new(),
        routing_method: recruitment.routing_method,
        required_capabilities: recruitment.required_capabilities,
    }
}
