//! Recruitment: route a prompt to one or more specialists.
//!
//! Stage 1 infers required capabilities from the prompt (keyword table);
//! stage 2 greedily selects specialists covering them. When the LLM routing
//! call is available it replaces stage 1; every failure falls back down the
//! chain so routing never aborts a task.

use std::sync::Arc;

use maestro_domain::config::{capabilities::capability_keywords, Config};
use maestro_domain::plan::routing;
use maestro_domain::tool::{Message, ToolDefinition};
use maestro_providers::{ChatClient, ChatRequest};

/// Outcome of routing a task.
///
/// `specialist_ids` is ordered by config position (execution order). For
/// task forces it has two or more entries.
#[derive(Debug, Clone)]
pub struct RecruitmentResult {
    pub specialist_ids: Vec<String>,
    pub required_capabilities: Vec<String>,
    pub routing_method: String,
}

impl RecruitmentResult {
    pub fn is_task_force(&self) -> bool {
        self.specialist_ids.len() > 1
    }
}

/// Capabilities whose any keyword appears (case-insensitive substring) in
/// the prompt, in table definition order.
pub fn infer_capabilities(prompt: &str, table: &[(&str, Vec<&str>)]) -> Vec<String> {
    let p = prompt.to_lowercase();
    table
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| p.contains(kw)))
        .map(|(cap, _)| cap.to_string())
        .collect()
}

/// Greedily cover the required capabilities with specialists.
///
/// Repeatedly picks the specialist covering the most uncovered capabilities
/// (ties broken by config insertion order) until everything is covered or no
/// candidate helps. The result is re-sorted into config order so execution
/// order is deterministic and config-driven. Empty when nothing covers any
/// required capability.
pub fn greedy_select_specialists(required_caps: &[String], config: &Config) -> Vec<String> {
    let mut uncovered: Vec<String> = required_caps.to_vec();
    let mut selected: Vec<usize> = Vec::new();
    let mut candidates: Vec<usize> = (0..config.specialists.len()).collect();

    while !uncovered.is_empty() && !candidates.is_empty() {
        let coverage = |idx: usize| {
            let caps = &config.specialists[idx].capabilities;
            uncovered.iter().filter(|c| caps.contains(c)).count()
        };

        // Most coverage wins; ties resolve to the earliest config position.
        let best = candidates
            .iter()
            .copied()
            .max_by(|a, b| coverage(*a).cmp(&coverage(*b)).then(b.cmp(a)))
            .unwrap_or(0);

        if coverage(best) == 0 {
            break;
        }

        let caps = &config.specialists[best].capabilities;
        uncovered.retain(|c| !caps.contains(c));
        selected.push(best);
        candidates.retain(|i| *i != best);
    }

    selected.sort_unstable();
    selected
        .into_iter()
        .map(|i| config.specialists[i].id.clone())
        .collect()
}

/// Keyword-based recruitment (no LLM).
///
/// Capability inference + greedy selection; falls back to scoring each
/// specialist's own keyword list, then to a hardcoded heuristic (code-ish
/// prompts → engineering, otherwise research).
pub fn recruit_specialist(prompt: &str, config: &Config) -> RecruitmentResult {
    let table = capability_keywords();
    let required_caps = infer_capabilities(prompt, &table);

    if !required_caps.is_empty() {
        let selected = greedy_select_specialists(&required_caps, config);
        if !selected.is_empty() {
            if selected.len() > 1 {
                tracing::info!(specialists = ?selected, required = ?required_caps, "recruited task force");
            }
            return RecruitmentResult {
                specialist_ids: selected,
                required_capabilities: required_caps,
                routing_method: routing::KEYWORD_ROUTING.into(),
            };
        }
        tracing::debug!(
            required = ?required_caps,
            "no specialist covers the required capabilities; falling back to keyword scoring"
        );
    }

    // Score each specialist's own keywords against the prompt.
    let p = prompt.to_lowercase();
    let mut best: Option<(usize, usize)> = None; // (score, index)
    for (idx, spec) in config.specialists.iter().enumerate() {
        let score = spec.keywords.iter().filter(|kw| p.contains(&kw.to_lowercase())).count();
        let better = match best {
            None => true,
            Some((best_score, _)) => score > best_score,
        };
        if better {
            best = Some((score, idx));
        }
    }

    if let Some((score, idx)) = best {
        if score > 0 {
            return RecruitmentResult {
                specialist_ids: vec![config.specialists[idx].id.clone()],
                required_capabilities: required_caps,
                routing_method: routing::KEYWORD_FALLBACK.into(),
            };
        }
    }

    // Nothing matched: hardcoded heuristic for very generic prompts.
    let code_ish = ["code", "build", "implement", "service", "pipeline", "deploy"]
        .iter()
        .any(|w| p.contains(w));
    let fallback_id = if code_ish { "engineering" } else { "research" };
    RecruitmentResult {
        specialist_ids: vec![fallback_id.to_string()],
        required_capabilities: required_caps,
        routing_method: routing::KEYWORD_FALLBACK.into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM-driven routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn routing_tool_def() -> ToolDefinition {
    let ids: Vec<&str> = capability_keywords().into_iter().map(|(id, _)| id).collect();
    ToolDefinition::new(
        "select_capabilities",
        "Identify which capabilities are needed to complete the task. \
         Call this tool exactly once with the complete list.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "capabilities": {
                    "type": "array",
                    "items": {"type": "string", "enum": ids},
                    "description": "Capability IDs required for the task.",
                },
                "reasoning": {
                    "type": "string",
                    "description": "One sentence explaining your selection.",
                },
            },
            "required": ["capabilities"],
        }),
    )
}

fn routing_messages(prompt: &str, config: &Config) -> Vec<Message> {
    let specialist_lines: Vec<String> = config
        .specialists
        .iter()
        .map(|s| format!("- {} ({}): {}", s.id, s.capabilities.join(", "), s.description))
        .collect();
    let capability_lines: Vec<String> = capability_keywords()
        .iter()
        .map(|(id, kws)| format!("- {id}: {}", kws.iter().take(4).cloned().collect::<Vec<_>>().join(", ")))
        .collect();
    let system = format!(
        "You are a task router. Identify which capabilities are required to complete the task.\n\n\
         Available specialists:\n{}\n\n\
         Available capability IDs:\n{}\n\n\
         Call select_capabilities with ONLY the capability IDs that are clearly needed. \
         If a capability is not clearly required, omit it. Prefer fewer capabilities over more.",
        specialist_lines.join("\n"),
        capability_lines.join("\n"),
    );
    vec![Message::system(system), Message::user(format!("Task: {prompt}"))]
}

/// Route with an LLM planning call; fall back to keyword routing on any
/// failure (transport error, no tool call, no known capability ids, empty
/// greedy selection).
pub async fn llm_recruit_specialist(
    prompt: &str,
    config: &Config,
    chat_client: &Arc<dyn ChatClient>,
    model: &str,
) -> RecruitmentResult {
    let req = ChatRequest {
        messages: routing_messages(prompt, config),
        model: model.to_string(),
        tools: vec![routing_tool_def()],
        temperature: Some(0.0),
        top_p: None,
        max_tokens: Some(256),
    };

    let response = match chat_client.chat(&req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "LLM routing call failed; falling back to keyword routing");
            return recruit_specialist(prompt, config);
        }
    };

    let known: Vec<&str> = capability_keywords().into_iter().map(|(id, _)| id).collect();
    let llm_caps: Vec<String> = response
        .tool_calls
        .first()
        .filter(|tc| tc.tool_name == "select_capabilities")
        .and_then(|tc| tc.arguments.get("capabilities"))
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter(|c| known.contains(c))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    if llm_caps.is_empty() {
        tracing::info!("LLM routing returned no usable capabilities; falling back to keyword routing");
        return recruit_specialist(prompt, config);
    }

    let selected = greedy_select_specialists(&llm_caps, config);
    if selected.is_empty() {
        tracing::info!("greedy selection produced no specialists; falling back to keyword routing");
        return recruit_specialist(prompt, config);
    }

    tracing::info!(specialists = ?selected, caps = ?llm_caps, "LLM routing recruited");
    RecruitmentResult {
        specialist_ids: selected,
        required_capabilities: llm_caps,
        routing_method: routing::LLM_ROUTING.into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::default_local()
    }

    #[test]
    fn infer_capabilities_matches_substrings() {
        let table = capability_keywords();
        let caps = infer_capabilities("Implement a parser and run the unit tests", &table);
        assert!(caps.contains(&"code_execution".to_string()));
        assert!(caps.contains(&"software_testing".to_string()));
    }

    #[test]
    fn infer_capabilities_empty_for_generic_prompts() {
        let table = capability_keywords();
        assert!(infer_capabilities("explore a topic", &table).is_empty());
        assert!(infer_capabilities("tell me about something", &table).is_empty());
    }

    #[test]
    fn infer_capabilities_is_case_insensitive() {
        let table = capability_keywords();
        let caps = infer_capabilities("BIBLIOGRAPHY and Citations please", &table);
        assert_eq!(caps, vec!["citation_extraction"]);
    }

    #[test]
    fn greedy_single_specialist_covers_all() {
        let caps = vec!["code_execution".to_string(), "file_io".to_string()];
        let selected = greedy_select_specialists(&caps, &config());
        assert_eq!(selected, vec!["engineering"]);
    }

    #[test]
    fn greedy_builds_task_force_for_mixed_caps() {
        let caps = vec![
            "code_execution".to_string(),
            "systematic_review".to_string(),
            "web_search".to_string(),
        ];
        let selected = greedy_select_specialists(&caps, &config());
        // Config order: engineering before research.
        assert_eq!(selected, vec!["engineering", "research"]);
    }

    #[test]
    fn greedy_uncoverable_caps_yield_empty() {
        let caps = vec!["quantum_annealing".to_string()];
        assert!(greedy_select_specialists(&caps, &config()).is_empty());
    }

    #[test]
    fn recruit_by_capability_sets_method() {
        let result = recruit_specialist("implement a small web service and test it", &config());
        assert_eq!(result.routing_method, "keyword_routing");
        assert_eq!(result.specialist_ids[0], "engineering");
        assert!(!result.required_capabilities.is_empty());
    }

    #[test]
    fn recruit_mixed_prompt_is_task_force() {
        let result = recruit_specialist(
            "survey the literature on arxiv, then implement a prototype and run the unit tests",
            &config(),
        );
        assert!(result.is_task_force(), "mixed prompt must recruit a task force");
    }

    #[test]
    fn recruit_keyword_scoring_fallback() {
        // No capability keyword matches, but the research specialist's own
        // keyword list does ("paper").
        let result = recruit_specialist("summarize this paper for me", &config());
        assert_eq!(result.specialist_ids, vec!["research"]);
        assert_eq!(result.routing_method, "keyword_fallback");
        assert!(result.required_capabilities.is_empty());
    }

    #[test]
    fn recruit_hardcoded_heuristic() {
        let eng = recruit_specialist("deploy the thing", &config());
        assert_eq!(eng.specialist_ids, vec!["engineering"]);
        assert_eq!(eng.routing_method, "keyword_fallback");

        let res = recruit_specialist("what is the weather like", &config());
        assert_eq!(res.specialist_ids, vec!["research"]);
        assert_eq!(res.routing_method, "keyword_fallback");
    }
}
