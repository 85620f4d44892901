//! Enterprise research pack: cross-run memory search, file tools, and
//! (via config) MCP servers layered on by the registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use maestro_runs::index::search_index;
use maestro_tools::sandbox::SandboxPolicy;
use maestro_tools::web;

use crate::base::BasePack;
use crate::prompts::SYSTEM_PROMPT_ENTERPRISE_RESEARCH;
use crate::research::register_file_tools;
use crate::tool_defs::{make_finish_tool_def, make_tool_def, optional_u64, required_str};

fn finish_tool_def() -> maestro_domain::tool::ToolDefinition {
    make_finish_tool_def(
        "Call this when the research report is complete. Provide the executive \
         summary, key findings with confidence annotations, source attributions, \
         and paths to artefact files.",
        serde_json::json!({
            "executive_summary": {
                "type": "string",
                "description": "High-level summary of findings.",
            },
            "key_findings": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Findings annotated with [HIGH]/[MEDIUM]/[LOW]/[STALE?].",
            },
            "sources": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Sources actually consulted via tool calls.",
            },
            "artifacts": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Workspace-relative paths of artefact files.",
            },
            "next_steps": {
                "type": "array",
                "items": {"type": "string"},
            },
        }),
        &["executive_summary", "key_findings"],
    )
}

/// Derive the workspace root from a per-run workspace path
/// (`{root}/runs/{id}/workspace` → `{root}`).
fn workspace_root_of(workspace_path: &Path) -> PathBuf {
    workspace_path
        .ancestors()
        .nth(3)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| workspace_path.to_path_buf())
}

/// Build the enterprise research pack.
///
/// MCP servers configured for this specialist are attached by the registry
/// decorator, not here.
pub fn build_enterprise_research_pack(workspace_path: &Path, network_allowed: bool) -> BasePack {
    let policy = Arc::new(SandboxPolicy::new(workspace_path, network_allowed));
    let workspace_root = workspace_root_of(workspace_path);

    let mut pack = BasePack::new(
        "enterprise_research",
        SYSTEM_PROMPT_ENTERPRISE_RESEARCH,
        finish_tool_def(),
        workspace_path,
        network_allowed,
    );

    pack.register_tool(
        make_tool_def(
            "cross_run_search",
            "Search the cross-run memory of prior task runs by keyword. \
             Use this first — prior research may already answer the question.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Keyword query."},
                    "limit": {
                        "type": "integer",
                        "description": "Maximum entries to return (default 10).",
                    },
                },
                "required": ["query"],
            }),
        ),
        Box::new(move |args| {
            let root = workspace_root.clone();
            Box::pin(async move {
                let query = required_str(&args, "query")?;
                let limit = optional_u64(&args, "limit", 10) as usize;
                let hits: Vec<serde_json::Value> = search_index(&root, &query, limit)
                    .into_iter()
                    .map(|e| {
                        serde_json::json!({
                            "run_id": e.run_id,
                            "prompt_prefix": e.prompt_prefix,
                            "summary": e.summary,
                            "specialist_ids": e.specialist_ids,
                        })
                    })
                    .collect();
                Ok(serde_json::json!({ "query": query, "count": hits.len(), "hits": hits }))
            })
        }),
    );

    if network_allowed {
        pack.register_tool(
            make_tool_def(
                "web_search",
                "Search the public web (fallback when internal sources are thin).",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "max_results": {"type": "integer", "description": "Default 8."},
                    },
                    "required": ["query"],
                }),
            ),
            Box::new(move |args| {
                Box::pin(async move {
                    let query = required_str(&args, "query")?;
                    let limit = optional_u64(&args, "max_results", 8) as usize;
                    web::web_search(&query, limit).await
                })
            }),
        );
    }

    register_file_tools(&mut pack, policy);
    pack
}
