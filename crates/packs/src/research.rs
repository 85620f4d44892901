//! Research pack: web_search + fetch_url (network-gated), file tools,
//! finish_task with citation fields.

use std::path::Path;
use std::sync::Arc;

use maestro_tools::sandbox::SandboxPolicy;
use maestro_tools::{file_ops, web};

use crate::base::BasePack;
use crate::prompts::SYSTEM_PROMPT_RESEARCH;
use crate::tool_defs::{
    list_files_def, make_finish_tool_def, make_tool_def, optional_u64, read_file_def,
    required_str, write_file_def,
};

fn finish_tool_def() -> maestro_domain::tool::ToolDefinition {
    make_finish_tool_def(
        "Call this when research is complete. Provide your executive summary, key \
         findings, citations for all fetched URLs, paths to artefact files in the \
         workspace, and any gaps or future work.",
        serde_json::json!({
            "executive_summary": {
                "type": "string",
                "description": "High-level summary of findings.",
            },
            "key_findings": {
                "type": "array",
                "items": {"type": "string"},
                "description": "The most important findings.",
            },
            "citations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "url": {"type": "string"},
                        "claim": {"type": "string", "description": "What this source supports."},
                    },
                    "required": ["url", "claim"],
                },
                "description": "Only URLs actually fetched via fetch_url.",
            },
            "artifacts": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Workspace-relative paths of artefact files.",
            },
            "next_steps": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Gaps or future work.",
            },
        }),
        &["executive_summary", "key_findings"],
    )
}

/// Build the research pack. Web tools are registered only when
/// `network_allowed`; the pack still works offline with file tools alone.
pub fn build_research_pack(workspace_path: &Path, network_allowed: bool) -> BasePack {
    let policy = Arc::new(SandboxPolicy::new(workspace_path, network_allowed));

    let mut pack = BasePack::new(
        "research",
        SYSTEM_PROMPT_RESEARCH,
        finish_tool_def(),
        workspace_path,
        network_allowed,
    );

    if network_allowed {
        pack.register_tool(
            make_tool_def(
                "web_search",
                "Search the web and return result titles, URLs and snippets.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Search query."},
                        "max_results": {
                            "type": "integer",
                            "description": "Maximum results to return (default 8).",
                        },
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

        pack.register_tool(
            make_tool_def(
                "fetch_url",
                "Fetch a URL and return its readable text content.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "Full URL including scheme."},
                    },
                    "required": ["url"],
                }),
            ),
            Box::new(move |args| {
                Box::pin(async move {
                    let url = required_str(&args, "url")?;
                    web::fetch_url(&url).await
                })
            }),
        );
    }

    register_file_tools(&mut pack, policy);
    pack
}

/// File tools shared by the research-flavoured packs.
pub(crate) fn register_file_tools(pack: &mut BasePack, policy: Arc<SandboxPolicy>) {
    let p = policy.clone();
    pack.register_tool(
        read_file_def(),
        Box::new(move |args| {
            let policy = p.clone();
            Box::pin(async move {
                let path = required_str(&args, "path")?;
                file_ops::read_text(&policy, &path).await
            })
        }),
    );

    let p = policy.clone();
    pack.register_tool(
        write_file_def(),
        Box::new(move |args| {
            let policy = p.clone();
            Box::pin(async move {
                let path = required_str(&args, "path")?;
                let content = required_str(&args, "content")?;
                file_ops::write_text(&policy, &path, &content).await
            })
        }),
    );

    let p = policy;
    pack.register_tool(
        list_files_def(),
        Box::new(move |args| {
            let policy = p.clone();
            Box::pin(async move {
                let max_files = optional_u64(&args, "max_files", 500) as usize;
                file_ops::list_tree(&policy, max_files).await
            })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::SpecialistPack;
    use tempfile::TempDir;

    #[test]
    fn network_gates_web_tools() {
        let ws = TempDir::new().unwrap();

        let online = build_research_pack(ws.path(), true);
        let online_names: Vec<String> = online
            .tool_definitions()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert!(online_names.contains(&"web_search".to_string()));
        assert!(online_names.contains(&"fetch_url".to_string()));

        let offline = build_research_pack(ws.path(), false);
        let offline_names: Vec<String> = offline
            .tool_definitions()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert!(!offline_names.contains(&"web_search".to_string()));
        assert!(!offline_names.contains(&"fetch_url".to_string()));
        // File tools and finish remain.
        assert!(offline_names.contains(&"write_file".to_string()));
        assert!(offline_names.contains(&"finish_task".to_string()));
    }

    #[test]
    fn finish_requires_summary_and_findings() {
        let ws = TempDir::new().unwrap();
        let pack = build_research_pack(ws.path(), false);
        assert_eq!(
            pack.finish_required_fields(),
            vec!["executive_summary", "key_findings"]
        );
    }
}
