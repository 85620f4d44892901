//! MCP decorator: merges external tool servers into a pack's catalogue.
//!
//! Discovered tools are exposed as `mcp__<server>__<tool>`. Calls matching
//! the prefix are forwarded to the owning session; everything else falls
//! through to the inner pack. Sessions are opened with the pack and closed
//! with it; one session failing never blocks the others.

use serde_json::Value;

use maestro_domain::error::Result;
use maestro_domain::tool::ToolDefinition;
use maestro_mcp::McpSession;

use crate::pack::{SpecialistPack, ToolResult};

pub struct McpAugmentedPack<P> {
    inner: P,
    sessions: Vec<McpSession>,
}

impl<P: SpecialistPack> McpAugmentedPack<P> {
    pub fn new(inner: P, sessions: Vec<McpSession>) -> Self {
        Self { inner, sessions }
    }

    /// The owning session and bare tool name for a prefixed tool name.
    fn resolve<'a>(&'a self, tool_name: &'a str) -> Option<(&'a McpSession, &'a str)> {
        let rest = tool_name.strip_prefix("mcp__")?;
        self.sessions.iter().find_map(|session| {
            rest.strip_prefix(session.server_name())
                .and_then(|r| r.strip_prefix("__"))
                .map(|bare| (session, bare))
        })
    }
}

#[async_trait::async_trait]
impl<P: SpecialistPack> SpecialistPack for McpAugmentedPack<P> {
    fn specialist_id(&self) -> &str {
        self.inner.specialist_id()
    }

    fn system_prompt(&self) -> &str {
        self.inner.system_prompt()
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.inner.tool_definitions();
        for session in &self.sessions {
            for tool in session.tools() {
                defs.push(ToolDefinition::new(
                    format!("mcp__{}__{}", session.server_name(), tool.name),
                    tool.description.clone(),
                    tool.input_schema.clone(),
                ));
            }
        }
        defs
    }

    fn finish_tool_name(&self) -> &str {
        self.inner.finish_tool_name()
    }

    fn finish_required_fields(&self) -> Vec<String> {
        self.inner.finish_required_fields()
    }

    fn validate_finish_payload(&self, args: &Value) -> Option<String> {
        self.inner.validate_finish_payload(args)
    }

    async fn open(&mut self) -> Result<()> {
        self.inner.open().await?;
        for session in &mut self.sessions {
            if let Err(e) = session.connect().await {
                tracing::warn!(
                    server = %session.server_name(),
                    error = %e,
                    "MCP session failed to connect; its tools will be unavailable"
                );
            }
        }
        Ok(())
    }

    async fn close(&mut self) {
        for session in &mut self.sessions {
            session.disconnect().await;
        }
        self.inner.close().await;
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        if let Some((session, bare_name)) = self.resolve(name) {
            return match session.call_tool(bare_name, args).await {
                Ok(result) => Ok(result),
                Err(e) => Ok(serde_json::json!({
                    "error": format!("MCP tool call failed: {e}"),
                })),
            };
        }
        self.inner.execute_tool(name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::BasePack;
    use crate::tool_defs::make_finish_tool_def;
    use maestro_domain::config::{McpServerConfig, McpTransportKind};
    use std::collections::HashMap;

    fn inner_pack() -> BasePack {
        BasePack::new(
            "enterprise_research",
            "prompt",
            make_finish_tool_def("done", serde_json::json!({"summary": {"type": "string"}}), &["summary"]),
            "/tmp/ws",
            false,
        )
    }

    fn session(name: &str) -> McpSession {
        McpSession::new(McpServerConfig {
            name: name.into(),
            transport: McpTransportKind::Stdio,
            command: Some("cat".into()),
            args: vec![],
            env: HashMap::new(),
            url: None,
            timeout_s: 2.0,
        })
    }

    #[test]
    fn metadata_is_forwarded() {
        let pack = McpAugmentedPack::new(inner_pack(), vec![session("github")]);
        assert_eq!(pack.specialist_id(), "enterprise_research");
        assert_eq!(pack.finish_tool_name(), "finish_task");
        assert_eq!(pack.finish_required_fields(), vec!["summary"]);
    }

    #[tokio::test]
    async fn unprefixed_tool_falls_through_to_inner() {
        let pack = McpAugmentedPack::new(inner_pack(), vec![session("github")]);
        let result = pack
            .execute_tool("not_a_tool", serde_json::json!({}))
            .await
            .unwrap();
        assert!(result["error"].as_str().unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn disconnected_session_call_returns_error_dict() {
        let pack = McpAugmentedPack::new(inner_pack(), vec![session("github")]);
        // Session never connected: the call maps to an error dict, not an Err.
        let result = pack
            .execute_tool("mcp__github__search", serde_json::json!({"q": "x"}))
            .await
            .unwrap();
        assert!(result["error"]
            .as_str()
            .unwrap()
            .contains("MCP tool call failed"));
    }

    #[test]
    fn resolve_matches_longest_server_prefix() {
        let pack = McpAugmentedPack::new(
            inner_pack(),
            vec![session("github"), session("jira")],
        );
        let (s, bare) = pack.resolve("mcp__jira__create_issue").unwrap();
        assert_eq!(s.server_name(), "jira");
        assert_eq!(bare, "create_issue");
        assert!(pack.resolve("shell").is_none());
        assert!(pack.resolve("mcp__confluence__get").is_none());
    }
}
