//! One MCP session per configured server.
//!
//! Lifecycle: `connect()` spawns the process, performs the initialize
//! handshake, and discovers the tool catalogue; `call_tool()` dispatches;
//! `disconnect()` shuts the server down. A session is exclusively owned by
//! the pack that opened it.

use serde_json::Value;

use maestro_domain::config::{McpServerConfig, McpTransportKind};

use crate::protocol::{self, McpToolDef, ToolsListResult};
use crate::transport::{McpTransport, SseTransport, StdioTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP session {0:?} is not connected")]
    NotConnected(String),
}

pub struct McpSession {
    config: McpServerConfig,
    transport: Option<Box<dyn McpTransport>>,
    tools: Vec<McpToolDef>,
}

impl McpSession {
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            transport: None,
            tools: Vec::new(),
        }
    }

    /// The configured server name (used as the tool prefix).
    pub fn server_name(&self) -> &str {
        &self.config.name
    }

    /// Tools discovered at connect time.
    pub fn tools(&self) -> &[McpToolDef] {
        &self.tools
    }

    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().map(|t| t.is_alive()).unwrap_or(false)
    }

    /// Spawn the server, run the initialize handshake, and list its tools.
    pub async fn connect(&mut self) -> Result<(), McpError> {
        let transport: Box<dyn McpTransport> = match self.config.transport {
            McpTransportKind::Stdio => Box::new(StdioTransport::spawn(&self.config)?),
            McpTransportKind::Sse => {
                tracing::warn!(
                    server = %self.config.name,
                    "SSE transport is not implemented; server will be non-functional"
                );
                Box::new(SseTransport)
            }
        };

        let init = transport
            .send_request("initialize", Some(protocol::initialize_params()))
            .await?;
        init.into_result()
            .map_err(|e| McpError::Protocol(format!("initialize failed: {e}")))?;

        transport.send_notification("notifications/initialized").await?;

        let tools_resp = transport.send_request("tools/list", None).await?;
        self.tools = match tools_resp.into_result() {
            Ok(result) => serde_json::from_value::<ToolsListResult>(result)
                .map(|r| r.tools)
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        server = %self.config.name,
                        error = %e,
                        "failed to parse tools/list result"
                    );
                    Vec::new()
                }),
            Err(e) => {
                tracing::warn!(
                    server = %self.config.name,
                    error = %e,
                    "tools/list returned an error; server will expose no tools"
                );
                Vec::new()
            }
        };

        tracing::info!(
            server = %self.config.name,
            tool_count = self.tools.len(),
            "MCP session connected"
        );
        self.transport = Some(transport);
        Ok(())
    }

    /// Call a tool on this server and return the raw result payload.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        let transport = self
            .transport
            .as_ref()
            .filter(|t| t.is_alive())
            .ok_or_else(|| McpError::NotConnected(self.config.name.clone()))?;

        let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
        let resp = transport.send_request("tools/call", Some(params)).await?;
        resp.into_result()
            .map_err(|e| McpError::Protocol(format!("tools/call failed: {e}")))
    }

    /// Shut the server down. Idempotent.
    pub async fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            tracing::debug!(server = %self.config.name, "disconnecting MCP session");
            transport.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(name: &str) -> McpServerConfig {
        McpServerConfig {
            name: name.into(),
            transport: McpTransportKind::Stdio,
            command: Some("cat".into()),
            args: vec![],
            env: HashMap::new(),
            url: None,
            timeout_s: 2.0,
        }
    }

    #[tokio::test]
    async fn call_tool_before_connect_is_not_connected() {
        let session = McpSession::new(config("github"));
        let err = session
            .call_tool("search", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NotConnected(_)));
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_noop() {
        let mut session = McpSession::new(config("github"));
        session.disconnect().await;
        assert!(!session.is_connected());
    }

    #[test]
    fn server_name_is_config_name() {
        let session = McpSession::new(config("jira"));
        assert_eq!(session.server_name(), "jira");
        assert!(session.tools().is_empty());
    }
}
