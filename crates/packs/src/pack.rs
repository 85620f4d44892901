//! The specialist-pack capability surface.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use maestro_domain::error::{Result, ToolError};
use maestro_domain::tool::ToolDefinition;

/// Outcome of one tool execution.
pub type ToolResult = std::result::Result<Value, ToolError>;

/// Boxed future returned by tool handlers.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// A tool executor: takes the decoded argument object, returns a result dict.
pub type ToolHandler = Box<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// Runtime specialist instance bound to a workspace.
///
/// Packs are created per run and discarded. `open()` runs before the first
/// LLM turn; `close()` runs on every exit path (the engine guarantees it).
#[async_trait::async_trait]
pub trait SpecialistPack: Send + Sync {
    fn specialist_id(&self) -> &str;

    fn system_prompt(&self) -> &str;

    /// All tool definitions (regular + finish) offered to the model.
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    fn finish_tool_name(&self) -> &str {
        crate::FINISH_TOOL_NAME
    }

    /// Required argument names of the finish tool.
    fn finish_required_fields(&self) -> Vec<String>;

    /// Pack-specific quality gate. A returned string rejects the finish
    /// payload and is sent back to the model.
    fn validate_finish_payload(&self, _args: &Value) -> Option<String> {
        None
    }

    /// Acquire runtime resources (browser, MCP sessions, container).
    async fn open(&mut self) -> Result<()>;

    /// Release runtime resources. Must be safe to call after a failed open.
    async fn close(&mut self);

    /// Execute a regular (non-finish) tool by name.
    ///
    /// Unknown tool names return `Ok` with an error dict, never an error,
    /// so a hallucinated tool name cannot abort the loop.
    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult;
}

impl std::fmt::Debug for dyn SpecialistPack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistPack")
            .field("specialist_id", &self.specialist_id())
            .finish()
    }
}
