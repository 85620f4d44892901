//! The chat-client contract shared by every LLM backend.

use maestro_domain::error::Result;
use maestro_domain::tool::{Message, ToolCall, ToolDefinition};

/// A chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub model: String,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// The model that actually produced the response.
    pub model: String,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Emitted by the fallback wrapper when a request was re-issued to the cloud.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FallbackEvent {
    pub reason: String,
    pub local_model: String,
    pub cloud_model: String,
}

/// Trait every LLM adapter implements.
///
/// Fails with a transport-kind error on connection failure, non-2xx status,
/// or read timeout. Tool-call argument JSON parse failures never error:
/// they decode to `{"_raw": <text>}`.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Drain fallback events recorded since the last call.
    ///
    /// Only the cloud-fallback wrapper produces any; the engine drains this
    /// after every chat call and records `cloud_fallback` run events.
    fn pop_fallback_events(&self) -> Vec<FallbackEvent> {
        Vec::new()
    }
}
