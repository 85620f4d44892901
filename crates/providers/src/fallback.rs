//! Cloud LLM fallback.
//!
//! Wraps a local client and a cloud client. Each request goes to the local
//! client first; when the configured policy triggers on the response, the
//! same request is re-issued to the cloud client with the cloud model name
//! substituted. Fallbacks are recorded on an internal queue the engine
//! drains after each LLM call.

use std::sync::Arc;

use parking_lot::Mutex;

use maestro_domain::error::Result;

use crate::client::{ChatClient, ChatRequest, ChatResponse, FallbackEvent};

/// Trigger condition for falling back to the cloud model.
///
/// Modes: `no_tool_calls` (local returned plain text), `malformed_args`
/// (a tool call decoded to `_raw`), `always`. Unknown modes never trigger
/// (a safe default), logged at construction so config typos are visible.
#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    mode: String,
}

impl FallbackPolicy {
    pub fn new(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        if !matches!(mode.as_str(), "no_tool_calls" | "malformed_args" | "always") {
            tracing::warn!(
                mode = %mode,
                "unknown fallback policy mode — fallback will never trigger"
            );
        }
        Self { mode }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    /// The trigger reason when this response should fall back, else `None`.
    pub fn evaluate(&self, response: &ChatResponse) -> Option<&'static str> {
        match self.mode.as_str() {
            "no_tool_calls" if !response.has_tool_calls() => Some("no_tool_calls"),
            "malformed_args"
                if response.tool_calls.iter().any(|tc| tc.has_malformed_args()) =>
            {
                Some("malformed_args")
            }
            "always" => Some("always"),
            _ => None,
        }
    }
}

/// Chat client that retries a second (cloud) client when the policy triggers.
pub struct FallbackChatClient {
    local: Arc<dyn ChatClient>,
    cloud: Arc<dyn ChatClient>,
    cloud_model: String,
    policy: FallbackPolicy,
    events: Mutex<Vec<FallbackEvent>>,
}

impl FallbackChatClient {
    pub fn new(
        local: Arc<dyn ChatClient>,
        cloud: Arc<dyn ChatClient>,
        cloud_model: impl Into<String>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            local,
            cloud,
            cloud_model: cloud_model.into(),
            policy,
            events: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl ChatClient for FallbackChatClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let local_response = self.local.chat(req).await?;

        let reason = match self.policy.evaluate(&local_response) {
            Some(reason) => reason,
            None => return Ok(local_response),
        };

        tracing::info!(
            reason,
            local_model = %req.model,
            cloud_model = %self.cloud_model,
            "fallback policy triggered; re-issuing request to cloud"
        );
        self.events.lock().push(FallbackEvent {
            reason: reason.to_string(),
            local_model: req.model.clone(),
            cloud_model: self.cloud_model.clone(),
        });

        let mut cloud_req = req.clone();
        cloud_req.model = self.cloud_model.clone();
        self.cloud.chat(&cloud_req).await
    }

    fn pop_fallback_events(&self) -> Vec<FallbackEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
