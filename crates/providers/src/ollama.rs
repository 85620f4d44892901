//! Ollama-flavoured adapter.
//!
//! Same wire shape as the generic client, plus tool-support discovery:
//! Ollama returns a 400 with a recognisable message when the model cannot do
//! tool calling. On that pattern the request is retried once without tools
//! and the discovery is remembered for the rest of the session.

use std::sync::atomic::{AtomicBool, Ordering};

use maestro_domain::config::ModelConfig;
use maestro_domain::error::{Error, Result};

use crate::client::{ChatClient, ChatRequest, ChatResponse};
use crate::openai_compat::{build_chat_body, parse_chat_response, GenericChatClient};

pub struct OllamaChatClient {
    inner: GenericChatClient,
    tools_supported: AtomicBool,
}

impl OllamaChatClient {
    pub fn new(cfg: &ModelConfig) -> Result<Self> {
        Ok(Self {
            inner: GenericChatClient::new(cfg)?,
            tools_supported: AtomicBool::new(true),
        })
    }

    /// Whether the model has been observed to accept tool definitions.
    pub fn tools_supported(&self) -> bool {
        self.tools_supported.load(Ordering::Relaxed)
    }
}

/// Ollama's 400 body when a model lacks tool calling.
pub(crate) fn is_tools_unsupported_error(err: &Error) -> bool {
    match err {
        Error::Provider { message, .. } => {
            message.contains("HTTP 400") && message.contains("does not support tools")
        }
        _ => false,
    }
}

#[async_trait::async_trait]
impl ChatClient for OllamaChatClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let include_tools = self.tools_supported() && !req.tools.is_empty();
        let body = build_chat_body(req, include_tools);

        match self.inner.post_chat(&body).await {
            Ok(resp_json) => parse_chat_response(&resp_json),
            Err(e) if include_tools && is_tools_unsupported_error(&e) => {
                tracing::info!(
                    model = %req.model,
                    "model does not support tools; retrying without tool definitions"
                );
                self.tools_supported.store(false, Ordering::Relaxed);
                let retry_body = build_chat_body(req, false);
                let resp_json = self.inner.post_chat(&retry_body).await?;
                parse_chat_response(&resp_json)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_unsupported_pattern_matches() {
        let err = Error::Provider {
            provider: "openai_compat".into(),
            message: "HTTP 400 - {\"error\":\"registry.ollama.ai/library/llama2 does not support tools\"}".into(),
        };
        assert!(is_tools_unsupported_error(&err));
    }

    #[test]
    fn other_400s_do_not_match() {
        let err = Error::Provider {
            provider: "openai_compat".into(),
            message: "HTTP 400 - bad request".into(),
        };
        assert!(!is_tools_unsupported_error(&err));

        let transport = Error::Http("connection refused".into());
        assert!(!is_tools_unsupported_error(&transport));
    }
}
