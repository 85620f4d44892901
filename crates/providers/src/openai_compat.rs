//! Generic OpenAI-compatible adapter.
//!
//! Works with OpenAI, vLLM, LM Studio, Together, LiteLLM bridges, and any
//! other endpoint following the chat-completions contract. Surfaces every
//! non-2xx immediately (including 4xx); no retries.

use serde_json::Value;

use maestro_domain::config::ModelConfig;
use maestro_domain::error::{Error, Result};
use maestro_domain::tool::{decode_arguments, ToolCall};

use crate::client::{ChatClient, ChatRequest, ChatResponse};

pub struct GenericChatClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GenericChatClient {
    pub fn new(cfg: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs_f64(cfg.timeout_s))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            client,
        })
    }

    pub(crate) fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub(crate) async fn post_chat(&self, body: &Value) -> Result<Value> {
        let mut request = self
            .client
            .post(self.chat_url())
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let resp = request.json(body).send().await.map_err(from_reqwest)?;
        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: "openai_compat".into(),
                message: format!("HTTP {} - {}", status.as_u16(), text),
            });
        }

        serde_json::from_str(&text).map_err(Error::Json)
    }
}

pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire helpers (shared with the Ollama adapter)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn build_chat_body(req: &ChatRequest, include_tools: bool) -> Value {
    let mut body = serde_json::json!({
        "model": req.model,
        "messages": req.messages,
        "stream": false,
    });
    if include_tools && !req.tools.is_empty() {
        let tools: Vec<Value> = req.tools.iter().map(|t| t.to_openai()).collect();
        body["tools"] = Value::Array(tools);
    }
    if let Some(temp) = req.temperature {
        body["temperature"] = serde_json::json!(temp);
    }
    if let Some(top_p) = req.top_p {
        body["top_p"] = serde_json::json!(top_p);
    }
    if let Some(max) = req.max_tokens {
        body["max_tokens"] = serde_json::json!(max);
    }
    body
}

pub(crate) fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: "openai_compat".into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: "openai_compat".into(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(ChatResponse {
        content,
        tool_calls: parse_tool_calls(message),
        model,
        finish_reason,
    })
}

fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let call_id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let tool_name = func.get("name")?.as_str()?.to_string();
            let args_raw = func.get("arguments")?.as_str().unwrap_or("{}");
            Some(ToolCall {
                call_id,
                tool_name,
                arguments: decode_arguments(args_raw),
            })
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ChatClient for GenericChatClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let body = build_chat_body(req, true);
        tracing::debug!(model = %req.model, url = %self.chat_url(), "chat request");
        let resp_json = self.post_chat(&body).await?;
        parse_chat_response(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_domain::tool::{Message, ToolDefinition};

    #[test]
    fn body_includes_tools_and_sampling() {
        let req = ChatRequest {
            messages: vec![Message::system("s"), Message::user("u")],
            model: "m1".into(),
            tools: vec![ToolDefinition::new(
                "shell",
                "run",
                serde_json::json!({"type": "object"}),
            )],
            temperature: Some(0.1),
            top_p: Some(0.9),
            max_tokens: Some(512),
        };
        let body = build_chat_body(&req, true);
        assert_eq!(body["model"], "m1");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["tools"][0]["function"]["name"], "shell");
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn body_can_omit_tools() {
        let req = ChatRequest {
            messages: vec![Message::user("u")],
            model: "m1".into(),
            tools: vec![ToolDefinition::new("shell", "run", serde_json::json!({}))],
            ..Default::default()
        };
        let body = build_chat_body(&req, false);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn parse_response_with_tool_calls() {
        let raw = serde_json::json!({
            "model": "qwen2.5:7b",
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "list_files", "arguments": "{\"max_files\": 10}"}
                    }]
                }
            }]
        });
        let resp = parse_chat_response(&raw).unwrap();
        assert!(resp.has_tool_calls());
        assert_eq!(resp.tool_calls[0].tool_name, "list_files");
        assert_eq!(resp.tool_calls[0].arguments["max_files"], 10);
        assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn parse_response_malformed_args_become_raw() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "shell", "arguments": "{broken"}
                    }]
                }
            }]
        });
        let resp = parse_chat_response(&raw).unwrap();
        assert_eq!(resp.tool_calls[0].arguments["_raw"], "{broken");
    }

    #[test]
    fn parse_response_plain_text() {
        let raw = serde_json::json!({
            "choices": [{"message": {"content": "All done."}, "finish_reason": "stop"}]
        });
        let resp = parse_chat_response(&raw).unwrap();
        assert!(!resp.has_tool_calls());
        assert_eq!(resp.content, "All done.");
    }

    #[test]
    fn parse_response_without_choices_is_provider_error() {
        let raw = serde_json::json!({"error": "boom"});
        assert!(parse_chat_response(&raw).is_err());
    }
}
