//! LLM chat clients.
//!
//! One [`client::ChatClient`] trait over the OpenAI chat-completions wire
//! shape, with two adapters (generic OpenAI-compatible, Ollama-flavoured), a
//! cloud-fallback wrapper, and the embeddings call used by the run index.

pub mod client;
pub mod embeddings;
pub mod fallback;
pub mod ollama;
pub mod openai_compat;

pub use client::{ChatClient, ChatRequest, ChatResponse, FallbackEvent};
pub use fallback::{FallbackChatClient, FallbackPolicy};
pub use ollama::OllamaChatClient;
pub use openai_compat::GenericChatClient;

use std::sync::Arc;

use maestro_domain::config::{BackendKind, ModelConfig};
use maestro_domain::error::Result;

/// Build the chat client for a model config.
pub fn build_chat_client(cfg: &ModelConfig) -> Result<Arc<dyn ChatClient>> {
    Ok(match cfg.backend {
        BackendKind::Ollama => Arc::new(OllamaChatClient::new(cfg)?),
        BackendKind::Generic => Arc::new(GenericChatClient::new(cfg)?),
    })
}
