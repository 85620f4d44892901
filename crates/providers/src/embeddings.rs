//! Text embeddings via the Ollama `/api/embeddings` endpoint.
//!
//! Used by the run index for semantic search. Any `/v1` suffix on the
//! configured base URL is stripped first, so both
//! `http://localhost:11434/v1` and `http://localhost:11434` work.

use maestro_domain::error::{Error, Result};

use crate::openai_compat::from_reqwest;

const EMBED_TIMEOUT_S: u64 = 30;

/// Derive the embeddings URL from an OpenAI-style base URL.
pub fn embeddings_url(base_url: &str) -> String {
    let mut normalized = base_url.trim_end_matches('/');
    if let Some(stripped) = normalized.strip_suffix("/v1") {
        normalized = stripped;
    }
    format!("{}/api/embeddings", normalized.trim_end_matches('/'))
}

/// Embed a text, returning the raw float vector.
pub async fn embed_text(text: &str, model: &str, base_url: &str) -> Result<Vec<f32>> {
    let url = embeddings_url(base_url);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(EMBED_TIMEOUT_S))
        .build()
        .map_err(from_reqwest)?;

    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "model": model, "prompt": text }))
        .send()
        .await
        .map_err(from_reqwest)?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Provider {
            provider: "embeddings".into(),
            message: format!("HTTP {} from {url}", status.as_u16()),
        });
    }

    let body: serde_json::Value = resp.json().await.map_err(from_reqwest)?;
    let embedding = body
        .get("embedding")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::Provider {
            provider: "embeddings".into(),
            message: "missing 'embedding' array in response".into(),
        })?;

    Ok(embedding
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect())
}
