//! Cross-run index: one JSONL record per successful run.
//!
//! Keyword search (case-insensitive substring over prompt prefix and
//! summary) always works. When entries carry embeddings, semantic search
//! ranks them by cosine similarity against an embedded query, degrading
//! transparently to keyword search when no entries are embedded or the
//! embedding call fails.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use maestro_domain::error::{Error, Result};
use maestro_providers::embeddings::embed_text;

/// One record in the run index, written once per successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIndexEntry {
    #[serde(default)]
    pub run_id: String,
    /// Unix epoch seconds.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub specialist_ids: Vec<String>,
    /// First 200 chars of the task prompt.
    #[serde(default)]
    pub prompt_prefix: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub workspace_path: String,
    #[serde(default)]
    pub run_dir: String,
    #[serde(default)]
    pub routing_method: String,
    #[serde(default)]
    pub model_name: String,
    /// Present only when an embedding model was configured at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

fn index_path(workspace_root: &Path) -> std::path::PathBuf {
    workspace_root.join("run_index.jsonl")
}

/// Append one entry to `{workspace_root}/run_index.jsonl`.
pub fn append_to_index(workspace_root: &Path, entry: &RunIndexEntry) -> Result<()> {
    let path = index_path(workspace_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(Error::Io)?;
    }
    let line = serde_json::to_string(entry).map_err(Error::Json)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(Error::Io)?;
    file.write_all(line.as_bytes()).map_err(Error::Io)?;
    file.write_all(b"\n").map_err(Error::Io)?;
    tracing::debug!(run_id = %entry.run_id, "run index entry appended");
    Ok(())
}

/// All index entries, oldest first. Malformed lines are skipped.
pub fn load_entries(workspace_root: &Path) -> Vec<RunIndexEntry> {
    let path = index_path(workspace_root);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// Case-insensitive substring search over prompt prefixes and summaries.
/// Newest first, up to `limit`.
pub fn search_index(workspace_root: &Path, query: &str, limit: usize) -> Vec<RunIndexEntry> {
    let q = query.to_lowercase();
    let mut hits: Vec<RunIndexEntry> = load_entries(workspace_root)
        .into_iter()
        .filter(|e| {
            e.prompt_prefix.to_lowercase().contains(&q) || e.summary.to_lowercase().contains(&q)
        })
        .collect();
    hits.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
    hits.truncate(limit);
    hits
}

/// Cosine similarity between two equal-length vectors.
///
/// Returns 0.0 for any zero vector (no division by zero).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Rank embedded entries by cosine similarity to the embedded query.
///
/// Falls back to [`search_index`] when no entries carry embeddings or when
/// the embedding call fails (missing model, refused connection).
pub async fn semantic_search_index(
    workspace_root: &Path,
    query: &str,
    embedding_model: &str,
    embedding_base_url: &str,
    top_k: usize,
) -> Vec<RunIndexEntry> {
    let all = load_entries(workspace_root);
    if all.is_empty() {
        return Vec::new();
    }

    let embedded: Vec<&RunIndexEntry> = all
        .iter()
        .filter(|e| e.embedding.as_ref().is_some_and(|v| !v.is_empty()))
        .collect();
    if embedded.is_empty() {
        tracing::debug!("no embedded index entries; falling back to keyword search");
        return search_index(workspace_root, query, top_k);
    }

    let query_embedding = match embed_text(query, embedding_model, embedding_base_url).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "query embedding failed; falling back to keyword search");
            return search_index(workspace_root, query, top_k);
        }
    };

    let mut scored: Vec<(f32, RunIndexEntry)> = embedded
        .into_iter()
        .map(|e| {
            let score = e
                .embedding
                .as_ref()
                .map(|emb| cosine_similarity(&query_embedding, emb))
                .unwrap_or(0.0);
            (score, e.clone())
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(top_k).map(|(_, e)| e).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(run_id: &str, ts: f64, prompt: &str, summary: &str) -> RunIndexEntry {
        RunIndexEntry {
            run_id: run_id.into(),
            timestamp: ts,
            specialist_ids: vec!["engineering".into()],
            prompt_prefix: prompt.into(),
            summary: summary.into(),
            workspace_path: "/tmp/ws".into(),
            run_dir: "/tmp/ws/runs/x".into(),
            routing_method: "keyword_routing".into(),
            model_name: "qwen2.5:7b".into(),
            embedding: None,
        }
    }

    #[test]
    fn append_then_search_roundtrip() {
        let ws = TempDir::new().unwrap();
        append_to_index(ws.path(), &entry("r1", 1.0, "build a parser", "parser built")).unwrap();
        append_to_index(ws.path(), &entry("r2", 2.0, "survey crdts", "notes written")).unwrap();

        let hits = search_index(ws.path(), "parser", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].run_id, "r1");
        assert_eq!(hits[0].specialist_ids, vec!["engineering"]);
        assert_eq!(hits[0].routing_method, "keyword_routing");
        assert_eq!(hits[0].model_name, "qwen2.5:7b");
    }

    #[test]
    fn search_matches_summary_case_insensitively() {
        let ws = TempDir::new().unwrap();
        append_to_index(ws.path(), &entry("r1", 1.0, "task", "Parser BUILT ok")).unwrap();
        assert_eq!(search_index(ws.path(), "parser built", 10).len(), 1);
    }

    #[test]
    fn search_returns_newest_first_and_limits() {
        let ws = TempDir::new().unwrap();
        for i in 0..5 {
            append_to_index(ws.path(), &entry(&format!("r{i}"), i as f64, "shared topic", ""))
                .unwrap();
        }
        let hits = search_index(ws.path(), "shared", 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].run_id, "r4");
        assert_eq!(hits[2].run_id, "r2");
    }

    #[test]
    fn search_missing_index_is_empty() {
        let ws = TempDir::new().unwrap();
        assert!(search_index(ws.path(), "anything", 10).is_empty());
    }

    #[test]
    fn loader_skips_malformed_lines() {
        let ws = TempDir::new().unwrap();
        append_to_index(ws.path(), &entry("r1", 1.0, "p", "s")).unwrap();
        let path = ws.path().join("run_index.jsonl");
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("not json at all\n");
        std::fs::write(&path, raw).unwrap();

        assert_eq!(load_entries(ws.path()).len(), 1);
    }

    #[test]
    fn cosine_basics() {
        let a = [1.0, 0.0];
        let b = [1.0, 0.0];
        let c = [0.0, 1.0];
        let d = [-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_is_symmetric_and_bounded() {
        let a = [0.3, -1.2, 2.0];
        let b = [1.5, 0.4, -0.3];
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        assert!((ab - ba).abs() < 1e-6);
        assert!((-1.0..=1.0).contains(&ab));
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn semantic_search_without_embeddings_falls_back_to_keyword() {
        let ws = TempDir::new().unwrap();
        append_to_index(ws.path(), &entry("r1", 1.0, "build a parser", "done")).unwrap();

        // No entry has an embedding, so no network call is attempted.
        let hits = semantic_search_index(
            ws.path(),
            "parser",
            "nomic-embed-text",
            "http://localhost:1/v1",
            5,
        )
        .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].run_id, "r1");
    }

    #[tokio::test]
    async fn semantic_search_embed_failure_falls_back_to_keyword() {
        let ws = TempDir::new().unwrap();
        let mut embedded = entry("r1", 1.0, "build a parser", "done");
        embedded.embedding = Some(vec![0.1, 0.2]);
        append_to_index(ws.path(), &embedded).unwrap();

        // Port 1 refuses connections; the query embedding fails and keyword
        // search answers instead.
        let hits = semantic_search_index(
            ws.path(),
            "parser",
            "nomic-embed-text",
            "http://127.0.0.1:1/v1",
            5,
        )
        .await;
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn embedding_not_serialized_when_absent() {
        let e = entry("r1", 1.0, "p", "s");
        let line = serde_json::to_string(&e).unwrap();
        assert!(!line.contains("embedding"));
    }
}
