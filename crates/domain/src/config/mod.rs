//! Configuration schema.
//!
//! Defaults point at Ollama; any OpenAI-compatible backend works via
//! `base_url` + `model`. Specialists are an *ordered* list because
//! recruitment tie-breaking follows config insertion order.

pub mod capabilities;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::plan::TaskForceMode;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Models
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which chat-client implementation talks to this endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Ollama-flavoured client: retries once on the tools-unsupported 400
    /// pattern and remembers the discovery.
    #[default]
    Ollama,
    /// Bare OpenAI-compatible client (OpenAI, vLLM, LM Studio, cloud bridges).
    /// Surfaces every non-2xx immediately.
    Generic,
}

/// LLM endpoint and model name (OpenAI chat-completions API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// e.g. `http://localhost:11434/v1`
    pub base_url: String,
    pub model: String,
    /// Bearer token; empty for local backends (no header sent).
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// HTTP read timeout. Large local models may need 300-600s.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
}

fn default_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.9
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_timeout_s() -> f64 {
    360.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Specialists
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for one MCP tool server attached to a specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Used as the tool prefix: `mcp__<name>__<tool>`.
    pub name: String,
    #[serde(default)]
    pub transport: McpTransportKind,
    /// Executable to launch (stdio transport).
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Endpoint URL (sse transport).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_mcp_timeout_s")]
    pub timeout_s: f64,
}

fn default_mcp_timeout_s() -> f64 {
    30.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum McpTransportKind {
    #[default]
    Stdio,
    Sse,
}

/// One specialist pack definition. Order in the config list is meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistConfig {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Capability IDs this pack provides; used by the capability router.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Register the headless-browser tool family on this pack. Browser
    /// tools additionally require the task to allow network access.
    #[serde(default)]
    pub browser: bool,
    /// MCP tool servers merged into this pack's tool catalogue.
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    /// Container image for shell isolation. When set, the pack is wrapped so
    /// every `shell` call executes inside a container with the workspace
    /// mounted at /workspace.
    #[serde(default)]
    pub container_image: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Feature configs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cloud LLM fallback. When set, the local model is tried first and the
/// cloud model is used when the configured policy triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudFallbackConfig {
    /// Key into `models` for the cloud model. Must exist when fallback is on.
    pub model_key: String,
    /// `no_tool_calls` | `malformed_args` | `always`. Unknown values never
    /// trigger (a warning is logged at construction).
    #[serde(default = "default_fallback_policy")]
    pub policy: String,
}

fn default_fallback_policy() -> String {
    "no_tool_calls".into()
}

/// Cross-run index configuration. With no embedding model the index is
/// keyword-only; with one, entries are embedded at write time and searched
/// by cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunIndexConfig {
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Embeddings endpoint base URL; when unset, derived from the task
    /// model's base_url by stripping any `/v1` suffix.
    #[serde(default)]
    pub embedding_base_url: Option<String>,
}

/// HTTP gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Env var holding the API bearer token. Unset/empty = no auth gate.
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8787
}
fn default_api_token_env() -> String {
    "MAESTRO_API_TOKEN".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_token_env: default_api_token_env(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Root config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub models: HashMap<String, ModelConfig>,
    pub specialists: Vec<SpecialistConfig>,
    /// Key into `models` for routing/orchestration calls (a lightweight
    /// model). Falls back to the task model when absent.
    #[serde(default = "default_routing_model_key")]
    pub routing_model_key: String,
    /// Default execution mode for multi-specialist task forces; an
    /// orchestrator plan may override it per run.
    #[serde(default)]
    pub task_force_mode: TaskForceMode,
    /// Maximum LLM turns per specialist.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Root directory holding `runs/` and `run_index.jsonl`.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    #[serde(default)]
    pub run_index: RunIndexConfig,
    #[serde(default)]
    pub cloud_fallback: Option<CloudFallbackConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_routing_model_key() -> String {
    "fast".into()
}
fn default_max_steps() -> usize {
    40
}
fn default_workspace_root() -> PathBuf {
    PathBuf::from("workspace")
}

impl Config {
    /// Built-in default: Ollama on localhost with the three stock specialists.
    pub fn default_local() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "fast".to_string(),
            ModelConfig {
                base_url: "http://localhost:11434/v1".into(),
                model: "qwen2.5:7b".into(),
                api_key: String::new(),
                backend: BackendKind::Ollama,
                temperature: 0.1,
                top_p: 0.9,
                max_tokens: 1200,
                timeout_s: 360.0,
            },
        );
        models.insert(
            "quality".to_string(),
            ModelConfig {
                base_url: "http://localhost:11434/v1".into(),
                model: "qwen2.5:14b".into(),
                api_key: String::new(),
                backend: BackendKind::Ollama,
                temperature: 0.1,
                top_p: 0.9,
                max_tokens: 2400,
                timeout_s: 360.0,
            },
        );

        Self {
            models,
            specialists: vec![
                SpecialistConfig {
                    id: "engineering".into(),
                    description: "Plan → implement → test → review → iterate.".into(),
                    keywords: [
                        "build", "implement", "code", "service", "pipeline", "kubernetes",
                        "rust", "python",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                    capabilities: ["code_execution", "file_io", "software_testing"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    browser: false,
                    mcp_servers: vec![],
                    container_image: None,
                },
                SpecialistConfig {
                    id: "research".into(),
                    description: "Scope → search → screen → extract → synthesize.".into(),
                    keywords: [
                        "literature", "systematic review", "paper", "arxiv", "survey",
                        "bibliography", "citations",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                    capabilities: [
                        "systematic_review",
                        "web_search",
                        "citation_extraction",
                        "file_io",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                    browser: false,
                    mcp_servers: vec![],
                    container_image: None,
                },
                SpecialistConfig {
                    id: "enterprise_research".into(),
                    description: "Enterprise search over GitHub, Confluence, Jira and \
                                  internal sources via MCP; structured reports with \
                                  staleness and confidence notes."
                        .into(),
                    keywords: [
                        "confluence", "jira", "github", "internal docs", "knowledge base",
                        "enterprise",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                    capabilities: [
                        "enterprise_search",
                        "github_search",
                        "systematic_review",
                        "web_search",
                        "file_io",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                    browser: false,
                    mcp_servers: vec![],
                    container_image: None,
                },
            ],
            routing_model_key: default_routing_model_key(),
            task_force_mode: TaskForceMode::Sequential,
            max_steps: default_max_steps(),
            workspace_root: default_workspace_root(),
            run_index: RunIndexConfig::default(),
            cloud_fallback: None,
            server: ServerConfig::default(),
        }
    }

    pub fn specialist(&self, id: &str) -> Option<&SpecialistConfig> {
        self.specialists.iter().find(|s| s.id == id)
    }

    pub fn specialist_ids(&self) -> Vec<&str> {
        self.specialists.iter().map(|s| s.id.as_str()).collect()
    }

    /// Validate cross-references. Returns human-readable problems; an empty
    /// vec means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.specialists.is_empty() {
            problems.push(
                "specialists must not be empty: define at least one specialist".to_string(),
            );
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.specialists {
            if !seen.insert(spec.id.as_str()) {
                problems.push(format!("duplicate specialist id: {:?}", spec.id));
            }
            let mut mcp_names = std::collections::HashSet::new();
            for server in &spec.mcp_servers {
                if !mcp_names.insert(server.name.as_str()) {
                    problems.push(format!(
                        "specialist {:?}: duplicate MCP server name {:?}",
                        spec.id, server.name
                    ));
                }
                if server.transport == McpTransportKind::Stdio && server.command.is_none() {
                    problems.push(format!(
                        "MCP server {:?}: transport 'stdio' requires 'command'",
                        server.name
                    ));
                }
                if server.transport == McpTransportKind::Sse && server.url.is_none() {
                    problems.push(format!(
                        "MCP server {:?}: transport 'sse' requires 'url'",
                        server.name
                    ));
                }
            }
        }

        if let Some(fb) = &self.cloud_fallback {
            if !self.models.contains_key(&fb.model_key) {
                problems.push(format!(
                    "cloud_fallback.model_key {:?} not found in models",
                    fb.model_key
                ));
            }
        }

        problems
    }
}
