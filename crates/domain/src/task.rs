use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A task submitted by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub prompt: String,
    /// When set, recruitment is bypassed and this specialist runs alone.
    #[serde(default)]
    pub specialist_id: Option<String>,
    #[serde(default = "default_model_key")]
    pub model_key: String,
    #[serde(default)]
    pub network_allowed: bool,
}

fn default_model_key() -> String {
    "quality".into()
}

impl Task {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            specialist_id: None,
            model_key: default_model_key(),
            network_allowed: false,
        }
    }
}

/// Opaque run identifier. Immutable for the life of the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Mint a new id: UTC timestamp plus a short random suffix.
    pub fn mint() -> Self {
        let ts = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let suffix = &uuid::Uuid::new_v4().as_simple().to_string()[..6];
        Self(format!("{ts}-{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The structured outcome of a run.
///
/// `payload` always contains `action = "final"`; for task forces,
/// `specialist_id` is the primary (first) specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub run_dir: PathBuf,
    pub workspace_path: PathBuf,
    pub specialist_id: String,
    pub specialist_ids: Vec<String>,
    pub model_name: String,
    pub payload: Value,
    pub required_capabilities: Vec<String>,
}
