//! Run checkpoints: atomic snapshots of in-flight multi-specialist state.
//!
//! Written after each specialist completes (write-to-tmp + rename, so a
//! crash never leaves a corrupt checkpoint), deleted on successful run
//! completion. `resume` continues from the first uncompleted specialist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use maestro_domain::error::{Error, Result};
use maestro_domain::event::{epoch_now, kind};
use maestro_domain::plan::{OrchestrationPlan, TaskForceMode};

/// State snapshot of an in-progress run.
///
/// Unknown fields on disk are ignored; missing optional fields take the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub workspace_path: PathBuf,
    pub task_prompt: String,
    /// The original task's network permission; resumed specialists get the
    /// same sandbox, not a widened one.
    #[serde(default)]
    pub network_allowed: bool,
    pub specialist_ids: Vec<String>,
    #[serde(default)]
    pub completed_specialists: Vec<String>,
    /// specialist_id → finish payload for completed specialists.
    #[serde(default)]
    pub payloads: HashMap<String, Value>,
    #[serde(default)]
    pub task_force_mode: TaskForceMode,
    #[serde(default = "default_model_key")]
    pub model_key: String,
    #[serde(default = "default_routing_method")]
    pub routing_method: String,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub orchestration_plan: Option<OrchestrationPlan>,
    #[serde(default)]
    pub created_at: f64,
    #[serde(default)]
    pub updated_at: f64,
}

fn default_model_key() -> String {
    "quality".into()
}
fn default_routing_method() -> String {
    "unknown".into()
}

impl RunCheckpoint {
    /// Specialists that have not completed yet, in plan order.
    pub fn remaining_specialists(&self) -> Vec<String> {
        self.specialist_ids
            .iter()
            .filter(|s| !self.completed_specialists.contains(s))
            .cloned()
            .collect()
    }

    /// Record a completed specialist and its payload, bumping `updated_at`.
    pub fn record_completed(&mut self, specialist_id: &str, payload: Value) {
        if !self.completed_specialists.iter().any(|s| s == specialist_id) {
            self.completed_specialists.push(specialist_id.to_string());
        }
        self.payloads.insert(specialist_id.to_string(), payload);
        self.updated_at = epoch_now();
    }
}

/// Atomically write `{run_dir}/checkpoint.json`.
pub fn save_checkpoint(run_dir: &Path, checkpoint: &RunCheckpoint) -> Result<()> {
    std::fs::create_dir_all(run_dir).map_err(Error::Io)?;
    let tmp = run_dir.join("checkpoint.json.tmp");
    let target = run_dir.join("checkpoint.json");

    let json = serde_json::to_string_pretty(checkpoint).map_err(Error::Json)?;
    std::fs::write(&tmp, json).map_err(Error::Io)?;
    std::fs::rename(&tmp, &target).map_err(Error::Io)?;
    Ok(())
}

/// Load `{run_dir}/checkpoint.json`. Missing file or parse failure → `None`.
pub fn load_checkpoint(run_dir: &Path) -> Option<RunCheckpoint> {
    let path = run_dir.join("checkpoint.json");
    let raw = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(cp) => Some(cp),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse checkpoint");
            None
        }
    }
}

/// Remove the checkpoint. Idempotent: absent file is a no-op.
pub fn delete_checkpoint(run_dir: &Path) -> Result<()> {
    let path = run_dir.join("checkpoint.json");
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Runs whose checkpoint exists and whose runlog has no `run_complete` event
/// (or no runlog at all).
pub fn find_resumable_runs(workspace_root: &Path) -> Vec<String> {
    let runs_dir = workspace_root.join("runs");
    let entries = match std::fs::read_dir(&runs_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut resumable = Vec::new();
    for entry in entries.flatten() {
        let run_dir = entry.path();
        if !run_dir.join("checkpoint.json").is_file() {
            continue;
        }
        let run_id = entry.file_name().to_string_lossy().to_string();

        let runlog = run_dir.join("runlog.jsonl");
        let has_complete = std::fs::read_to_string(&runlog)
            .map(|raw| {
                raw.lines().any(|line| {
                    serde_json::from_str::<Value>(line)
                        .ok()
                        .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(String::from))
                        .is_some_and(|k| k == kind::RUN_COMPLETE)
                })
            })
            .unwrap_or(false);

        if !has_complete {
            resumable.push(run_id);
        }
    }
    resumable.sort();
    resumable
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
