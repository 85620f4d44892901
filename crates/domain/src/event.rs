//! Run-log events: one JSON object per line in `runlog.jsonl`.
//!
//! Readers must tolerate partial last lines, invalid JSON lines (skip), and
//! unknown kinds (pass through), which is why `kind` is a plain string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of event kinds the engine emits.
pub mod kind {
    pub const RECRUITMENT: &str = "recruitment";
    pub const ORCHESTRATION_PLAN: &str = "orchestration_plan";
    pub const PACK_START: &str = "pack_start";
    pub const TASK_FORCE_PARALLEL: &str = "task_force_parallel";
    pub const LLM_REQUEST: &str = "llm_request";
    pub const LLM_RESPONSE: &str = "llm_response";
    pub const TOOL_CALL: &str = "tool_call";
    pub const TOOL_RESULT: &str = "tool_result";
    pub const TOOL_ERROR: &str = "tool_error";
    pub const SECURITY_EVENT: &str = "security_event";
    pub const CORRECTIVE_REPROMPT: &str = "corrective_reprompt";
    pub const LOOP_DETECTED: &str = "loop_detected";
    pub const QUALITY_GATE_FAILED: &str = "quality_gate_failed";
    pub const CLOUD_FALLBACK: &str = "cloud_fallback";
    pub const SYNTHESIS_COMPLETE: &str = "synthesis_complete";
    pub const RUN_COMPLETE: &str = "run_complete";
}

/// One run-log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Unix epoch seconds.
    pub ts: f64,
    pub kind: String,
    pub step: Option<String>,
    pub payload: Value,
}

impl RunEvent {
    pub fn now(kind: impl Into<String>, step: Option<String>, payload: Value) -> Self {
        Self {
            ts: epoch_now(),
            kind: kind.into(),
            step,
            payload,
        }
    }
}

/// Current time as fractional Unix epoch seconds.
pub fn epoch_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
