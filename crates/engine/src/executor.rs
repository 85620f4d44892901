//! The per-specialist pack loop: `LLM call → handle tool calls → check
//! termination`, at most `max_steps` turns.
//!
//! Correctness gates on `finish_task` (work done, required fields, pack
//! quality gate), structured classification of tool errors, repetition/loop
//! detection, corrective re-prompts for plain-text responses, and one run
//! event per observable step. Tool failures never abort the loop; only LLM
//! transport errors propagate (the run becomes resumable).

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use maestro_domain::config::ModelConfig;
use maestro_domain::constants::MAX_LLM_CONTENT_IN_RUNLOG_CHARS;
use maestro_domain::error::Result;
use maestro_domain::event::kind;
use maestro_domain::tool::{Message, ToolCall};
use maestro_packs::SpecialistPack;
use maestro_providers::{ChatClient, ChatRequest};

use crate::emitter::EventSink;
use crate::{LOOP_DETECT_THRESHOLD, LOOP_DETECT_WINDOW, MAX_PLAIN_TEXT_RETRIES};

/// The finish tool's success result sent back to the model.
const FINISH_RESULT_CONTENT: &str = r#"{"ok":true,"status":"task_completed"}"#;

/// Everything one pack loop needs, owned so parallel loops can be spawned.
pub struct PackLoop {
    pub pack: Box<dyn SpecialistPack>,
    pub messages: Vec<Message>,
    pub chat_client: Arc<dyn ChatClient>,
    pub model_cfg: ModelConfig,
    pub events: EventSink,
    /// `"{specialist_id}_"` in task-force mode, `""` otherwise.
    pub step_prefix: String,
    pub max_steps: usize,
}

/// How a finish-tool call fared against the gates.
enum GateOutcome {
    Accept(Value),
    Reject { error_result: Value, quality_gate: Option<String> },
}

impl PackLoop {
    /// Drive the loop to a final payload.
    ///
    /// `open()` runs before step 0 and `close()` runs on every exit path,
    /// including transport errors. The returned payload always carries
    /// `action = "final"`.
    pub async fn run(mut self) -> Result<Value> {
        if let Err(e) = self.pack.open().await {
            self.pack.close().await;
            return Err(e);
        }
        let result = self.run_inner().await;
        self.pack.close().await;
        result
    }

    async fn run_inner(&mut self) -> Result<Value> {
        let mut any_non_finish_tool_called = false;
        let mut consecutive_plain_text = 0usize;
        let mut tool_call_history: Vec<String> = Vec::new();

        for step in 0..self.max_steps {
            let step_key = format!("{}step_{step}", self.step_prefix);
            tracing::debug!(step = %step_key, messages = self.messages.len(), "pack loop step");

            self.events.emit(
                kind::LLM_REQUEST,
                Some(&step_key),
                serde_json::json!({ "step": step, "message_count": self.messages.len() }),
            );

            let req = ChatRequest {
                messages: self.messages.clone(),
                model: self.model_cfg.model.clone(),
                tools: self.pack.tool_definitions(),
                temperature: Some(self.model_cfg.temperature),
                top_p: Some(self.model_cfg.top_p),
                max_tokens: Some(self.model_cfg.max_tokens),
            };
            let response = self.chat_client.chat(&req).await?;

            for fb in self.chat_client.pop_fallback_events() {
                tracing::info!(
                    step = %step_key,
                    reason = %fb.reason,
                    local = %fb.local_model,
                    cloud = %fb.cloud_model,
                    "cloud fallback used"
                );
                self.events.emit(
                    kind::CLOUD_FALLBACK,
                    Some(&step_key),
                    serde_json::json!({
                        "reason": fb.reason,
                        "local_model": fb.local_model,
                        "cloud_model": fb.cloud_model,
                    }),
                );
            }

            let mut preview = response.content.clone();
            preview.truncate(floor_char_boundary(&preview, MAX_LLM_CONTENT_IN_RUNLOG_CHARS));
            self.events.emit(
                kind::LLM_RESPONSE,
                Some(&step_key),
                serde_json::json!({
                    "content": preview,
                    "tool_calls": response
                        .tool_calls
                        .iter()
                        .map(|tc| serde_json::json!({"name": &tc.tool_name, "call_id": &tc.call_id}))
                        .collect::<Vec<_>>(),
                }),
            );

            // Plain-text handling: nudge the model back to tools, then give
            // up and treat the text as the final answer.
            if !response.has_tool_calls() {
                consecutive_plain_text += 1;
                if consecutive_plain_text <= MAX_PLAIN_TEXT_RETRIES {
                    let tool_names: Vec<String> = self
                        .pack
                        .tool_definitions()
                        .iter()
                        .map(|d| d.name.clone())
                        .collect();
                    let correction = format!(
                        "You must call one of the available tools to continue — do not \
                         respond with plain text.\nAvailable tools: {}.\nIf the task is \
                         fully complete, call {}. Otherwise, use a tool to make progress.",
                        tool_names.join(", "),
                        self.pack.finish_tool_name(),
                    );
                    self.messages.push(Message::assistant(response.content.clone()));
                    self.messages.push(Message::user(correction));
                    tracing::warn!(
                        step = %step_key,
                        attempt = consecutive_plain_text,
                        "plain-text response; injecting corrective re-prompt"
                    );
                    self.events.emit(
                        kind::CORRECTIVE_REPROMPT,
                        Some(&step_key),
                        serde_json::json!({
                            "reason": "plain_text_response",
                            "attempt": consecutive_plain_text,
                            "max_retries": MAX_PLAIN_TEXT_RETRIES,
                        }),
                    );
                    continue;
                }

                tracing::warn!(
                    step = %step_key,
                    count = consecutive_plain_text,
                    "plain-text limit reached; using text as final payload"
                );
                return Ok(serde_json::json!({
                    "action": "final",
                    "summary": response.content,
                    "artifacts": [],
                    "next_steps": [],
                    "notes": format!(
                        "Model returned plain text {consecutive_plain_text} time(s) without \
                         calling a tool; used text response as summary."
                    ),
                }));
            }
            consecutive_plain_text = 0;

            let content = if response.content.is_empty() {
                None
            } else {
                Some(response.content.clone())
            };
            self.messages
                .push(Message::assistant_tool_calls(content, &response.tool_calls));

            let mut finish_payload: Option<Value> = None;

            for tc in &response.tool_calls {
                self.events.emit(
                    kind::TOOL_CALL,
                    Some(&step_key),
                    serde_json::json!({ "tool": &tc.tool_name, "args": &tc.arguments }),
                );

                if tc.tool_name == self.pack.finish_tool_name() {
                    match self.check_finish_gates(tc, any_non_finish_tool_called) {
                        GateOutcome::Accept(payload) => {
                            finish_payload = Some(payload);
                            self.messages
                                .push(Message::tool_result(&tc.call_id, FINISH_RESULT_CONTENT));
                            self.events.emit(
                                kind::TOOL_RESULT,
                                Some(&step_key),
                                serde_json::json!({
                                    "tool": &tc.tool_name,
                                    "result": {"status": "task_completed"},
                                }),
                            );
                        }
                        GateOutcome::Reject { error_result, quality_gate } => {
                            tracing::warn!(
                                step = %step_key,
                                error = %error_result["error"],
                                "finish_task rejected"
                            );
                            self.messages
                                .push(Message::tool_result(&tc.call_id, error_result.to_string()));
                            match quality_gate {
                                Some(message) => self.events.emit(
                                    kind::QUALITY_GATE_FAILED,
                                    Some(&step_key),
                                    serde_json::json!({ "tool": &tc.tool_name, "message": message }),
                                ),
                                None => self.events.emit(
                                    kind::TOOL_RESULT,
                                    Some(&step_key),
                                    serde_json::json!({
                                        "tool": &tc.tool_name,
                                        "result": error_result,
                                    }),
                                ),
                            }
                        }
                    }
                    continue;
                }

                // A real tool is being attempted.
                any_non_finish_tool_called = true;

                let call_sig = format!("{}:{}", tc.tool_name, canonical_json(&tc.arguments));
                let recent_repeats = tool_call_history
                    .iter()
                    .rev()
                    .take(LOOP_DETECT_WINDOW)
                    .filter(|s| **s == call_sig)
                    .count();
                tool_call_history.push(call_sig);

                let result = match self.pack.execute_tool(&tc.tool_name, tc.arguments.clone()).await
                {
                    Ok(result) => {
                        self.events.emit(
                            kind::TOOL_RESULT,
                            Some(&step_key),
                            serde_json::json!({ "tool": &tc.tool_name, "result": &result }),
                        );
                        result
                    }
                    Err(tool_err) => {
                        let error_type = tool_err.kind();
                        let message = tool_err.to_string();
                        tracing::warn!(
                            step = %step_key,
                            tool = %tc.tool_name,
                            error_type,
                            error = %message,
                            "tool error"
                        );
                        self.events.emit(
                            kind::TOOL_ERROR,
                            Some(&step_key),
                            serde_json::json!({
                                "tool": &tc.tool_name,
                                "error_type": error_type,
                                "error_message": &message,
                            }),
                        );
                        if error_type == "permission" {
                            tracing::warn!(
                                tool = %tc.tool_name,
                                error = %message,
                                "security event: sandbox violation"
                            );
                            self.events.emit(
                                kind::SECURITY_EVENT,
                                Some(&step_key),
                                serde_json::json!({
                                    "event_type": "sandbox_violation",
                                    "tool": &tc.tool_name,
                                    "error_message": &message,
                                }),
                            );
                        }
                        serde_json::json!({
                            "error": tool_err.error_label(),
                            "message": message,
                        })
                    }
                };
                self.messages
                    .push(Message::tool_result(&tc.call_id, result.to_string()));

                if recent_repeats >= LOOP_DETECT_THRESHOLD {
                    let warning = format!(
                        "[SYSTEM] LOOP DETECTED: you have already called '{}' with these \
                         exact arguments {recent_repeats} time(s) recently and it has not \
                         resolved the problem.\nSTOP repeating this action. Instead:\n\
                         1. Re-read the error output above and identify the ROOT CAUSE.\n\
                         2. Take a DIFFERENT action — fix the code, install a missing \
                         dependency, or restructure your approach.\n\
                         3. If you cannot fix the issue after trying multiple approaches, \
                         call {} with an explanation of what was attempted and what failed.",
                        tc.tool_name,
                        self.pack.finish_tool_name(),
                    );
                    self.messages.push(Message::user(warning));
                    tracing::warn!(
                        step = %step_key,
                        tool = %tc.tool_name,
                        repeats = recent_repeats,
                        "loop detected; injected loop-break warning"
                    );
                    self.events.emit(
                        kind::LOOP_DETECTED,
                        Some(&step_key),
                        serde_json::json!({
                            "tool": &tc.tool_name,
                            "repeat_count": recent_repeats,
                        }),
                    );
                }
            }

            if let Some(payload) = finish_payload {
                tracing::info!(step = %step_key, "pack loop completed");
                return Ok(payload);
            }
        }

        tracing::warn!(
            max_steps = self.max_steps,
            step_prefix = %self.step_prefix,
            "max_steps reached without finish_task"
        );
        Ok(serde_json::json!({
            "action": "final",
            "summary": format!("Reached max_steps ({}) without completion.", self.max_steps),
            "artifacts": [],
            "next_steps": ["Increase max_steps or refine task."],
            "notes": "See runlog for details.",
        }))
    }

    /// The three gates, in order. Each rejection is sent back to the model
    /// as a tool message and the loop continues.
    fn check_finish_gates(&self, tc: &ToolCall, any_non_finish_tool_called: bool) -> GateOutcome {
        // Gate 1: at least one regular tool must have been attempted.
        if !any_non_finish_tool_called {
            return GateOutcome::Reject {
                error_result: serde_json::json!({
                    "error": "finish_task_called_without_doing_work",
                    "message": "You must use at least one tool to actually complete the task \
                                before calling finish_task. Call finish_task only after you \
                                have done the work and verified it.",
                    "hint": "Use your available tools first (e.g. shell, write_file, \
                             web_search), then call finish_task.",
                }),
                quality_gate: None,
            };
        }

        // Gate 2: all required fields present.
        let missing: Vec<String> = self
            .pack
            .finish_required_fields()
            .into_iter()
            .filter(|f| tc.arguments.get(f).is_none())
            .collect();
        if !missing.is_empty() {
            return GateOutcome::Reject {
                error_result: serde_json::json!({
                    "error": "finish_task called with missing required fields",
                    "missing_fields": missing,
                    "required_fields": self.pack.finish_required_fields(),
                    "hint": "Call finish_task again with all required fields populated.",
                }),
                quality_gate: None,
            };
        }

        // Gate 3: pack-specific quality gate.
        if let Some(message) = self.pack.validate_finish_payload(&tc.arguments) {
            return GateOutcome::Reject {
                error_result: serde_json::json!({
                    "error": "quality_gate_failed",
                    "message": message,
                    "hint": "Call run_tests, fix issues, then retry finish_task.",
                }),
                quality_gate: Some(message),
            };
        }

        let mut payload = serde_json::json!({ "action": "final" });
        if let (Some(obj), Some(args)) = (payload.as_object_mut(), tc.arguments.as_object()) {
            for (k, v) in args {
                obj.insert(k.clone(), v.clone());
            }
        }
        GateOutcome::Accept(payload)
    }
}

/// Serialise with object keys sorted recursively, so argument order never
/// defeats repetition detection.
fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sort(v))).collect();
                serde_json::to_value(sorted).unwrap_or(Value::Null)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

/// Largest char-boundary index not exceeding `max`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut end = max;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    end
}
