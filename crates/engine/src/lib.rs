//! The task execution engine.
//!
//! [`recruit`] and [`orchestrator`] turn a prompt into an
//! [`maestro_domain::plan::OrchestrationPlan`]; [`executor`] drives one
//! specialist pack through its bounded tool loop; [`task_force`] coordinates
//! one or more packs per the plan, checkpoints progress, synthesises
//! multi-specialist output, and resumes interrupted runs.

pub mod emitter;
pub mod executor;
pub mod orchestrator;
pub mod recruit;
pub mod task_force;

pub use task_force::TaskExecutor;

/// Consecutive plain-text (no tool call) responses tolerated before the text
/// is taken as the final payload. Each occurrence below the limit injects a
/// corrective re-prompt.
pub const MAX_PLAIN_TEXT_RETRIES: usize = 2;

/// Loop detection: window of recent tool-call signatures inspected.
pub const LOOP_DETECT_WINDOW: usize = 8;

/// Loop detection: prior occurrences of a signature within the window that
/// trigger the loop-break warning.
pub const LOOP_DETECT_THRESHOLD: usize = 2;
