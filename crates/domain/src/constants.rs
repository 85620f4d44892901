//! Shared limits used across tool executors and the run log.

/// Maximum characters of captured stdout/stderr returned from a tool.
pub const MAX_TOOL_OUTPUT_CHARS: usize = 8_000;

/// Default timeout for shell commands run inside the sandbox.
pub const SHELL_DEFAULT_TIMEOUT_S: u64 = 120;

/// Maximum characters of LLM text content stored in `llm_response` events.
pub const MAX_LLM_CONTENT_IN_RUNLOG_CHARS: usize = 2_000;

/// Truncate a string to `limit` characters, appending a marker with the
/// number of characters dropped.
pub fn truncate_output(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_owned();
    }
    let mut end = limit;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}\n... [truncated {} chars]", &s[..end], s.len() - end)
}
