//! Sandbox policy: path confinement and an allowlisted shell.
//!
//! The policy restricts the *file system* to the workspace root and shell
//! commands to an allowlist. `network_allowed` is advisory: it suppresses
//! registration of network-bearing tools (web search, browser) but does not
//! enforce network isolation at the OS level, so callers must not over-trust it.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;

use maestro_domain::constants::{truncate_output, MAX_TOOL_OUTPUT_CHARS};
use maestro_domain::error::ToolError;

/// Commands the LLM may run inside the workspace.
///
/// Language-aware but small: interpreters, test runners, VCS, search/text
/// utilities, package managers.
const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    "python", "python3", "pytest", "bash", "sh", "git", "cargo", "npm", "node", "rg", "grep",
    "ls", "cat", "head", "tail", "wc", "sed", "awk", "jq", "find", "pip", "uv", "make", "echo",
    "mkdir", "touch",
];

/// Per-run sandbox: workspace root + command allowlist.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub root: PathBuf,
    pub network_allowed: bool,
    pub allowed_commands: Vec<String>,
}

impl SandboxPolicy {
    pub fn new(root: impl Into<PathBuf>, network_allowed: bool) -> Self {
        Self {
            root: root.into(),
            network_allowed,
            allowed_commands: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_allowed_commands(mut self, commands: Vec<String>) -> Self {
        self.allowed_commands = commands;
        self
    }

    /// Whether an executable name passes the allowlist.
    pub fn is_command_allowed(&self, exe: &str) -> bool {
        self.allowed_commands.iter().any(|c| c == exe)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path confinement
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolve a workspace-relative path, rejecting anything that escapes the
/// sandbox root.
///
/// 1. Absolute input paths are rejected.
/// 2. Raw `..` components are rejected before any resolution.
/// 3. The root is canonicalised; the candidate is resolved against its
///    nearest existing ancestor; containment is checked on the result.
pub fn safe_path(policy: &SandboxPolicy, requested: &str) -> Result<PathBuf, ToolError> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(ToolError::Permission(format!(
            "absolute paths are not allowed; use a path relative to the workspace root (got {requested:?})"
        )));
    }

    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(ToolError::Permission(
                "path must not contain '..' components".into(),
            ));
        }
    }

    let canonical_root = policy.root.canonicalize().map_err(|e| {
        ToolError::Io(format!(
            "cannot resolve workspace root '{}': {e}",
            policy.root.display()
        ))
    })?;

    let candidate = canonical_root.join(requested_path);

    // Canonicalise the longest existing prefix, then re-append the rest, so
    // not-yet-created files still get a containment check through symlinks.
    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| ToolError::Io(format!("cannot resolve path '{requested}': {e}")))?
    } else {
        let mut existing = candidate.as_path();
        let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => {
                    if let Some(name) = existing.file_name() {
                        tail.push(name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved = existing
            .canonicalize()
            .map_err(|e| ToolError::Io(format!("cannot resolve ancestor of '{requested}': {e}")))?;
        for part in tail.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(ToolError::Permission(format!(
            "path {requested:?} resolves outside the workspace root"
        )));
    }

    Ok(resolved)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Allowlisted shell
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run an allowlisted command in the workspace root.
///
/// A timeout produces a synthetic result (`returncode: -1`), not an error.
pub async fn run_cmd(
    policy: &SandboxPolicy,
    cmd: &[String],
    timeout_s: u64,
) -> Result<Value, ToolError> {
    run_cmd_in(policy, cmd, &policy.root, timeout_s).await
}

/// As [`run_cmd`] but with an explicit working directory (already validated).
pub async fn run_cmd_in(
    policy: &SandboxPolicy,
    cmd: &[String],
    cwd: &Path,
    timeout_s: u64,
) -> Result<Value, ToolError> {
    let exe = cmd
        .first()
        .ok_or_else(|| ToolError::InvalidArgs("empty command".into()))?;

    if !policy.is_command_allowed(exe) {
        return Err(ToolError::Permission(format!(
            "command not allowed: {exe:?}. Allowed commands: {:?}",
            policy.allowed_commands
        )));
    }

    let mut command = Command::new(exe);
    command
        .args(&cmd[1..])
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(cmd = ?cmd, timeout_s, "sandbox exec");

    let child = command
        .spawn()
        .map_err(|e| ToolError::Io(format!("failed to spawn {exe:?}: {e}")))?;

    let joined = cmd.join(" ");
    let timeout = std::time::Duration::from_secs(timeout_s);
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(serde_json::json!({
            "cmd": joined,
            "returncode": output.status.code().unwrap_or(-1),
            "stdout": truncate_output(&String::from_utf8_lossy(&output.stdout), MAX_TOOL_OUTPUT_CHARS),
            "stderr": truncate_output(&String::from_utf8_lossy(&output.stderr), MAX_TOOL_OUTPUT_CHARS),
        })),
        Ok(Err(e)) => Err(ToolError::Io(format!("subprocess failed: {e}"))),
        Err(_) => {
            // Child is killed on drop of the wait future.
            tracing::warn!(cmd = ?cmd, timeout_s, "sandbox command timed out");
            Ok(serde_json::json!({
                "cmd": joined,
                "returncode": -1,
                "stdout": "",
                "stderr": format!("Command timed out after {timeout_s}s"),
            }))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
