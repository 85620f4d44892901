//! Container decorator: runs the `shell` tool inside a Podman container.
//!
//! On `open()` a detached container is started from the configured image
//! with the workspace mounted at `/workspace`; on `close()` it is stopped
//! (best effort; `--rm` removes it). `execute_tool` intercepts exactly the
//! tool named `shell` and re-dispatches through `podman exec`, preserving
//! the command allowlist and output truncation. Every other tool passes
//! through unchanged.
//!
//! Podman must be installed and the image available locally
//! (`podman pull <image>` first).

use std::path::PathBuf;
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;

use maestro_domain::constants::{truncate_output, MAX_TOOL_OUTPUT_CHARS, SHELL_DEFAULT_TIMEOUT_S};
use maestro_domain::error::{Error, Result, ToolError};
use maestro_domain::tool::ToolDefinition;
use maestro_tools::sandbox::SandboxPolicy;

use crate::pack::{SpecialistPack, ToolResult};
use crate::tool_defs::{optional_u64, required_string_vec};

pub struct ContainerisedPack<P> {
    inner: P,
    image: String,
    workspace_path: PathBuf,
    container_id: Option<String>,
    /// Container isolation removes the filesystem-escape risk; the allowlist
    /// stays as defence in depth against prompt injection.
    allowlist: SandboxPolicy,
}

impl<P: SpecialistPack> ContainerisedPack<P> {
    pub fn new(inner: P, image: impl Into<String>, workspace_path: impl Into<PathBuf>) -> Self {
        let workspace_path = workspace_path.into();
        Self {
            inner,
            image: image.into(),
            allowlist: SandboxPolicy::new(&workspace_path, false),
            workspace_path,
            container_id: None,
        }
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    async fn exec_in_container(&self, args: Value) -> ToolResult {
        let container_id = self
            .container_id
            .as_deref()
            .ok_or_else(|| ToolError::Unexpected("container is not running".into()))?;

        let cmd = required_string_vec(&args, "cmd")?;
        let timeout_s = optional_u64(&args, "timeout_s", SHELL_DEFAULT_TIMEOUT_S);

        let exe = cmd
            .first()
            .ok_or_else(|| ToolError::InvalidArgs("empty command".into()))?;
        if !self.allowlist.is_command_allowed(exe) {
            return Err(ToolError::Permission(format!(
                "command not allowed: {exe:?}. Allowed commands: {:?}",
                self.allowlist.allowed_commands
            )));
        }

        let mut podman = Command::new("podman");
        podman
            .args(["exec", "-w", "/workspace", container_id])
            .args(&cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = podman
            .spawn()
            .map_err(|e| ToolError::Io(format!("failed to run podman exec: {e}")))?;

        let joined = cmd.join(" ");
        match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_s),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => Ok(serde_json::json!({
                "cmd": joined,
                "returncode": output.status.code().unwrap_or(-1),
                "stdout": truncate_output(
                    &String::from_utf8_lossy(&output.stdout),
                    MAX_TOOL_OUTPUT_CHARS
                ),
                "stderr": truncate_output(
                    &String::from_utf8_lossy(&output.stderr),
                    MAX_TOOL_OUTPUT_CHARS
                ),
            })),
            Ok(Err(e)) => Err(ToolError::Io(format!("podman exec failed: {e}"))),
            Err(_) => Ok(serde_json::json!({
                "cmd": joined,
                "returncode": -1,
                "stdout": "",
                "stderr": format!("Command timed out after {timeout_s}s"),
            })),
        }
    }
}

#[async_trait::async_trait]
impl<P: SpecialistPack> SpecialistPack for ContainerisedPack<P> {
    fn specialist_id(&self) -> &str {
        self.inner.specialist_id()
    }

    fn system_prompt(&self) -> &str {
        self.inner.system_prompt()
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.inner.tool_definitions()
    }

    fn finish_tool_name(&self) -> &str {
        self.inner.finish_tool_name()
    }

    fn finish_required_fields(&self) -> Vec<String> {
        self.inner.finish_required_fields()
    }

    fn validate_finish_payload(&self, args: &Value) -> Option<String> {
        self.inner.validate_finish_payload(args)
    }

    async fn open(&mut self) -> Result<()> {
        // :Z applies a private SELinux label so the container can write the
        // mount on SELinux-enforcing hosts; ignored elsewhere.
        let mount = format!("{}:/workspace:Z", self.workspace_path.display());
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(60),
            Command::new("podman")
                .args(["run", "-d", "--rm", "-v", &mount, &self.image, "sleep", "infinity"])
                .stdin(Stdio::null())
                .output(),
        )
        .await
        .map_err(|_| Error::Other("timed out starting Podman container".into()))?
        .map_err(|e| {
            Error::Other(format!(
                "podman is not installed or not in PATH ({e}). Install Podman to use \
                 container_image in specialist config."
            ))
        })?;

        if !output.status.success() {
            return Err(Error::Other(format!(
                "failed to start Podman container (image={:?}): {}",
                self.image,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::info!(
            container_id = %&container_id[..container_id.len().min(12)],
            image = %self.image,
            "container started"
        );
        self.container_id = Some(container_id);

        self.inner.open().await
    }

    async fn close(&mut self) {
        self.inner.close().await;

        if let Some(container_id) = self.container_id.take() {
            let stopped = tokio::time::timeout(
                std::time::Duration::from_secs(30),
                Command::new("podman")
                    .args(["stop", &container_id])
                    .stdin(Stdio::null())
                    .output(),
            )
            .await;
            match stopped {
                Ok(Ok(_)) => {
                    tracing::debug!(
                        container_id = %&container_id[..container_id.len().min(12)],
                        "container stopped"
                    );
                }
                _ => {
                    tracing::warn!(
                        container_id = %&container_id[..container_id.len().min(12)],
                        "failed to stop container"
                    );
                }
            }
        }
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        if name == "shell" {
            return self.exec_in_container(args).await;
        }
        self.inner.execute_tool(name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::BasePack;
    use crate::tool_defs::make_finish_tool_def;
    use tempfile::TempDir;

    fn wrapped() -> (TempDir, ContainerisedPack<BasePack>) {
        let ws = TempDir::new().unwrap();
        let inner = BasePack::new(
            "engineering",
            "prompt",
            make_finish_tool_def("done", serde_json::json!({"summary": {"type": "string"}}), &["summary"]),
            ws.path(),
            false,
        );
        let pack = ContainerisedPack::new(inner, "python:3.12-slim", ws.path());
        (ws, pack)
    }

    #[test]
    fn metadata_forwarded_unchanged() {
        let (_ws, pack) = wrapped();
        assert_eq!(pack.specialist_id(), "engineering");
        assert_eq!(pack.finish_required_fields(), vec!["summary"]);
        assert!(pack.container_id().is_none());
    }

    #[tokio::test]
    async fn shell_before_open_is_unexpected_error() {
        let (_ws, pack) = wrapped();
        let err = pack
            .execute_tool("shell", serde_json::json!({"cmd": ["ls"]}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unexpected");
    }

    #[tokio::test]
    async fn non_shell_tools_pass_through() {
        let (_ws, pack) = wrapped();
        let result = pack
            .execute_tool("read_file", serde_json::json!({"path": "x"}))
            .await
            .unwrap();
        // Inner pack has no tools registered, so it answers unknown-tool.
        assert!(result["error"].as_str().unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn disallowed_command_rejected_before_podman_runs() {
        let (_ws, mut pack) = wrapped();
        pack.container_id = Some("deadbeef".into());
        let err = pack
            .execute_tool("shell", serde_json::json!({"cmd": ["curl", "http://x"]}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permission");
    }
}
