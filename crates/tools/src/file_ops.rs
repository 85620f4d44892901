//! File tools scoped to the sandbox.

use serde_json::Value;
use tokio::fs;

use maestro_domain::error::ToolError;

use crate::sandbox::{safe_path, SandboxPolicy};

/// Read a UTF-8 text file. Fails with `io_error` when missing or binary.
pub async fn read_text(policy: &SandboxPolicy, rel_path: &str) -> Result<Value, ToolError> {
    let path = safe_path(policy, rel_path)?;
    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| ToolError::Io(format!("failed to read {rel_path:?}: {e}")))?;
    Ok(serde_json::json!({ "path": rel_path, "content": content }))
}

/// Write a text file, creating parent directories as needed.
pub async fn write_text(
    policy: &SandboxPolicy,
    rel_path: &str,
    content: &str,
) -> Result<Value, ToolError> {
    let path = safe_path(policy, rel_path)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ToolError::Io(format!("failed to create parent directory: {e}")))?;
    }
    fs::write(&path, content)
        .await
        .map_err(|e| ToolError::Io(format!("failed to write {rel_path:?}: {e}")))?;
    Ok(serde_json::json!({ "path": rel_path, "bytes": content.len() }))
}

/// List workspace files (relative paths, lexicographic, capped).
pub async fn list_tree(policy: &SandboxPolicy, max_files: usize) -> Result<Value, ToolError> {
    let root = policy
        .root
        .canonicalize()
        .map_err(|e| ToolError::Io(format!("cannot resolve workspace root: {e}")))?;

    let mut files: Vec<String> = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| ToolError::Io(format!("failed to read {}: {e}", dir.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ToolError::Io(e.to_string()))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| ToolError::Io(e.to_string()))?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                if let Ok(rel) = path.strip_prefix(&root) {
                    files.push(rel.to_string_lossy().to_string());
                }
            }
        }
    }

    files.sort();
    files.truncate(max_files);
    Ok(serde_json::json!({ "count": files.len(), "files": files }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_policy() -> (TempDir, SandboxPolicy) {
        let ws = TempDir::new().expect("temp dir");
        let policy = SandboxPolicy::new(ws.path(), false);
        (ws, policy)
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let (_ws, policy) = tmp_policy();
        write_text(&policy, "notes/plan.md", "step one").await.unwrap();
        let result = read_text(&policy, "notes/plan.md").await.unwrap();
        assert_eq!(result["content"], "step one");
        assert_eq!(result["path"], "notes/plan.md");
    }

    #[tokio::test]
    async fn read_missing_file_is_io_error() {
        let (_ws, policy) = tmp_policy();
        let err = read_text(&policy, "absent.txt").await.unwrap_err();
        assert_eq!(err.kind(), "io_error");
    }

    #[tokio::test]
    async fn write_escaping_path_is_permission_error() {
        let (_ws, policy) = tmp_policy();
        let err = write_text(&policy, "../escape.txt", "nope").await.unwrap_err();
        assert_eq!(err.kind(), "permission");
    }

    #[tokio::test]
    async fn list_tree_is_sorted_and_capped() {
        let (ws, policy) = tmp_policy();
        std::fs::create_dir(ws.path().join("sub")).unwrap();
        std::fs::write(ws.path().join("b.txt"), "b").unwrap();
        std::fs::write(ws.path().join("a.txt"), "a").unwrap();
        std::fs::write(ws.path().join("sub/c.txt"), "c").unwrap();

        let result = list_tree(&policy, 500).await.unwrap();
        let files: Vec<&str> = result["files"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(files, vec!["a.txt", "b.txt", "sub/c.txt"]);

        let capped = list_tree(&policy, 2).await.unwrap();
        assert_eq!(capped["count"], 2);
    }
}
