//! Tool definition builders shared by the built-in packs.

use serde_json::Value;

use maestro_domain::tool::ToolDefinition;

pub fn make_tool_def(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition::new(name, description, parameters)
}

/// Build a `finish_task` definition from its property schema.
pub fn make_finish_tool_def(description: &str, properties: Value, required: &[&str]) -> ToolDefinition {
    ToolDefinition::new(
        crate::FINISH_TOOL_NAME,
        description,
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    )
}

pub fn read_file_def() -> ToolDefinition {
    make_tool_def(
        "read_file",
        "Read a text file from the workspace.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative path, e.g. \"src/main.rs\".",
                },
            },
            "required": ["path"],
        }),
    )
}

pub fn write_file_def() -> ToolDefinition {
    make_tool_def(
        "write_file",
        "Create or overwrite a text file in the workspace. Parent directories are created.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative path. Never absolute.",
                },
                "content": {
                    "type": "string",
                    "description": "Full file content.",
                },
            },
            "required": ["path", "content"],
        }),
    )
}

pub fn list_files_def() -> ToolDefinition {
    make_tool_def(
        "list_files",
        "List workspace files (relative paths, sorted).",
        serde_json::json!({
            "type": "object",
            "properties": {
                "max_files": {
                    "type": "integer",
                    "description": "Maximum number of files to return (default 500).",
                },
            },
            "required": [],
        }),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Argument extraction helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use maestro_domain::error::ToolError;

pub fn required_str(args: &Value, key: &str) -> Result<String, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| ToolError::InvalidArgs(format!("missing or non-string argument {key:?}")))
}

pub fn optional_str(args: &Value, key: &str, default: &str) -> String {
    args.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

pub fn optional_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
}

pub fn required_string_vec(args: &Value, key: &str) -> Result<Vec<String>, ToolError> {
    let arr = args
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| ToolError::InvalidArgs(format!("missing or non-array argument {key:?}")))?;
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| ToolError::InvalidArgs(format!("{key:?} must be a list of strings")))
        })
        .collect()
}
