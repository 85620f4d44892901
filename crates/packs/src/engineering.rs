//! Engineering pack: shell, read_file, write_file, list_files, run_tests,
//! finish_task, plus a quality gate enforcing test verification.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use maestro_domain::constants::SHELL_DEFAULT_TIMEOUT_S;
use maestro_tools::sandbox::{run_cmd, SandboxPolicy};
use maestro_tools::{file_ops, test_runner};

use crate::base::BasePack;
use crate::prompts::SYSTEM_PROMPT_ENGINEERING;
use crate::tool_defs::{
    list_files_def, make_finish_tool_def, make_tool_def, optional_str, optional_u64,
    read_file_def, required_str, required_string_vec, write_file_def,
};

fn finish_tool_def() -> maestro_domain::tool::ToolDefinition {
    make_finish_tool_def(
        "Call this when the task is complete. Provide a clear summary of what was \
         accomplished, list any artefact file paths, and note any remaining steps \
         (e.g. deployment commands that require human approval). \
         You MUST call run_tests first and set tests_verified=true.",
        serde_json::json!({
            "summary": {
                "type": "string",
                "description": "What was accomplished (be specific).",
            },
            "artifacts": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Relative paths of files created or modified.",
            },
            "next_steps": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Remaining steps, especially ones needing human approval.",
            },
            "notes": {
                "type": "string",
                "description": "Caveats, test commands, or anything useful to know.",
            },
            "tests_verified": {
                "type": "boolean",
                "description": "Set to true only after run_tests confirms all tests pass. \
                                Do not call finish_task with false — fix failures first.",
            },
        }),
        &["summary", "tests_verified"],
    )
}

/// Reject finish_task when `tests_verified` is explicitly false.
fn tests_verified_gate(args: &Value) -> Option<String> {
    if args.get("tests_verified") == Some(&Value::Bool(false)) {
        Some(
            "tests_verified is false. Run run_tests to check the test suite. \
             Fix any failures, then call finish_task with tests_verified=true."
                .into(),
        )
    } else {
        None
    }
}

/// Build the engineering pack for a workspace.
///
/// `network_allowed` is recorded on the sandbox policy; shell commands are
/// not network-isolated at the OS level (the policy documents this), but the
/// filesystem is confined to the workspace and commands to an allowlist.
pub fn build_engineering_pack(workspace_path: &Path, network_allowed: bool) -> BasePack {
    let policy = Arc::new(SandboxPolicy::new(workspace_path, network_allowed));

    let mut pack = BasePack::new(
        "engineering",
        SYSTEM_PROMPT_ENGINEERING,
        finish_tool_def(),
        workspace_path,
        network_allowed,
    )
    .with_quality_gate(tests_verified_gate);

    let p = policy.clone();
    pack.register_tool(
        make_tool_def(
            "shell",
            "Run a shell command inside the sandbox workspace. Use for compiling, \
             testing, running scripts, git operations, etc.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "cmd": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Command and arguments as a list, e.g. [\"cargo\", \"test\"].",
                    },
                    "timeout_s": {
                        "type": "integer",
                        "description": "Timeout in seconds (default 120).",
                    },
                },
                "required": ["cmd"],
            }),
        ),
        Box::new(move |args| {
            let policy = p.clone();
            Box::pin(async move {
                let cmd = required_string_vec(&args, "cmd")?;
                let timeout_s = optional_u64(&args, "timeout_s", SHELL_DEFAULT_TIMEOUT_S);
                run_cmd(&policy, &cmd, timeout_s).await
            })
        }),
    );

    let p = policy.clone();
    pack.register_tool(
        read_file_def(),
        Box::new(move |args| {
            let policy = p.clone();
            Box::pin(async move {
                let path = required_str(&args, "path")?;
                file_ops::read_text(&policy, &path).await
            })
        }),
    );

    let p = policy.clone();
    pack.register_tool(
        write_file_def(),
        Box::new(move |args| {
            let policy = p.clone();
            Box::pin(async move {
                let path = required_str(&args, "path")?;
                let content = required_str(&args, "content")?;
                file_ops::write_text(&policy, &path, &content).await
            })
        }),
    );

    let p = policy.clone();
    pack.register_tool(
        list_files_def(),
        Box::new(move |args| {
            let policy = p.clone();
            Box::pin(async move {
                let max_files = optional_u64(&args, "max_files", 500) as usize;
                file_ops::list_tree(&policy, max_files).await
            })
        }),
    );

    let p = policy;
    pack.register_tool(
        make_tool_def(
            "run_tests",
            "Run the project's test suite and return pass/fail status. \
             Call this before finish_task to verify correctness.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "framework": {
                        "type": "string",
                        "description": "Test framework: 'auto' (detect), 'pytest', 'unittest', \
                                        'cargo', 'npm'. Default: 'auto'.",
                    },
                    "path": {
                        "type": "string",
                        "description": "Relative path to run tests from (default '.').",
                    },
                },
                "required": [],
            }),
        ),
        Box::new(move |args| {
            let policy = p.clone();
            Box::pin(async move {
                let framework = optional_str(&args, "framework", "auto");
                let path = optional_str(&args, "path", ".");
                test_runner::run_tests(&policy, &framework, &path, SHELL_DEFAULT_TIMEOUT_S).await
            })
        }),
    );

    pack
}
