//! Test-runner tool: auto-detect the project's test framework and run it.

use std::path::Path;

use regex::Regex;
use serde_json::Value;

use maestro_domain::error::ToolError;

use crate::sandbox::{run_cmd_in, safe_path, SandboxPolicy};

/// Characters of combined test output retained in the result.
const MAX_OUTPUT_CHARS: usize = 3_000;

/// Detect the test framework by scanning for project markers.
///
/// Priority: `Cargo.toml` → `package.json` with a `test` script → pytest
/// markers (`pytest.ini`, `pyproject.toml` with `[tool.pytest.ini_options]`,
/// `setup.cfg` with `[tool:pytest]`, any `test_*.py` / `*_test.py` at the
/// root or one level deep) → pytest default.
pub fn detect_framework(scan_root: &Path) -> &'static str {
    if scan_root.join("Cargo.toml").exists() {
        return "cargo";
    }

    let pkg = scan_root.join("package.json");
    if pkg.exists() {
        if let Ok(raw) = std::fs::read_to_string(&pkg) {
            if let Ok(data) = serde_json::from_str::<Value>(&raw) {
                if data["scripts"]["test"].is_string() {
                    return "npm";
                }
            }
        }
    }

    if scan_root.join("pytest.ini").exists() {
        return "pytest";
    }
    if let Ok(raw) = std::fs::read_to_string(scan_root.join("pyproject.toml")) {
        if raw.contains("[tool.pytest.ini_options]") {
            return "pytest";
        }
    }
    if let Ok(raw) = std::fs::read_to_string(scan_root.join("setup.cfg")) {
        if raw.contains("[tool:pytest]") {
            return "pytest";
        }
    }
    if has_pytest_files(scan_root) {
        return "pytest";
    }

    "pytest"
}

/// Any `test_*.py` or `*_test.py` at the root or one directory deep.
fn has_pytest_files(scan_root: &Path) -> bool {
    let matches_name = |name: &str| {
        (name.starts_with("test_") || name.ends_with("_test.py")) && name.ends_with(".py")
    };
    let scan_dir = |dir: &Path| -> bool {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries.flatten().any(|e| {
                    e.file_type().map(|t| t.is_file()).unwrap_or(false)
                        && matches_name(&e.file_name().to_string_lossy())
                })
            })
            .unwrap_or(false)
    };

    if scan_dir(scan_root) {
        return true;
    }
    std::fs::read_dir(scan_root)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .any(|e| scan_dir(&e.path()))
        })
        .unwrap_or(false)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output parsers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ParseOutcome {
    passed: bool,
    failed_count: u64,
    error_count: u64,
    summary: String,
}

fn parse_pytest_output(output: &str) -> ParseOutcome {
    let passed_re = Regex::new(r"(\d+) passed").expect("static regex");
    let failed_re = Regex::new(r"(\d+) failed").expect("static regex");
    let error_re = Regex::new(r"(\d+) errors?").expect("static regex");

    let capture = |re: &Regex| {
        re.captures(output)
            .and_then(|c| c[1].parse::<u64>().ok())
            .unwrap_or(0)
    };
    let passed_count = capture(&passed_re);
    let failed_count = capture(&failed_re);
    let error_count = capture(&error_re);

    let mut parts = Vec::new();
    if passed_count > 0 {
        parts.push(format!("{passed_count} passed"));
    }
    if failed_count > 0 {
        parts.push(format!("{failed_count} failed"));
    }
    if error_count > 0 {
        parts.push(format!(
            "{error_count} error{}",
            if error_count != 1 { "s" } else { "" }
        ));
    }

    ParseOutcome {
        passed: failed_count == 0 && error_count == 0,
        failed_count,
        error_count,
        summary: if parts.is_empty() {
            "no test results detected".into()
        } else {
            parts.join(", ")
        },
    }
}

fn parse_cargo_output(output: &str) -> ParseOutcome {
    let result_re = Regex::new(r"test result: (ok|FAILED)\. (\d+) passed; (\d+) failed")
        .expect("static regex");

    // A cargo run may print several `test result:` lines (one per target);
    // aggregate them all.
    let mut any = false;
    let mut all_ok = true;
    let mut passed_total = 0u64;
    let mut failed_total = 0u64;
    for caps in result_re.captures_iter(output) {
        any = true;
        all_ok &= &caps[1] == "ok";
        passed_total += caps[2].parse::<u64>().unwrap_or(0);
        failed_total += caps[3].parse::<u64>().unwrap_or(0);
    }

    if !any {
        return ParseOutcome {
            passed: false,
            failed_count: 0,
            error_count: 0,
            summary: "no test results detected".into(),
        };
    }

    let mut parts = vec![format!("{passed_total} passed")];
    if failed_total > 0 {
        parts.push(format!("{failed_total} failed"));
    }
    ParseOutcome {
        passed: all_ok && failed_total == 0,
        failed_count: failed_total,
        error_count: 0,
        summary: parts.join(", "),
    }
}

fn parse_unittest_output(output: &str) -> ParseOutcome {
    let ran_re = Regex::new(r"Ran (\d+) tests?").expect("static regex");
    let failed_re =
        Regex::new(r"FAILED \((?:failures=(\d+))?(?:,\s*)?(?:errors=(\d+))?\)").expect("static regex");

    let ran = ran_re
        .captures(output)
        .and_then(|c| c[1].parse::<u64>().ok())
        .unwrap_or(0);
    let fail_caps = failed_re.captures(output);
    let failures = fail_caps
        .as_ref()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .unwrap_or(0);
    let errors = fail_caps
        .as_ref()
        .and_then(|c| c.get(2))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .unwrap_or(0);

    let mut summary = if ran > 0 {
        format!("{ran} ran")
    } else {
        "no tests discovered".into()
    };
    if failures > 0 {
        summary.push_str(&format!(", {failures} failed"));
    }
    if errors > 0 {
        summary.push_str(&format!(", {errors} errors"));
    }

    ParseOutcome {
        passed: fail_caps.is_none() && ran > 0,
        failed_count: failures,
        error_count: errors,
        summary,
    }
}

/// Exit code says failure but the parser saw none: trust the exit code.
fn apply_exit_code(outcome: &mut ParseOutcome, returncode: i64) {
    if returncode != 0 && outcome.passed {
        outcome.passed = false;
        if outcome.failed_count == 0 && outcome.error_count == 0 {
            outcome.error_count = 1;
            outcome.summary = if outcome.summary == "no test results detected" {
                format!("failed (exit code {returncode})")
            } else {
                format!("{} (exit code {returncode})", outcome.summary)
            };
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Auto-detect and run the project test suite through the sandbox shell.
///
/// `framework` is `auto` | `pytest` | `unittest` | `cargo` | `npm`; unknown
/// values fall back to pytest. Returns `{passed, failed_count, error_count,
/// summary, output, framework}`.
pub async fn run_tests(
    policy: &SandboxPolicy,
    framework: &str,
    path: &str,
    timeout_s: u64,
) -> Result<Value, ToolError> {
    let scan_root = if path == "." {
        policy
            .root
            .canonicalize()
            .map_err(|e| ToolError::Io(format!("cannot resolve workspace root: {e}")))?
    } else {
        safe_path(policy, path)?
    };

    let detected = if framework == "auto" {
        detect_framework(&scan_root)
    } else {
        match framework {
            "pytest" | "unittest" | "cargo" | "npm" => framework,
            _ => "pytest",
        }
    };

    // `python -m <runner>` so the sandbox interpreter is used and no extra
    // binary needs to be on PATH.
    let cmd: Vec<String> = match detected {
        "cargo" => vec!["cargo".into(), "test".into()],
        "npm" => vec!["npm".into(), "test".into()],
        "unittest" => vec![
            "python".into(),
            "-m".into(),
            "unittest".into(),
            "discover".into(),
        ],
        _ => vec!["python".into(), "-m".into(), "pytest".into(), ".".into()],
    };

    let result = run_cmd_in(policy, &cmd, &scan_root, timeout_s).await?;

    let stdout = result["stdout"].as_str().unwrap_or("");
    let stderr = result["stderr"].as_str().unwrap_or("");
    let combined = format!("{stdout}{stderr}");
    let combined = combined.trim();
    let returncode = result["returncode"].as_i64().unwrap_or(1);

    let mut outcome = match detected {
        "cargo" => parse_cargo_output(combined),
        "unittest" => parse_unittest_output(combined),
        "npm" => ParseOutcome {
            passed: returncode == 0,
            failed_count: if returncode == 0 { 0 } else { 1 },
            error_count: 0,
            summary: if returncode == 0 {
                "passed".into()
            } else {
                format!("failed (exit code {returncode})")
            },
        },
        _ => parse_pytest_output(combined),
    };

    apply_exit_code(&mut outcome, returncode);

    let mut tail_start = combined.len().saturating_sub(MAX_OUTPUT_CHARS);
    while !combined.is_char_boundary(tail_start) {
        tail_start += 1;
    }

    Ok(serde_json::json!({
        "passed": outcome.passed,
        "failed_count": outcome.failed_count,
        "error_count": outcome.error_count,
        "summary": outcome.summary,
        "output": &combined[tail_start..],
        "framework": detected,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn detect_prefers_cargo() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("Cargo.toml"), "[package]").unwrap();
        std::fs::write(ws.path().join("package.json"), r#"{"scripts":{"test":"x"}}"#).unwrap();
        assert_eq!(detect_framework(ws.path()), "cargo");
    }

    #[test]
    fn detect_npm_requires_test_script() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("package.json"), r#"{"name": "x"}"#).unwrap();
        assert_eq!(detect_framework(ws.path()), "pytest");

        std::fs::write(
            ws.path().join("package.json"),
            r#"{"scripts": {"test": "jest"}}"#,
        )
        .unwrap();
        assert_eq!(detect_framework(ws.path()), "npm");
    }

    #[test]
    fn detect_pytest_from_pyproject_marker() {
        let ws = TempDir::new().unwrap();
        std::fs::write(
            ws.path().join("pyproject.toml"),
            "[tool.pytest.ini_options]\naddopts = \"-q\"\n",
        )
        .unwrap();
        assert_eq!(detect_framework(ws.path()), "pytest");
    }

    #[test]
    fn detect_pytest_from_test_files_one_level_deep() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir(ws.path().join("tests")).unwrap();
        std::fs::write(ws.path().join("tests/test_app.py"), "def test_ok(): pass").unwrap();
        assert_eq!(detect_framework(ws.path()), "pytest");
    }

    #[test]
    fn detect_defaults_to_pytest() {
        let ws = TempDir::new().unwrap();
        assert_eq!(detect_framework(ws.path()), "pytest");
    }

    #[test]
    fn parse_pytest_counts() {
        let out = parse_pytest_output("== 3 passed, 2 failed, 1 error in 0.5s ==");
        assert!(!out.passed);
        assert_eq!(out.failed_count, 2);
        assert_eq!(out.error_count, 1);
        assert!(out.summary.contains("3 passed"));
    }

    #[test]
    fn parse_pytest_all_green() {
        let out = parse_pytest_output("== 12 passed in 1.2s ==");
        assert!(out.passed);
        assert_eq!(out.summary, "12 passed");
    }

    #[test]
    fn parse_cargo_ok() {
        let out = parse_cargo_output("test result: ok. 8 passed; 0 failed; 0 ignored");
        assert!(out.passed);
        assert_eq!(out.summary, "8 passed");
    }

    #[test]
    fn parse_cargo_failed() {
        let out = parse_cargo_output("test result: FAILED. 5 passed; 2 failed; 0 ignored");
        assert!(!out.passed);
        assert_eq!(out.failed_count, 2);
    }

    #[test]
    fn parse_cargo_multiple_targets() {
        let out = parse_cargo_output(
            "test result: ok. 3 passed; 0 failed\ntest result: ok. 4 passed; 0 failed",
        );
        assert!(out.passed);
        assert_eq!(out.summary, "7 passed");
    }

    #[test]
    fn parse_unittest_failures() {
        let out = parse_unittest_output("Ran 4 tests in 0.01s\n\nFAILED (failures=1, errors=2)");
        assert!(!out.passed);
        assert_eq!(out.failed_count, 1);
        assert_eq!(out.error_count, 2);
    }

    #[test]
    fn parse_unittest_ok() {
        let out = parse_unittest_output("Ran 4 tests in 0.01s\n\nOK");
        assert!(out.passed);
        assert_eq!(out.summary, "4 ran");
    }

    #[test]
    fn nonzero_exit_without_parsed_failures_forces_failure() {
        let mut outcome = parse_pytest_output("collected 0 items");
        assert_eq!(outcome.summary, "no test results detected");
        assert!(outcome.passed, "parser alone sees no failures");
        apply_exit_code(&mut outcome, 2);
        assert!(!outcome.passed);
        assert_eq!(outcome.error_count, 1);
        assert!(outcome.summary.contains("exit code 2"));
    }

    #[test]
    fn zero_exit_leaves_outcome_untouched() {
        let mut outcome = parse_pytest_output("== 3 passed in 0.1s ==");
        apply_exit_code(&mut outcome, 0);
        assert!(outcome.passed);
        assert_eq!(outcome.summary, "3 passed");
    }
}
