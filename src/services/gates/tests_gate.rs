//! Runs the project's test suite and reports pass/fail/skip counts.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::domain::error::{CoreError, CoreResult};
use crate::services::gates::{extract_count, Gate, GateOutcome};

pub struct TestsGate {
    program: String,
    args: Vec<String>,
}

impl TestsGate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    pub fn cargo_test() -> Self {
        Self::new("cargo", vec!["test".into()])
    }

    fn parse_output(stdout: &str, stderr: &str) -> (u32, u32, u32, Vec<String>) {
        let mut passed = 0u32;
        let mut failed = 0u32;
        let mut skipped = 0u32;
        let mut failing = Vec::new();
        let combined = format!("{stdout}\n{stderr}");

        for line in combined.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("test ") && trimmed.ends_with("... ok") {
                passed += 1;
            } else if trimmed.starts_with("test ") && trimmed.ends_with("... FAILED") {
                failed += 1;
                if let Some(name) = trimmed.strip_prefix("test ").and_then(|s| s.strip_suffix(" ... FAILED")) {
                    failing.push(name.trim().to_string());
                }
            } else if trimmed.starts_with("test ") && trimmed.ends_with("... ignored") {
                skipped += 1;
            }
        }

        for line in combined.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("test result:") {
                if let Some(p) = extract_count(trimmed, "passed") {
                    passed = p;
                }
                if let Some(f) = extract_count(trimmed, "failed") {
                    failed = f;
                }
                if let Some(i) = extract_count(trimmed, "ignored") {
                    skipped = i;
                }
            }
        }

        (passed, failed, skipped, failing)
    }
}

#[async_trait]
impl Gate for TestsGate {
    fn name(&self) -> &'static str {
        "tests"
    }

    async fn measure(&self, workspace_root: &Path) -> CoreResult<GateOutcome> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(workspace_root)
            .output()
            .await
            .map_err(|e| CoreError::gate_infrastructure(self.name(), e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let (passed, failed, skipped, failing_test_names) = Self::parse_output(&stdout, &stderr);
        let pass = output.status.success() && failed == 0;

        Ok(GateOutcome {
            pass,
            summary: format!("{passed} passed, {failed} failed, {skipped} skipped"),
            detail: serde_json::json!({ "passed": passed, "failed": failed, "skipped": skipped, "failing_test_names": failing_test_names }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_output_rust_style() {
        let stdout = "test a ... ok\ntest b ... FAILED\ntest result: FAILED. 1 passed; 1 failed; 0 ignored";
        let (passed, failed, skipped, failing) = TestsGate::parse_output(stdout, "");
        assert_eq!(passed, 1);
        assert_eq!(failed, 1);
        assert_eq!(skipped, 0);
        assert_eq!(failing, vec!["b"]);
    }

    #[test]
    fn parse_output_empty_is_clean() {
        let (passed, failed, skipped, failing) = TestsGate::parse_output("", "");
        assert_eq!((passed, failed, skipped), (0, 0, 0));
        assert!(failing.is_empty());
    }
}
