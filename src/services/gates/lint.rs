//! Runs the project's linter.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::domain::error::{CoreError, CoreResult};
use crate::services::gates::{Gate, GateOutcome};

pub struct LintGate {
    program: String,
    args: Vec<String>,
}

impl LintGate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    pub fn cargo_clippy() -> Self {
        Self::new("cargo", vec!["clippy".into(), "--".into(), "-D".into(), "warnings".into()])
    }

    fn parse_output(stderr: &str, stdout: &str) -> (u32, u32, Vec<String>) {
        let mut errors = Vec::new();
        let mut error_count = 0u32;
        let mut warning_count = 0u32;

        for line in stderr.lines().chain(stdout.lines()) {
            let trimmed = line.trim();
            if trimmed.starts_with("error") {
                errors.push(trimmed.to_string());
                error_count += 1;
            } else if trimmed.starts_with("warning") {
                warning_count += 1;
            }
        }

        for line in stderr.lines().rev() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("error: aborting due to ") {
                if let Some(n) = rest.split_whitespace().next().and_then(|w| w.parse().ok()) {
                    error_count = n;
                    break;
                }
            }
        }

        for line in stderr.lines().rev() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("warning: ") {
                if rest.contains("warning") && rest.contains("emitted") {
                    if let Some(n) = rest.split_whitespace().next().and_then(|w| w.parse().ok()) {
                        warning_count = n;
                        break;
                    }
                }
            }
        }

        (error_count, warning_count, errors)
    }
}

#[async_trait]
impl Gate for LintGate {
    fn name(&self) -> &'static str {
        "linting"
    }

    async fn measure(&self, workspace_root: &Path) -> CoreResult<GateOutcome> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(workspace_root)
            .output()
            .await
            .map_err(|e| CoreError::gate_infrastructure(self.name(), e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let pass = output.status.success();
        let (error_count, warning_count, errors) = Self::parse_output(&stderr, &stdout);

        Ok(GateOutcome {
            pass,
            summary: format!("{error_count} errors, {warning_count} warnings"),
            detail: serde_json::json!({ "error_count": error_count, "warning_count": warning_count, "errors": errors }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_output_warnings_only() {
        let stderr = "warning: unused variable `x`\nwarning: 1 warning emitted";
        let (errors, warnings, _) = LintGate::parse_output(stderr, "");
        assert_eq!(errors, 0);
        assert_eq!(warnings, 1);
    }
}
