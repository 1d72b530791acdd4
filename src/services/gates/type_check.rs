//! Runs the project's type/compile checker.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::domain::error::{CoreError, CoreResult};
use crate::services::gates::{Gate, GateOutcome};

pub struct TypeCheckGate {
    program: String,
    args: Vec<String>,
}

impl TypeCheckGate {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    pub fn cargo_check() -> Self {
        Self::new("cargo", vec!["check".into()])
    }

    fn parse_errors(stderr: &str, stdout: &str) -> (u32, Vec<String>) {
        let mut errors = Vec::new();
        let mut count = 0u32;

        for line in stderr.lines().chain(stdout.lines()) {
            let trimmed = line.trim();
            if trimmed.starts_with("error") || trimmed.contains(": error ") {
                errors.push(trimmed.to_string());
                count += 1;
            }
        }

        for line in stderr.lines().rev() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("error: aborting due to ") {
                if let Some(n) = rest.split_whitespace().next().and_then(|w| w.parse().ok()) {
                    count = n;
                    break;
                }
            }
        }

        (count, errors)
    }
}

#[async_trait]
impl Gate for TypeCheckGate {
    fn name(&self) -> &'static str {
        "type_check"
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
        let clean = output.status.success();
        let (error_count, errors) = if clean { (0, Vec::new()) } else { Self::parse_errors(&stderr, &stdout) };

        Ok(GateOutcome {
            pass: clean,
            summary: if clean { "clean".to_string() } else { format!("{error_count} type errors") },
            detail: serde_json::json!({ "error_count": error_count, "errors": errors }),
        })
    }
}
