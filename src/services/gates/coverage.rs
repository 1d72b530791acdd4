//! Runs the project's coverage tool and checks the result against a threshold.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

use crate::domain::error::{CoreError, CoreResult};
use crate::services::gates::{Gate, GateOutcome};

/// Coverage gate backed by an external coverage tool (e.g. `cargo tarpaulin`).
///
/// Unlike the other subprocess gates, a clean exit status alone doesn't mean
/// pass/fail -- the tool always exits 0 on a successful run. The verdict
/// comes from comparing the parsed percentage against `min_percent`.
pub struct CoverageGate {
    program: String,
    args: Vec<String>,
    min_percent: f64,
}

impl CoverageGate {
    pub fn new(program: impl Into<String>, args: Vec<String>, min_percent: f64) -> Self {
        Self {
            program: program.into(),
            args,
            min_percent,
        }
    }

    pub fn cargo_tarpaulin(min_percent: f64) -> Self {
        Self::new(
            "cargo",
            vec!["tarpaulin".into(), "--out".into(), "Stdout".into()],
            min_percent,
        )
    }

    /// Parse a coverage percentage out of tool output.
    ///
    /// Tarpaulin prints a trailing line like `"XX.XX% coverage, N/M lines covered"`.
    /// Falls back to scanning every line for the first `"N.NN%"` token so the
    /// gate tolerates other coverage tools' summary formats.
    fn parse_percent(stdout: &str) -> Option<f64> {
        for line in stdout.lines().rev() {
            let trimmed = line.trim();
            if let Some(pct_str) = trimmed.strip_suffix("% coverage").map(|_| trimmed) {
                if let Some(pct) = Self::leading_percent(pct_str) {
                    return Some(pct);
                }
            }
        }

        for line in stdout.lines().rev() {
            if let Some(pct) = Self::leading_percent(line.trim()) {
                return Some(pct);
            }
        }

        None
    }

    fn leading_percent(line: &str) -> Option<f64> {
        for token in line.split(|c: char| c.is_whitespace() || c == ',') {
            if let Some(digits) = token.strip_suffix('%') {
                if let Ok(pct) = digits.parse::<f64>() {
                    return Some(pct);
                }
            }
        }
        None
    }
}

#[async_trait]
impl Gate for CoverageGate {
    fn name(&self) -> &'static str {
        "coverage"
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

        if !output.status.success() {
            return Ok(GateOutcome {
                pass: false,
                summary: "coverage tool exited with an error".to_string(),
                detail: serde_json::json!({ "percent": serde_json::Value::Null, "stderr": stderr }),
            });
        }

        let percent = Self::parse_percent(&stdout).unwrap_or(0.0);
        let pass = percent >= self.min_percent;

        Ok(GateOutcome {
            pass,
            summary: format!("{percent:.2}% covered (minimum {:.2}%)", self.min_percent),
            detail: serde_json::json!({ "percent": percent, "min_percent": self.min_percent }),
        })
    }
}
