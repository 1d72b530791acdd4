//! Quality gates: subprocess checks run against a task's workspace.
//!
//! Each gate wraps a single external tool invocation and normalizes its
//! output into a pass/fail verdict plus a machine-readable signal. [`super::quality_gate`]
//! runs the fixed set (`tests`, `type_check`, `coverage`, `linting`, `review`)
//! under a shared timeout and aggregates the verdicts.

pub mod coverage;
pub mod lint;
pub mod tests_gate;
pub mod type_check;

pub use coverage::CoverageGate;
pub use lint::LintGate;
pub use tests_gate::TestsGate;
pub use type_check::TypeCheckGate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One gate's verdict plus whatever structured detail it extracted from
/// the subprocess output, for inclusion in a `quality_gate_result` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOutcome {
    pub pass: bool,
    pub summary: String,
    pub detail: serde_json::Value,
}

/// A single quality check run against a task's workspace.
#[async_trait]
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs the underlying subprocess and parses its output. Errors here are
    /// `GateInfrastructure` failures (the tool itself couldn't run), distinct
    /// from a `GateOutcome { pass: false, .. }` (the tool ran and found issues).
    async fn measure(&self, workspace_root: &Path) -> crate::domain::error::CoreResult<GateOutcome>;
}

/// Extracts a numeric count preceding `keyword` from a `;`-delimited summary
/// line, e.g. `"10 passed; 2 failed"` + `"passed"` -> `Some(10)`.
pub(crate) fn extract_count(line: &str, keyword: &str) -> Option<u32> {
    for part in line.split(';') {
        let trimmed = part.trim();
        if trimmed.contains(keyword) {
            for word in trimmed.split_whitespace() {
                if let Ok(n) = word.parse::<u32>() {
                    return Some(n);
                }
            }
        }
    }
    None
}
