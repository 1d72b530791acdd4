//! Orchestrates the fixed quality-gate pipeline (§4.5): tests, type_check,
//! coverage, review, linting. Runs each gate under [`GATE_TIMEOUT_SECONDS`],
//! aggregates verdicts, and decides whether the pipeline as a whole passed.
//!
//! [`GATE_TIMEOUT_SECONDS`]: crate::domain::models::Config::gate_timeout_seconds

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::services::gates::{CoverageGate, Gate, GateOutcome, LintGate, TestsGate, TypeCheckGate};
use crate::services::review_cache::ReviewCache;

/// A single gate's result, tagged with whether its failure blocks the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    pub gate: &'static str,
    pub blocking: bool,
    pub outcome: GateOutcome,
}

/// One entry of the pipeline's `blocking_failures[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingFailure {
    pub gate: String,
    pub severity: &'static str,
    pub reason: String,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateReport {
    pub pass: bool,
    pub gate_reports: Vec<GateReport>,
    pub blocking_failures: Vec<BlockingFailure>,
}

/// Runs the fixed gate set against a task's workspace.
pub struct QualityGateRunner {
    tests: TestsGate,
    type_check: TypeCheckGate,
    coverage: CoverageGate,
    lint: LintGate,
    review_cache: Arc<ReviewCache>,
    gate_timeout: Duration,
}

impl QualityGateRunner {
    pub fn new(
        tests: TestsGate,
        type_check: TypeCheckGate,
        coverage: CoverageGate,
        lint: LintGate,
        review_cache: Arc<ReviewCache>,
        gate_timeout: Duration,
    ) -> Self {
        Self { tests, type_check, coverage, lint, review_cache, gate_timeout }
    }

    async fn run_subprocess_gate(&self, gate: &dyn Gate, workspace_root: &Path) -> GateReport {
        let outcome = match tokio::time::timeout(self.gate_timeout, gate.measure(workspace_root)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(CoreError::GateInfrastructure { gate, reason })) => GateOutcome {
                pass: false,
                summary: format!("gate infrastructure error: {reason}"),
                detail: serde_json::json!({ "gate_error": reason, "gate": gate }),
            },
            Ok(Err(e)) => GateOutcome {
                pass: false,
                summary: format!("gate infrastructure error: {e}"),
                detail: serde_json::json!({ "gate_error": e.to_string() }),
            },
            Err(_elapsed) => GateOutcome {
                pass: false,
                summary: "gate timed out".to_string(),
                detail: serde_json::json!({ "gate_error": "timeout" }),
            },
        };

        GateReport { gate: gate.name(), blocking: gate.name() != "linting", outcome }
    }

    /// Runs tests, type_check, coverage, review, linting (in that order) and
    /// aggregates the pipeline verdict. `fingerprint` identifies the task's
    /// current output for the review cache.
    pub async fn run(
        &self,
        task_id: Uuid,
        fingerprint: &str,
        workspace_root: &Path,
    ) -> CoreResult<QualityGateReport> {
        let mut reports = Vec::with_capacity(5);
        reports.push(self.run_subprocess_gate(&self.tests, workspace_root).await);
        reports.push(self.run_subprocess_gate(&self.type_check, workspace_root).await);
        reports.push(self.run_subprocess_gate(&self.coverage, workspace_root).await);
        reports.push(self.run_review_gate(task_id, fingerprint, workspace_root).await);
        reports.push(self.run_subprocess_gate(&self.lint, workspace_root).await);

        let blocking_failures: Vec<BlockingFailure> = reports
            .iter()
            .filter(|r| r.blocking && !r.outcome.pass)
            .map(|r| BlockingFailure {
                gate: r.gate.to_string(),
                severity: Self::severity_of(r),
                reason: r.outcome.summary.clone(),
                detail: r.outcome.detail.clone(),
            })
            .collect();

        Ok(QualityGateReport {
            pass: blocking_failures.is_empty(),
            gate_reports: reports,
            blocking_failures,
        })
    }

    fn severity_of(report: &GateReport) -> &'static str {
        if report.gate == "review" {
            let is_critical = report
                .outcome
                .detail
                .get("has_critical")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if is_critical {
                return "critical";
            }
        }
        if report.outcome.detail.get("gate_error").is_some() {
            return "critical";
        }
        "normal"
    }

    async fn run_review_gate(&self, task_id: Uuid, fingerprint: &str, workspace_root: &Path) -> GateReport {
        let outcome = match tokio::time::timeout(
            self.gate_timeout,
            self.review_cache.review(task_id, fingerprint, workspace_root),
        )
        .await
        {
            Ok(Ok(report)) => {
                let has_critical = report
                    .issues
                    .iter()
                    .any(|i| matches!(i.severity, crate::domain::models::IssueSeverity::Critical));
                GateOutcome {
                    pass: !report.has_blocking_issues(),
                    summary: format!("{} issues found", report.issues.len()),
                    detail: serde_json::json!({
                        "issue_count": report.issues.len(),
                        "has_critical": has_critical,
                        "fingerprint": report.fingerprint,
                    }),
                }
            }
            Ok(Err(e)) => GateOutcome {
                pass: false,
                summary: format!("review gate error: {e}"),
                detail: serde_json::json!({ "gate_error": e.to_string() }),
            },
            Err(_elapsed) => GateOutcome {
                pass: false,
                summary: "review timed out".to_string(),
                detail: serde_json::json!({ "gate_error": "timeout" }),
            },
        };

        GateReport { gate: "review", blocking: true, outcome }
    }
}

/// Builds the default subprocess gates (`cargo test`/`check`/`clippy`,
/// `cargo tarpaulin`) rooted at `workspace_root`, using `min_coverage_percent`
/// as the coverage gate's threshold.
pub fn default_gates(min_coverage_percent: f64) -> (TestsGate, TypeCheckGate, CoverageGate, LintGate) {
    (
        TestsGate::cargo_test(),
        TypeCheckGate::cargo_check(),
        CoverageGate::cargo_tarpaulin(min_coverage_percent),
        LintGate::cargo_clippy(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(gate: &'static str, blocking: bool, pass: bool, detail: serde_json::Value) -> GateReport {
        GateReport {
            gate,
            blocking,
            outcome: GateOutcome { pass, summary: String::new(), detail },
        }
    }

    #[test]
    fn linting_failure_alone_does_not_block() {
        let reports = vec![
            report("tests", true, true, serde_json::json!({})),
            report("linting", false, false, serde_json::json!({})),
        ];
        let failures: Vec<_> = reports.iter().filter(|r| r.blocking && !r.outcome.pass).collect();
        assert!(failures.is_empty());
    }

    #[test]
    fn a_blocking_gate_failure_surfaces() {
        let reports = vec![
            report("tests", true, false, serde_json::json!({})),
            report("linting", false, false, serde_json::json!({})),
        ];
        let failures: Vec<_> = reports.iter().filter(|r| r.blocking && !r.outcome.pass).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].gate, "tests");
    }

    #[test]
    fn gate_infrastructure_error_is_critical_severity() {
        let r = report("type_check", true, false, serde_json::json!({ "gate_error": "spawn failed" }));
        assert_eq!(QualityGateRunner::severity_of(&r), "critical");
    }

    #[test]
    fn review_with_critical_finding_is_critical_severity() {
        let r = report("review", true, false, serde_json::json!({ "has_critical": true }));
        assert_eq!(QualityGateRunner::severity_of(&r), "critical");
    }

    #[test]
    fn ordinary_gate_failure_is_normal_severity() {
        let r = report("coverage", true, false, serde_json::json!({ "percent": 40.0 }));
        assert_eq!(QualityGateRunner::severity_of(&r), "normal");
    }
}
