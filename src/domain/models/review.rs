//! Review domain model: the cached verdict of a quality-gate review pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a single review finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Minor,
    Major,
    Critical,
}

impl IssueSeverity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

/// A single finding surfaced by the review gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub severity: IssueSeverity,
    pub message: String,
    pub location: Option<String>,
}

/// Cached outcome of reviewing one task's output at a given fingerprint.
/// Uniquely keyed by `(task_id, fingerprint)`; re-review of unchanged work
/// short-circuits on this cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReport {
    pub id: Uuid,
    pub task_id: Uuid,
    pub fingerprint: String,
    pub issues: Vec<ReviewIssue>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl ReviewReport {
    pub fn new(task_id: Uuid, fingerprint: impl Into<String>, issues: Vec<ReviewIssue>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            fingerprint: fingerprint.into(),
            issues,
            created_at: Utc::now(),
            version: 0,
        }
    }

    pub fn severity_counts(&self) -> [(IssueSeverity, usize); 4] {
        let count = |s: IssueSeverity| self.issues.iter().filter(|i| i.severity == s).count();
        [
            (IssueSeverity::Info, count(IssueSeverity::Info)),
            (IssueSeverity::Minor, count(IssueSeverity::Minor)),
            (IssueSeverity::Major, count(IssueSeverity::Major)),
            (IssueSeverity::Critical, count(IssueSeverity::Critical)),
        ]
    }

    pub fn has_blocking_issues(&self) -> bool {
        self.issues
            .iter()
            .any(|i| matches!(i.severity, IssueSeverity::Major | IssueSeverity::Critical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_detection() {
        let clean = ReviewReport::new(Uuid::new_v4(), "fp1", vec![]);
        assert!(!clean.has_blocking_issues());

        let dirty = ReviewReport::new(
            Uuid::new_v4(),
            "fp2",
            vec![ReviewIssue {
                severity: IssueSeverity::Major,
                message: "unchecked unwrap".into(),
                location: Some("src/lib.rs:12".into()),
            }],
        );
        assert!(dirty.has_blocking_issues());
    }

    #[test]
    fn severity_counts_tally_correctly() {
        let r = ReviewReport::new(
            Uuid::new_v4(),
            "fp3",
            vec![
                ReviewIssue { severity: IssueSeverity::Minor, message: "a".into(), location: None },
                ReviewIssue { severity: IssueSeverity::Minor, message: "b".into(), location: None },
                ReviewIssue { severity: IssueSeverity::Critical, message: "c".into(), location: None },
            ],
        );
        let counts = r.severity_counts();
        assert_eq!(counts[1], (IssueSeverity::Minor, 2));
        assert_eq!(counts[3], (IssueSeverity::Critical, 1));
    }
}
