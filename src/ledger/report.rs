//! IntegrityReport - revision history of one package with its community score
//!
//! Rendered as a Markdown summary for humans or as JSON for tooling.

use super::integrity::{IntegrityLedger, RevisionIntegrity};
use crate::core::error::{DepupError, Result};
use crate::core::types::RevisionStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Aggregate numbers over all revisions of a package
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatistics {
    pub total_revisions: usize,
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
    pub prepared: usize,
    pub total_votes: u64,
    /// Mean score over revisions that received at least one vote
    pub average_score: Option<f64>,
}

impl ReportStatistics {
    fn from_revisions(revisions: &[RevisionIntegrity]) -> Self {
        let count = |status: RevisionStatus| {
            revisions
                .iter()
                .filter(|r| r.record.as_ref().map(|rec| rec.status) == Some(status))
                .count()
        };

        let voted: Vec<i64> = revisions
            .iter()
            .filter(|r| r.snapshot.total() > 0)
            .map(|r| r.snapshot.score)
            .collect();

        Self {
            total_revisions: revisions.len(),
            published: count(RevisionStatus::Published),
            skipped: count(RevisionStatus::Skipped),
            failed: count(RevisionStatus::Failed),
            prepared: count(RevisionStatus::Prepared),
            total_votes: revisions.iter().map(|r| r.snapshot.total()).sum(),
            average_score: if voted.is_empty() {
                None
            } else {
                Some(voted.iter().sum::<i64>() as f64 / voted.len() as f64)
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub package: String,
    pub generated_at: DateTime<Utc>,
    pub statistics: ReportStatistics,
    pub revisions: Vec<RevisionIntegrity>,
}

impl IntegrityReport {
    pub async fn build(ledger: &IntegrityLedger, package: &str) -> Result<Self> {
        let revisions = ledger.history(package).await?;
        Ok(Self::from_revisions(package, revisions))
    }

    pub fn from_revisions(package: &str, revisions: Vec<RevisionIntegrity>) -> Self {
        Self {
            package: package.to_string(),
            generated_at: Utc::now(),
            statistics: ReportStatistics::from_revisions(&revisions),
            revisions,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| DepupError::Store {
            path: self.package.clone(),
            message: format!("failed to render report: {}", e),
        })
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = Vec::new();
        let stats = &self.statistics;

        lines.push(format!("# Integrity Report: {}\n", self.package));
        lines.push(format!("**Generated**: {}\n", self.generated_at.to_rfc3339()));

        lines.push("## Summary\n".to_string());
        lines.push(format!("- **Revisions**: {}", stats.total_revisions));
        lines.push(format!("- **Published**: {}", stats.published));
        lines.push(format!("- **Skipped**: {}", stats.skipped));
        lines.push(format!("- **Failed**: {}", stats.failed));
        lines.push(format!("- **Votes**: {}", stats.total_votes));
        match stats.average_score {
            Some(avg) => lines.push(format!("- **Average Score**: {:.1}\n", avg)),
            None => lines.push("- **Average Score**: n/a\n".to_string()),
        }

        if self.revisions.is_empty() {
            lines.push("_No revisions recorded._".to_string());
            return lines.join("\n");
        }

        lines.push("## Revisions\n".to_string());
        lines.push("| Version | Status | Recorded | 👍 | 👎 | 😐 | Score | Integrity |".to_string());
        lines.push("|---------|--------|----------|----|----|----|-------|-----------|".to_string());

        for revision in &self.revisions {
            let (version, status, recorded) = match &revision.record {
                Some(record) => (
                    record.version.clone(),
                    status_label(record.status),
                    record.timestamp.format("%Y-%m-%d").to_string(),
                ),
                None => (
                    crate::validation::version_validator::produce_version(
                        &revision.key.base_version,
                        revision.key.index,
                    ),
                    "❔ unknown",
                    "-".to_string(),
                ),
            };
            let snapshot = &revision.snapshot;
            let integrity = snapshot.status();

            lines.push(format!(
                "| {} | {} | {} | {} | {} | {} | {} | {} {} |",
                version,
                status,
                recorded,
                snapshot.up_count,
                snapshot.down_count,
                snapshot.neutral_count,
                snapshot.score,
                integrity.emoji(),
                integrity
            ));
        }
        lines.push(String::new());

        lines.join("\n")
    }
}

fn status_label(status: RevisionStatus) -> &'static str {
    match status {
        RevisionStatus::Published => "✅ published",
        RevisionStatus::Skipped => "⏭️ skipped",
        RevisionStatus::Failed => "❌ failed",
        RevisionStatus::Prepared => "🔄 prepared",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{RevisionKey, VoteDirection};
    use crate::ledger::revision_store::RevisionStore;
    use tempfile::TempDir;

    async fn seeded_ledger(temp_dir: &TempDir) -> IntegrityLedger {
        let ledger = IntegrityLedger::new(RevisionStore::new(temp_dir.path()));
        let rev0 = RevisionKey::new("chalk", "5.3.0", 0);
        let rev1 = RevisionKey::new("chalk", "5.3.0", 1);

        ledger
            .record_outcome(&rev0, RevisionStatus::Published, Utc::now())
            .await
            .unwrap();
        ledger
            .record_outcome(&rev1, RevisionStatus::Skipped, Utc::now())
            .await
            .unwrap();
        for voter in ["a", "b", "c", "d"] {
            ledger.record_vote(&rev0, VoteDirection::Up, None, voter).await.unwrap();
        }
        ledger.record_vote(&rev0, VoteDirection::Down, None, "e").await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_statistics() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = seeded_ledger(&temp_dir).await;

        let report = IntegrityReport::build(&ledger, "chalk").await.unwrap();

        assert_eq!(report.statistics.total_revisions, 2);
        assert_eq!(report.statistics.published, 1);
        assert_eq!(report.statistics.skipped, 1);
        assert_eq!(report.statistics.total_votes, 5);
        assert_eq!(report.statistics.average_score, Some(60.0));
    }

    #[tokio::test]
    async fn test_markdown() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = seeded_ledger(&temp_dir).await;

        let markdown = IntegrityReport::build(&ledger, "chalk").await.unwrap().to_markdown();

        assert!(markdown.contains("# Integrity Report: chalk"));
        assert!(markdown.contains("| 5.3.0-depup.0 | ✅ published |"));
        assert!(markdown.contains("| 4 | 1 | 0 | 60 | 🔵 good |"));
        assert!(markdown.contains("| 5.3.0-depup.1 | ⏭️ skipped |"));
    }

    #[tokio::test]
    async fn test_json() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = seeded_ledger(&temp_dir).await;

        let json = IntegrityReport::build(&ledger, "chalk").await.unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["package"], "chalk");
        assert_eq!(value["statistics"]["published"], 1);
        assert_eq!(value["revisions"][0]["snapshot"]["upCount"], 4);
        assert_eq!(value["revisions"][0]["record"]["status"], "published");
    }

    #[test]
    fn test_empty_report() {
        let report = IntegrityReport::from_revisions("nothing", Vec::new());
        let markdown = report.to_markdown();

        assert_eq!(report.statistics.average_score, None);
        assert!(markdown.contains("No revisions recorded"));
    }
}
