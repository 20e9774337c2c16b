//! Run reports
//!
//! A [`RunReport`] is everything a run produced. [`ReportSink`]s persist it;
//! [`DirectoryReportWriter`] writes one timestamped folder of JSON files per run.

use crate::classify::{Classification, ClassificationStats};
use crate::config::RunMode;
use crate::error::Result;
use crate::orchestrator::OrchestrationResults;
use crate::snapshot::DecodeStats;
use crate::types::ResultSummary;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Complete outcome of a reconciliation run
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    /// Mode the deletions ran under
    pub mode: RunMode,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
    /// Snapshot came from disk rather than the network
    pub local_snapshot: bool,
    /// Snapshot was repaired from a truncated body
    pub snapshot_recovered: bool,
    /// Transfer attempts (0 for a local snapshot)
    pub download_attempts: u32,
    /// Entries dropped while decoding
    pub decode_stats: DecodeStats,
    /// Normal and particular inconsistencies
    pub classification: Classification,
    /// Per-target deletion results
    pub results: OrchestrationResults,
}

/// Counts-only view of a [`RunReport`]
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    /// Mode the deletions ran under
    pub mode: RunMode,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
    /// Snapshot was repaired from a truncated body
    pub snapshot_recovered: bool,
    /// Classification counters
    pub classification: ClassificationStats,
    /// Normal inconsistencies found
    pub normal: usize,
    /// Particular inconsistencies found
    pub particular: usize,
    /// Normal inconsistencies mirrored in the service desk
    pub downstream: usize,
    /// Inventory counts
    pub inventory: ResultSummary,
    /// Service-desk counts
    pub service_desk: ResultSummary,
}

impl RunReport {
    /// Counts for logs and `summary.json`
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            mode: self.mode,
            started_at: self.started_at,
            finished_at: self.finished_at,
            snapshot_recovered: self.snapshot_recovered,
            classification: self.classification.stats,
            normal: self.classification.normal.len(),
            particular: self.classification.particular.len(),
            downstream: self.classification.downstream_subset().len(),
            inventory: self.results.inventory_summary(),
            service_desk: self.results.service_desk_summary(),
        }
    }

    /// True when any deletion failed on either target
    pub fn has_failures(&self) -> bool {
        self.results.inventory_summary().failed() + self.results.service_desk_summary().failed()
            > 0
    }
}

/// Destination for finished run reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist `report`; returns where it went
    async fn write(&self, report: &RunReport) -> Result<PathBuf>;
}

/// Writes each run into `<root>/run_<timestamp>/`
#[derive(Clone, Debug)]
pub struct DirectoryReportWriter {
    root: PathBuf,
}

impl DirectoryReportWriter {
    /// Writer rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Folder a report started at `started_at` is written to
    pub fn run_dir(&self, started_at: DateTime<Utc>) -> PathBuf {
        self.root
            .join(format!("run_{}", started_at.format("%Y-%m-%d_%H-%M-%S")))
    }
}

async fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(dir.join(name), bytes).await?;
    Ok(())
}

#[async_trait]
impl ReportSink for DirectoryReportWriter {
    async fn write(&self, report: &RunReport) -> Result<PathBuf> {
        let dir = self.run_dir(report.started_at);
        tokio::fs::create_dir_all(&dir).await?;

        write_json(&dir, "inconsistencies_normal.json", &report.classification.normal).await?;
        write_json(
            &dir,
            "inconsistencies_particular.json",
            &report.classification.particular,
        )
        .await?;
        write_json(&dir, "inventory_results.json", &report.results.inventory).await?;
        write_json(&dir, "service_desk_results.json", &report.results.service_desk).await?;
        write_json(&dir, "summary.json", &report.summary()).await?;

        tracing::info!(dir = %dir.display(), "run report written");
        Ok(dir)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        DeletionResult, DeletionStatus, Endpoint, InconsistencyKind, InconsistencyRecord,
        TargetKind,
    };
    use chrono::TimeZone;

    fn sample_report() -> RunReport {
        let end = |id: &str, nit: &str| Endpoint {
            id: id.into(),
            nit: nit.into(),
            label: "N/A".into(),
        };
        let normal = InconsistencyRecord::new(
            "r1",
            InconsistencyKind::Normal,
            end("a", "1"),
            end("b", "2"),
        )
        .unwrap()
        .with_forward_object(Some("fo-1"));
        let particular = InconsistencyRecord::new(
            "r2",
            InconsistencyKind::Particular,
            end("a", "X"),
            end("c", "2"),
        )
        .unwrap();

        let result = |target, status| DeletionResult {
            target,
            relationship_id: "r1".into(),
            forward_object_id: Some("fo-1".into()),
            endpoint: "http://x".into(),
            status,
            attempts: 1,
            http_status: Some(204),
            error: None,
        };

        let started_at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        RunReport {
            mode: RunMode::Execution,
            started_at,
            finished_at: started_at,
            local_snapshot: false,
            snapshot_recovered: true,
            download_attempts: 2,
            decode_stats: DecodeStats::default(),
            classification: Classification {
                normal: vec![normal],
                particular: vec![particular],
                stats: ClassificationStats {
                    processed: 2,
                    ..ClassificationStats::default()
                },
            },
            results: OrchestrationResults {
                inventory: vec![result(TargetKind::Inventory, DeletionStatus::Success)],
                service_desk: vec![result(
                    TargetKind::ServiceDesk,
                    DeletionStatus::FailedTransient,
                )],
            },
        }
    }

    #[test]
    fn summary_counts_everything() {
        let report = sample_report();
        let summary = report.summary();

        assert_eq!(summary.normal, 1);
        assert_eq!(summary.particular, 1);
        assert_eq!(summary.downstream, 1);
        assert_eq!(summary.inventory.succeeded, 1);
        assert_eq!(summary.service_desk.failed_transient, 1);
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn writes_one_folder_per_run() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = DirectoryReportWriter::new(tmp.path().join("reports"));
        let report = sample_report();

        let dir = writer.write(&report).await.unwrap();
        assert_eq!(dir, tmp.path().join("reports").join("run_2026-03-04_05-06-07"));

        for name in [
            "inconsistencies_normal.json",
            "inconsistencies_particular.json",
            "inventory_results.json",
            "service_desk_results.json",
            "summary.json",
        ] {
            assert!(dir.join(name).is_file(), "{name} missing");
        }

        let normal: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join("inconsistencies_normal.json")).unwrap())
                .unwrap();
        assert_eq!(normal[0]["ucmdbId"], "r1");
        assert_eq!(normal[0]["ucmdbid_fo"], "fo-1");

        let summary: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["mode"], "execution");
        assert_eq!(summary["service_desk"]["failed_transient"], 1);
        assert_eq!(summary["classification"]["processed"], 2);
    }
}
