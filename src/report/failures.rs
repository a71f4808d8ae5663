//! CSV exports of what a run could not do, for audit and reprocessing.

use serde::Serialize;
use std::path::Path;

use crate::error::Result;
use crate::pipeline::RunReport;

#[derive(Serialize)]
struct FailureRow<'a> {
    record_id: &'a str,
    group: &'a str,
    kind: String,
    reason: &'a str,
}

#[derive(Serialize)]
struct RolledBackRow<'a> {
    batch: u64,
    record_id: &'a str,
    error: &'a str,
}

/// One row per failed record: `record_id, group, kind, reason`
pub fn write_failures(path: &Path, report: &RunReport) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    for failure in &report.failures {
        writer.serialize(FailureRow {
            record_id: failure.record_id.as_str(),
            group: failure.group.as_deref().unwrap_or_default(),
            kind: failure.kind.to_string(),
            reason: &failure.reason,
        })?;
    }
    writer.flush()?;
    Ok(report.failures.len())
}

/// One row per record of every rolled-back batch: `batch, record_id, error`
pub fn write_rolled_back(path: &Path, report: &RunReport) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;
    for batch in &report.rolled_back {
        for record_id in &batch.record_ids {
            writer.serialize(RolledBackRow {
                batch: batch.sequence,
                record_id: record_id.as_str(),
                error: &batch.error,
            })?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}

/// Write `<job>-failures.csv` and `<job>-rolled-back.csv` into `dir` when
/// the run has anything to report
pub fn export(dir: &Path, report: &RunReport) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    if !report.failures.is_empty() {
        write_failures(&dir.join(format!("{}-failures.csv", report.job)), report)?;
    }
    if !report.rolled_back.is_empty() {
        write_rolled_back(&dir.join(format!("{}-rolled-back.csv", report.job)), report)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureKind, RecordId};
    use crate::pipeline::{RecordFailure, RolledBackBatch};

    fn report() -> RunReport {
        let mut report = RunReport::new("normalize-dois", 4);
        report.failures.push(RecordFailure {
            record_id: RecordId::new("a"),
            group: Some("repo".to_string()),
            kind: FailureKind::Validation,
            reason: "doi is NULL".to_string(),
        });
        report.rolled_back.push(RolledBackBatch {
            sequence: 2,
            record_ids: vec![RecordId::new("b"), RecordId::new("c")],
            error: "deadlock detected".to_string(),
        });
        report
    }

    #[test]
    fn exports_failures_and_rolled_back_ids() {
        let dir = tempfile::tempdir().unwrap();
        export(dir.path(), &report()).unwrap();

        let failures =
            std::fs::read_to_string(dir.path().join("normalize-dois-failures.csv")).unwrap();
        assert_eq!(
            failures,
            "record_id,group,kind,reason\na,repo,validation,doi is NULL\n"
        );

        let rolled_back =
            std::fs::read_to_string(dir.path().join("normalize-dois-rolled-back.csv")).unwrap();
        assert_eq!(
            rolled_back,
            "batch,record_id,error\n2,b,deadlock detected\n2,c,deadlock detected\n"
        );
    }

    #[test]
    fn clean_runs_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        export(dir.path(), &RunReport::new("clean", 0)).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
