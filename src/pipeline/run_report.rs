//! End-of-run accounting.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::models::{FailureKind, RecordId, TransformFailure};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub record_id: RecordId,
    pub group: Option<String>,
    pub kind: FailureKind,
    pub reason: String,
}

/// A batch whose write was rolled back; its records can be reprocessed by id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RolledBackBatch {
    pub sequence: u64,
    pub record_ids: Vec<RecordId>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub job: String,
    /// Size of the working set
    pub total: usize,
    /// Successful results, including those with nothing to write
    pub succeeded: usize,
    pub unchanged: usize,
    pub failures: Vec<RecordFailure>,
    /// Records whose batch committed
    pub records_written: usize,
    pub rows_affected: u64,
    pub batches_committed: usize,
    pub rolled_back: Vec<RolledBackBatch>,
    /// Records left untouched by a requested stop
    pub not_dispatched: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn new(job: impl Into<String>, total: usize) -> Self {
        Self {
            job: job.into(),
            total,
            ..Self::default()
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn batches_rolled_back(&self) -> usize {
        self.rolled_back.len()
    }

    /// Records that produced a result
    pub fn processed(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.rolled_back.is_empty() && self.not_dispatched == 0
    }

    pub fn failures_by_kind(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.kind.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub(crate) fn record_failure(
        &mut self,
        record_id: RecordId,
        group: Option<String>,
        failure: TransformFailure,
    ) {
        self.failures.push(RecordFailure {
            record_id,
            group,
            kind: failure.kind,
            reason: failure.reason,
        });
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} records in {:.1?}", self.job, self.total, self.elapsed)?;
        writeln!(
            f,
            "  succeeded {} ({} unchanged), failed {}, not dispatched {}",
            self.succeeded,
            self.unchanged,
            self.failures.len(),
            self.not_dispatched
        )?;
        writeln!(
            f,
            "  written {} records / {} rows; batches committed {}, rolled back {}",
            self.records_written,
            self.rows_affected,
            self.batches_committed,
            self.rolled_back.len()
        )?;
        for (kind, count) in self.failures_by_kind() {
            writeln!(f, "  failure {kind}: {count}")?;
        }
        for batch in &self.rolled_back {
            writeln!(
                f,
                "  batch {} rolled back ({} records): {}",
                batch.sequence,
                batch.record_ids.len(),
                batch.error
            )?;
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransformResult;

    #[test]
    fn summary_groups_failures_by_kind() {
        let mut report = RunReport::new("reconcile-ror", 3);
        report.succeeded = 1;
        for (id, kind) in [("a", FailureKind::NoMatch), ("b", FailureKind::NoMatch)] {
            let result = TransformResult::failed(RecordId::new(id), kind, "nothing");
            let failure = result.failure().cloned().unwrap();
            report.record_failure(result.record_id, None, failure);
        }

        assert_eq!(report.processed(), 3);
        assert!(!report.is_clean());
        let rendered = report.to_string();
        assert!(rendered.contains("failure no_match: 2"));
        assert!(rendered.contains("failed 2"));
    }
}
