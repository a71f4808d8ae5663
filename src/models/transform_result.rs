use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::record::RecordId;

/// A value written to an output column.
///
/// Values travel to the store as text and are cast to the column type in SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Text(String),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn from_option(value: Option<String>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Text)
    }

    /// Text form bound into SQL statements and CSV cells
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(flag) => Some(flag.to_string()),
            FieldValue::Text(text) => Some(text.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(flag) => write!(f, "{flag}"),
            FieldValue::Text(text) => f.write_str(text),
        }
    }
}

/// Output column values for one written row
pub type FieldValues = BTreeMap<String, FieldValue>;

/// Why a record could not be transformed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Input did not have the expected shape
    Validation,
    /// The registry returned no acceptable candidate
    NoMatch,
    /// Transport errors, 5xx or unexpected statuses after bounded retries
    Remote,
    /// The rate-limit wait budget ran out
    RateLimited,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Validation => write!(f, "validation"),
            FailureKind::NoMatch => write!(f, "no_match"),
            FailureKind::Remote => write!(f, "remote"),
            FailureKind::RateLimited => write!(f, "rate_limited"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformFailure {
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformOutcome {
    /// Rows to write for this record: one for updates, one or more for inserts,
    /// none when the write is keyed by the record id alone (deletes)
    Output(Vec<FieldValues>),
    /// Successful, but there is nothing to write
    Unchanged,
    Failed(TransformFailure),
}

/// Exactly one of these is produced for every record in a working set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResult {
    pub record_id: RecordId,
    pub group: Option<String>,
    pub outcome: TransformOutcome,
}

impl TransformResult {
    pub fn output(record_id: RecordId, values: FieldValues) -> Self {
        Self {
            record_id,
            group: None,
            outcome: TransformOutcome::Output(vec![values]),
        }
    }

    pub fn rows(record_id: RecordId, rows: Vec<FieldValues>) -> Self {
        Self {
            record_id,
            group: None,
            outcome: TransformOutcome::Output(rows),
        }
    }

    /// Success keyed only by the record id
    pub fn selected(record_id: RecordId) -> Self {
        Self::rows(record_id, Vec::new())
    }

    pub fn unchanged(record_id: RecordId) -> Self {
        Self {
            record_id,
            group: None,
            outcome: TransformOutcome::Unchanged,
        }
    }

    pub fn failed(record_id: RecordId, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            record_id,
            group: None,
            outcome: TransformOutcome::Failed(TransformFailure {
                kind,
                reason: reason.into(),
            }),
        }
    }

    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, TransformOutcome::Failed(_))
    }

    pub fn failure(&self) -> Option<&TransformFailure> {
        match &self.outcome {
            TransformOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A successful result that must be written, as held in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub record_id: RecordId,
    pub group: Option<String>,
    pub rows: Vec<FieldValues>,
}

impl PendingWrite {
    /// The first (for updates, the only) row of output values
    pub fn values(&self) -> Option<&FieldValues> {
        self.rows.first()
    }
}

impl TryFrom<TransformResult> for PendingWrite {
    type Error = TransformResult;

    fn try_from(result: TransformResult) -> Result<Self, Self::Error> {
        match result.outcome {
            TransformOutcome::Output(rows) => Ok(PendingWrite {
                record_id: result.record_id,
                group: result.group,
                rows,
            }),
            _ => Err(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_values_render_as_sql_literals() {
        assert_eq!(FieldValue::Bool(true).as_text().as_deref(), Some("true"));
        assert_eq!(FieldValue::Null.as_text(), None);
        assert_eq!(FieldValue::from_option(None), FieldValue::Null);
    }

    #[test]
    fn only_outputs_become_pending_writes() {
        let id = RecordId::new("a");
        let output = TransformResult::output(
            id.clone(),
            FieldValues::from([("doi".to_string(), FieldValue::text("https://doi.org/10.1/x"))]),
        );
        let pending = PendingWrite::try_from(output).expect("output converts");
        assert_eq!(pending.record_id, id);
        assert_eq!(pending.rows.len(), 1);

        let unchanged = TransformResult::unchanged(id.clone());
        assert!(PendingWrite::try_from(unchanged).is_err());

        let failed = TransformResult::failed(id, FailureKind::Validation, "empty");
        assert!(!failed.is_success());
        assert_eq!(failed.failure().map(|f| f.kind), Some(FailureKind::Validation));
    }
}
