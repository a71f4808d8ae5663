use async_trait::async_trait;
use std::sync::Arc;

use super::{RecordTransformer, StrategyRegistry, TransformerKind};
use crate::models::{FailureKind, FieldValue, FieldValues, Record, TransformResult};

/// Maps a record's group to its configured subjects, one insert row each
#[derive(Debug, Clone)]
pub struct SubjectMapper {
    strategies: Arc<StrategyRegistry>,
    subject_column: String,
}

impl SubjectMapper {
    pub fn new(strategies: Arc<StrategyRegistry>, subject_column: impl Into<String>) -> Self {
        Self {
            strategies,
            subject_column: subject_column.into(),
        }
    }
}

#[async_trait]
impl RecordTransformer for SubjectMapper {
    fn name(&self) -> &str {
        "subject_mapper"
    }

    fn kind(&self) -> TransformerKind {
        TransformerKind::Local
    }

    async fn transform(&self, record: &Record) -> TransformResult {
        let subjects = record
            .group
            .as_deref()
            .and_then(|group| self.strategies.subjects(group));
        let Some(subjects) = subjects else {
            return TransformResult::failed(
                record.id.clone(),
                FailureKind::Validation,
                format!(
                    "no subjects configured for group {}",
                    record.group.as_deref().unwrap_or("<none>")
                ),
            );
        };

        let rows = subjects
            .iter()
            .map(|subject| {
                FieldValues::from([(self.subject_column.clone(), FieldValue::text(subject.as_str()))])
            })
            .collect();
        TransformResult::rows(record.id.clone(), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransformOutcome;

    #[tokio::test]
    async fn one_row_per_subject() {
        let strategies = Arc::new(StrategyRegistry::default().with_subjects(
            "repo",
            [
                "84fe679f-156c-4090-b25e-f752b3f8ea92",
                "9122f222-ff6e-4e51-b1be-ef5e1be55d61",
            ],
        ));
        let mapper = SubjectMapper::new(strategies, "subject_id");

        let result = mapper.transform(&Record::new("a").with_group("repo")).await;
        let TransformOutcome::Output(rows) = result.outcome else {
            panic!("expected rows");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1]["subject_id"],
            FieldValue::text("9122f222-ff6e-4e51-b1be-ef5e1be55d61")
        );

        let unmapped = mapper.transform(&Record::new("b").with_group("other")).await;
        assert_eq!(unmapped.failure().map(|f| f.kind), Some(FailureKind::Validation));
    }
}
