//! Identifier format checks against per-group patterns.

use async_trait::async_trait;
use std::sync::Arc;

use super::{RecordTransformer, StrategyRegistry, TransformerKind};
use crate::models::{FailureKind, FieldValue, FieldValues, Record, TransformResult};

/// Outcome of checking one record against its group's pattern
enum Verdict {
    Matches(bool),
    Invalid(String),
}

fn check(strategies: &StrategyRegistry, column: &str, record: &Record) -> Verdict {
    let Some(group) = record.group.as_deref() else {
        return Verdict::Invalid("record has no group".to_string());
    };
    let Some(pattern) = strategies.pattern(group) else {
        return Verdict::Invalid(format!("no pattern configured for group {group}"));
    };
    match record.field(column) {
        Some(value) => Verdict::Matches(pattern.is_match(value)),
        None => Verdict::Invalid(format!("{column} is NULL")),
    }
}

/// Flags whether each record's identifier matches its group's pattern.
///
/// Emits `{flag_column: bool}` together with the checked value, so the same
/// output can update the store or be exported. A malformed value is a `false`
/// verdict, not a failure.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    strategies: Arc<StrategyRegistry>,
    input_column: String,
    flag_column: String,
}

impl PatternValidator {
    pub fn new(
        strategies: Arc<StrategyRegistry>,
        input_column: impl Into<String>,
        flag_column: impl Into<String>,
    ) -> Self {
        Self {
            strategies,
            input_column: input_column.into(),
            flag_column: flag_column.into(),
        }
    }
}

#[async_trait]
impl RecordTransformer for PatternValidator {
    fn name(&self) -> &str {
        "pattern_validator"
    }

    fn kind(&self) -> TransformerKind {
        TransformerKind::Local
    }

    async fn transform(&self, record: &Record) -> TransformResult {
        match check(&self.strategies, &self.input_column, record) {
            Verdict::Matches(matched) => {
                let values = FieldValues::from([
                    (self.flag_column.clone(), FieldValue::Bool(matched)),
                    (
                        self.input_column.clone(),
                        FieldValue::from_option(record.field(&self.input_column).map(str::to_string)),
                    ),
                ]);
                TransformResult::output(record.id.clone(), values)
            }
            Verdict::Invalid(reason) => {
                TransformResult::failed(record.id.clone(), FailureKind::Validation, reason)
            }
        }
    }
}

/// Selects records whose identifier does NOT match their group's pattern.
///
/// Non-matching records succeed with an id-only output (the delete sink keys
/// on the id); matching records are left alone.
#[derive(Debug, Clone)]
pub struct InvalidPatternFilter {
    strategies: Arc<StrategyRegistry>,
    input_column: String,
}

impl InvalidPatternFilter {
    pub fn new(strategies: Arc<StrategyRegistry>, input_column: impl Into<String>) -> Self {
        Self {
            strategies,
            input_column: input_column.into(),
        }
    }
}

#[async_trait]
impl RecordTransformer for InvalidPatternFilter {
    fn name(&self) -> &str {
        "invalid_pattern_filter"
    }

    fn kind(&self) -> TransformerKind {
        TransformerKind::Local
    }

    async fn transform(&self, record: &Record) -> TransformResult {
        match check(&self.strategies, &self.input_column, record) {
            Verdict::Matches(true) => TransformResult::unchanged(record.id.clone()),
            Verdict::Matches(false) => TransformResult::selected(record.id.clone()),
            Verdict::Invalid(reason) => {
                TransformResult::failed(record.id.clone(), FailureKind::Validation, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransformOutcome;

    const GEO: &str = "b2a4aa2b-db3f-456a-8e2b-7d935343385e";

    fn strategies() -> Arc<StrategyRegistry> {
        Arc::new(
            StrategyRegistry::default()
                .with_pattern(GEO, r"^G(PL|SM|SE|DS)\d+$")
                .unwrap(),
        )
    }

    fn record(id: &str, accession: Option<&str>) -> Record {
        Record::new(id)
            .with_group(GEO)
            .with_field("accession_number", accession)
    }

    fn flag(result: &TransformResult) -> Option<bool> {
        match &result.outcome {
            TransformOutcome::Output(rows) => match rows[0].get("accession_number_pattern_match") {
                Some(FieldValue::Bool(flag)) => Some(*flag),
                _ => None,
            },
            _ => None,
        }
    }

    #[tokio::test]
    async fn flags_follow_the_group_pattern() {
        let validator =
            PatternValidator::new(strategies(), "accession_number", "accession_number_pattern_match");
        let mut flags = Vec::new();
        for (id, accession) in [("1", "GSE12345"), ("2", "BADID"), ("3", "GSM999")] {
            flags.push(flag(&validator.transform(&record(id, Some(accession))).await));
        }
        assert_eq!(flags, vec![Some(true), Some(false), Some(true)]);
    }

    #[tokio::test]
    async fn empty_values_are_false_and_missing_ones_fail() {
        let validator =
            PatternValidator::new(strategies(), "accession_number", "accession_number_pattern_match");
        assert_eq!(flag(&validator.transform(&record("1", Some(""))).await), Some(false));

        let missing = validator.transform(&record("2", None)).await;
        assert_eq!(missing.failure().map(|f| f.kind), Some(FailureKind::Validation));

        let ungrouped = validator
            .transform(&Record::new("3").with_field("accession_number", Some("GSE1")))
            .await;
        assert!(!ungrouped.is_success());
    }

    #[tokio::test]
    async fn filter_selects_only_non_matching_records() {
        let filter = InvalidPatternFilter::new(strategies(), "accession_number");
        let good = filter.transform(&record("1", Some("GDS42"))).await;
        let bad = filter.transform(&record("2", Some("E-GEOD-1"))).await;

        assert_eq!(good.outcome, TransformOutcome::Unchanged);
        assert_eq!(bad.outcome, TransformOutcome::Output(Vec::new()));
    }
}
