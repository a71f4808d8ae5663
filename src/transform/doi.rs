use async_trait::async_trait;

use super::{normalize_doi, RecordTransformer, TransformerKind};
use crate::models::{FieldValue, FieldValues, Record, TransformResult};

/// Rewrites DOI-bearing columns into `https://doi.org/` form.
///
/// The output carries every configured column (changed or not, NULL stays
/// NULL) because the update writes all of them; a record with nothing to
/// rewrite is reported unchanged and never written.
#[derive(Debug, Clone)]
pub struct DoiNormalizer {
    columns: Vec<String>,
}

impl DoiNormalizer {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

#[async_trait]
impl RecordTransformer for DoiNormalizer {
    fn name(&self) -> &str {
        "doi_normalizer"
    }

    fn kind(&self) -> TransformerKind {
        TransformerKind::Local
    }

    async fn transform(&self, record: &Record) -> TransformResult {
        let mut changed = false;
        let mut values = FieldValues::new();
        for column in &self.columns {
            let current = record.field(column);
            let normalized = current.map(normalize_doi);
            changed |= normalized.as_deref() != current;
            values.insert(column.clone(), FieldValue::from_option(normalized));
        }

        if changed {
            TransformResult::output(record.id.clone(), values)
        } else {
            TransformResult::unchanged(record.id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransformOutcome;

    #[tokio::test]
    async fn rewrites_only_when_something_changes() {
        let normalizer = DoiNormalizer::new(["doi", "dataset"]);
        let record = Record::new("a")
            .with_field("doi", Some("10.5061/dryad.1"))
            .with_field("dataset", None);

        let result = normalizer.transform(&record).await;
        let TransformOutcome::Output(rows) = result.outcome else {
            panic!("expected output");
        };
        assert_eq!(rows[0]["doi"], FieldValue::text("https://doi.org/10.5061/dryad.1"));
        assert_eq!(rows[0]["dataset"], FieldValue::Null);

        let done = Record::new("b").with_field("doi", Some("https://doi.org/10.5061/dryad.1"));
        assert_eq!(
            normalizer.transform(&done).await.outcome,
            TransformOutcome::Unchanged
        );
    }
}
