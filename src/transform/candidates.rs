use async_trait::async_trait;
use std::sync::Arc;

use super::{RecordTransformer, TransformerKind};
use crate::constants::{ror::MAX_CANDIDATES, tables};
use crate::models::{FailureKind, FieldValue, FieldValues, Record, TransformResult};
use crate::ror::OrganizationRegistry;

pub const ORIGINAL_NAME: &str = "original_name";

/// Collects the top registry candidates for an organization name, for review.
///
/// Produces `original_name` plus `match_N_name`, `match_N_id` and
/// `match_N_score` for N in 1..=5; slots without a candidate are NULL.
#[derive(Debug, Clone)]
pub struct RorCandidateCollector {
    registry: Arc<dyn OrganizationRegistry>,
    title_column: String,
}

impl RorCandidateCollector {
    pub fn new(registry: Arc<dyn OrganizationRegistry>) -> Self {
        Self {
            registry,
            title_column: tables::TITLE.to_string(),
        }
    }

    /// Output keys paired with their report headers, in column order
    pub fn report_columns() -> Vec<(String, String)> {
        let mut columns = vec![(ORIGINAL_NAME.to_string(), "Original Name".to_string())];
        for n in 1..=MAX_CANDIDATES {
            for (key, label) in [("name", "Name"), ("id", "ID"), ("score", "Score")] {
                columns.push((format!("match_{n}_{key}"), format!("Match {n} {label}")));
            }
        }
        columns
    }
}

fn render_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{score:.1}")
    } else {
        score.to_string()
    }
}

#[async_trait]
impl RecordTransformer for RorCandidateCollector {
    fn name(&self) -> &str {
        "ror_candidate_collector"
    }

    fn kind(&self) -> TransformerKind {
        TransformerKind::RemoteLookup
    }

    async fn transform(&self, record: &Record) -> TransformResult {
        let Some(title) = record.non_blank_field(&self.title_column) else {
            return TransformResult::failed(
                record.id.clone(),
                FailureKind::Validation,
                "organization has no name",
            );
        };

        let candidates = match self.registry.match_affiliation(title).await {
            Ok(candidates) => candidates,
            Err(e) => {
                return TransformResult::failed(
                    record.id.clone(),
                    e.failure_kind(),
                    format!("affiliation match for '{title}': {e}"),
                )
            }
        };

        let mut values = FieldValues::from([(ORIGINAL_NAME.to_string(), FieldValue::text(title))]);
        for n in 1..=MAX_CANDIDATES {
            let candidate = candidates.get(n - 1);
            values.insert(
                format!("match_{n}_name"),
                FieldValue::from_option(candidate.map(|c| c.organization.name.clone())),
            );
            values.insert(
                format!("match_{n}_id"),
                FieldValue::from_option(candidate.map(|c| c.organization.id.clone())),
            );
            values.insert(
                format!("match_{n}_score"),
                FieldValue::from_option(candidate.map(|c| render_score(c.score))),
            );
        }
        TransformResult::output(record.id.clone(), values)
    }
}
