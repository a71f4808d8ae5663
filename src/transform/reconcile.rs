//! Organization reconciliation against the ROR registry.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{normalize_external_id, RecordTransformer, TransformerKind};
use crate::constants::{prefixes, tables};
use crate::models::{FailureKind, FieldValue, FieldValues, Record, TransformResult};
use crate::ror::{AffiliationCandidate, OrganizationMatch, OrganizationRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Exact identifier lookup first, fuzzy title match as the fallback
    IdentifierFirst,
    /// Fuzzy title match only, for rows whose identifier already failed to resolve
    TitleOnly,
}

/// Fills `ror_id`/`ror_name` for organizations, normalizing `external_id` on the way.
///
/// A structured identifier is resolved exactly; only when there is none, or it
/// resolves to nothing, is the organization name matched, and then only a
/// candidate the registry marks as chosen with maximal score is accepted.
#[derive(Debug, Clone)]
pub struct RorReconciler {
    registry: Arc<dyn OrganizationRegistry>,
    mode: ReconcileMode,
    external_id_column: String,
    title_column: String,
    ror_id_column: String,
    ror_name_column: String,
}

impl RorReconciler {
    pub fn new(registry: Arc<dyn OrganizationRegistry>) -> Self {
        Self {
            registry,
            mode: ReconcileMode::IdentifierFirst,
            external_id_column: tables::EXTERNAL_ID.to_string(),
            title_column: tables::TITLE.to_string(),
            ror_id_column: tables::ROR_ID.to_string(),
            ror_name_column: tables::ROR_NAME.to_string(),
        }
    }

    pub fn with_mode(mut self, mode: ReconcileMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ReconcileMode {
        self.mode
    }

    fn values(
        &self,
        external_id: Option<String>,
        organization: Option<OrganizationMatch>,
    ) -> FieldValues {
        let (ror_id, ror_name) = match organization {
            Some(org) => (FieldValue::Text(org.id), FieldValue::Text(org.name)),
            None => (FieldValue::Null, FieldValue::Null),
        };
        FieldValues::from([
            (
                self.external_id_column.clone(),
                FieldValue::from_option(external_id),
            ),
            (self.ror_id_column.clone(), ror_id),
            (self.ror_name_column.clone(), ror_name),
        ])
    }
}

#[async_trait]
impl RecordTransformer for RorReconciler {
    fn name(&self) -> &str {
        match self.mode {
            ReconcileMode::IdentifierFirst => "ror_reconciler",
            ReconcileMode::TitleOnly => "ror_reconciler_by_title",
        }
    }

    fn kind(&self) -> TransformerKind {
        TransformerKind::RemoteLookup
    }

    async fn transform(&self, record: &Record) -> TransformResult {
        let id = record.id.clone();
        let stored = record.field(&self.external_id_column);
        let normalized = record
            .non_blank_field(&self.external_id_column)
            .map(normalize_external_id);
        let title = record.non_blank_field(&self.title_column);

        if normalized.is_none() && title.is_none() {
            return TransformResult::failed(
                id,
                FailureKind::Validation,
                "neither an external id nor a title to match on",
            );
        }

        let mut organization = None;
        if let (ReconcileMode::IdentifierFirst, Some(identifier)) = (self.mode, &normalized) {
            let lookup = if identifier.starts_with(prefixes::ROR) {
                self.registry.lookup_by_id(identifier).await
            } else {
                self.registry.query_identifier(identifier).await
            };
            match lookup {
                Ok(found) => organization = found,
                Err(e) => {
                    return TransformResult::failed(
                        id,
                        e.failure_kind(),
                        format!("identifier lookup for {identifier}: {e}"),
                    )
                }
            }
        }

        if organization.is_none() {
            if let Some(title) = title {
                match self.registry.match_affiliation(title).await {
                    Ok(candidates) => {
                        organization = candidates
                            .into_iter()
                            .find(AffiliationCandidate::is_confident)
                            .map(|candidate| candidate.organization);
                    }
                    Err(e) => {
                        return TransformResult::failed(
                            id,
                            e.failure_kind(),
                            format!("affiliation match for '{title}': {e}"),
                        )
                    }
                }
            }
        }

        let external_id = normalized.clone().or_else(|| stored.map(str::to_string));
        match organization {
            Some(organization) => {
                debug!(record = %id, ror_id = %organization.id, "Resolved organization");
                TransformResult::output(id, self.values(external_id, Some(organization)))
            }
            None if normalized.is_some() && normalized.as_deref() != stored => {
                TransformResult::output(id, self.values(external_id, None))
            }
            None => TransformResult::failed(id, FailureKind::NoMatch, "no confident registry match"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransformOutcome;
    use crate::ror::{LookupError, LookupResult};
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    struct FakeRegistry {
        by_id: Option<OrganizationMatch>,
        by_query: Option<OrganizationMatch>,
        candidates: Vec<AffiliationCandidate>,
        fail_with: Option<LookupError>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OrganizationRegistry for FakeRegistry {
        async fn lookup_by_id(&self, ror_id: &str) -> LookupResult<Option<OrganizationMatch>> {
            self.calls.lock().push(format!("id:{ror_id}"));
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(self.by_id.clone()),
            }
        }

        async fn query_identifier(&self, identifier: &str) -> LookupResult<Option<OrganizationMatch>> {
            self.calls.lock().push(format!("query:{identifier}"));
            Ok(self.by_query.clone())
        }

        async fn match_affiliation(&self, name: &str) -> LookupResult<Vec<AffiliationCandidate>> {
            self.calls.lock().push(format!("affiliation:{name}"));
            Ok(self.candidates.clone())
        }
    }

    fn org(id: &str, name: &str) -> OrganizationMatch {
        OrganizationMatch {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn candidate(score: f64, chosen: bool, id: &str) -> AffiliationCandidate {
        AffiliationCandidate {
            score,
            chosen,
            organization: org(id, "Candidate"),
        }
    }

    fn affiliation(external_id: Option<&str>, title: Option<&str>) -> Record {
        Record::new("5b1f7e0e-8a0a-4c36-a1a8-0b4b1f0c9f11")
            .with_field("external_id", external_id)
            .with_field("title", title)
    }

    fn ror_id(result: &TransformResult) -> Option<FieldValue> {
        match &result.outcome {
            TransformOutcome::Output(rows) => rows[0].get("ror_id").cloned(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn exact_lookup_wins_without_fuzzy_call() {
        let registry = Arc::new(FakeRegistry {
            by_id: Some(org("https://ror.org/052gg0110", "University of Oxford")),
            candidates: vec![candidate(1.0, true, "https://ror.org/other")],
            ..FakeRegistry::default()
        });
        let reconciler = RorReconciler::new(registry.clone());

        let result = reconciler
            .transform(&affiliation(Some("052gg0110"), Some("Oxford")))
            .await;

        assert_eq!(ror_id(&result), Some(FieldValue::text("https://ror.org/052gg0110")));
        assert_eq!(*registry.calls.lock(), vec!["id:https://ror.org/052gg0110"]);
    }

    #[tokio::test]
    async fn falls_back_to_confident_title_match() {
        let registry = Arc::new(FakeRegistry {
            candidates: vec![
                candidate(0.9, false, "https://ror.org/weak"),
                candidate(1.0, true, "https://ror.org/strong"),
            ],
            ..FakeRegistry::default()
        });
        let reconciler = RorReconciler::new(registry.clone());

        let result = reconciler
            .transform(&affiliation(Some("grid.4991.5"), Some("University of Oxford")))
            .await;

        assert_eq!(ror_id(&result), Some(FieldValue::text("https://ror.org/strong")));
        assert_eq!(
            *registry.calls.lock(),
            vec![
                "query:https://www.grid.ac/grid.4991.5",
                "affiliation:University of Oxford"
            ]
        );
    }

    #[tokio::test]
    async fn unconfident_candidates_are_never_guessed() {
        let registry = Arc::new(FakeRegistry {
            candidates: vec![candidate(1.0, false, "https://ror.org/a"), candidate(0.8, true, "https://ror.org/b")],
            ..FakeRegistry::default()
        });
        let reconciler = RorReconciler::new(registry);

        let result = reconciler.transform(&affiliation(None, Some("Oxford Uni"))).await;
        assert_eq!(result.failure().map(|f| f.kind), Some(FailureKind::NoMatch));
    }

    #[tokio::test]
    async fn unresolved_identifier_is_still_normalized() {
        let registry = Arc::new(FakeRegistry::default());
        let reconciler = RorReconciler::new(registry);

        let result = reconciler.transform(&affiliation(Some("10.13039/100000001"), None)).await;
        let TransformOutcome::Output(rows) = result.outcome else {
            panic!("expected normalized external id");
        };
        assert_eq!(
            rows[0]["external_id"],
            FieldValue::text("https://doi.org/10.13039/100000001")
        );
        assert_eq!(rows[0]["ror_id"], FieldValue::Null);
    }

    #[tokio::test]
    async fn lookup_errors_become_failures() {
        let registry = Arc::new(FakeRegistry {
            fail_with: Some(LookupError::RateLimitExhausted { waits: 5 }),
            ..FakeRegistry::default()
        });
        let reconciler = RorReconciler::new(registry);

        let result = reconciler
            .transform(&affiliation(Some("https://ror.org/052gg0110"), Some("Oxford")))
            .await;
        assert_eq!(result.failure().map(|f| f.kind), Some(FailureKind::RateLimited));
    }

    #[tokio::test]
    async fn title_only_mode_skips_identifier_lookup() {
        let registry = Arc::new(FakeRegistry {
            by_id: Some(org("https://ror.org/unused", "Unused")),
            candidates: vec![candidate(1.0, true, "https://ror.org/strong")],
            ..FakeRegistry::default()
        });
        let reconciler = RorReconciler::new(registry.clone()).with_mode(ReconcileMode::TitleOnly);

        let result = reconciler
            .transform(&affiliation(Some("https://ror.org/052gg0110"), Some("Oxford")))
            .await;
        assert_eq!(ror_id(&result), Some(FieldValue::text("https://ror.org/strong")));
        assert_eq!(*registry.calls.lock(), vec!["affiliation:Oxford"]);
    }

    #[tokio::test]
    async fn records_without_inputs_fail_validation() {
        let reconciler = RorReconciler::new(Arc::new(FakeRegistry::default()));
        let result = reconciler.transform(&affiliation(Some("  "), None)).await;
        assert_eq!(result.failure().map(|f| f.kind), Some(FailureKind::Validation));
    }
}
