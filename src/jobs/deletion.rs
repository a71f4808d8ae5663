//! Removal of assertions with malformed accession numbers, or listed in files.

use std::path::Path;
use std::sync::Arc;

use super::JobContext;
use crate::constants::tables::{ACCESSION_NUMBER, ASSERTIONS, REPOSITORY_ID, SOURCE_ID};
use crate::error::Result;
use crate::pipeline::RunReport;
use crate::sink::DeleteSink;
use crate::source::CsvIdSource;
use crate::store::{ColumnType, DeletePlan, Predicate, Selection};
use crate::transform::{IdListTransformer, InvalidPatternFilter};

fn delete_sink(ctx: &JobContext) -> Result<Arc<DeleteSink>> {
    let deletion = &ctx.config.deletion;
    let plan = DeletePlan::new(ASSERTIONS, deletion.children.clone()).with_strategy(deletion.strategy);
    Ok(Arc::new(DeleteSink::new(ctx.store.clone(), plan)?))
}

/// Delete, group by group, the assertions whose accession number does not
/// match the group's pattern, together with their dependent rows
pub async fn delete_invalid_accessions(ctx: &JobContext) -> Result<Vec<RunReport>> {
    let strategies = ctx.strategies()?;
    let transformer = Arc::new(InvalidPatternFilter::new(strategies.clone(), ACCESSION_NUMBER));
    let sink = delete_sink(ctx)?;

    let mut reports = Vec::new();
    for group in strategies.pattern_groups() {
        if ctx.shutdown.is_stop_requested() {
            break;
        }
        let mut selection = Selection::new(ASSERTIONS)
            .group_column(REPOSITORY_ID)
            .input_columns([ACCESSION_NUMBER])
            .filter(Predicate::equals(REPOSITORY_ID, group, ColumnType::Uuid));
        if let Some(source_id) = &ctx.config.accession.source_id {
            selection =
                selection.filter(Predicate::equals(SOURCE_ID, source_id.as_str(), ColumnType::Uuid));
        }

        let settings = ctx
            .settings(&format!("delete-invalid:{group}"))
            .with_batch_size(ctx.config.deletion.batch_size);
        let source = ctx.store_source(selection);
        let report = ctx
            .run(settings, source, transformer.clone(), sink.clone())
            .await
            .map_err(|e| e.with_completed_runs(std::mem::take(&mut reports)))?;
        reports.push(report);
    }
    Ok(reports)
}

/// Delete the assertions listed in the `*-remove*` CSV files under `dir`
pub async fn delete_listed(ctx: &JobContext, dir: &Path) -> Result<RunReport> {
    let settings = ctx
        .settings("delete-listed")
        .with_batch_size(ctx.config.deletion.batch_size);
    ctx.run(
        settings,
        Arc::new(CsvIdSource::new(dir)),
        Arc::new(IdListTransformer),
        delete_sink(ctx)?,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorpusConfig, GroupStrategy};
    use crate::constants::tables::{ASSERTIONS_SUBJECTS, ASSERTION_ID};
    use crate::error::CorpusError;
    use crate::store::InMemoryRecordStore;

    const GEO: &str = "b2a4aa2b-db3f-456a-8e2b-7d935343385e";
    const KEEP: &str = "3b7f4a6e-8f1d-4a55-9f0e-7a1c2d3e4f50";
    const DROP: &str = "9c0d1e2f-3a4b-4c5d-8e6f-7a8b9c0d1e2f";

    fn context(store: Arc<InMemoryRecordStore>) -> JobContext {
        let mut config = CorpusConfig::default();
        config.groups.insert(
            GEO.to_string(),
            GroupStrategy {
                pattern: Some(r"^G(PL|SM|SE|DS)\d+$".to_string()),
                subjects: Vec::new(),
            },
        );
        config.deletion.batch_size = 1;
        JobContext::new(config, store)
    }

    fn seed(store: &InMemoryRecordStore) {
        for (id, accession) in [(KEEP, "GSE1"), (DROP, "not-an-accession")] {
            store.insert_row(
                ASSERTIONS,
                [
                    ("id", Some(id)),
                    (REPOSITORY_ID, Some(GEO)),
                    (ACCESSION_NUMBER, Some(accession)),
                ],
            );
            store.insert_row(
                ASSERTIONS_SUBJECTS,
                [("id", Some("s")), (ASSERTION_ID, Some(id))],
            );
        }
    }

    #[tokio::test]
    async fn malformed_accessions_are_deleted_with_children() {
        let store = Arc::new(InMemoryRecordStore::new());
        seed(&store);
        let reports = delete_invalid_accessions(&context(store.clone())).await.unwrap();

        assert_eq!(reports[0].unchanged, 1);
        assert_eq!(reports[0].records_written, 1);
        assert!(store.row(ASSERTIONS, KEEP).is_some());
        assert!(store.row(ASSERTIONS, DROP).is_none());
        assert_eq!(store.row_count(ASSERTIONS_SUBJECTS), 1);
    }

    #[tokio::test]
    async fn listed_ids_are_deleted() {
        let store = Arc::new(InMemoryRecordStore::new());
        seed(&store);
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("geo-remove.csv"),
            format!("{DROP}\nnot-a-uuid\n"),
        )
        .unwrap();

        let report = delete_listed(&context(store.clone()), dir.path()).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(store.row_count(ASSERTIONS), 1);
    }

    #[tokio::test]
    async fn missing_list_directory_aborts_before_writing() {
        let store = Arc::new(InMemoryRecordStore::new());
        seed(&store);
        let result = delete_listed(&context(store.clone()), Path::new("/nonexistent/lists")).await;
        assert!(matches!(result, Err(CorpusError::SetupError(_))));
        assert_eq!(store.write_statements(), 0);
    }
}
