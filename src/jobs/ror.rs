//! Organization reconciliation against ROR, and the candidate-match report.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::JobContext;
use crate::constants::tables::{AFFILIATIONS, EXTERNAL_ID, FUNDERS, ROR_ID, ROR_NAME, TITLE};
use crate::error::Result;
use crate::pipeline::RunReport;
use crate::ror::OrganizationRegistry;
use crate::sink::{CsvColumn, CsvSink, UpdateSink};
use crate::store::{OutputColumn, Predicate, Selection, UpdateTarget};
use crate::transform::reconcile::ReconcileMode;
use crate::transform::{RorCandidateCollector, RorReconciler};

/// Organization tables carrying `external_id`, `title`, `ror_id` and `ror_name`
pub const ORGANIZATION_TABLES: [&str; 2] = [AFFILIATIONS, FUNDERS];

/// Null out the configured junk `external_id` values of `table`
pub async fn clean_external_ids(ctx: &JobContext, table: &str) -> Result<u64> {
    let values = ctx.config.cleanup.invalid_values(table);
    let cleared = ctx.store.clear_values(table, EXTERNAL_ID, values).await?;
    info!(table = %table, cleared = cleared, "Invalid external ids cleared");
    Ok(cleared)
}

fn reconcile_selection(table: &str, mode: ReconcileMode) -> Selection {
    let selection = Selection::new(table).input_columns([EXTERNAL_ID, TITLE]);
    match mode {
        ReconcileMode::IdentifierFirst => selection.unset([ROR_ID, ROR_NAME]),
        ReconcileMode::TitleOnly => selection
            .filter(Predicate::is_not_null(EXTERNAL_ID))
            .unset([ROR_ID]),
    }
}

/// Fill `ror_id`/`ror_name` for every organization table.
///
/// The identifier-first pass cleans junk external ids beforehand; the
/// title-only pass revisits rows whose external id did not resolve.
pub async fn reconcile_ror(
    ctx: &JobContext,
    registry: Arc<dyn OrganizationRegistry>,
    mode: ReconcileMode,
) -> Result<Vec<RunReport>> {
    let transformer = Arc::new(RorReconciler::new(registry).with_mode(mode));
    let job = match mode {
        ReconcileMode::IdentifierFirst => "reconcile-ror",
        ReconcileMode::TitleOnly => "reconcile-ror-by-title",
    };

    let mut reports = Vec::new();
    for table in ORGANIZATION_TABLES {
        if ctx.shutdown.is_stop_requested() {
            break;
        }
        if mode == ReconcileMode::IdentifierFirst {
            clean_external_ids(ctx, table)
                .await
                .map_err(|e| e.with_completed_runs(std::mem::take(&mut reports)))?;
        }

        let target = UpdateTarget::new(
            table,
            vec![
                OutputColumn::text(EXTERNAL_ID),
                OutputColumn::text(ROR_ID),
                OutputColumn::text(ROR_NAME),
            ],
        );
        let sink = Arc::new(
            UpdateSink::new(ctx.store.clone(), target)
                .map_err(|e| e.with_completed_runs(std::mem::take(&mut reports)))?,
        );
        let source = ctx.store_source(reconcile_selection(table, mode));
        let settings = ctx.settings(&format!("{job}:{table}"));
        let report = ctx
            .run(settings, source, transformer.clone(), sink)
            .await
            .map_err(|e| e.with_completed_runs(std::mem::take(&mut reports)))?;
        reports.push(report);
    }
    Ok(reports)
}

/// Write the top registry candidates for every organization without an
/// external id to one CSV report
pub async fn ror_candidates(
    ctx: &JobContext,
    registry: Arc<dyn OrganizationRegistry>,
    output: &Path,
) -> Result<Vec<RunReport>> {
    let columns = RorCandidateCollector::report_columns()
        .into_iter()
        .map(|(key, header)| CsvColumn::value(key, header))
        .collect();
    let sink = Arc::new(CsvSink::create(output, columns)?);
    let transformer = Arc::new(RorCandidateCollector::new(registry));

    let mut reports = Vec::new();
    for table in ORGANIZATION_TABLES {
        if ctx.shutdown.is_stop_requested() {
            break;
        }
        let selection = Selection::new(table).input_columns([TITLE]).unset([EXTERNAL_ID]);
        let settings = ctx.settings(&format!("ror-candidates:{table}"));
        let report = ctx
            .run(settings, ctx.store_source(selection), transformer.clone(), sink.clone())
            .await
            .map_err(|e| e.with_completed_runs(std::mem::take(&mut reports)))?;
        reports.push(report);
    }
    Ok(reports)
}
