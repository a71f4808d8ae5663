//! Accession-number format validation, per repository.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::JobContext;
use crate::constants::tables::{
    ACCESSION_MATCH, ACCESSION_NUMBER, ASSERTIONS, ID, REPOSITORY_ID, SOURCE_ID,
};
use crate::error::Result;
use crate::pipeline::RunReport;
use crate::sink::{CsvColumn, CsvSink, UpdateSink};
use crate::store::{ColumnType, OutputColumn, Predicate, Selection, UpdateTarget};
use crate::transform::PatternValidator;

fn selection(ctx: &JobContext, group: &str) -> Selection {
    let mut selection = Selection::new(ASSERTIONS)
        .group_column(REPOSITORY_ID)
        .input_columns([ACCESSION_NUMBER])
        .filter(Predicate::equals(REPOSITORY_ID, group, ColumnType::Uuid));
    if let Some(source_id) = &ctx.config.accession.source_id {
        selection = selection.filter(Predicate::equals(
            SOURCE_ID,
            source_id.as_str(),
            ColumnType::Uuid,
        ));
    }
    selection
}

/// Store `accession_number_pattern_match` for assertions that have none yet
pub async fn validate_accessions(ctx: &JobContext) -> Result<Vec<RunReport>> {
    let strategies = ctx.strategies()?;
    let transformer = Arc::new(PatternValidator::new(
        strategies.clone(),
        ACCESSION_NUMBER,
        ACCESSION_MATCH,
    ));
    let sink = Arc::new(UpdateSink::new(
        ctx.store.clone(),
        UpdateTarget::new(
            ASSERTIONS,
            vec![OutputColumn::new(ACCESSION_MATCH, ColumnType::Boolean)],
        ),
    )?);

    let mut reports = Vec::new();
    for group in strategies.pattern_groups() {
        if ctx.shutdown.is_stop_requested() {
            break;
        }
        let source = ctx.store_source(selection(ctx, group).unset([ACCESSION_MATCH]));
        let settings = ctx.settings(&format!("validate-accessions:{group}"));
        let report = ctx
            .run(settings, source, transformer.clone(), sink.clone())
            .await
            .map_err(|e| e.with_completed_runs(std::mem::take(&mut reports)))?;
        reports.push(report);
    }
    Ok(reports)
}

/// Write `<dir>/<group>.csv` with every assertion's verdict, for review
pub async fn export_accessions(ctx: &JobContext, dir: &Path) -> Result<Vec<RunReport>> {
    let strategies = ctx.strategies()?;
    let transformer = Arc::new(PatternValidator::new(
        strategies.clone(),
        ACCESSION_NUMBER,
        ACCESSION_MATCH,
    ));

    let mut reports = Vec::new();
    for group in strategies.pattern_groups() {
        if ctx.shutdown.is_stop_requested() {
            break;
        }
        let path = dir.join(format!("{group}.csv"));
        let sink = CsvSink::create(
            &path,
            vec![
                CsvColumn::record_id(ID),
                CsvColumn::group(REPOSITORY_ID),
                CsvColumn::value(ACCESSION_NUMBER, ACCESSION_NUMBER),
                CsvColumn::value(ACCESSION_MATCH, ACCESSION_MATCH),
            ],
        )
        .map_err(|e| e.with_completed_runs(std::mem::take(&mut reports)))?;
        let source = ctx.store_source(selection(ctx, group));
        let settings = ctx.settings(&format!("export-accessions:{group}"));
        let report = ctx
            .run(settings, source, transformer.clone(), Arc::new(sink))
            .await
            .map_err(|e| e.with_completed_runs(std::mem::take(&mut reports)))?;
        info!(group = %group, file = %path.display(), rows = report.records_written, "Accession export written");
        reports.push(report);
    }
    Ok(reports)
}
