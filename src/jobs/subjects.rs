//! Subject mapping backfill for assertions of repositories with known subjects.

use std::sync::Arc;

use super::JobContext;
use crate::constants::tables::{ASSERTIONS, ASSERTIONS_SUBJECTS, ASSERTION_ID, REPOSITORY_ID, SUBJECT_ID};
use crate::error::Result;
use crate::pipeline::RunReport;
use crate::sink::InsertSink;
use crate::store::{ColumnType, InsertTarget, OutputColumn, Predicate, Selection};
use crate::transform::SubjectMapper;

/// Insert `assertions_subjects` rows for assertions that have none yet
pub async fn backfill_subjects(ctx: &JobContext) -> Result<Vec<RunReport>> {
    let strategies = ctx.strategies()?;
    let transformer = Arc::new(SubjectMapper::new(strategies.clone(), SUBJECT_ID));
    let target = InsertTarget::new(
        ASSERTIONS_SUBJECTS,
        ASSERTION_ID,
        vec![OutputColumn::new(SUBJECT_ID, ColumnType::Uuid)],
    );
    let sink = Arc::new(InsertSink::new(ctx.store.clone(), target)?);

    let mut reports = Vec::new();
    for group in strategies.subject_groups() {
        if ctx.shutdown.is_stop_requested() {
            break;
        }
        let selection = Selection::new(ASSERTIONS)
            .group_column(REPOSITORY_ID)
            .filter(Predicate::equals(REPOSITORY_ID, group, ColumnType::Uuid))
            .filter(Predicate::no_child_rows(ASSERTIONS_SUBJECTS, ASSERTION_ID));
        let settings = ctx.settings(&format!("backfill-subjects:{group}"));
        let report = ctx
            .run(settings, ctx.store_source(selection), transformer.clone(), sink.clone())
            .await
            .map_err(|e| e.with_completed_runs(std::mem::take(&mut reports)))?;
        reports.push(report);
    }
    Ok(reports)
}
