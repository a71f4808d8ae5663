//! DOI normalization over the identifier-bearing assertion columns.

use std::sync::Arc;

use super::JobContext;
use crate::constants::tables::{ASSERTIONS, DOI_COLUMNS};
use crate::error::Result;
use crate::pipeline::RunReport;
use crate::sink::UpdateSink;
use crate::store::{OutputColumn, Selection, UpdateTarget};
use crate::transform::DoiNormalizer;

/// Rewrite every DOI column into `https://doi.org/` form. Already normalized
/// rows come back unchanged and are never written, so re-runs write nothing.
pub async fn normalize_dois(ctx: &JobContext) -> Result<RunReport> {
    let selection = Selection::new(ASSERTIONS).input_columns(DOI_COLUMNS);
    let target = UpdateTarget::new(
        ASSERTIONS,
        DOI_COLUMNS.iter().map(|column| OutputColumn::text(*column)).collect(),
    );

    ctx.run(
        ctx.settings("normalize-dois"),
        ctx.store_source(selection),
        Arc::new(DoiNormalizer::new(DOI_COLUMNS)),
        Arc::new(UpdateSink::new(ctx.store.clone(), target)?),
    )
    .await
}
