//! # Jobs
//!
//! The named maintenance runs, each a [`Pipeline`] assembled from a source
//! selection, a transformer and a sink. Jobs that work group by group (one
//! repository's pattern or subjects at a time) return one [`RunReport`] per
//! group.

pub mod accession;
pub mod deletion;
pub mod doi;
pub mod ror;
pub mod subjects;

use std::sync::Arc;

use crate::config::CorpusConfig;
use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineSettings, RunReport, ShutdownHandle};
use crate::sink::BatchSink;
use crate::source::{RecordSource, StoreSource};
use crate::store::{RecordStore, Selection};
use crate::transform::{RecordTransformer, StrategyRegistry};

pub use accession::{export_accessions, validate_accessions};
pub use deletion::{delete_invalid_accessions, delete_listed};
pub use doi::normalize_dois;
pub use ror::{clean_external_ids, reconcile_ror, ror_candidates, ORGANIZATION_TABLES};
pub use subjects::backfill_subjects;

/// Everything a job needs, passed explicitly
#[derive(Debug, Clone)]
pub struct JobContext {
    pub config: CorpusConfig,
    pub store: Arc<dyn RecordStore>,
    pub shutdown: ShutdownHandle,
}

impl JobContext {
    pub fn new(config: CorpusConfig, store: Arc<dyn RecordStore>) -> Self {
        Self {
            config,
            store,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn strategies(&self) -> Result<Arc<StrategyRegistry>> {
        Ok(Arc::new(self.config.strategies()?))
    }

    pub fn settings(&self, job: &str) -> PipelineSettings {
        PipelineSettings::from_config(job, &self.config.pipeline)
    }

    pub fn store_source(&self, selection: Selection) -> Arc<dyn RecordSource> {
        Arc::new(
            StoreSource::new(self.store.clone(), selection)
                .with_page_size(self.config.pipeline.page_size),
        )
    }

    pub async fn run(
        &self,
        settings: PipelineSettings,
        source: Arc<dyn RecordSource>,
        transformer: Arc<dyn RecordTransformer>,
        sink: Arc<dyn BatchSink>,
    ) -> Result<RunReport> {
        Pipeline::new(settings, source, transformer, sink)
            .with_shutdown(self.shutdown.clone())
            .run()
            .await
    }
}
