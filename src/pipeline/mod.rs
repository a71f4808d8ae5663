//! # Pipeline
//!
//! One run: the source materializes a working set, every record is
//! transformed exactly once, successful outputs are accumulated into bounded
//! batches and each batch is flushed through a sink as one transaction.
//!
//! ```text
//! RecordSource ──► RecordTransformer ──► collector ──► BatchAccumulator ──► BatchWriter ──► BatchSink
//!                  (inline, or tasks      (single)
//!                   under a Semaphore)
//! ```
//!
//! Local transformers run inline in the collector. Remote-lookup transformers
//! run as tokio tasks, at most `max_concurrency` in flight, feeding an mpsc
//! completion channel; the collector keeps flushing while lookups are still
//! outstanding. Batches therefore follow completion order, which may differ
//! from working-set order.
//!
//! Per-record problems and failed batches are accounted in the [`RunReport`];
//! only setup failures (the source cannot be read) abort a run.
//!
//! ```rust
//! use citation_corpus::models::{Record, WorkingSet};
//! use citation_corpus::pipeline::{Pipeline, PipelineSettings};
//! use citation_corpus::sink::UpdateSink;
//! use citation_corpus::source::StaticSource;
//! use citation_corpus::store::{InMemoryRecordStore, OutputColumn, UpdateTarget};
//! use citation_corpus::transform::DoiNormalizer;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(InMemoryRecordStore::new());
//! store.insert_row("assertions", [("id", Some("a1")), ("doi", Some("10.1/x"))]);
//!
//! let records = WorkingSet::new(vec![Record::new("a1").with_field("doi", Some("10.1/x"))]);
//! let target = UpdateTarget::new("assertions", vec![OutputColumn::text("doi")]);
//! let pipeline = Pipeline::new(
//!     PipelineSettings::new("doc").with_batch_size(100),
//!     Arc::new(StaticSource::new(records)),
//!     Arc::new(DoiNormalizer::new(["doi"])),
//!     Arc::new(UpdateSink::new(store.clone(), target).unwrap()),
//! );
//!
//! let report = pipeline.run().await.unwrap();
//! assert_eq!(report.records_written, 1);
//! assert_eq!(store.value("assertions", "a1", "doi").as_deref(), Some("https://doi.org/10.1/x"));
//! # });
//! ```

pub mod batch;
pub mod run_report;
pub mod writer;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::constants::pipeline::COMPLETION_CHANNEL_CAPACITY;
use crate::error::Result;
use crate::logging::log_pipeline_operation;
use crate::models::{FailureKind, PendingWrite, Record, TransformOutcome, TransformResult};
use crate::sink::BatchSink;
use crate::source::RecordSource;
use crate::transform::{RecordTransformer, TransformerKind};

pub use batch::{Batch, BatchAccumulator};
pub use run_report::{RecordFailure, RolledBackBatch, RunReport};
pub use writer::{BatchWriter, FailurePolicy, FlushOutcome};

/// Cooperative stop signal. Once requested, no further records are
/// dispatched; in-flight transforms finish and the pending batch is flushed.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    stop_requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub job: String,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub failure_policy: FailurePolicy,
}

impl PipelineSettings {
    pub fn new(job: impl Into<String>) -> Self {
        Self::from_config(job, &PipelineConfig::default())
    }

    pub fn from_config(job: impl Into<String>, config: &PipelineConfig) -> Self {
        Self {
            job: job.into(),
            batch_size: config.batch_size,
            max_concurrency: config.max_concurrency,
            failure_policy: config.failure_policy.clone(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

#[derive(Debug)]
pub struct Pipeline {
    settings: PipelineSettings,
    source: Arc<dyn RecordSource>,
    transformer: Arc<dyn RecordTransformer>,
    sink: Arc<dyn BatchSink>,
    shutdown: ShutdownHandle,
}

/// Single accumulation point for results, in completion order
struct Collector {
    report: RunReport,
    accumulator: BatchAccumulator,
    writer: BatchWriter,
}

impl Collector {
    async fn accept(&mut self, result: TransformResult) {
        let TransformResult {
            record_id,
            group,
            outcome,
        } = result;

        match outcome {
            TransformOutcome::Failed(failure) => {
                debug!(
                    record_id = %record_id,
                    kind = %failure.kind,
                    reason = %failure.reason,
                    "Record failed"
                );
                self.report.record_failure(record_id, group, failure);
            }
            TransformOutcome::Unchanged => {
                self.report.succeeded += 1;
                self.report.unchanged += 1;
            }
            TransformOutcome::Output(rows) => {
                self.report.succeeded += 1;
                let pending = PendingWrite {
                    record_id,
                    group,
                    rows,
                };
                if let Some(batch) = self.accumulator.push(pending) {
                    self.flush(batch).await;
                }
            }
        }
    }

    async fn flush(&mut self, batch: Batch) {
        match self.writer.flush(&batch).await {
            FlushOutcome::Committed { rows_affected, .. } => {
                self.report.batches_committed += 1;
                self.report.records_written += batch.len();
                self.report.rows_affected += rows_affected;
            }
            FlushOutcome::RolledBack { error, .. } => {
                self.report.rolled_back.push(RolledBackBatch {
                    sequence: batch.sequence,
                    record_ids: batch.record_ids(),
                    error,
                });
            }
        }
    }

    async fn finish(mut self) -> RunReport {
        if let Some(batch) = self.accumulator.finish() {
            self.flush(batch).await;
        }
        self.report
    }
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        source: Arc<dyn RecordSource>,
        transformer: Arc<dyn RecordTransformer>,
        sink: Arc<dyn BatchSink>,
    ) -> Self {
        Self {
            settings,
            source,
            transformer,
            sink,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run to completion (or to a requested stop).
    ///
    /// Errors only when the working set cannot be loaded; nothing has been
    /// written at that point.
    #[instrument(skip(self), fields(job = %self.settings.job))]
    pub async fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        let job = self.settings.job.clone();
        log_pipeline_operation(&job, "load", "started", Some(&self.source.describe()));

        let working_set = self.source.load().await.inspect_err(|e| {
            error!(job = %job, error = %e, "Cannot load working set, aborting before any write");
        })?;
        let total = working_set.len();
        info!(
            job = %job,
            total = total,
            transformer = self.transformer.name(),
            sink = %self.sink.describe(),
            batch_size = self.settings.batch_size,
            "Working set loaded"
        );

        let mut collector = Collector {
            report: RunReport::new(&job, total),
            accumulator: BatchAccumulator::new(self.settings.batch_size),
            writer: BatchWriter::new(
                &job,
                self.sink.clone(),
                self.settings.failure_policy.clone(),
                total,
            ),
        };

        let records = working_set.into_records();
        let not_dispatched = match self.transformer.kind() {
            TransformerKind::Local => self.run_inline(records, &mut collector).await,
            TransformerKind::RemoteLookup => self.run_concurrent(records, &mut collector).await,
        };

        let mut report = collector.finish().await;
        report.not_dispatched = not_dispatched;
        report.elapsed = started.elapsed();

        if not_dispatched > 0 {
            warn!(
                job = %job,
                not_dispatched = not_dispatched,
                "Run stopped on request; undispatched records are left for the next run"
            );
        }
        info!(
            job = %job,
            total = report.total,
            succeeded = report.succeeded,
            unchanged = report.unchanged,
            failed = report.failed(),
            written = report.records_written,
            batches_committed = report.batches_committed,
            batches_rolled_back = report.batches_rolled_back(),
            duration_ms = report.elapsed.as_millis() as u64,
            "Pipeline run finished"
        );
        log_pipeline_operation(
            &job,
            "run",
            if report.is_clean() { "completed" } else { "completed_with_errors" },
            None,
        );
        Ok(report)
    }

    async fn run_inline(&self, records: Vec<Record>, collector: &mut Collector) -> usize {
        let total = records.len();
        for (dispatched, record) in records.into_iter().enumerate() {
            if self.shutdown.is_stop_requested() {
                return total - dispatched;
            }
            let result = self
                .transformer
                .transform(&record)
                .await
                .with_group(record.group.clone());
            collector.accept(result).await;
        }
        0
    }

    async fn run_concurrent(&self, records: Vec<Record>, collector: &mut Collector) -> usize {
        let (sender, mut receiver) = mpsc::channel::<TransformResult>(COMPLETION_CHANNEL_CAPACITY);
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let transformer = self.transformer.clone();
        let shutdown = self.shutdown.clone();
        let job = self.settings.job.clone();

        let dispatcher = tokio::spawn(async move {
            let total = records.len();
            for (dispatched, record) in records.into_iter().enumerate() {
                if shutdown.is_stop_requested() {
                    return total - dispatched;
                }
                // Holding the permit before spawning bounds the number of live tasks
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        error!(job = %job, "Dispatch semaphore closed");
                        return total - dispatched;
                    }
                };
                if shutdown.is_stop_requested() {
                    return total - dispatched;
                }

                let transformer = transformer.clone();
                let sender = sender.clone();
                tokio::spawn(async move {
                    let group = record.group.clone();
                    let result = AssertUnwindSafe(transformer.transform(&record))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            TransformResult::failed(
                                record.id.clone(),
                                FailureKind::Remote,
                                "transformer panicked",
                            )
                        })
                        .with_group(group);
                    drop(permit);
                    if sender.send(result).await.is_err() {
                        error!(record_id = %record.id, "Completion channel closed, result lost");
                    }
                });
            }
            0
        });

        while let Some(result) = receiver.recv().await {
            collector.accept(result).await;
        }

        match dispatcher.await {
            Ok(not_dispatched) => not_dispatched,
            Err(e) => {
                error!(job = %self.settings.job, error = %e, "Dispatcher task failed");
                0
            }
        }
    }
}
