//! Flushes batches through a sink under the configured failure policy.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::batch::Batch;
use crate::logging::log_batch_operation;
use crate::resilience::BackoffPolicy;
use crate::sink::BatchSink;

/// What happens to a batch whose write fails
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report the batch as rolled back and move on
    #[default]
    Skip,
    /// Re-run the whole write up to `max_retries` more times before giving up
    Retry {
        max_retries: u32,
        #[serde(default)]
        backoff: BackoffPolicy,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    Committed { rows_affected: u64, attempts: u32 },
    RolledBack { error: String, attempts: u32 },
}

impl FlushOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, FlushOutcome::Committed { .. })
    }
}

/// Single writer for one pipeline run
#[derive(Debug)]
pub struct BatchWriter {
    job: String,
    sink: Arc<dyn BatchSink>,
    policy: FailurePolicy,
    total: usize,
    written: usize,
}

impl BatchWriter {
    pub fn new(
        job: impl Into<String>,
        sink: Arc<dyn BatchSink>,
        policy: FailurePolicy,
        total: usize,
    ) -> Self {
        Self {
            job: job.into(),
            sink,
            policy,
            total,
            written: 0,
        }
    }

    /// Records committed so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub async fn flush(&mut self, batch: &Batch) -> FlushOutcome {
        let max_attempts = match &self.policy {
            FailurePolicy::Skip => 1,
            FailurePolicy::Retry { max_retries, .. } => max_retries.saturating_add(1),
        };
        let first_id = batch.first_id().map(|id| id.to_string()).unwrap_or_default();
        let last_id = batch.last_id().map(|id| id.to_string()).unwrap_or_default();

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            match self.sink.flush(batch).await {
                Ok(rows_affected) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    self.written += batch.len();
                    info!(
                        job = %self.job,
                        batch = batch.sequence,
                        size = batch.len(),
                        rows_affected = rows_affected,
                        written = self.written,
                        total = self.total,
                        duration_ms = duration_ms,
                        "Batch committed ({}/{})",
                        self.written,
                        self.total
                    );
                    log_batch_operation(
                        &self.job,
                        batch.sequence,
                        batch.len(),
                        "committed",
                        Some(duration_ms),
                        None,
                    );
                    return FlushOutcome::Committed {
                        rows_affected,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    let message = e.to_string();
                    if attempt < max_attempts {
                        let delay = match &self.policy {
                            FailurePolicy::Retry { backoff, .. } => backoff.delay_for(attempt),
                            FailurePolicy::Skip => std::time::Duration::ZERO,
                        };
                        warn!(
                            job = %self.job,
                            batch = batch.sequence,
                            first_id = %first_id,
                            last_id = %last_id,
                            size = batch.len(),
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %message,
                            "Batch write failed and was rolled back, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    error!(
                        job = %self.job,
                        batch = batch.sequence,
                        first_id = %first_id,
                        last_id = %last_id,
                        size = batch.len(),
                        attempts = attempt,
                        error = %message,
                        "Batch write rolled back"
                    );
                    log_batch_operation(
                        &self.job,
                        batch.sequence,
                        batch.len(),
                        "rolled_back",
                        None,
                        Some(&message),
                    );
                    return FlushOutcome::RolledBack {
                        error: message,
                        attempts: attempt,
                    };
                }
            }
        }
    }
}
