//! # Record Transformers
//!
//! Per-record strategies plugged into a pipeline. Every transformer turns one
//! [`Record`] into exactly one [`TransformResult`]; problems with a single
//! record become failure results and never abort the run.
//!
//! Local transformers are deterministic string and pattern work with no I/O.
//! Remote-lookup transformers consult an [`OrganizationRegistry`](crate::ror::OrganizationRegistry)
//! and are run concurrently under the pipeline's concurrency cap.

pub mod candidates;
pub mod doi;
pub mod id_list;
pub mod normalize;
pub mod pattern;
pub mod reconcile;
pub mod strategy;
pub mod subjects;

use async_trait::async_trait;
use std::fmt;

use crate::models::{Record, TransformResult};

pub use candidates::RorCandidateCollector;
pub use doi::DoiNormalizer;
pub use id_list::IdListTransformer;
pub use normalize::{normalize_doi, normalize_external_id};
pub use pattern::{InvalidPatternFilter, PatternValidator};
pub use reconcile::RorReconciler;
pub use strategy::StrategyRegistry;
pub use subjects::SubjectMapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerKind {
    /// No I/O; run inline without a concurrency limit
    Local,
    /// Calls an external service; run under the remote concurrency cap
    RemoteLookup,
}

#[async_trait]
pub trait RecordTransformer: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> TransformerKind;

    async fn transform(&self, record: &Record) -> TransformResult;
}
