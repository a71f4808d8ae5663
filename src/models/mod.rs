//! # Data Model
//!
//! Records flowing through a pipeline run and the per-record results the
//! transformers produce.

pub mod record;
pub mod transform_result;

pub use record::{Record, RecordId, WorkingSet};
pub use transform_result::{
    FailureKind, FieldValue, FieldValues, PendingWrite, TransformFailure, TransformOutcome,
    TransformResult,
};
