//! # Source Reader
//!
//! Materializes the working set for one pipeline run. Readers never mutate
//! the store. The whole working set is held in memory before transformation
//! starts, so memory use is proportional to the number of selected records;
//! keyset paging bounds the size of each query, not the total.

pub mod csv_ids;
pub mod store;

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;
use crate::models::WorkingSet;

pub use csv_ids::CsvIdSource;
pub use store::StoreSource;

#[async_trait]
pub trait RecordSource: Send + Sync + fmt::Debug {
    /// Short label used in logs
    fn describe(&self) -> String;

    /// Select the working set. Errors here are fatal setup failures.
    async fn load(&self) -> Result<WorkingSet>;
}

/// A fixed working set, for callers that already hold their records
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    working_set: WorkingSet,
}

impl StaticSource {
    pub fn new(working_set: WorkingSet) -> Self {
        Self { working_set }
    }
}

#[async_trait]
impl RecordSource for StaticSource {
    fn describe(&self) -> String {
        format!("static({} records)", self.working_set.len())
    }

    async fn load(&self) -> Result<WorkingSet> {
        Ok(self.working_set.clone())
    }
}
