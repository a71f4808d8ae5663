//! # Batch Sinks
//!
//! Where a committed batch goes. Each flush is one set-based write applied as
//! a single unit: a store statement group inside one transaction, or one
//! append to a report file.

pub mod csv_file;
pub mod store;

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;
use crate::pipeline::Batch;

pub use csv_file::{CsvColumn, CsvField, CsvSink};
pub use store::{DeleteSink, InsertSink, UpdateSink};

#[async_trait]
pub trait BatchSink: Send + Sync + fmt::Debug {
    fn describe(&self) -> String;

    /// Write the whole batch or nothing; returns rows affected
    async fn flush(&self, batch: &Batch) -> Result<u64>;
}
