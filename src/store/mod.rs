//! # Record Store
//!
//! Set-based access to the relational store holding corpus records.
//!
//! Every write method applies its whole input as one transaction: either all
//! rows are committed or the store is left exactly as it was.
//!
//! - [`postgres`] - sqlx/PostgreSQL implementation
//! - [`in_memory`] - transactional in-memory implementation for tests and dry runs

pub mod in_memory;
pub mod postgres;
pub mod selection;
pub mod targets;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CorpusError, Result};
use crate::models::{PendingWrite, Record, RecordId};

pub use in_memory::InMemoryRecordStore;
pub use postgres::PgRecordStore;
pub use selection::{Predicate, Selection};
pub use targets::{
    ChildRelation, DeletePlan, DeleteStrategy, InsertTarget, OutputColumn, UpdateTarget,
};

/// SQL type an id or output value is cast to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    Text,
    Boolean,
    Uuid,
    BigInt,
}

impl ColumnType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Uuid => "uuid",
            ColumnType::BigInt => "bigint",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// A table or column name that is safe to splice into SQL text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlIdent(String);

impl SqlIdent {
    pub fn new(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid_start && valid_rest && name.len() <= 63 {
            Ok(Self(name.to_string()))
        } else {
            Err(CorpusError::InvalidIdentifier(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set-based query/update/insert/delete interface over corpus tables
#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Read-only selection ordered by id; `after` and `limit` drive keyset paging
    async fn select_page(
        &self,
        selection: &Selection,
        after: Option<&RecordId>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>>;

    /// One bulk update of the target columns, keyed by record id
    async fn update_rows(&self, target: &UpdateTarget, rows: &[PendingWrite]) -> Result<u64>;

    /// One bulk insert of every row carried by the pending writes
    async fn insert_rows(&self, target: &InsertTarget, rows: &[PendingWrite]) -> Result<u64>;

    /// Removes the given parent records and their dependent rows
    async fn delete_records(&self, plan: &DeletePlan, ids: &[RecordId]) -> Result<u64>;

    /// Sets `column` to NULL wherever its trimmed value is one of `values`
    async fn clear_values(&self, table: &str, column: &str, values: &[String]) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_accept_snake_case_names() {
        assert!(SqlIdent::new("assertions_subjects").is_ok());
        assert!(SqlIdent::new("_hidden").is_ok());
    }

    #[test]
    fn identifiers_reject_sql_fragments() {
        for bad in ["", "1table", "ror id", "id;--", "a\"b", "public.assertions"] {
            assert!(SqlIdent::new(bad).is_err(), "{bad} should be rejected");
        }
    }
}
