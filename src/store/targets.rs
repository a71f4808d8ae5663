//! Descriptions of the set-based writes a batch can be flushed as.

use serde::{Deserialize, Serialize};

use super::{ColumnType, SqlIdent};
use crate::error::Result;

/// A written column and the SQL type its text value is cast to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub name: String,
    pub column_type: ColumnType,
}

impl OutputColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }
}

/// Bulk `UPDATE … FROM (VALUES …)` keyed by record id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTarget {
    pub table: String,
    pub id_column: String,
    pub id_type: ColumnType,
    pub columns: Vec<OutputColumn>,
}

impl UpdateTarget {
    pub fn new(table: impl Into<String>, columns: Vec<OutputColumn>) -> Self {
        Self {
            table: table.into(),
            id_column: "id".to_string(),
            id_type: ColumnType::Uuid,
            columns,
        }
    }

    pub fn validate(&self) -> Result<()> {
        SqlIdent::new(&self.table)?;
        SqlIdent::new(&self.id_column)?;
        for column in &self.columns {
            SqlIdent::new(&column.name)?;
        }
        Ok(())
    }
}

/// Bulk `INSERT` of child rows referencing the record id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertTarget {
    pub table: String,
    /// Column receiving the record id
    pub foreign_key: String,
    pub foreign_key_type: ColumnType,
    pub columns: Vec<OutputColumn>,
    pub skip_conflicts: bool,
}

impl InsertTarget {
    pub fn new(
        table: impl Into<String>,
        foreign_key: impl Into<String>,
        columns: Vec<OutputColumn>,
    ) -> Self {
        Self {
            table: table.into(),
            foreign_key: foreign_key.into(),
            foreign_key_type: ColumnType::Uuid,
            columns,
            skip_conflicts: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        SqlIdent::new(&self.table)?;
        SqlIdent::new(&self.foreign_key)?;
        for column in &self.columns {
            SqlIdent::new(&column.name)?;
        }
        Ok(())
    }
}

/// A relation whose rows reference the parent and must go first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRelation {
    pub table: String,
    pub foreign_key: String,
}

impl ChildRelation {
    pub fn new(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            foreign_key: foreign_key.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStrategy {
    /// Children in listed order, then the parent, in one transaction
    #[default]
    DependencyOrdered,
    /// Children deleted, kept parent rows copied aside, parent truncated and
    /// refilled, in one transaction. Only valid when no foreign key references
    /// the parent table.
    RebuildTable,
}

/// Batched removal of parent records together with their dependent rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletePlan {
    pub parent: String,
    pub id_column: String,
    pub id_type: ColumnType,
    /// Deleted in this order, before the parent
    pub children: Vec<ChildRelation>,
    pub strategy: DeleteStrategy,
}

impl DeletePlan {
    pub fn new(parent: impl Into<String>, children: Vec<ChildRelation>) -> Self {
        Self {
            parent: parent.into(),
            id_column: "id".to_string(),
            id_type: ColumnType::Uuid,
            children,
            strategy: DeleteStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: DeleteStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        SqlIdent::new(&self.parent)?;
        SqlIdent::new(&self.id_column)?;
        for child in &self.children {
            SqlIdent::new(&child.table)?;
            SqlIdent::new(&child.foreign_key)?;
        }
        Ok(())
    }
}
