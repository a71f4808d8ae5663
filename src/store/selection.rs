//! Selection criteria for the source reader.

use serde::{Deserialize, Serialize};

use super::{ColumnType, SqlIdent};
use crate::error::Result;

/// A row filter applied when selecting a working set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// `column = value` with the value cast to the column type
    Equals {
        column: String,
        value: String,
        cast: ColumnType,
    },
    /// `column IS NULL`, used on output columns to select unprocessed rows
    IsNull { column: String },
    IsNotNull { column: String },
    /// No row in `table` references this record through `foreign_key`
    NoChildRows { table: String, foreign_key: String },
}

impl Predicate {
    pub fn equals(column: impl Into<String>, value: impl Into<String>, cast: ColumnType) -> Self {
        Predicate::Equals {
            column: column.into(),
            value: value.into(),
            cast,
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Predicate::IsNull {
            column: column.into(),
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Predicate::IsNotNull {
            column: column.into(),
        }
    }

    pub fn no_child_rows(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Predicate::NoChildRows {
            table: table.into(),
            foreign_key: foreign_key.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Predicate::Equals { column, .. }
            | Predicate::IsNull { column }
            | Predicate::IsNotNull { column } => {
                SqlIdent::new(column).map(|_| ())
            }
            Predicate::NoChildRows { table, foreign_key } => {
                SqlIdent::new(table)?;
                SqlIdent::new(foreign_key).map(|_| ())
            }
        }
    }
}

/// Which rows of which table form a working set, and which of their columns
/// the transformer gets to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub table: String,
    pub id_column: String,
    pub id_type: ColumnType,
    /// Column whose value becomes `Record::group`
    pub group_column: Option<String>,
    pub input_columns: Vec<String>,
    pub predicates: Vec<Predicate>,
}

impl Selection {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_column: "id".to_string(),
            id_type: ColumnType::Uuid,
            group_column: None,
            input_columns: Vec::new(),
            predicates: Vec::new(),
        }
    }

    pub fn id_column(mut self, column: impl Into<String>, id_type: ColumnType) -> Self {
        self.id_column = column.into();
        self.id_type = id_type;
        self
    }

    pub fn group_column(mut self, column: impl Into<String>) -> Self {
        self.group_column = Some(column.into());
        self
    }

    pub fn input_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Restrict to rows whose output columns are all still unset
    pub fn unset<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predicates
            .extend(columns.into_iter().map(|column| Predicate::is_null(column)));
        self
    }

    /// Reject anything that cannot be spliced into SQL as an identifier
    pub fn validate(&self) -> Result<()> {
        SqlIdent::new(&self.table)?;
        SqlIdent::new(&self.id_column)?;
        if let Some(group) = &self.group_column {
            SqlIdent::new(group)?;
        }
        for column in &self.input_columns {
            SqlIdent::new(column)?;
        }
        for predicate in &self.predicates {
            predicate.validate()?;
        }
        Ok(())
    }
}
