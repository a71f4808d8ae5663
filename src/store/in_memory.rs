//! # In-Memory Record Store
//!
//! A [`RecordStore`] holding tables as rows of text values. Every write is
//! applied to a staged copy of the table and swapped in only when the whole
//! batch succeeded, which gives the same all-or-nothing behavior as a
//! database transaction. Write failures can be injected to exercise rollback
//! paths.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use super::{DeletePlan, InsertTarget, Predicate, RecordStore, Selection, UpdateTarget};
use crate::error::{CorpusError, Result};
use crate::models::{FieldValue, FieldValues, PendingWrite, Record, RecordId};

/// Column name to text value; `None` is NULL
pub type Row = BTreeMap<String, Option<String>>;

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    failing_ids: RwLock<HashSet<String>>,
    fail_next: AtomicUsize,
    write_statements: AtomicU64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_row<'a, I>(&self, table: &str, columns: I)
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let row: Row = columns
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.map(str::to_string)))
            .collect();
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    /// The row of `table` whose `id` column equals `id`
    pub fn row(&self, table: &str, id: &str) -> Option<Row> {
        self.tables
            .read()
            .get(table)?
            .iter()
            .find(|row| cell(row, "id") == Some(id))
            .cloned()
    }

    pub fn value(&self, table: &str, id: &str, column: &str) -> Option<String> {
        self.row(table, id)
            .and_then(|row| row.get(column).cloned().flatten())
    }

    /// Any write whose input touches `id` fails after part of it was staged
    pub fn fail_writes_touching(&self, id: &str) {
        self.failing_ids.write().insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_ids.write().clear();
        self.fail_next.store(0, Ordering::SeqCst);
    }

    /// The next `count` write statements fail before touching anything
    pub fn fail_next_writes(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Write statements attempted so far, failed ones included
    pub fn write_statements(&self) -> u64 {
        self.write_statements.load(Ordering::SeqCst)
    }

    fn begin_write(&self) -> Result<()> {
        self.write_statements.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if injected {
            return Err(CorpusError::InjectedFailure(
                "write statement rejected".to_string(),
            ));
        }
        Ok(())
    }

    fn check_touch(&self, id: &str) -> Result<()> {
        if self.failing_ids.read().contains(id) {
            return Err(CorpusError::InjectedFailure(format!(
                "write touching record {id} rejected"
            )));
        }
        Ok(())
    }
}

fn matches(tables: &HashMap<String, Vec<Row>>, selection: &Selection, row: &Row) -> bool {
    selection.predicates.iter().all(|predicate| match predicate {
        Predicate::Equals { column, value, .. } => cell(row, column) == Some(value.as_str()),
        Predicate::IsNull { column } => cell(row, column).is_none(),
        Predicate::IsNotNull { column } => cell(row, column).is_some(),
        Predicate::NoChildRows { table, foreign_key } => {
            let Some(id) = cell(row, &selection.id_column) else {
                return true;
            };
            tables.get(table).map_or(true, |children| {
                !children
                    .iter()
                    .any(|child| cell(child, foreign_key) == Some(id))
            })
        }
    })
}

fn cell<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|value| value.as_deref())
}

fn field_text(values: Option<&FieldValues>, column: &str) -> Option<String> {
    values
        .and_then(|values| values.get(column))
        .and_then(FieldValue::as_text)
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn select_page(
        &self,
        selection: &Selection,
        after: Option<&RecordId>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>> {
        selection.validate()?;
        let tables = self.tables.read();
        let Some(rows) = tables.get(&selection.table) else {
            return Ok(Vec::new());
        };

        let mut records: Vec<Record> = rows
            .iter()
            .filter(|row| matches(&tables, selection, row))
            .filter_map(|row| {
                let id = cell(row, &selection.id_column)?;
                if after.is_some_and(|after| id <= after.as_str()) {
                    return None;
                }
                let mut record = Record::new(id);
                record.group = selection
                    .group_column
                    .as_deref()
                    .and_then(|group| cell(row, group))
                    .map(str::to_string);
                for column in &selection.input_columns {
                    record
                        .fields
                        .insert(column.clone(), cell(row, column).map(str::to_string));
                }
                Some(record)
            })
            .collect();

        records.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn update_rows(&self, target: &UpdateTarget, rows: &[PendingWrite]) -> Result<u64> {
        target.validate()?;
        if rows.is_empty() {
            return Ok(0);
        }
        self.begin_write()?;

        let mut tables = self.tables.write();
        let mut staged = tables.get(&target.table).cloned().unwrap_or_default();
        let mut updated = 0;
        for write in rows {
            self.check_touch(write.record_id.as_str())?;
            for row in staged
                .iter_mut()
                .filter(|row| cell(row, &target.id_column) == Some(write.record_id.as_str()))
            {
                for column in &target.columns {
                    row.insert(
                        column.name.clone(),
                        field_text(write.values(), &column.name),
                    );
                }
                updated += 1;
            }
        }
        tables.insert(target.table.clone(), staged);

        debug!(table = %target.table, updated, "Applied in-memory update");
        Ok(updated)
    }

    async fn insert_rows(&self, target: &InsertTarget, rows: &[PendingWrite]) -> Result<u64> {
        target.validate()?;
        if rows.iter().all(|write| write.rows.is_empty()) {
            return Ok(0);
        }
        self.begin_write()?;

        let mut tables = self.tables.write();
        let mut staged = tables.get(&target.table).cloned().unwrap_or_default();
        let mut inserted = 0;
        for write in rows {
            self.check_touch(write.record_id.as_str())?;
            for values in &write.rows {
                let mut row = Row::new();
                row.insert(
                    target.foreign_key.clone(),
                    Some(write.record_id.as_str().to_string()),
                );
                for column in &target.columns {
                    row.insert(
                        column.name.clone(),
                        field_text(Some(values), &column.name),
                    );
                }
                if target.skip_conflicts && staged.contains(&row) {
                    continue;
                }
                staged.push(row);
                inserted += 1;
            }
        }
        tables.insert(target.table.clone(), staged);

        Ok(inserted)
    }

    async fn delete_records(&self, plan: &DeletePlan, ids: &[RecordId]) -> Result<u64> {
        plan.validate()?;
        if ids.is_empty() {
            return Ok(0);
        }
        self.begin_write()?;
        for id in ids {
            self.check_touch(id.as_str())?;
        }
        let doomed: HashSet<&str> = ids.iter().map(RecordId::as_str).collect();

        let mut tables = self.tables.write();
        let mut staged: HashMap<String, Vec<Row>> = HashMap::new();
        for child in &plan.children {
            let mut kept = tables.get(&child.table).cloned().unwrap_or_default();
            kept.retain(|row| {
                cell(row, &child.foreign_key).map_or(true, |fk| !doomed.contains(fk))
            });
            staged.insert(child.table.clone(), kept);
        }

        let mut parent = tables.get(&plan.parent).cloned().unwrap_or_default();
        let before = parent.len();
        parent.retain(|row| {
            cell(row, &plan.id_column).map_or(true, |id| !doomed.contains(id))
        });
        let deleted = (before - parent.len()) as u64;
        staged.insert(plan.parent.clone(), parent);

        tables.extend(staged);
        Ok(deleted)
    }

    async fn clear_values(&self, table: &str, column: &str, values: &[String]) -> Result<u64> {
        super::SqlIdent::new(table)?;
        super::SqlIdent::new(column)?;
        if values.is_empty() {
            return Ok(0);
        }
        self.begin_write()?;

        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut cleared = 0;
        for row in rows.iter_mut() {
            let invalid = cell(row, column)
                .map(str::trim)
                .is_some_and(|value| values.iter().any(|v| v == value));
            if invalid {
                row.insert(column.to_string(), None);
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}
