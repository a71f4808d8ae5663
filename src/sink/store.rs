//! Sinks writing batches back to the record store.

use async_trait::async_trait;
use std::sync::Arc;

use super::BatchSink;
use crate::error::Result;
use crate::pipeline::Batch;
use crate::store::{DeletePlan, InsertTarget, RecordStore, UpdateTarget};

/// Bulk update of output columns keyed by record id
#[derive(Debug, Clone)]
pub struct UpdateSink {
    store: Arc<dyn RecordStore>,
    target: UpdateTarget,
}

impl UpdateSink {
    pub fn new(store: Arc<dyn RecordStore>, target: UpdateTarget) -> Result<Self> {
        target.validate()?;
        Ok(Self { store, target })
    }
}

#[async_trait]
impl BatchSink for UpdateSink {
    fn describe(&self) -> String {
        let columns: Vec<&str> = self.target.columns.iter().map(|c| c.name.as_str()).collect();
        format!("update {}({})", self.target.table, columns.join(", "))
    }

    async fn flush(&self, batch: &Batch) -> Result<u64> {
        self.store.update_rows(&self.target, &batch.items).await
    }
}

/// Bulk insert of child rows referencing each record
#[derive(Debug, Clone)]
pub struct InsertSink {
    store: Arc<dyn RecordStore>,
    target: InsertTarget,
}

impl InsertSink {
    pub fn new(store: Arc<dyn RecordStore>, target: InsertTarget) -> Result<Self> {
        target.validate()?;
        Ok(Self { store, target })
    }
}

#[async_trait]
impl BatchSink for InsertSink {
    fn describe(&self) -> String {
        format!("insert {}", self.target.table)
    }

    async fn flush(&self, batch: &Batch) -> Result<u64> {
        self.store.insert_rows(&self.target, &batch.items).await
    }
}

/// Removal of the batch's records and their dependent rows
#[derive(Debug, Clone)]
pub struct DeleteSink {
    store: Arc<dyn RecordStore>,
    plan: DeletePlan,
}

impl DeleteSink {
    pub fn new(store: Arc<dyn RecordStore>, plan: DeletePlan) -> Result<Self> {
        plan.validate()?;
        Ok(Self { store, plan })
    }
}

#[async_trait]
impl BatchSink for DeleteSink {
    fn describe(&self) -> String {
        format!("delete {} ({:?})", self.plan.parent, self.plan.strategy)
    }

    async fn flush(&self, batch: &Batch) -> Result<u64> {
        self.store.delete_records(&self.plan, &batch.record_ids()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValue, FieldValues, PendingWrite, RecordId};
    use crate::store::{ChildRelation, InMemoryRecordStore, OutputColumn};

    fn pending(id: &str, doi: &str) -> PendingWrite {
        PendingWrite {
            record_id: RecordId::new(id),
            group: None,
            rows: vec![FieldValues::from([("doi".to_string(), FieldValue::text(doi))])],
        }
    }

    #[tokio::test]
    async fn update_sink_writes_the_batch() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert_row("assertions", [("id", Some("a")), ("doi", Some("10.1/x"))]);
        let sink = UpdateSink::new(
            store.clone(),
            UpdateTarget::new("assertions", vec![OutputColumn::text("doi")]),
        )
        .unwrap();

        let batch = Batch {
            sequence: 1,
            items: vec![pending("a", "https://doi.org/10.1/x")],
        };
        assert_eq!(sink.flush(&batch).await.unwrap(), 1);
        assert_eq!(
            store.value("assertions", "a", "doi").as_deref(),
            Some("https://doi.org/10.1/x")
        );
    }

    #[tokio::test]
    async fn delete_sink_removes_children_first() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert_row("assertions", [("id", Some("a"))]);
        store.insert_row("assertions", [("id", Some("b"))]);
        store.insert_row(
            "assertions_subjects",
            [("id", Some("s1")), ("assertion_id", Some("a"))],
        );
        let plan = DeletePlan::new(
            "assertions",
            vec![ChildRelation::new("assertions_subjects", "assertion_id")],
        );
        let sink = DeleteSink::new(store.clone(), plan).unwrap();

        let batch = Batch {
            sequence: 1,
            items: vec![PendingWrite {
                record_id: RecordId::new("a"),
                group: None,
                rows: Vec::new(),
            }],
        };
        sink.flush(&batch).await.unwrap();
        assert_eq!(store.row_count("assertions"), 1);
        assert_eq!(store.row_count("assertions_subjects"), 0);
    }

    #[test]
    fn invalid_targets_are_rejected_up_front() {
        let store = Arc::new(InMemoryRecordStore::new());
        let target = UpdateTarget::new("assertions; drop", vec![OutputColumn::text("doi")]);
        assert!(UpdateSink::new(store, target).is_err());
    }
}
