use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::RecordSource;
use crate::error::{CorpusError, Result};
use crate::models::{Record, WorkingSet};
use crate::store::{RecordStore, Selection};

/// Working set drawn from a [`RecordStore`] selection.
///
/// With no page size the selection runs as one query; otherwise pages of
/// `page_size` rows are fetched by id until a short page comes back.
#[derive(Debug, Clone)]
pub struct StoreSource {
    store: Arc<dyn RecordStore>,
    selection: Selection,
    page_size: Option<usize>,
}

impl StoreSource {
    pub fn new(store: Arc<dyn RecordStore>, selection: Selection) -> Self {
        Self {
            store,
            selection,
            page_size: None,
        }
    }

    pub fn with_page_size(mut self, page_size: Option<usize>) -> Self {
        self.page_size = page_size.filter(|size| *size > 0);
        self
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }
}

#[async_trait]
impl RecordSource for StoreSource {
    fn describe(&self) -> String {
        format!("table {}", self.selection.table)
    }

    #[instrument(skip(self), fields(table = %self.selection.table, page_size = ?self.page_size))]
    async fn load(&self) -> Result<WorkingSet> {
        self.selection
            .validate()
            .map_err(|e| CorpusError::SetupError(e.to_string()))?;

        let Some(page_size) = self.page_size else {
            let records = self
                .store
                .select_page(&self.selection, None, None)
                .await
                .map_err(|e| CorpusError::SetupError(format!("selection failed: {e}")))?;
            info!(count = records.len(), "Loaded working set");
            return Ok(WorkingSet::new(records));
        };

        let mut records: Vec<Record> = Vec::new();
        let mut pages = 0usize;
        loop {
            let after = records.last().map(|record| record.id.clone());
            let page = self
                .store
                .select_page(&self.selection, after.as_ref(), Some(page_size))
                .await
                .map_err(|e| CorpusError::SetupError(format!("selection failed: {e}")))?;
            pages += 1;
            let short = page.len() < page_size;
            debug!(page = pages, rows = page.len(), "Fetched page");
            records.extend(page);
            if short {
                break;
            }
        }

        info!(count = records.len(), pages, "Loaded working set");
        Ok(WorkingSet::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRecordStore;

    fn store_with(ids: &[&str]) -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::new());
        for id in ids {
            store.insert_row("funders", [("id", Some(*id)), ("ror_id", None)]);
        }
        store.insert_row("funders", [("id", Some("done")), ("ror_id", Some("https://ror.org/x"))]);
        store
    }

    #[tokio::test]
    async fn paged_load_matches_single_query() {
        let store = store_with(&["a", "b", "c", "d", "e"]);
        let selection = Selection::new("funders").unset(["ror_id"]);

        let whole = StoreSource::new(store.clone(), selection.clone())
            .load()
            .await
            .unwrap();
        let paged = StoreSource::new(store, selection)
            .with_page_size(Some(2))
            .load()
            .await
            .unwrap();

        assert_eq!(whole.len(), 5);
        assert_eq!(whole, paged);
    }

    #[tokio::test]
    async fn exact_page_multiple_terminates() {
        let store = store_with(&["a", "b", "c", "d"]);
        let source =
            StoreSource::new(store, Selection::new("funders").unset(["ror_id"])).with_page_size(Some(2));
        assert_eq!(source.load().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn invalid_selection_is_a_setup_failure() {
        let store = store_with(&[]);
        let source = StoreSource::new(store, Selection::new("funders; --"));
        assert!(matches!(source.load().await, Err(CorpusError::SetupError(_))));
    }
}
