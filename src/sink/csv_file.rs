//! Report sink appending each batch to a CSV file.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::BatchSink;
use crate::error::{CorpusError, Result};
use crate::models::PendingWrite;
use crate::pipeline::Batch;

/// What a report column is filled from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvField {
    RecordId,
    Group,
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvColumn {
    pub header: String,
    pub field: CsvField,
}

impl CsvColumn {
    pub fn record_id(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            field: CsvField::RecordId,
        }
    }

    pub fn group(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            field: CsvField::Group,
        }
    }

    pub fn value(key: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            field: CsvField::Value(key.into()),
        }
    }

    /// Columns whose header is the output key itself
    pub fn values<I, S>(keys: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        keys.into_iter()
            .map(|key| {
                let key = key.into();
                Self::value(key.clone(), key)
            })
            .collect()
    }
}

/// Writes one CSV line per output row. The header is written once when the
/// sink is created; each batch is rendered in memory and appended with a
/// single write, so a failed batch never leaves a partial block behind.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    columns: Vec<CsvColumn>,
    file: Mutex<File>,
}

impl CsvSink {
    /// Create (or truncate) `path` and write the header
    pub fn create(path: impl AsRef<Path>, columns: Vec<CsvColumn>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let headers: Vec<&str> = columns.iter().map(|c| c.header.as_str()).collect();
        let header = render(|writer| writer.write_record(&headers))?;
        let mut file = File::create(&path)
            .map_err(|e| CorpusError::SetupError(format!("cannot create {}: {e}", path.display())))?;
        file.write_all(&header)?;
        drop(file);

        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self {
            path,
            columns,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cells(&self, item: &PendingWrite) -> Vec<Vec<String>> {
        let render_row = |values: Option<&crate::models::FieldValues>| {
            self.columns
                .iter()
                .map(|column| match &column.field {
                    CsvField::RecordId => item.record_id.to_string(),
                    CsvField::Group => item.group.clone().unwrap_or_default(),
                    CsvField::Value(key) => values
                        .and_then(|values| values.get(key))
                        .and_then(|value| value.as_text())
                        .unwrap_or_default(),
                })
                .collect::<Vec<String>>()
        };

        if item.rows.is_empty() {
            vec![render_row(None)]
        } else {
            item.rows.iter().map(|row| render_row(Some(row))).collect()
        }
    }
}

fn render<F>(write: F) -> Result<Vec<u8>>
where
    F: FnOnce(&mut csv::Writer<Vec<u8>>) -> csv::Result<()>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    write(&mut writer)?;
    writer
        .into_inner()
        .map_err(|e| CorpusError::CsvError(e.to_string()))
}

#[async_trait]
impl BatchSink for CsvSink {
    fn describe(&self) -> String {
        format!("csv {}", self.path.display())
    }

    async fn flush(&self, batch: &Batch) -> Result<u64> {
        let mut lines: u64 = 0;
        let block = render(|writer| {
            for item in &batch.items {
                for record in self.cells(item) {
                    writer.write_record(&record)?;
                    lines += 1;
                }
            }
            Ok(())
        })?;

        let mut file = self.file.lock();
        file.write_all(&block)?;
        file.flush()?;
        Ok(lines)
    }
}
