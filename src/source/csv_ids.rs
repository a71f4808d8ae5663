use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::RecordSource;
use crate::constants::REMOVE_FILE_MARKER;
use crate::error::{CorpusError, Result};
use crate::models::{Record, WorkingSet};

/// Working set made of record ids listed in CSV files.
///
/// Every file in `dir` whose name contains `marker` is read as headerless CSV;
/// the first column of each row is taken verbatim as a record id and the part
/// of the file name before the marker becomes the record's group. An id that
/// appears more than once is kept only at its first occurrence.
#[derive(Debug, Clone)]
pub struct CsvIdSource {
    dir: PathBuf,
    marker: String,
}

impl CsvIdSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            marker: REMOVE_FILE_MARKER.to_string(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Group key encoded in a file name, e.g. `gse-remove-2024.csv` -> `gse`
    pub fn group_for(&self, file_name: &str) -> Option<String> {
        file_name
            .find(&self.marker)
            .map(|position| file_name[..position].to_string())
    }

    fn input_files(&self) -> Result<Vec<(PathBuf, String)>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            CorpusError::SetupError(format!("cannot open {}: {e}", self.dir.display()))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(group) = self.group_for(name) {
                files.push((path.clone(), group));
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_ids(path: &Path) -> Result<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| CorpusError::SetupError(format!("cannot open {}: {e}", path.display())))?;

        let mut ids = Vec::new();
        for row in reader.records() {
            let row = row?;
            match row.get(0) {
                Some(id) if !id.trim().is_empty() => ids.push(id.to_string()),
                _ => {}
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl RecordSource for CsvIdSource {
    fn describe(&self) -> String {
        format!("{}/*{}*", self.dir.display(), self.marker)
    }

    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn load(&self) -> Result<WorkingSet> {
        let files = self.input_files()?;
        if files.is_empty() {
            warn!(marker = %self.marker, "No id files found");
        }

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for (path, group) in files {
            let ids = Self::read_ids(&path)?;
            info!(file = %path.display(), group = %group, count = ids.len(), "Read id list");
            for id in ids {
                if seen.insert(id.clone()) {
                    records.push(Record::new(id).with_group(group.clone()));
                }
            }
        }

        Ok(WorkingSet::new(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn group_is_the_prefix_before_the_marker() {
        let source = CsvIdSource::new(".");
        assert_eq!(
            source.group_for("1c2b-remove-2024-05.csv").as_deref(),
            Some("1c2b")
        );
        assert_eq!(source.group_for("1c2b-keep.csv"), None);
    }

    #[tokio::test]
    async fn reads_first_column_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("repo-a-remove.csv"),
            "0A60B1A9-041A-444E-BD6A-94CAAAB7591B,GSE1\n  \n7d2b0c1e-5f3e-4b8f-9f51-0a3c2d1e4f5a\n",
        )
        .unwrap();
        fs::write(dir.path().join("repo-b-remove-old.csv"), "7d2b0c1e-5f3e-4b8f-9f51-0a3c2d1e4f5a\n")
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored\n").unwrap();

        let working_set = CsvIdSource::new(dir.path()).load().await.unwrap();
        let records = working_set.records();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_str(), "0A60B1A9-041A-444E-BD6A-94CAAAB7591B");
        assert_eq!(records[0].group.as_deref(), Some("repo-a"));
        assert_eq!(records[1].group.as_deref(), Some("repo-a"));
    }

    #[tokio::test]
    async fn missing_directory_is_a_setup_failure() {
        let source = CsvIdSource::new("/nonexistent/corpus/ids");
        assert!(matches!(source.load().await, Err(CorpusError::SetupError(_))));
    }
}
