//! Summary over the per-group accession validation exports.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::constants::tables::{ACCESSION_MATCH, REPOSITORY_ID};
use crate::error::{CorpusError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessionSummary {
    pub file: String,
    pub group: String,
    pub total_accession_numbers: usize,
    pub false_match: usize,
    pub percent_false_match: String,
}

fn percent(part: usize, whole: usize) -> String {
    if whole == 0 {
        return "0%".to_string();
    }
    format!("{:.0}%", part as f64 / whole as f64 * 100.0)
}

/// Summarize one export file. The group is taken from the first data row,
/// or from the file stem when the file has no rows.
pub fn summarize_file(path: &Path) -> Result<AccessionSummary> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);
    let flag = position(ACCESSION_MATCH).ok_or_else(|| {
        CorpusError::ValidationError(format!(
            "{} has no {ACCESSION_MATCH} column",
            path.display()
        ))
    })?;
    let group_column = position(REPOSITORY_ID);

    let mut total = 0;
    let mut false_match = 0;
    let mut group = None;
    for row in reader.records() {
        let row = row?;
        total += 1;
        if row.get(flag).is_some_and(|value| value.eq_ignore_ascii_case("false")) {
            false_match += 1;
        }
        if group.is_none() {
            group = group_column.and_then(|i| row.get(i)).map(str::to_string);
        }
    }

    let file = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let group = group.unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    Ok(AccessionSummary {
        file,
        group,
        total_accession_numbers: total,
        false_match,
        percent_false_match: percent(false_match, total),
    })
}

/// Summarize every `.csv` file in `dir`, sorted by file name
pub fn summarize_dir(dir: &Path) -> Result<Vec<AccessionSummary>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        CorpusError::SetupError(format!("cannot read export directory {}: {e}", dir.display()))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();

    let mut summaries = Vec::with_capacity(files.len());
    for path in files {
        match summarize_file(&path) {
            Ok(summary) => summaries.push(summary),
            Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable export"),
        }
    }
    Ok(summaries)
}

pub fn write_summary(path: &Path, summaries: &[AccessionSummary]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;
    info!(report = %path.display(), files = summaries.len(), "Accession summary written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn export(dir: &Path, name: &str, flags: &[bool]) {
        let mut contents = format!("id,{REPOSITORY_ID},accession_number,{ACCESSION_MATCH}\n");
        for (i, flag) in flags.iter().enumerate() {
            contents.push_str(&format!("id{i},repo-{name},ACC{i},{flag}\n"));
        }
        std::fs::write(dir.join(format!("{name}.csv")), contents).unwrap();
    }

    #[test]
    fn counts_false_matches_per_file() {
        let dir = tempfile::tempdir().unwrap();
        export(dir.path(), "a", &[true, false, true]);
        export(dir.path(), "b", &[false, false]);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let summaries = summarize_dir(dir.path()).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(
            summaries[0],
            AccessionSummary {
                file: "a.csv".to_string(),
                group: "repo-a".to_string(),
                total_accession_numbers: 3,
                false_match: 1,
                percent_false_match: "33%".to_string(),
            }
        );
        assert_eq!(summaries[1].percent_false_match, "100%");
    }

    #[test]
    fn summary_csv_has_expected_header() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("report.csv");
        write_summary(
            &out,
            &[AccessionSummary {
                file: "a.csv".to_string(),
                group: "g".to_string(),
                total_accession_numbers: 4,
                false_match: 0,
                percent_false_match: percent(0, 4),
            }],
        )
        .unwrap();
        let contents = std::fs::read_to_string(out).unwrap();
        assert!(contents.starts_with(
            "file,group,total_accession_numbers,false_match,percent_false_match\n"
        ));
        assert!(contents.contains("a.csv,g,4,0,0%"));
    }

    #[test]
    fn missing_directory_is_a_setup_error() {
        let result = summarize_dir(Path::new("/nonexistent/exports"));
        assert!(matches!(result, Err(CorpusError::SetupError(_))));
    }
}
