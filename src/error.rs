//! Error types for the corpus maintenance pipelines.

use thiserror::Error;

use crate::pipeline::RunReport;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorpusError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Remote lookup error: {0}")]
    RemoteError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("CSV error: {0}")]
    CsvError(String),
    /// Failures before any batch work begins (connection, input discovery)
    #[error("Setup failed: {0}")]
    SetupError(String),
    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Injected failure: {0}")]
    InjectedFailure(String),
    /// A group run failed after earlier groups of the same job had finished
    #[error("{source} (after {} completed runs)", completed.len())]
    PartialRun {
        completed: Vec<RunReport>,
        source: Box<CorpusError>,
    },
}

impl CorpusError {
    /// Attach the reports of runs that finished before this error
    pub fn with_completed_runs(self, completed: Vec<RunReport>) -> Self {
        if completed.is_empty() {
            return self;
        }
        CorpusError::PartialRun {
            completed,
            source: Box::new(self),
        }
    }

    /// Reports of the runs that finished before the failure, if any
    pub fn completed_runs(&self) -> &[RunReport] {
        match self {
            CorpusError::PartialRun { completed, .. } => completed,
            _ => &[],
        }
    }
}

impl From<sqlx::Error> for CorpusError {
    fn from(err: sqlx::Error) -> Self {
        CorpusError::DatabaseError(err.to_string())
    }
}

impl From<std::io::Error> for CorpusError {
    fn from(err: std::io::Error) -> Self {
        CorpusError::IoError(err.to_string())
    }
}

impl From<csv::Error> for CorpusError {
    fn from(err: csv::Error) -> Self {
        CorpusError::CsvError(err.to_string())
    }
}

impl From<config::ConfigError> for CorpusError {
    fn from(err: config::ConfigError) -> Self {
        CorpusError::ConfigurationError(err.to_string())
    }
}

impl From<serde_json::Error> for CorpusError {
    fn from(err: serde_json::Error) -> Self {
        CorpusError::ValidationError(format!("JSON serialization error: {err}"))
    }
}

impl From<regex::Error> for CorpusError {
    fn from(err: regex::Error) -> Self {
        CorpusError::ConfigurationError(format!("Invalid pattern: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, CorpusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_with_message() {
        let err: CorpusError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv").into();
        assert!(matches!(err, CorpusError::IoError(ref msg) if msg.contains("missing.csv")));
    }

    #[test]
    fn display_includes_category() {
        let err = CorpusError::SetupError("cannot connect".to_string());
        assert_eq!(err.to_string(), "Setup failed: cannot connect");
    }

    #[test]
    fn completed_runs_travel_with_the_error() {
        let err = CorpusError::SetupError("no input".to_string());
        assert_eq!(err.clone().with_completed_runs(Vec::new()), err);

        let partial = err.with_completed_runs(vec![RunReport::new("first", 3)]);
        assert_eq!(partial.completed_runs().len(), 1);
        assert_eq!(partial.to_string(), "Setup failed: no input (after 1 completed runs)");
    }
}
