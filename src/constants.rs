//! # System Constants
//!
//! Operational defaults and well-known identifier prefixes used by the corpus
//! maintenance pipelines.

/// Pipeline sizing defaults
pub mod pipeline {
    /// Records per set-based write
    pub const DEFAULT_BATCH_SIZE: usize = 5000;
    /// Concurrent in-flight remote lookups
    pub const DEFAULT_REMOTE_CONCURRENCY: usize = 10;
    /// Capacity of the completion channel between transform workers and the collector
    pub const COMPLETION_CHANNEL_CAPACITY: usize = 1024;
    /// Postgres caps bind parameters per statement at u16::MAX
    pub const MAX_BIND_PARAMETERS: usize = 65_535;
}

/// Identifier prefixes written by the normalizers
pub mod prefixes {
    pub const DOI_RESOLVER: &str = "https://doi.org/";
    pub const DOI_HOST: &str = "doi.org/";
    pub const DOI_DIRECTORY: &str = "10.";
    pub const ROR: &str = "https://ror.org/";
    pub const GRID: &str = "https://www.grid.ac/";
    pub const GRID_ID: &str = "grid.";
    pub const ISNI: &str = "http://isni.org/isni/";
    pub const ISNI_HOST: &str = "http://isni.org";
    pub const ISNI_ID: &str = "0000";
}

/// Organization registry defaults
pub mod ror {
    pub const DEFAULT_BASE_URL: &str = "https://api.ror.org/organizations";
    /// Bare ROR identifier: leading zero, six alphanumerics, two digits
    pub const BARE_ID_PATTERN: &str = r"^0[a-zA-Z0-9]{6}\d{2}$";
    /// Candidates kept per organization in the candidate report
    pub const MAX_CANDIDATES: usize = 5;
    pub const USER_AGENT: &str = concat!("citation-corpus/", env!("CARGO_PKG_VERSION"));
}

/// Default corpus table and column names
pub mod tables {
    pub const ASSERTIONS: &str = "assertions";
    pub const AFFILIATIONS: &str = "affiliations";
    pub const FUNDERS: &str = "funders";
    pub const ASSERTIONS_AFFILIATIONS: &str = "assertions_affiliations";
    pub const ASSERTIONS_FUNDERS: &str = "assertions_funders";
    pub const ASSERTIONS_SUBJECTS: &str = "assertions_subjects";

    pub const ID: &str = "id";
    pub const ASSERTION_ID: &str = "assertion_id";
    pub const SUBJECT_ID: &str = "subject_id";
    pub const REPOSITORY_ID: &str = "repository_id";
    pub const SOURCE_ID: &str = "source_id";
    pub const ACCESSION_NUMBER: &str = "accession_number";
    pub const ACCESSION_MATCH: &str = "accession_number_pattern_match";
    pub const EXTERNAL_ID: &str = "external_id";
    pub const TITLE: &str = "title";
    pub const ROR_ID: &str = "ror_id";
    pub const ROR_NAME: &str = "ror_name";

    /// Identifier-bearing assertion columns rewritten by DOI normalization
    pub const DOI_COLUMNS: [&str; 5] = ["subj_id", "obj_id", "doi", "publication", "dataset"];
}

/// File name marker for id lists of records scheduled for deletion
pub const REMOVE_FILE_MARKER: &str = "-remove";
